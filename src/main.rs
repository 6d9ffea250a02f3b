//! covmodel CLI - Merge, compare and filter code coverage reports.

use std::io::stdout;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use covmodel::changes::ChangeSet;
use covmodel::cli::{Cli, Command, OutputFormat, ReportArgs};
use covmodel::config::{self, Config};
use covmodel::core::Result;
use covmodel::model::Tree;
use covmodel::output::{Format, Render};
use covmodel::reader::{self, ProcessingMode, ReportLog};
use covmodel::report::{ChangeSummary, DeltaSummary, MergeSummary, TreeSummary};

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

/// Settings shared by all commands.
struct Context {
    config: Config,
    format: Format,
    color: bool,
}

impl Context {
    fn new(cli: &Cli) -> Result<Self> {
        let mut config = match &cli.config {
            Some(path) => Config::from_file(path)?,
            None => Config::load_default(".")?,
        };
        if cli.ignore_errors {
            config.reader.mode = ProcessingMode::IgnoreErrors;
        }

        let format = match cli.format {
            Some(OutputFormat::Json) => Format::Json,
            Some(OutputFormat::Markdown) => Format::Markdown,
            Some(OutputFormat::Text) => Format::Text,
            None => match config.output.format {
                config::OutputFormat::Json => Format::Json,
                config::OutputFormat::Markdown => Format::Markdown,
                config::OutputFormat::Text => Format::Text,
            },
        };
        let color = config.output.color && !cli.no_color;
        Ok(Self {
            config,
            format,
            color,
        })
    }

    fn new_log(&self, title: &str) -> ReportLog {
        ReportLog::new(title).with_max_lines(self.config.reader.max_log_lines)
    }

    fn read(&self, paths: &[PathBuf], args: &ReportArgs, log: &mut ReportLog) -> Result<Tree> {
        let filter = self.config.reader.filter()?;
        reader::read_all(
            paths,
            args.report_format,
            self.config.reader.mode,
            &filter,
            log,
        )
    }

    fn write<T: Render>(&self, data: &T) -> Result<()> {
        self.format.write(data, &mut stdout(), self.color)
    }
}

fn run(cli: Cli) -> Result<()> {
    let ctx = Context::new(&cli)?;

    match &cli.command {
        Command::Summary(args) => {
            let mut log = ctx.new_log("summary");
            let tree = ctx.read(&args.input.reports, &args.input, &mut log)?;
            let mut summary = TreeSummary::new(&tree).with_log(&log);
            if !args.files {
                summary.files.clear();
            }
            ctx.write(&summary)?;
        }
        Command::Merge(args) => {
            let mut log = ctx.new_log("merge");
            let filter = ctx.config.reader.filter()?;
            let mut inputs: Vec<(PathBuf, Tree)> = Vec::new();
            for path in reader::expand_paths(&args.reports, &filter)? {
                let mode = ctx.config.reader.mode;
                match reader::read_report(&path, args.report_format, mode, &mut log) {
                    Ok(tree) => inputs.push((path, tree)),
                    Err(error) if mode == ProcessingMode::IgnoreErrors => {
                        warn!("Skipping report: {error}");
                        log.log_error(format!("Skipping report: {error}"));
                    }
                    Err(error) => return Err(error),
                }
            }
            let merged =
                reader::merge_reports(inputs.iter().map(|(_, tree)| tree.copy_tree()).collect())?;
            info!(reports = inputs.len(), "Merged reports");
            let mut summary = MergeSummary::new(
                inputs.iter().map(|(path, tree)| (path.as_path(), tree)),
                &merged,
            );
            summary.merged = summary.merged.with_log(&log);
            ctx.write(&summary)?;
        }
        Command::Delta(args) => {
            let mut log = ctx.new_log("delta");
            let mut current = ctx.read(&args.input.reports, &args.input, &mut log)?;
            let baseline = ctx.read(&args.baseline, &args.input, &mut log)?;
            let files = current.compute_file_deltas(&baseline);
            info!(files, "Computed file deltas");
            ctx.write(&DeltaSummary::new(&current, &baseline))?;
        }
        Command::Changes(args) => {
            let mut log = ctx.new_log("changes");
            let mut tree = ctx.read(&args.input.reports, &args.input, &mut log)?;
            let changes = ChangeSet::from_diff_file(&args.diff)?;
            let changed = tree.apply_changes(&changes);
            if !args.baseline.is_empty() {
                let baseline = ctx.read(&args.baseline, &args.input, &mut log)?;
                tree.compute_indirect_changes(&baseline);
            }
            ctx.write(&ChangeSummary::new(&tree, changed))?;
        }
        Command::Check(args) => {
            let mut log = ctx.new_log("check");
            let tree = ctx.read(&args.input.reports, &args.input, &mut log)?;
            let summary = TreeSummary::new(&tree).with_log(&log);
            let mut gate = ctx.config.gate.clone();
            gate.min_line_coverage = args.min_line.or(gate.min_line_coverage);
            gate.min_branch_coverage = args.min_branch.or(gate.min_branch_coverage);
            gate.min_mutation_coverage = args.min_mutation.or(gate.min_mutation_coverage);
            ctx.write(&summary)?;
            summary.check(&gate)?;
        }
    }

    Ok(())
}
