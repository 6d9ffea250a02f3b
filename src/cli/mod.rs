//! CLI implementation using clap.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::reader::ReportFormat;

/// covmodel - Merge, compare and filter code coverage reports.
#[derive(Parser)]
#[command(name = "covmodel")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Output format (defaults to the configured format)
    #[arg(short, long, value_enum, global = true)]
    pub format: Option<OutputFormat>,

    /// Configuration file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Skip malformed records and reports instead of failing
    #[arg(long, global = true)]
    pub ignore_errors: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Summarize one or more coverage reports
    #[command(alias = "sum")]
    Summary(SummaryArgs),

    /// Merge reports and show each input next to the result
    Merge(ReportArgs),

    /// Compare reports with baseline reports
    Delta(DeltaArgs),

    /// Show the coverage of the lines changed in a diff
    #[command(alias = "diff")]
    Changes(ChangesArgs),

    /// Fail if coverage is below the configured thresholds
    #[command(alias = "gate")]
    Check(CheckArgs),
}

/// Reports to read.
#[derive(Args)]
pub struct ReportArgs {
    /// Report files or directories containing reports
    #[arg(required = true)]
    pub reports: Vec<PathBuf>,

    /// Report format (detected from the content if omitted)
    #[arg(long)]
    pub report_format: Option<ReportFormat>,
}

#[derive(Args)]
pub struct SummaryArgs {
    #[command(flatten)]
    pub input: ReportArgs,

    /// Include one row per file
    #[arg(long)]
    pub files: bool,
}

#[derive(Args)]
pub struct DeltaArgs {
    #[command(flatten)]
    pub input: ReportArgs,

    /// Reports of the baseline
    #[arg(short, long, required = true, num_args = 1..)]
    pub baseline: Vec<PathBuf>,
}

#[derive(Args)]
pub struct ChangesArgs {
    #[command(flatten)]
    pub input: ReportArgs,

    /// Unified diff of the changes
    #[arg(short, long)]
    pub diff: PathBuf,

    /// Reports of the baseline, used for indirect coverage changes
    #[arg(short, long, num_args = 1..)]
    pub baseline: Vec<PathBuf>,
}

#[derive(Args)]
pub struct CheckArgs {
    #[command(flatten)]
    pub input: ReportArgs,

    /// Minimum line coverage in percent
    #[arg(long)]
    pub min_line: Option<f64>,

    /// Minimum branch coverage in percent
    #[arg(long)]
    pub min_branch: Option<f64>,

    /// Minimum mutation coverage in percent
    #[arg(long)]
    pub min_mutation: Option<f64>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Markdown,
    Text,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_verify() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_summary_defaults() {
        let cli = Cli::try_parse_from(["covmodel", "summary", "coverage.json"]).unwrap();
        assert!(cli.format.is_none());
        assert!(!cli.ignore_errors);
        match cli.command {
            Command::Summary(args) => {
                assert_eq!(args.input.reports, vec![PathBuf::from("coverage.json")]);
                assert!(args.input.report_format.is_none());
                assert!(!args.files);
            }
            _ => panic!("expected summary"),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "covmodel",
            "merge",
            "a.json",
            "b.json",
            "--format",
            "json",
            "--ignore-errors",
            "-v",
        ])
        .unwrap();
        assert_eq!(cli.format, Some(OutputFormat::Json));
        assert!(cli.ignore_errors);
        assert!(cli.verbose);
        assert!(matches!(cli.command, Command::Merge(ref args) if args.reports.len() == 2));
    }

    #[test]
    fn test_report_format_flag() {
        let cli = Cli::try_parse_from([
            "covmodel",
            "summary",
            "--report-format",
            "istanbul",
            "coverage-final.json",
        ])
        .unwrap();
        match cli.command {
            Command::Summary(args) => {
                assert_eq!(args.input.report_format, Some(ReportFormat::Istanbul));
            }
            _ => panic!("expected summary"),
        }
        assert!(Cli::try_parse_from([
            "covmodel",
            "summary",
            "--report-format",
            "cobertura",
            "coverage.xml",
        ])
        .is_err());
    }

    #[test]
    fn test_summary_requires_reports() {
        assert!(Cli::try_parse_from(["covmodel", "summary"]).is_err());
    }

    #[test]
    fn test_delta_requires_baseline() {
        assert!(Cli::try_parse_from(["covmodel", "delta", "new.json"]).is_err());
        let cli =
            Cli::try_parse_from(["covmodel", "delta", "new.json", "--baseline", "old.json"]).unwrap();
        assert!(matches!(cli.command, Command::Delta(ref args) if args.baseline.len() == 1));
    }

    #[test]
    fn test_changes_args() {
        let cli = Cli::try_parse_from([
            "covmodel",
            "changes",
            "new.json",
            "--diff",
            "changes.diff",
        ])
        .unwrap();
        match cli.command {
            Command::Changes(args) => {
                assert_eq!(args.diff, PathBuf::from("changes.diff"));
                assert!(args.baseline.is_empty());
            }
            _ => panic!("expected changes"),
        }
    }

    #[test]
    fn test_check_thresholds() {
        let cli = Cli::try_parse_from([
            "covmodel",
            "gate",
            "new.json",
            "--min-line",
            "80",
            "--min-branch",
            "65.5",
        ])
        .unwrap();
        match cli.command {
            Command::Check(args) => {
                assert_eq!(args.min_line, Some(80.0));
                assert_eq!(args.min_branch, Some(65.5));
                assert!(args.min_mutation.is_none());
            }
            _ => panic!("expected check"),
        }
    }
}
