//! Report readers that turn coverage and mutation reports into trees.
//!
//! Every reader produces a tree rooted at a module named `-`, with one
//! package per source directory and one file node per source file. Line
//! counters and mutations are stored on the file nodes; their line, branch
//! and mutation values are computed once the file is complete.

mod coverage_py;
mod istanbul;
mod llvm_cov;
mod mutations;

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use globset::{Glob, GlobSet, GlobSetBuilder};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

pub use coverage_py::CoveragePyReader;
pub use istanbul::IstanbulReader;
pub use llvm_cov::LlvmCovReader;
pub use mutations::MutationReportReader;

use crate::core::{Error, Result};
use crate::model::{Node, Tree, EMPTY_NAME};

/// Default number of error lines kept in a [`ReportLog`].
pub const DEFAULT_MAX_LOG_LINES: usize = 20;

/// How a reader reacts to malformed records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingMode {
    /// Abort the read on the first malformed record.
    #[default]
    FailFast,
    /// Skip malformed records and record them in the log.
    IgnoreErrors,
}

impl FromStr for ProcessingMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "fail_fast" | "strict" => Ok(Self::FailFast),
            "ignore_errors" | "ignore" => Ok(Self::IgnoreErrors),
            _ => Err(format!(
                "Unknown processing mode: {s}. Use 'fail_fast' or 'ignore_errors'"
            )),
        }
    }
}

/// Messages collected while reading reports.
///
/// Only the first `max_lines` errors are stored, further errors are counted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportLog {
    title: String,
    info: Vec<String>,
    errors: Vec<String>,
    max_lines: usize,
    skipped: usize,
}

impl ReportLog {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            info: Vec::new(),
            errors: Vec::new(),
            max_lines: DEFAULT_MAX_LOG_LINES,
            skipped: 0,
        }
    }

    pub fn with_max_lines(mut self, max_lines: usize) -> Self {
        self.max_lines = max_lines;
        self
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn log_info(&mut self, message: impl Into<String>) {
        self.info.push(message.into());
    }

    pub fn log_error(&mut self, message: impl Into<String>) {
        if self.errors.len() < self.max_lines {
            self.errors.push(message.into());
        } else {
            self.skipped += 1;
        }
    }

    pub fn info_messages(&self) -> &[String] {
        &self.info
    }

    pub fn error_messages(&self) -> &[String] {
        &self.errors
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Number of errors that exceeded the line limit.
    pub fn skipped_errors(&self) -> usize {
        self.skipped
    }

    /// Appends the messages of another log, respecting this log's limit.
    pub fn merge(&mut self, other: ReportLog) {
        self.info.extend(other.info);
        for error in other.errors {
            self.log_error(error);
        }
        self.skipped += other.skipped;
    }
}

/// Reads one report format into a coverage tree.
pub trait ReportReader: Send + Sync {
    /// Unique identifier of the format.
    fn name(&self) -> &'static str;

    fn mode(&self) -> ProcessingMode;

    /// Parses the content of a report; `source` is used in messages only.
    fn read_str(&self, content: &str, source: &Path, log: &mut ReportLog) -> Result<Tree>;

    /// Whether a file looks like a report of this reader.
    fn accepts(&self, path: &Path) -> bool {
        path.extension().is_some_and(|ext| ext == "json")
    }

    fn read(&self, path: &Path, log: &mut ReportLog) -> Result<Tree> {
        let content = fs::read_to_string(path)?;
        let tree = self.read_str(&content, path, log)?;
        let message = format!(
            "Successfully parsed {} report '{}' with {} files",
            self.name(),
            path.display(),
            tree.all_files().len()
        );
        info!("{message}");
        log.log_info(message);
        Ok(tree)
    }

    /// Reads all accepted reports below a directory and merges them.
    ///
    /// Rejects anything that is not a directory. Returns an empty module if
    /// no report is found.
    fn read_directory(&self, dir: &Path, filter: &ReportFilter, log: &mut ReportLog) -> Result<Tree> {
        if !dir.is_dir() {
            return Err(Error::NotADirectory {
                path: dir.to_path_buf(),
            });
        }
        let mut trees = Vec::new();
        for path in find_reports(dir, filter)? {
            if !self.accepts(&path) {
                continue;
            }
            match self.read(&path, log) {
                Ok(tree) => trees.push(tree),
                Err(error) => self.handle_record_error(error, log)?,
            }
        }
        merge_reports(trees)
    }

    /// Propagates the error in fail-fast mode, logs it otherwise.
    fn handle_record_error(&self, error: Error, log: &mut ReportLog) -> Result<()> {
        match self.mode() {
            ProcessingMode::FailFast => Err(error),
            ProcessingMode::IgnoreErrors => {
                warn!(reader = self.name(), "Skipping malformed record: {error}");
                log.log_error(format!("Skipping malformed record: {error}"));
                Ok(())
            }
        }
    }
}

/// Supported report formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReportFormat {
    /// `llvm-cov export` JSON.
    LlvmCov,
    /// Istanbul / nyc `coverage-final.json`.
    Istanbul,
    /// coverage.py `coverage json`.
    CoveragePy,
    /// Mutation testing report schema (Stryker and compatible tools).
    Mutations,
}

impl ReportFormat {
    pub const ALL: [ReportFormat; 4] = [
        ReportFormat::LlvmCov,
        ReportFormat::Istanbul,
        ReportFormat::CoveragePy,
        ReportFormat::Mutations,
    ];

    /// Detects the format from the structure of a parsed report.
    pub fn detect(report: &serde_json::Value) -> Option<Self> {
        let object = report.as_object()?;
        if object
            .get("type")
            .and_then(|t| t.as_str())
            .is_some_and(|t| t.starts_with("llvm.coverage.json.export"))
            || object.get("data").is_some_and(|d| d.is_array())
        {
            return Some(Self::LlvmCov);
        }
        if object.contains_key("schemaVersion") && object.contains_key("files") {
            return Some(Self::Mutations);
        }
        if object.contains_key("meta") && object.contains_key("files") {
            return Some(Self::CoveragePy);
        }
        if !object.is_empty()
            && object
                .values()
                .all(|entry| entry.get("statementMap").is_some())
        {
            return Some(Self::Istanbul);
        }
        None
    }

    /// Detects the format of report content.
    pub fn detect_str(content: &str, source: &Path) -> Result<Self> {
        let report: serde_json::Value =
            serde_json::from_str(content).map_err(|e| Error::parse(source, e.to_string()))?;
        Self::detect(&report).ok_or_else(|| Error::UnknownFormat {
            path: source.to_path_buf(),
        })
    }

    pub fn reader(self, mode: ProcessingMode) -> Box<dyn ReportReader> {
        match self {
            Self::LlvmCov => Box::new(LlvmCovReader::new(mode)),
            Self::Istanbul => Box::new(IstanbulReader::new(mode)),
            Self::CoveragePy => Box::new(CoveragePyReader::new(mode)),
            Self::Mutations => Box::new(MutationReportReader::new(mode)),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::LlvmCov => "llvm-cov",
            Self::Istanbul => "istanbul",
            Self::CoveragePy => "coverage-py",
            Self::Mutations => "mutations",
        }
    }
}

impl fmt::Display for ReportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReportFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().replace('_', "-").as_str() {
            "llvm-cov" | "llvm" => Ok(Self::LlvmCov),
            "istanbul" | "nyc" => Ok(Self::Istanbul),
            "coverage-py" | "coveragepy" | "python" => Ok(Self::CoveragePy),
            "mutations" | "mutation" | "stryker" => Ok(Self::Mutations),
            _ => Err(format!(
                "Unknown report format: {s}. Use 'llvm-cov', 'istanbul', 'coverage-py' or 'mutations'"
            )),
        }
    }
}

/// Include and exclude globs for report discovery.
#[derive(Debug, Clone)]
pub struct ReportFilter {
    include: GlobSet,
    exclude: GlobSet,
}

impl ReportFilter {
    pub fn new(include: &[String], exclude: &[String]) -> Result<Self> {
        Ok(Self {
            include: build_glob_set(include)?,
            exclude: build_glob_set(exclude)?,
        })
    }

    /// Returns true if the relative path is included and not excluded.
    pub fn matches(&self, relative_path: &Path) -> bool {
        self.include.is_match(relative_path) && !self.exclude.is_match(relative_path)
    }
}

impl Default for ReportFilter {
    fn default() -> Self {
        let mut include = GlobSetBuilder::new();
        if let Ok(glob) = Glob::new("**/*.json") {
            include.add(glob);
        }
        Self {
            include: include.build().unwrap_or_else(|_| GlobSet::empty()),
            exclude: GlobSet::empty(),
        }
    }
}

fn build_glob_set(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern)
            .map_err(|e| Error::config(format!("invalid glob '{pattern}': {e}")))?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|e| Error::config(format!("invalid glob set: {e}")))
}

/// Finds report files below a directory, sorted by path.
pub fn find_reports(dir: &Path, filter: &ReportFilter) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(Error::NotADirectory {
            path: dir.to_path_buf(),
        });
    }
    let mut reports = Vec::new();
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry.map_err(|e| Error::Io(e.into()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry.path().strip_prefix(dir).unwrap_or(entry.path());
        if filter.matches(relative) {
            reports.push(entry.into_path());
        }
    }
    debug!(dir = %dir.display(), reports = reports.len(), "Found reports");
    Ok(reports)
}

/// Reads a single report, detecting its format unless one is given.
pub fn read_report(
    path: &Path,
    format: Option<ReportFormat>,
    mode: ProcessingMode,
    log: &mut ReportLog,
) -> Result<Tree> {
    let content = fs::read_to_string(path)?;
    let format = match format {
        Some(format) => format,
        None => ReportFormat::detect_str(&content, path)?,
    };
    let reader = format.reader(mode);
    let tree = reader.read_str(&content, path, log)?;
    let message = format!(
        "Successfully parsed {format} report '{}' with {} files",
        path.display(),
        tree.all_files().len()
    );
    info!("{message}");
    log.log_info(message);
    Ok(tree)
}

/// Reads reports in parallel and merges the resulting trees.
///
/// Directories are expanded with the filter. In fail-fast mode the first
/// failing report aborts the read; otherwise failing reports are logged and
/// skipped.
pub fn read_all(
    paths: &[PathBuf],
    format: Option<ReportFormat>,
    mode: ProcessingMode,
    filter: &ReportFilter,
    log: &mut ReportLog,
) -> Result<Tree> {
    let files = expand_paths(paths, filter)?;
    let max_lines = log.max_lines;
    let results: Vec<(Result<Tree>, ReportLog)> = files
        .par_iter()
        .map(|path| {
            let mut local = ReportLog::new(path.display().to_string()).with_max_lines(max_lines);
            let tree = read_report(path, format, mode, &mut local);
            (tree, local)
        })
        .collect();

    let mut trees = Vec::with_capacity(results.len());
    for (result, local) in results {
        log.merge(local);
        match result {
            Ok(tree) => trees.push(tree),
            Err(error) if mode == ProcessingMode::IgnoreErrors => {
                warn!("Skipping report: {error}");
                log.log_error(format!("Skipping report: {error}"));
            }
            Err(error) => return Err(error),
        }
    }
    merge_reports(trees)
}

/// Replaces directories by the reports found below them.
pub fn expand_paths(paths: &[PathBuf], filter: &ReportFilter) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_dir() {
            files.extend(find_reports(path, filter)?);
        } else {
            files.push(path.clone());
        }
    }
    Ok(files)
}

/// Merges report trees, returning an empty module for no trees.
pub fn merge_reports(trees: Vec<Tree>) -> Result<Tree> {
    if trees.is_empty() {
        return Ok(new_report_tree());
    }
    Tree::merge_all(trees)
}

/// Creates the empty tree every reader starts with.
pub(crate) fn new_report_tree() -> Tree {
    Tree::new(Node::module(EMPTY_NAME))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Metric;
    use tempfile::TempDir;

    const ISTANBUL: &str = r#"{
        "src/app.js": {
            "path": "src/app.js",
            "statementMap": {
                "0": {"start": {"line": 1, "column": 0}, "end": {"line": 1, "column": 10}},
                "1": {"start": {"line": 2, "column": 0}, "end": {"line": 2, "column": 10}}
            },
            "s": {"0": 1, "1": 0},
            "branchMap": {},
            "b": {}
        }
    }"#;

    const COVERAGE_PY: &str = r#"{
        "meta": {"version": "7.4.0", "branch_coverage": false},
        "files": {
            "pkg/util.py": {"executed_lines": [1, 2, 3], "missing_lines": [4]}
        }
    }"#;

    #[test]
    fn test_report_log_caps_errors() {
        let mut log = ReportLog::new("test").with_max_lines(2);
        for i in 0..5 {
            log.log_error(format!("error {i}"));
        }
        assert_eq!(log.error_messages().len(), 2);
        assert_eq!(log.skipped_errors(), 3);
        assert!(log.has_errors());
    }

    #[test]
    fn test_report_log_merge() {
        let mut log = ReportLog::new("all").with_max_lines(1);
        let mut other = ReportLog::new("one");
        other.log_info("parsed");
        other.log_error("first");
        other.log_error("second");
        log.merge(other);
        assert_eq!(log.info_messages(), ["parsed".to_string()]);
        assert_eq!(log.error_messages().len(), 1);
        assert_eq!(log.skipped_errors(), 1);
    }

    #[test]
    fn test_detect_formats() {
        let path = Path::new("report.json");
        assert_eq!(
            ReportFormat::detect_str(ISTANBUL, path).unwrap(),
            ReportFormat::Istanbul
        );
        assert_eq!(
            ReportFormat::detect_str(COVERAGE_PY, path).unwrap(),
            ReportFormat::CoveragePy
        );
        assert_eq!(
            ReportFormat::detect_str(r#"{"type": "llvm.coverage.json.export", "data": []}"#, path)
                .unwrap(),
            ReportFormat::LlvmCov
        );
        assert_eq!(
            ReportFormat::detect_str(r#"{"schemaVersion": "1", "files": {}}"#, path).unwrap(),
            ReportFormat::Mutations
        );
        assert!(matches!(
            ReportFormat::detect_str(r#"{"unrelated": 1}"#, path),
            Err(Error::UnknownFormat { .. })
        ));
        assert!(matches!(
            ReportFormat::detect_str("not json", path),
            Err(Error::Parse { .. })
        ));
    }

    #[test]
    fn test_format_from_str() {
        assert_eq!("llvm".parse::<ReportFormat>().unwrap(), ReportFormat::LlvmCov);
        assert_eq!(
            "coverage_py".parse::<ReportFormat>().unwrap(),
            ReportFormat::CoveragePy
        );
        assert!("cobertura".parse::<ReportFormat>().is_err());
        assert_eq!(
            "ignore-errors".parse::<ProcessingMode>().unwrap(),
            ProcessingMode::IgnoreErrors
        );
    }

    #[test]
    fn test_read_directory_rejects_files() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("coverage.json");
        fs::write(&file, ISTANBUL).unwrap();

        let reader = IstanbulReader::new(ProcessingMode::FailFast);
        let mut log = ReportLog::new("test");
        let err = reader
            .read_directory(&file, &ReportFilter::default(), &mut log)
            .unwrap_err();
        assert!(matches!(err, Error::NotADirectory { .. }));
    }

    #[test]
    fn test_read_directory_merges_reports() {
        let temp = TempDir::new().unwrap();
        fs::create_dir(temp.path().join("a")).unwrap();
        fs::write(temp.path().join("a/coverage.json"), ISTANBUL).unwrap();
        fs::write(temp.path().join("notes.txt"), "ignored").unwrap();

        let reader = IstanbulReader::new(ProcessingMode::FailFast);
        let mut log = ReportLog::new("test");
        let tree = reader
            .read_directory(temp.path(), &ReportFilter::default(), &mut log)
            .unwrap();
        assert!(tree.find_file("src/app.js").is_some());
        assert_eq!(log.info_messages().len(), 1);
    }

    #[test]
    fn test_read_directory_ignore_errors() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("broken.json"), "{").unwrap();
        fs::write(temp.path().join("good.json"), ISTANBUL).unwrap();

        let strict = IstanbulReader::new(ProcessingMode::FailFast);
        let mut log = ReportLog::new("strict");
        assert!(strict
            .read_directory(temp.path(), &ReportFilter::default(), &mut log)
            .is_err());

        let lenient = IstanbulReader::new(ProcessingMode::IgnoreErrors);
        let mut log = ReportLog::new("lenient");
        let tree = lenient
            .read_directory(temp.path(), &ReportFilter::default(), &mut log)
            .unwrap();
        assert_eq!(tree.all_files().len(), 1);
        assert_eq!(log.error_messages().len(), 1);
    }

    #[test]
    fn test_read_directory_without_reports() {
        let temp = TempDir::new().unwrap();
        let reader = CoveragePyReader::new(ProcessingMode::FailFast);
        let mut log = ReportLog::new("test");
        let tree = reader
            .read_directory(temp.path(), &ReportFilter::default(), &mut log)
            .unwrap();
        assert!(tree.is_empty());
        assert_eq!(tree[tree.root()].name, EMPTY_NAME);
    }

    #[test]
    fn test_read_all_merges_formats() {
        let temp = TempDir::new().unwrap();
        let js = temp.path().join("js.json");
        let py = temp.path().join("py.json");
        fs::write(&js, ISTANBUL).unwrap();
        fs::write(&py, COVERAGE_PY).unwrap();

        let mut log = ReportLog::new("all");
        let tree = read_all(
            &[js, py],
            None,
            ProcessingMode::FailFast,
            &ReportFilter::default(),
            &mut log,
        )
        .unwrap();
        assert_eq!(tree[tree.root()].metric(), Metric::Module);
        assert_eq!(tree.all_files().len(), 2);
        let lines = tree.value(tree.root(), Metric::Line).unwrap();
        let lines = lines.as_coverage().unwrap();
        assert_eq!((lines.covered(), lines.missed()), (4, 2));
        assert_eq!(log.info_messages().len(), 2);
    }

    #[test]
    fn test_read_all_ignore_errors_skips_broken_reports() {
        let temp = TempDir::new().unwrap();
        let good = temp.path().join("good.json");
        let bad = temp.path().join("bad.json");
        fs::write(&good, COVERAGE_PY).unwrap();
        fs::write(&bad, r#"{"something": "else"}"#).unwrap();
        let paths = [good, bad];

        let mut log = ReportLog::new("all");
        let err = read_all(
            &paths,
            None,
            ProcessingMode::FailFast,
            &ReportFilter::default(),
            &mut log,
        )
        .unwrap_err();
        assert!(matches!(err, Error::UnknownFormat { .. }));

        let mut log = ReportLog::new("all");
        let tree = read_all(
            &paths,
            None,
            ProcessingMode::IgnoreErrors,
            &ReportFilter::default(),
            &mut log,
        )
        .unwrap();
        assert_eq!(tree.all_files().len(), 1);
        assert_eq!(log.error_messages().len(), 1);
    }

    #[test]
    fn test_report_filter() {
        let filter = ReportFilter::new(
            &["**/*.json".to_string()],
            &["**/node_modules/**".to_string()],
        )
        .unwrap();
        assert!(filter.matches(Path::new("coverage/coverage-final.json")));
        assert!(!filter.matches(Path::new("node_modules/x/coverage.json")));
        assert!(!filter.matches(Path::new("coverage/lcov.info")));
        assert!(ReportFilter::new(&["[".to_string()], &[]).is_err());
    }
}
