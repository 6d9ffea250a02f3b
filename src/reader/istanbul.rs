//! Reader for Istanbul `coverage-final.json` reports (nyc, jest, vitest).

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;

use super::{new_report_tree, ProcessingMode, ReportLog, ReportReader};
use crate::core::{Error, Result};
use crate::model::{LineCounter, Tree};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileCoverage {
    #[serde(default)]
    path: Option<String>,
    statement_map: BTreeMap<String, Location>,
    s: BTreeMap<String, u64>,
    #[serde(default)]
    branch_map: BTreeMap<String, BranchMapping>,
    #[serde(default)]
    b: BTreeMap<String, Vec<u64>>,
}

#[derive(Debug, Deserialize)]
struct Location {
    start: Position,
}

#[derive(Debug, Deserialize)]
struct Position {
    line: u32,
}

#[derive(Debug, Deserialize)]
struct BranchMapping {
    #[serde(default)]
    line: Option<u32>,
    #[serde(default)]
    loc: Option<Location>,
}

impl BranchMapping {
    fn line(&self) -> Option<u32> {
        self.line.or_else(|| self.loc.as_ref().map(|loc| loc.start.line))
    }
}

/// Reads statement and branch coverage of JavaScript and TypeScript files.
#[derive(Debug, Clone, Copy, Default)]
pub struct IstanbulReader {
    mode: ProcessingMode,
}

impl IstanbulReader {
    pub fn new(mode: ProcessingMode) -> Self {
        Self { mode }
    }

    fn read_file(&self, tree: &mut Tree, key: &str, coverage: FileCoverage, source: &Path) -> Result<()> {
        let path = coverage.path.as_deref().unwrap_or(key);
        let malformed = |what: String| Error::parse(source, format!("{what} in {path}"));

        // A line counts as covered as soon as one of its statements ran.
        let mut hits: BTreeMap<u32, bool> = BTreeMap::new();
        for (id, location) in &coverage.statement_map {
            let count = coverage
                .s
                .get(id)
                .ok_or_else(|| malformed(format!("missing hit count of statement {id}")))?;
            *hits.entry(location.start.line).or_default() |= *count > 0;
        }
        let mut counters: BTreeMap<u32, LineCounter> = hits
            .into_iter()
            .map(|(line, covered)| (line, LineCounter::new(u32::from(covered), u32::from(!covered))))
            .collect();

        let mut branch_lines: BTreeMap<u32, LineCounter> = BTreeMap::new();
        for (id, mapping) in &coverage.branch_map {
            let line = mapping
                .line()
                .ok_or_else(|| malformed(format!("missing line of branch {id}")))?;
            let counts = coverage
                .b
                .get(id)
                .ok_or_else(|| malformed(format!("missing hit counts of branch {id}")))?;
            let entry = branch_lines.entry(line).or_default();
            for &count in counts {
                if count > 0 {
                    entry.covered += 1;
                } else {
                    entry.missed += 1;
                }
            }
        }
        for (line, counter) in branch_lines {
            if counter.is_branch() {
                counters.insert(line, counter);
            }
        }

        let file = tree.find_or_create_file(path)?;
        for (line, counter) in counters {
            tree.add_counters(file, line, counter.covered, counter.missed)?;
        }
        tree.summarize_file(file)
    }
}

impl ReportReader for IstanbulReader {
    fn name(&self) -> &'static str {
        "istanbul"
    }

    fn mode(&self) -> ProcessingMode {
        self.mode
    }

    fn read_str(&self, content: &str, source: &Path, log: &mut ReportLog) -> Result<Tree> {
        let report: BTreeMap<String, serde_json::Value> =
            serde_json::from_str(content).map_err(|e| Error::parse(source, e.to_string()))?;

        let mut tree = new_report_tree();
        for (key, entry) in report {
            let result = serde_json::from_value::<FileCoverage>(entry)
                .map_err(|e| Error::parse(source, format!("malformed entry {key}: {e}")))
                .and_then(|coverage| self.read_file(&mut tree, &key, coverage, source));
            if let Err(error) = result {
                self.handle_record_error(error, log)?;
            }
        }
        Ok(tree)
    }
}
