//! Reader for `llvm-cov export -format=text` JSON reports.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;

use super::{new_report_tree, ProcessingMode, ReportLog, ReportReader};
use crate::core::{Error, Result};
use crate::model::{LineCounter, Tree};

#[derive(Debug, Deserialize)]
struct Export {
    data: Vec<ExportData>,
}

#[derive(Debug, Deserialize)]
struct ExportData {
    #[serde(default)]
    files: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct ExportFile {
    filename: String,
    #[serde(default)]
    segments: Vec<Vec<serde_json::Value>>,
    #[serde(default)]
    branches: Vec<Branch>,
}

/// `[line, column, count, has_count, is_region_entry, is_gap_region]`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Segment {
    line: u32,
    count: u64,
    has_count: bool,
    is_region_entry: bool,
    is_gap: bool,
}

impl Segment {
    fn parse(values: &[serde_json::Value]) -> Option<Self> {
        let flag = |index: usize| -> Option<bool> {
            match values.get(index) {
                Some(value) => value.as_bool().or_else(|| value.as_u64().map(|v| v != 0)),
                None => Some(false),
            }
        };
        Some(Self {
            line: u32::try_from(values.first()?.as_u64()?).ok()?,
            count: values.get(2)?.as_u64()?,
            has_count: flag(3)?,
            is_region_entry: flag(4)?,
            is_gap: flag(5)?,
        })
    }
}

/// `[line_start, column_start, line_end, column_end, true_count, false_count, ...]`
#[derive(Debug, Clone, Deserialize)]
struct Branch(Vec<serde_json::Value>);

impl Branch {
    fn parse(&self) -> Option<(u32, u64, u64)> {
        let line = u32::try_from(self.0.first()?.as_u64()?).ok()?;
        let taken = self.0.get(4)?.as_u64()?;
        let not_taken = self.0.get(5)?.as_u64()?;
        Some((line, taken, not_taken))
    }
}

/// Reads line and branch coverage from `llvm-cov export`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LlvmCovReader {
    mode: ProcessingMode,
}

impl LlvmCovReader {
    pub fn new(mode: ProcessingMode) -> Self {
        Self { mode }
    }

    fn read_file(&self, tree: &mut Tree, file: ExportFile, source: &Path) -> Result<()> {
        let segments = file
            .segments
            .iter()
            .map(|values| {
                Segment::parse(values).ok_or_else(|| {
                    Error::parse(
                        source,
                        format!("malformed segment {values:?} in {}", file.filename),
                    )
                })
            })
            .collect::<Result<Vec<_>>>()?;
        let mut counters = line_counters(&segments);
        for branch in &file.branches {
            let (line, taken, not_taken) = branch.parse().ok_or_else(|| {
                Error::parse(
                    source,
                    format!("malformed branch {:?} in {}", branch.0, file.filename),
                )
            })?;
            let covered = u32::from(taken > 0) + u32::from(not_taken > 0);
            let entry = branches_entry(&mut counters, line);
            entry.covered += covered;
            entry.missed += 2 - covered;
        }

        let id = tree.find_or_create_file(&file.filename)?;
        for (line, (counter, _)) in counters {
            tree.add_counters(id, line, counter.covered, counter.missed)?;
        }
        tree.summarize_file(id)
    }
}

/// Branch counters of a line replace its plain line counter.
fn branches_entry(counters: &mut BTreeMap<u32, (LineCounter, bool)>, line: u32) -> &mut LineCounter {
    let (counter, has_branches) = counters.entry(line).or_default();
    if !*has_branches {
        *counter = LineCounter::default();
        *has_branches = true;
    }
    counter
}

/// Computes one counter per line from the coverage segments.
///
/// A line is instrumented if a region starts on it or if a counted region
/// spans it. Its execution count is the largest count of those regions.
fn line_counters(segments: &[Segment]) -> BTreeMap<u32, (LineCounter, bool)> {
    let mut counters = BTreeMap::new();
    let mut wrapped: Option<Segment> = None;
    let mut previous: Option<u32> = None;

    for on_line in segments.chunk_by(|a, b| a.line == b.line) {
        let line = on_line[0].line;
        let wrapped_count = wrapped.filter(|s| s.has_count && !s.is_gap).map(|s| s.count);

        // Lines without segments inherit the region that spans them.
        if let (Some(previous), Some(count)) = (previous, wrapped_count) {
            for between in previous.saturating_add(1)..line {
                counters.insert(between, (line_counter(count), false));
            }
        }

        let count = on_line
            .iter()
            .filter(|s| s.has_count && s.is_region_entry && !s.is_gap)
            .map(|s| s.count)
            .chain(wrapped_count)
            .max();
        if let Some(count) = count {
            counters.insert(line, (line_counter(count), false));
        }

        previous = Some(line);
        wrapped = on_line.last().copied();
    }
    counters
}

fn line_counter(count: u64) -> LineCounter {
    if count > 0 {
        LineCounter::new(1, 0)
    } else {
        LineCounter::new(0, 1)
    }
}

impl ReportReader for LlvmCovReader {
    fn name(&self) -> &'static str {
        "llvm-cov"
    }

    fn mode(&self) -> ProcessingMode {
        self.mode
    }

    fn read_str(&self, content: &str, source: &Path, log: &mut ReportLog) -> Result<Tree> {
        let export: Export =
            serde_json::from_str(content).map_err(|e| Error::parse(source, e.to_string()))?;

        let mut tree = new_report_tree();
        for file in export.data.into_iter().flat_map(|data| data.files) {
            let result = serde_json::from_value::<ExportFile>(file)
                .map_err(|e| Error::parse(source, format!("malformed file record: {e}")))
                .and_then(|file| self.read_file(&mut tree, file, source));
            if let Err(error) = result {
                self.handle_record_error(error, log)?;
            }
        }
        Ok(tree)
    }
}
