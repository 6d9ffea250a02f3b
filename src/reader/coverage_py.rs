//! Reader for coverage.py JSON reports (`coverage json`).

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use serde::Deserialize;

use super::{new_report_tree, ProcessingMode, ReportLog, ReportReader};
use crate::core::{Error, Result};
use crate::model::{Coverage, LineCounter, Metric, Node, NodeId, Tree, Value};

#[derive(Debug, Deserialize)]
struct Report {
    files: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Default, Deserialize)]
struct Lines {
    #[serde(default)]
    executed_lines: Vec<i64>,
    #[serde(default)]
    missing_lines: Vec<i64>,
}

#[derive(Debug, Deserialize)]
struct FileReport {
    #[serde(flatten)]
    lines: Lines,
    /// Arcs as `[from, to]`, negative targets denote an exit.
    #[serde(default)]
    executed_branches: Vec<[i64; 2]>,
    #[serde(default)]
    missing_branches: Vec<[i64; 2]>,
    #[serde(default)]
    classes: BTreeMap<String, Lines>,
    #[serde(default)]
    functions: BTreeMap<String, Lines>,
}

/// Reads line and branch coverage of Python modules.
#[derive(Debug, Clone, Copy, Default)]
pub struct CoveragePyReader {
    mode: ProcessingMode,
}

impl CoveragePyReader {
    pub fn new(mode: ProcessingMode) -> Self {
        Self { mode }
    }

    fn read_file(&self, tree: &mut Tree, path: &str, report: FileReport, source: &Path) -> Result<()> {
        let line = |number: i64| {
            u32::try_from(number)
                .ok()
                .filter(|&line| line > 0)
                .ok_or_else(|| Error::parse(source, format!("invalid line number {number} in {path}")))
        };

        let mut counters: BTreeMap<u32, LineCounter> = BTreeMap::new();
        for &number in &report.lines.executed_lines {
            counters.insert(line(number)?, LineCounter::new(1, 0));
        }
        for &number in &report.lines.missing_lines {
            counters.insert(line(number)?, LineCounter::new(0, 1));
        }

        let mut branches: BTreeMap<u32, LineCounter> = BTreeMap::new();
        for &[from, _] in &report.executed_branches {
            branches.entry(line(from)?).or_default().covered += 1;
        }
        for &[from, _] in &report.missing_branches {
            branches.entry(line(from)?).or_default().missed += 1;
        }
        for (number, counter) in branches {
            if counter.is_branch() {
                counters.insert(number, counter);
            }
        }

        // Functions nested in a known class hang below it, all others keep
        // their qualified name so that nested functions cannot collide.
        let classes: BTreeMap<&str, &Lines> = report
            .classes
            .iter()
            .filter(|(name, _)| !name.is_empty())
            .map(|(name, lines)| (name.as_str(), lines))
            .collect();
        let mut methods: Vec<(Option<&str>, &str, &str, &Lines)> = Vec::new();
        let mut names = BTreeSet::new();
        for (signature, lines) in report.functions.iter().filter(|(name, _)| !name.is_empty()) {
            let (class, name) = match signature.rsplit_once('.') {
                Some((class, name)) if classes.contains_key(class) => (Some(class), name),
                _ => (None, signature.as_str()),
            };
            let clashes_with_class = class.is_none() && classes.contains_key(name);
            if clashes_with_class || !names.insert((class, name)) {
                return Err(Error::parse(
                    source,
                    format!("duplicate function {signature} in {path}"),
                ));
            }
            methods.push((class, name, signature.as_str(), lines));
        }

        let file = tree.find_or_create_file(path)?;
        for (number, counter) in counters {
            tree.add_counters(file, number, counter.covered, counter.missed)?;
        }
        tree.summarize_file(file)?;

        let mut class_ids = BTreeMap::new();
        for (&name, &lines) in &classes {
            let class = tree.find_or_create_class(file, name)?;
            add_line_value(tree, class, lines)?;
            class_ids.insert(name, class);
        }
        for (class, name, signature, lines) in methods {
            let parent = class
                .and_then(|class| class_ids.get(class).copied())
                .unwrap_or(file);
            let existing = tree
                .child_by_name(parent, name)
                .filter(|&id| tree[id].signature() == Some(signature));
            let method = match existing {
                Some(method) => method,
                None => {
                    let first_line = lines
                        .executed_lines
                        .iter()
                        .chain(&lines.missing_lines)
                        .filter_map(|&number| u32::try_from(number).ok())
                        .min()
                        .unwrap_or_default();
                    tree.add_child(parent, Node::method(name, signature).with_line(first_line))?
                }
            };
            add_line_value(tree, method, lines)?;
        }
        Ok(())
    }
}

fn add_line_value(tree: &mut Tree, id: NodeId, lines: &Lines) -> Result<()> {
    let covered = u32::try_from(lines.executed_lines.len()).unwrap_or(u32::MAX);
    let missed = u32::try_from(lines.missing_lines.len()).unwrap_or(u32::MAX);
    if covered.saturating_add(missed) > 0 {
        tree.replace_value(id, Value::Coverage(Coverage::new(Metric::Line, covered, missed)?));
    }
    Ok(())
}

impl ReportReader for CoveragePyReader {
    fn name(&self) -> &'static str {
        "coverage-py"
    }

    fn mode(&self) -> ProcessingMode {
        self.mode
    }

    fn read_str(&self, content: &str, source: &Path, log: &mut ReportLog) -> Result<Tree> {
        let report: Report =
            serde_json::from_str(content).map_err(|e| Error::parse(source, e.to_string()))?;

        let mut tree = new_report_tree();
        for (path, entry) in report.files {
            let result = serde_json::from_value::<FileReport>(entry)
                .map_err(|e| Error::parse(source, format!("malformed entry {path}: {e}")))
                .and_then(|file| self.read_file(&mut tree, &path, file, source));
            if let Err(error) = result {
                self.handle_record_error(error, log)?;
            }
        }
        Ok(tree)
    }
}
