//! Change sets and their effect on coverage trees.
//!
//! A [`ChangeSet`] lists the lines added or modified per file, usually parsed
//! from a unified diff. Applying it to a tree marks the modified lines in the
//! file nodes; comparing the tree with a baseline tree then yields indirect
//! coverage changes and per-file deltas.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

use tracing::{debug, info};

use crate::core::Result;
use crate::model::{NodeId, Tree};

/// Modified lines per file path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    files: BTreeMap<String, BTreeSet<u32>>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_lines(&mut self, path: impl Into<String>, lines: impl IntoIterator<Item = u32>) {
        self.files.entry(path.into()).or_default().extend(lines);
    }

    pub fn files(&self) -> &BTreeMap<String, BTreeSet<u32>> {
        &self.files
    }

    /// Modified lines of the file matching the given path.
    pub fn modified_lines(&self, path: &str) -> Option<&BTreeSet<u32>> {
        self.files
            .iter()
            .find(|(changed, _)| paths_match(changed, path))
            .map(|(_, lines)| lines)
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Parses the added lines of a unified diff.
    ///
    /// Deleted files and hunks that only remove lines contribute nothing.
    pub fn from_diff(diff: &str) -> Self {
        let mut changes = ChangeSet::new();
        let mut current: Option<String> = None;
        let mut hunk: Option<Hunk> = None;

        for line in diff.lines() {
            if let Some(state) = hunk.as_mut().filter(|h| !h.is_complete()) {
                if let Some(added) = state.advance(line) {
                    if let Some(path) = &current {
                        changes.add_lines(path.clone(), [added]);
                    }
                }
                continue;
            }
            hunk = None;

            if line.starts_with("diff ") {
                current = None;
            } else if let Some(target) = line.strip_prefix("+++ ") {
                current = parse_target(target);
            } else if line.starts_with("@@") {
                hunk = parse_hunk_header(line);
            }
        }

        debug!(files = changes.len(), "Parsed unified diff");
        changes
    }

    pub fn from_diff_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(Self::from_diff(&content))
    }
}

/// Line bookkeeping while walking through the body of a hunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Hunk {
    next_line: u32,
    old_remaining: u32,
    new_remaining: u32,
}

impl Hunk {
    fn is_complete(&self) -> bool {
        self.old_remaining == 0 && self.new_remaining == 0
    }

    /// Consumes a body line and returns the new line number if it was added.
    fn advance(&mut self, line: &str) -> Option<u32> {
        match line.chars().next() {
            Some('+') => {
                let added = self.next_line;
                self.next_line = self.next_line.saturating_add(1);
                self.new_remaining = self.new_remaining.saturating_sub(1);
                Some(added)
            }
            Some('-') => {
                self.old_remaining = self.old_remaining.saturating_sub(1);
                None
            }
            Some('\\') => None,
            _ => {
                self.next_line = self.next_line.saturating_add(1);
                self.old_remaining = self.old_remaining.saturating_sub(1);
                self.new_remaining = self.new_remaining.saturating_sub(1);
                None
            }
        }
    }
}

/// Parses a hunk header like "@@ -1,3 +1,4 @@".
fn parse_hunk_header(header: &str) -> Option<Hunk> {
    let mut old = None;
    let mut new = None;
    for part in header.split_whitespace().skip(1) {
        if let Some(range) = part.strip_prefix('-') {
            old = Some(parse_range(range)?);
        } else if let Some(range) = part.strip_prefix('+') {
            new = Some(parse_range(range)?);
            break;
        }
    }
    let (_, old_count) = old?;
    let (start, new_count) = new?;
    Some(Hunk {
        next_line: start,
        old_remaining: old_count,
        new_remaining: new_count,
    })
}

fn parse_range(range: &str) -> Option<(u32, u32)> {
    match range.split_once(',') {
        Some((start, count)) => Some((start.parse().ok()?, count.parse().ok()?)),
        None => Some((range.parse().ok()?, 1)),
    }
}

/// Extracts the new path of a "+++" line; deleted files have none.
fn parse_target(target: &str) -> Option<String> {
    let path = target.split('\t').next()?.trim();
    if path == "/dev/null" {
        return None;
    }
    let path = path.strip_prefix("b/").unwrap_or(path);
    Some(path.to_string())
}

/// Returns true if both paths denote the same file, allowing one of them to
/// be relative to a subdirectory of the other.
pub fn paths_match(left: &str, right: &str) -> bool {
    let left = left.trim_start_matches("./");
    let right = right.trim_start_matches("./");
    left == right || is_suffix(left, right) || is_suffix(right, left)
}

fn is_suffix(path: &str, suffix: &str) -> bool {
    path.strip_suffix(suffix)
        .is_some_and(|prefix| prefix.ends_with('/'))
}

impl Tree {
    /// Marks the modified lines of every file listed in the change set.
    ///
    /// Returns the number of files that have been changed.
    pub fn apply_changes(&mut self, changes: &ChangeSet) -> usize {
        let mut changed = 0;
        for file in self.all_files() {
            let Some(data) = self.file_mut(file) else {
                continue;
            };
            if let Some(lines) = changes.modified_lines(data.relative_path()) {
                data.add_modified_lines(lines.iter().copied());
                changed += 1;
            }
        }
        info!(files = changed, "Applied change set");
        changed
    }

    /// Records coverage changes of unmodified lines relative to a baseline.
    ///
    /// For every line that is instrumented in both trees and not modified,
    /// a changed covered counter is stored as indirect coverage change.
    /// Returns the number of lines with such a change.
    pub fn compute_indirect_changes(&mut self, baseline: &Tree) -> usize {
        let mut count = 0;
        for file in self.all_files() {
            let Some(reference) = self.baseline_file(file, baseline) else {
                continue;
            };
            let Some(reference) = baseline.file(reference) else {
                continue;
            };
            let Some(data) = self.file_mut(file) else {
                continue;
            };
            let changes: Vec<(u32, i32)> = data
                .counters()
                .iter()
                .filter(|(line, _)| !data.has_modified_line(**line))
                .filter_map(|(&line, counter)| {
                    let before = reference.counter(line)?;
                    let delta = i64::from(counter.covered) - i64::from(before.covered);
                    let delta = i32::try_from(delta).ok()?;
                    (delta != 0).then_some((line, delta))
                })
                .collect();
            count += changes.len();
            for (line, delta) in changes {
                data.add_indirect_coverage_change(line, delta);
            }
        }
        debug!(lines = count, "Computed indirect coverage changes");
        count
    }

    /// Stores the per-metric deltas of every file relative to the same file
    /// in the baseline. Returns the number of files found in the baseline.
    pub fn compute_file_deltas(&mut self, baseline: &Tree) -> usize {
        let mut count = 0;
        for file in self.all_files() {
            let Some(reference) = self.baseline_file(file, baseline) else {
                continue;
            };
            let current = self.metrics_distribution(file);
            let previous = baseline.metrics_distribution(reference);
            if let Some(data) = self.file_mut(file) {
                data.compute_delta(&current, &previous);
                count += 1;
            }
        }
        count
    }

    fn baseline_file(&self, file: NodeId, baseline: &Tree) -> Option<NodeId> {
        let path = self.file(file)?.relative_path();
        let files = baseline.all_files();
        files
            .iter()
            .copied()
            .find(|&id| baseline.file(id).is_some_and(|f| f.relative_path() == path))
            .or_else(|| {
                files.iter().copied().find(|&id| {
                    baseline
                        .file(id)
                        .is_some_and(|f| paths_match(f.relative_path(), path))
                })
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Fraction, Metric, Node};

    const DIFF: &str = "diff --git a/src/app/main.ts b/src/app/main.ts
index 3b18e51..a9c1c2e 100644
--- a/src/app/main.ts
+++ b/src/app/main.ts
@@ -1,4 +1,5 @@
 import { run } from './run';
+import { log } from './log';

 export function main() {
-  run();
+  log(run());
@@ -20,3 +21,2 @@ export function other() {
 const a = 1;
-const b = 2;
 const c = 3;
diff --git a/src/old.ts b/src/old.ts
deleted file mode 100644
--- a/src/old.ts
+++ /dev/null
@@ -1,2 +0,0 @@
-line one
-line two
diff --git a/README.md b/README.md
--- a/README.md
+++ b/README.md
@@ -3 +3 @@
-old
+new
";

    fn tree(lines: &[(u32, u32, u32)]) -> (Tree, NodeId) {
        let mut tree = Tree::new(Node::module("-"));
        let file = tree.find_or_create_file("src/app/main.ts").unwrap();
        for &(line, covered, missed) in lines {
            tree.add_counters(file, line, covered, missed).unwrap();
        }
        tree.summarize_file(file).unwrap();
        (tree, file)
    }

    #[test]
    fn test_from_diff() {
        let changes = ChangeSet::from_diff(DIFF);
        assert_eq!(changes.len(), 2);
        assert_eq!(
            changes.modified_lines("src/app/main.ts"),
            Some(&BTreeSet::from([2, 5]))
        );
        assert_eq!(
            changes.modified_lines("README.md"),
            Some(&BTreeSet::from([3]))
        );
        assert!(changes.modified_lines("src/old.ts").is_none());
    }

    #[test]
    fn test_hunk_at_last_line_number() {
        let diff = "--- a/big.c\n+++ b/big.c\n@@ -4294967295,1 +4294967295,2 @@\n context\n+added\n";
        let changes = ChangeSet::from_diff(diff);
        assert_eq!(
            changes.modified_lines("big.c"),
            Some(&BTreeSet::from([u32::MAX]))
        );
    }

    #[test]
    fn test_parse_hunk_header() {
        let hunk = parse_hunk_header("@@ -10,2 +11,5 @@ fn other()").unwrap();
        assert_eq!(hunk.next_line, 11);
        assert_eq!(hunk.old_remaining, 2);
        assert_eq!(hunk.new_remaining, 5);
        assert!(parse_hunk_header("@@ garbage @@").is_none());
    }

    #[test]
    fn test_paths_match() {
        assert!(paths_match("src/app/main.ts", "src/app/main.ts"));
        assert!(paths_match("project/src/app/main.ts", "src/app/main.ts"));
        assert!(paths_match("./src/main.ts", "src/main.ts"));
        assert!(!paths_match("src/xmain.ts", "main.ts"));
    }

    #[test]
    fn test_apply_changes() {
        let (mut tree, file) = tree(&[(1, 1, 0), (2, 0, 1)]);
        let changed = tree.apply_changes(&ChangeSet::from_diff(DIFF));
        assert_eq!(changed, 1);
        assert_eq!(
            tree.file(file).unwrap().modified_lines(),
            &BTreeSet::from([2, 5])
        );
        assert!(tree.has_modified_lines(tree.root()));
    }

    #[test]
    fn test_compute_indirect_changes() {
        let (baseline, _) = tree(&[(1, 0, 1), (2, 1, 0), (3, 1, 0), (4, 2, 2)]);
        let (mut current, file) = tree(&[(1, 1, 0), (2, 0, 1), (3, 1, 0), (4, 3, 1), (9, 1, 0)]);
        current.file_mut(file).unwrap().add_modified_lines([2]);

        let count = current.compute_indirect_changes(&baseline);
        assert_eq!(count, 2);
        let changes = current.file(file).unwrap().indirect_coverage_changes();
        assert_eq!(changes, &BTreeMap::from([(1, 1), (4, 1)]));
    }

    #[test]
    fn test_compute_file_deltas() {
        let (baseline, _) = tree(&[(1, 0, 1), (2, 1, 0)]);
        let (mut current, file) = tree(&[(1, 1, 0), (2, 1, 0)]);

        assert_eq!(current.compute_file_deltas(&baseline), 1);
        let data = current.file(file).unwrap();
        assert_eq!(data.delta(Metric::Line), Fraction::new(1, 2));
        assert!(data.has_delta(Metric::Line));
        assert!(!data.has_delta(Metric::Branch));
    }
}
