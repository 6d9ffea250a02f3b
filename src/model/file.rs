//! Per-line bookkeeping of source files.
//!
//! Only file nodes carry line level data: the covered and missed counters of
//! every instrumented line, the lines modified by a change, indirect coverage
//! changes and the mutations found in the file.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use super::metric::Metric;
use super::mutation::Mutation;
use super::value::{Coverage, CoverageBuilder, Fraction, Value};

/// Hit counters of one instrumented line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LineCounter {
    pub covered: u32,
    pub missed: u32,
}

impl LineCounter {
    pub fn new(covered: u32, missed: u32) -> Self {
        Self { covered, missed }
    }

    /// Number of coverage items (instructions or branches) on the line.
    pub fn total(&self) -> u32 {
        self.covered.saturating_add(self.missed)
    }

    /// Returns true if the line is a branch point.
    pub fn is_branch(&self) -> bool {
        self.total() > 1
    }
}

/// An inclusive range of line numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LineRange {
    pub start: u32,
    pub end: u32,
}

impl LineRange {
    pub fn new(start: u32, end: u32) -> Self {
        Self { start, end }
    }

    pub fn single(line: u32) -> Self {
        Self::new(line, line)
    }

    pub fn contains(&self, line: u32) -> bool {
        self.start <= line && line <= self.end
    }

    pub fn lines(&self) -> impl Iterator<Item = u32> {
        self.start..=self.end
    }
}

impl fmt::Display for LineRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.start == self.end {
            write!(f, "{}", self.start)
        } else {
            write!(f, "{}-{}", self.start, self.end)
        }
    }
}

/// Line level data of a file node.
///
/// Covered and missed counters are stored as one entry per line, so a line
/// is either instrumented with both counters or absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileData {
    relative_path: String,
    counters: BTreeMap<u32, LineCounter>,
    modified_lines: BTreeSet<u32>,
    indirect_coverage_changes: BTreeMap<u32, i32>,
    mutations: Vec<Mutation>,
    coverage_delta: BTreeMap<Metric, Fraction>,
}

impl FileData {
    pub fn new(relative_path: impl Into<String>) -> Self {
        Self {
            relative_path: relative_path.into(),
            ..Self::default()
        }
    }

    /// Returns an empty copy that keeps only the relative path.
    pub(crate) fn empty_copy(&self) -> Self {
        Self::new(self.relative_path.clone())
    }

    pub fn relative_path(&self) -> &str {
        &self.relative_path
    }

    pub fn set_relative_path(&mut self, relative_path: impl Into<String>) {
        self.relative_path = relative_path.into();
    }

    /// Last path segment of the relative path.
    pub fn file_name(&self) -> &str {
        self.relative_path
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or(&self.relative_path)
    }

    /// Sets the counters of a line, replacing previous counters of that line.
    pub fn add_counters(&mut self, line: u32, covered: u32, missed: u32) {
        self.counters.insert(line, LineCounter::new(covered, missed));
    }

    pub fn counters(&self) -> &BTreeMap<u32, LineCounter> {
        &self.counters
    }

    pub fn counter(&self, line: u32) -> Option<LineCounter> {
        self.counters.get(&line).copied()
    }

    pub fn has_coverage_for_line(&self, line: u32) -> bool {
        self.counters.contains_key(&line)
    }

    /// All instrumented lines in ascending order.
    pub fn lines_with_coverage(&self) -> BTreeSet<u32> {
        self.counters.keys().copied().collect()
    }

    /// Covered counters of all instrumented lines in line order.
    pub fn covered_counters(&self) -> Vec<u32> {
        self.counters.values().map(|c| c.covered).collect()
    }

    /// Missed counters of all instrumented lines in line order.
    pub fn missed_counters(&self) -> Vec<u32> {
        self.counters.values().map(|c| c.missed).collect()
    }

    /// Covered counter of a line, zero for lines that are not instrumented.
    pub fn covered_of_line(&self, line: u32) -> u32 {
        self.counter(line).map_or(0, |c| c.covered)
    }

    /// Missed counter of a line, zero for lines that are not instrumented.
    pub fn missed_of_line(&self, line: u32) -> u32 {
        self.counter(line).map_or(0, |c| c.missed)
    }

    pub fn missed_lines(&self) -> BTreeSet<u32> {
        self.lines_where(|c| c.covered == 0)
    }

    pub fn covered_lines(&self) -> BTreeSet<u32> {
        self.lines_where(|c| c.covered > 0)
    }

    fn lines_where(&self, predicate: impl Fn(&LineCounter) -> bool) -> BTreeSet<u32> {
        self.counters
            .iter()
            .filter(|(_, counter)| predicate(counter))
            .map(|(&line, _)| line)
            .collect()
    }

    /// Lines that are covered only in part, mapped to their missed counter.
    pub fn partially_covered_lines(&self) -> BTreeMap<u32, u32> {
        self.counters
            .iter()
            .filter(|(_, c)| c.covered > 0 && c.missed > 0)
            .map(|(&line, c)| (line, c.missed))
            .collect()
    }

    /// Maximal ranges of consecutive missed lines.
    ///
    /// Consecutive means adjacent among the instrumented lines: a gap of
    /// lines without coverage data does not split a range, a covered line
    /// does.
    pub fn missed_line_ranges(&self) -> Vec<LineRange> {
        let mut ranges = Vec::new();
        let mut current: Option<LineRange> = None;
        for (&line, counter) in &self.counters {
            if counter.covered == 0 {
                current = Some(match current {
                    Some(range) => LineRange::new(range.start, line),
                    None => LineRange::single(line),
                });
            } else if let Some(range) = current.take() {
                ranges.push(range);
            }
        }
        ranges.extend(current);
        ranges
    }

    pub fn modified_lines(&self) -> &BTreeSet<u32> {
        &self.modified_lines
    }

    pub fn has_modified_lines(&self) -> bool {
        !self.modified_lines.is_empty()
    }

    pub fn has_modified_line(&self, line: u32) -> bool {
        self.modified_lines.contains(&line)
    }

    pub fn add_modified_lines(&mut self, lines: impl IntoIterator<Item = u32>) {
        self.modified_lines.extend(lines);
    }

    /// Instrumented lines that have been modified.
    pub fn covered_and_modified_lines(&self) -> BTreeSet<u32> {
        self.modified_lines
            .iter()
            .copied()
            .filter(|line| self.counters.contains_key(line))
            .collect()
    }

    pub fn has_covered_and_modified_lines(&self) -> bool {
        self.modified_lines
            .iter()
            .any(|line| self.counters.contains_key(line))
    }

    /// Records the change of the covered counter of an unmodified line.
    pub fn add_indirect_coverage_change(&mut self, line: u32, hits_delta: i32) {
        self.indirect_coverage_changes.insert(line, hits_delta);
    }

    pub fn indirect_coverage_changes(&self) -> &BTreeMap<u32, i32> {
        &self.indirect_coverage_changes
    }

    pub fn has_indirect_coverage_changes(&self) -> bool {
        !self.indirect_coverage_changes.is_empty()
    }

    pub fn mutations(&self) -> &[Mutation] {
        &self.mutations
    }

    pub fn add_mutation(&mut self, mutation: Mutation) {
        self.mutations.push(mutation);
    }

    /// Mutations grouped by line.
    pub fn mutations_per_line(&self) -> BTreeMap<u32, Vec<&Mutation>> {
        self.group_mutations(|_| true)
    }

    /// Survived mutations grouped by line.
    pub fn survived_mutations_per_line(&self) -> BTreeMap<u32, Vec<&Mutation>> {
        self.group_mutations(Mutation::has_survived)
    }

    fn group_mutations(&self, predicate: impl Fn(&Mutation) -> bool) -> BTreeMap<u32, Vec<&Mutation>> {
        let mut lines: BTreeMap<u32, Vec<&Mutation>> = BTreeMap::new();
        for mutation in self.mutations.iter().filter(|m| predicate(m)) {
            lines.entry(mutation.line).or_default().push(mutation);
        }
        lines
    }

    /// Stores the delta of each metric present in both distributions.
    pub fn compute_delta(
        &mut self,
        current: &BTreeMap<Metric, Value>,
        reference: &BTreeMap<Metric, Value>,
    ) {
        for (metric, value) in current {
            if let Some(delta) = reference.get(metric).and_then(|r| value.delta(r)) {
                self.coverage_delta.insert(*metric, delta);
            }
        }
    }

    /// Delta of the metric, zero if none has been computed.
    pub fn delta(&self, metric: Metric) -> Fraction {
        self.coverage_delta
            .get(&metric)
            .copied()
            .unwrap_or_else(|| Fraction::from_integer(0))
    }

    pub fn has_delta(&self, metric: Metric) -> bool {
        self.coverage_delta.contains_key(&metric)
    }

    pub fn coverage_delta(&self) -> &BTreeMap<Metric, Fraction> {
        &self.coverage_delta
    }

    pub(crate) fn counters_mut(&mut self) -> &mut BTreeMap<u32, LineCounter> {
        &mut self.counters
    }

    pub(crate) fn merge_supplements(&mut self, other: &FileData) {
        for mutation in &other.mutations {
            if !self.mutations.contains(mutation) {
                self.mutations.push(mutation.clone());
            }
        }
        self.modified_lines.extend(other.modified_lines.iter().copied());
        for (&line, &delta) in &other.indirect_coverage_changes {
            self.indirect_coverage_changes.entry(line).or_insert(delta);
        }
    }

    /// Keeps only modified instrumented lines and mutations on modified lines.
    ///
    /// Returns `None` if no modified line is instrumented. Lines without any
    /// coverage item carry no information and are dropped from the counters.
    pub(crate) fn retain_modified(&self) -> Option<(FileData, Vec<Value>)> {
        if !self.has_covered_and_modified_lines() {
            return None;
        }
        let mut copy = self.empty_copy();
        copy.modified_lines = self.modified_lines.clone();
        for line in self.covered_and_modified_lines() {
            if let Some(counter) = self.counter(line).filter(|c| c.total() > 0) {
                copy.counters.insert(line, counter);
            }
        }
        copy.mutations = self
            .mutations
            .iter()
            .filter(|m| self.has_modified_line(m.line))
            .cloned()
            .collect();

        let mut values = summarize(&copy.counters);
        values.extend(mutation_coverage(&copy.mutations).map(Value::Coverage));
        Some((copy, values))
    }

    /// Line and branch values gained or lost through indirect coverage changes.
    pub(crate) fn indirect_change_values(&self) -> Option<Vec<Value>> {
        if !self.has_indirect_coverage_changes() {
            return None;
        }
        let mut lines = CoverageBuilder::new(Metric::Line);
        let mut branches = CoverageBuilder::new(Metric::Branch);
        for (&line, &delta) in &self.indirect_coverage_changes {
            let counter = self.counter(line).unwrap_or_default();
            let covered = if counter.is_branch() {
                counter.covered
            } else {
                u32::from(counter.covered > 0)
            };
            let magnitude = delta.unsigned_abs();
            if delta > 0 {
                if magnitude == covered {
                    lines.increment_covered(1);
                }
                if counter.is_branch() {
                    branches.increment_covered(magnitude);
                }
            } else if delta < 0 {
                if covered == 0 {
                    lines.increment_missed(1);
                }
                if counter.is_branch() {
                    branches.increment_missed(magnitude);
                }
            }
        }
        Some(
            [lines.build_counts(), branches.build_counts()]
                .into_iter()
                .filter(Coverage::is_set)
                .map(Value::Coverage)
                .collect(),
        )
    }
}

/// Computes line and branch values from line counters.
///
/// Lines count as one covered or missed item each. Branch points contribute
/// all of their items to the branch value. Lines without items are ignored.
pub(crate) fn summarize(counters: &BTreeMap<u32, LineCounter>) -> Vec<Value> {
    let mut lines = CoverageBuilder::new(Metric::Line);
    let mut branches = CoverageBuilder::new(Metric::Branch);
    for counter in counters.values() {
        match counter.total() {
            0 => {}
            1 => {
                lines.increment_covered(counter.covered);
                lines.increment_missed(counter.missed);
            }
            _ => {
                if counter.covered > 0 {
                    lines.increment_covered(1);
                } else {
                    lines.increment_missed(1);
                }
                branches.increment_covered(counter.covered);
                branches.increment_missed(counter.missed);
            }
        }
    }
    [lines.build_counts(), branches.build_counts()]
        .into_iter()
        .filter(Coverage::is_set)
        .map(Value::Coverage)
        .collect()
}

/// Detected and undetected mutations as a mutation coverage value.
pub(crate) fn mutation_coverage(mutations: &[Mutation]) -> Option<Coverage> {
    if mutations.is_empty() {
        return None;
    }
    let detected = mutations.iter().filter(|m| m.is_detected()).count();
    let undetected = mutations.len() - detected;
    Some(Coverage::counts(
        Metric::Mutation,
        u32::try_from(detected).unwrap_or(u32::MAX),
        u32::try_from(undetected).unwrap_or(u32::MAX),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{MutationBuilder, MutationStatus};

    fn file_with(lines: &[(u32, u32, u32)]) -> FileData {
        let mut file = FileData::new("src/Main.java");
        for &(line, covered, missed) in lines {
            file.add_counters(line, covered, missed);
        }
        file
    }

    fn mutation(line: u32, status: MutationStatus) -> Mutation {
        MutationBuilder::new()
            .with_line(line)
            .with_status(status)
            .build()
            .unwrap()
    }

    fn coverage_of(values: &[Value], metric: Metric) -> Option<(u32, u32)> {
        values
            .iter()
            .filter(|v| v.metric() == metric)
            .filter_map(Value::as_coverage)
            .map(|c| (c.covered(), c.missed()))
            .next()
    }

    #[test]
    fn test_line_counter_total_saturates() {
        let counter = LineCounter::new(u32::MAX, 3);
        assert_eq!(counter.total(), u32::MAX);
        assert!(counter.is_branch());
    }

    #[test]
    fn test_add_counters_last_write_wins() {
        let mut file = file_with(&[(10, 1, 0)]);
        file.add_counters(10, 0, 1);
        assert_eq!(file.counter(10), Some(LineCounter::new(0, 1)));
        assert_eq!(file.counters().len(), 1);
    }

    #[test]
    fn test_missed_line_ranges() {
        let mut file = FileData::new("a.rs");
        for line in [1, 2, 3, 6, 7, 10] {
            file.add_counters(line, 0, 1);
        }
        for line in [4, 5, 8, 9] {
            file.add_counters(line, 1, 0);
        }
        assert_eq!(
            file.missed_line_ranges(),
            vec![
                LineRange::new(1, 3),
                LineRange::new(6, 7),
                LineRange::single(10)
            ]
        );
    }

    #[test]
    fn test_missed_line_ranges_skip_uninstrumented_gaps() {
        let file = file_with(&[(1, 0, 1), (5, 0, 1), (6, 1, 0)]);
        assert_eq!(file.missed_line_ranges(), vec![LineRange::new(1, 5)]);
    }

    #[test]
    fn test_covered_and_missed_lines() {
        let file = file_with(&[(1, 1, 0), (2, 0, 1), (3, 1, 1), (4, 0, 2)]);
        assert_eq!(file.covered_lines(), BTreeSet::from([1, 3]));
        assert_eq!(file.missed_lines(), BTreeSet::from([2, 4]));
        assert_eq!(file.partially_covered_lines(), BTreeMap::from([(3, 1)]));
        assert_eq!(file.covered_counters(), vec![1, 0, 1, 0]);
        assert_eq!(file.missed_counters(), vec![0, 1, 1, 2]);
        assert_eq!(file.covered_of_line(99), 0);
    }

    #[test]
    fn test_file_name() {
        assert_eq!(FileData::new("src/app/main.ts").file_name(), "main.ts");
        assert_eq!(FileData::new("main.ts").file_name(), "main.ts");
    }

    #[test]
    fn test_covered_and_modified_lines() {
        let mut file = file_with(&[(5, 1, 0), (9, 0, 1)]);
        file.add_modified_lines([5, 6, 7]);
        assert!(file.has_modified_line(6));
        assert_eq!(file.covered_and_modified_lines(), BTreeSet::from([5]));
        assert!(file.has_covered_and_modified_lines());
    }

    #[test]
    fn test_summarize_binarizes_lines() {
        let file = file_with(&[(1, 1, 0), (2, 0, 1), (3, 3, 1), (4, 0, 2), (5, 0, 0)]);
        let values = summarize(file.counters());
        assert_eq!(coverage_of(&values, Metric::Line), Some((2, 2)));
        assert_eq!(coverage_of(&values, Metric::Branch), Some((3, 3)));
    }

    #[test]
    fn test_retain_modified() {
        let mut file = file_with(&[(1, 1, 0), (5, 1, 0), (9, 0, 1), (12, 2, 2)]);
        file.add_modified_lines([5, 9, 30]);
        file.add_mutation(mutation(5, MutationStatus::Killed));
        file.add_mutation(mutation(9, MutationStatus::Survived));
        file.add_mutation(mutation(12, MutationStatus::Survived));

        let (copy, values) = file.retain_modified().unwrap();
        assert_eq!(copy.lines_with_coverage(), BTreeSet::from([5, 9]));
        assert_eq!(copy.mutations().len(), 2);
        assert_eq!(coverage_of(&values, Metric::Line), Some((1, 1)));
        assert_eq!(coverage_of(&values, Metric::Branch), None);
        assert_eq!(coverage_of(&values, Metric::Mutation), Some((1, 1)));
    }

    #[test]
    fn test_retain_modified_without_intersection() {
        let mut file = file_with(&[(1, 1, 0)]);
        file.add_modified_lines([2]);
        assert!(file.retain_modified().is_none());
    }

    #[test]
    fn test_indirect_change_values() {
        let mut file = file_with(&[(1, 1, 0), (2, 0, 1), (3, 2, 2), (4, 0, 4)]);
        file.add_indirect_coverage_change(1, 1);
        file.add_indirect_coverage_change(2, -1);
        file.add_indirect_coverage_change(3, 2);
        file.add_indirect_coverage_change(4, -3);

        let values = file.indirect_change_values().unwrap();
        // line 1 newly covered, line 3 covered by exactly the delta
        assert_eq!(coverage_of(&values, Metric::Line), Some((2, 2)));
        assert_eq!(coverage_of(&values, Metric::Branch), Some((2, 3)));
    }

    #[test]
    fn test_indirect_change_values_without_changes() {
        assert!(file_with(&[(1, 1, 0)]).indirect_change_values().is_none());
    }

    #[test]
    fn test_mutations_per_line() {
        let mut file = FileData::new("a.rs");
        file.add_mutation(mutation(3, MutationStatus::Killed));
        file.add_mutation(mutation(3, MutationStatus::Survived));
        file.add_mutation(mutation(7, MutationStatus::NoCoverage));

        let all = file.mutations_per_line();
        assert_eq!(all[&3].len(), 2);
        assert_eq!(all[&7].len(), 1);
        let survived = file.survived_mutations_per_line();
        assert_eq!(survived.len(), 1);
        assert_eq!(survived[&3][0].status, MutationStatus::Survived);
    }

    #[test]
    fn test_mutation_coverage() {
        let mutations = vec![
            mutation(1, MutationStatus::Killed),
            mutation(2, MutationStatus::TimedOut),
            mutation(3, MutationStatus::NoCoverage),
        ];
        let coverage = mutation_coverage(&mutations).unwrap();
        assert_eq!((coverage.covered(), coverage.missed()), (2, 1));
        assert!(mutation_coverage(&[]).is_none());
    }

    #[test]
    fn test_delta_defaults_to_zero() {
        let mut file = FileData::new("a.rs");
        assert_eq!(file.delta(Metric::Line), Fraction::from_integer(0));
        assert!(!file.has_delta(Metric::Line));

        let current = BTreeMap::from([
            (Metric::Line, Value::Coverage(Coverage::counts(Metric::Line, 3, 1))),
            (Metric::Branch, Value::Coverage(Coverage::counts(Metric::Branch, 1, 1))),
        ]);
        let reference = BTreeMap::from([(
            Metric::Line,
            Value::Coverage(Coverage::counts(Metric::Line, 1, 1)),
        )]);
        file.compute_delta(&current, &reference);
        assert_eq!(file.delta(Metric::Line), Fraction::new(1, 4));
        assert!(!file.has_delta(Metric::Branch));
    }
}
