use std::collections::{BTreeMap, BTreeSet};

use proptest::prelude::*;

use covmodel::changes::ChangeSet;
use covmodel::model::{Coverage, Metric, Node, Tree, Value, EMPTY_NAME};

fn report(path: &str, lines: &BTreeMap<u32, bool>) -> Tree {
    let mut tree = Tree::new(Node::module(EMPTY_NAME));
    let file = tree.find_or_create_file(path).unwrap();
    for (&line, &covered) in lines {
        tree.add_counters(file, line, u32::from(covered), u32::from(!covered))
            .unwrap();
    }
    tree.summarize_file(file).unwrap();
    tree
}

fn line_totals(tree: &Tree) -> Option<(u32, u32)> {
    tree.value(tree.root(), Metric::Line)
        .and_then(|value| value.as_coverage().map(|c| (c.covered(), c.missed())))
        .filter(|(covered, missed)| covered + missed > 0)
}

fn line_map() -> impl Strategy<Value = BTreeMap<u32, bool>> {
    prop::collection::btree_map(1u32..200, any::<bool>(), 0..40)
}

// ---------------------------------------------------------------------------
// Merge property tests
// ---------------------------------------------------------------------------

proptest! {
    /// Merging is symmetric: the order of the inputs does not change totals.
    #[test]
    fn merge_is_commutative(left in line_map(), right in line_map()) {
        let a = report("src/lib.rs", &left);
        let b = report("src/lib.rs", &right);
        let ab = a.merge(&b).unwrap().into_owned();
        let ba = b.merge(&a).unwrap().into_owned();
        prop_assert_eq!(line_totals(&ab), line_totals(&ba));
    }

    /// Merging a tree with a copy of itself changes nothing.
    #[test]
    fn merge_with_copy_is_idempotent(lines in line_map()) {
        let tree = report("src/lib.rs", &lines);
        let copy = tree.copy_tree();
        let merged = tree.merge(&copy).unwrap().into_owned();
        prop_assert_eq!(line_totals(&merged), line_totals(&tree));
        prop_assert_eq!(merged.all_files().len(), tree.all_files().len());
    }

    /// A line covered in either input is covered in the result.
    #[test]
    fn merge_never_loses_covered_lines(left in line_map(), right in line_map()) {
        let a = report("src/lib.rs", &left);
        let b = report("src/lib.rs", &right);
        let merged = a.merge(&b).unwrap().into_owned();
        let file = merged.find_file("src/lib.rs").unwrap();
        let covered = merged.file(file).unwrap().covered_lines();

        for (line, _) in left.iter().chain(right.iter()).filter(|(_, covered)| **covered) {
            prop_assert!(covered.contains(line), "line {} lost its coverage", line);
        }
        let instrumented: BTreeSet<u32> = left.keys().chain(right.keys()).copied().collect();
        let total = line_totals(&merged).map_or(0, |(c, m)| c + m);
        prop_assert_eq!(total as usize, instrumented.len());
    }

    /// Files of disjoint reports are kept side by side and their totals add up.
    #[test]
    fn merge_of_disjoint_files_adds_totals(left in line_map(), right in line_map()) {
        let a = report("src/a.rs", &left);
        let b = report("src/b.rs", &right);
        let merged = Tree::merge_all(vec![a.copy_tree(), b.copy_tree()]).unwrap();

        let sum = |tree: &Tree| line_totals(tree).unwrap_or((0, 0));
        let (ca, ma) = sum(&a);
        let (cb, mb) = sum(&b);
        prop_assert_eq!(sum(&merged), (ca + cb, ma + mb));
        prop_assert_eq!(merged.all_files().len(), 2);
    }

    /// Coverage percentages stay within bounds.
    #[test]
    fn percentage_is_bounded(lines in line_map()) {
        let tree = report("src/lib.rs", &lines);
        if let Some(value) = tree.value(tree.root(), Metric::Line) {
            if let Some(percentage) = value.as_coverage().and_then(|c| c.percentage()) {
                prop_assert!((0.0..=100.0).contains(&percentage));
            }
        }
    }
}

// ---------------------------------------------------------------------------
// File data property tests
// ---------------------------------------------------------------------------

proptest! {
    /// Missed ranges are ordered, disjoint and hold exactly the missed lines.
    #[test]
    fn missed_ranges_cover_missed_lines(lines in line_map()) {
        let tree = report("src/lib.rs", &lines);
        let file = tree.find_file("src/lib.rs").unwrap();
        let data = tree.file(file).unwrap();
        let ranges = data.missed_line_ranges();

        for pair in ranges.windows(2) {
            prop_assert!(pair[0].end < pair[1].start);
        }
        for (&line, &covered) in &lines {
            let in_range = ranges.iter().any(|range| range.contains(line));
            prop_assert_eq!(in_range, !covered, "line {}", line);
        }
        for range in &ranges {
            prop_assert!(!lines.get(&range.start).copied().unwrap_or(true));
            prop_assert!(!lines.get(&range.end).copied().unwrap_or(true));
        }
    }
}

// ---------------------------------------------------------------------------
// Construction property tests
// ---------------------------------------------------------------------------

proptest! {
    /// A copy equals its source and is independent of it.
    #[test]
    fn copy_is_equal_and_independent(lines in line_map(), extra in 200u32..300) {
        let tree = report("src/lib.rs", &lines);
        let mut copy = tree.copy_tree();
        prop_assert!(copy == tree);

        let file = copy.find_file("src/lib.rs").unwrap();
        copy.add_counters(file, extra, 0, 1).unwrap();
        copy.summarize_file(file).unwrap();
        prop_assert!(copy != tree);
        let original = tree.find_file("src/lib.rs").unwrap();
        prop_assert!(!tree.file(original).unwrap().has_coverage_for_line(extra));
    }

    /// After any sequence of replacements exactly one value per metric remains.
    #[test]
    fn replace_value_keeps_one_value(
        counts in prop::collection::vec((0u32..100, 0u32..100), 1..10)
    ) {
        let mut node = Node::package("pkg");
        for &(covered, missed) in &counts {
            node.replace_value(Value::Coverage(Coverage::new(Metric::Line, covered, missed).unwrap()));
        }
        let lines: Vec<_> = node.values().iter().filter(|v| v.metric() == Metric::Line).collect();
        prop_assert_eq!(lines.len(), 1);

        let &(covered, missed) = counts.last().unwrap();
        let stored = lines[0].as_coverage().unwrap();
        prop_assert_eq!((stored.covered(), stored.missed()), (covered, missed));
    }

    /// Adding a second value of the same metric fails and keeps the first.
    #[test]
    fn add_value_rejects_duplicates(first in 0u32..50, second in 0u32..50) {
        let mut node = Node::package("pkg");
        node.add_value(Value::Coverage(Coverage::new(Metric::Branch, first, 1).unwrap())).unwrap();
        let result = node.add_value(Value::Coverage(Coverage::new(Metric::Branch, second, 2).unwrap()));
        prop_assert!(result.is_err());
        prop_assert_eq!(node.values().len(), 1);
        prop_assert_eq!(node.values()[0].as_coverage().unwrap().covered(), first);
    }
}

// ---------------------------------------------------------------------------
// Diff parsing property tests
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
enum Op {
    Context,
    Added,
    Removed,
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![Just(Op::Context), Just(Op::Added), Just(Op::Removed)]
}

proptest! {
    /// Added lines are reported with their line numbers in the new file.
    #[test]
    fn diff_reports_added_lines(start in 1u32..500, ops in prop::collection::vec(op(), 1..30)) {
        let old_count = ops.iter().filter(|o| !matches!(o, Op::Added)).count();
        let new_count = ops.iter().filter(|o| !matches!(o, Op::Removed)).count();

        let mut diff = format!(
            "diff --git a/src/lib.rs b/src/lib.rs\n--- a/src/lib.rs\n+++ b/src/lib.rs\n@@ -{start},{old_count} +{start},{new_count} @@\n"
        );
        let mut expected = BTreeSet::new();
        let mut next = start;
        for op in &ops {
            match op {
                Op::Context => {
                    diff.push_str(" unchanged\n");
                    next += 1;
                }
                Op::Added => {
                    diff.push_str("+added\n");
                    expected.insert(next);
                    next += 1;
                }
                Op::Removed => diff.push_str("-removed\n"),
            }
        }

        let changes = ChangeSet::from_diff(&diff);
        let actual = changes.modified_lines("src/lib.rs").cloned().unwrap_or_default();
        prop_assert_eq!(actual, expected);
    }
}
