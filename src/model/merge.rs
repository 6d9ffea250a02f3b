//! Merging of coverage trees.
//!
//! Containers are merged structurally: children with the same name are merged
//! recursively, all other children are copied. Files are reconciled line by
//! line and their values are recomputed from the merged counters.

use std::borrow::Cow;
use std::ptr;

use tracing::debug;

use super::file::{mutation_coverage, summarize, FileData, LineCounter};
use super::metric::Metric;
use super::node::{Node, NodeId, NodeKind};
use super::tree::Tree;
use crate::core::{Error, Result};

/// Name of the synthetic root holding trees with different identities.
pub const CONTAINER_NAME: &str = "Container";

impl Tree {
    /// Merges this tree with another tree of the same root identity.
    ///
    /// Neither input is modified. Merging a tree with itself returns the tree
    /// unchanged without copying it.
    pub fn merge(&self, other: &Tree) -> Result<Cow<'_, Tree>> {
        if ptr::eq(self, other) {
            return Ok(Cow::Borrowed(self));
        }
        let (left, right) = (&self[self.root()], &other[other.root()]);
        if left.metric() != right.metric() {
            return Err(Error::IncompatibleMetric {
                left: left.metric(),
                right: right.metric(),
            });
        }
        if left.name != right.name {
            return Err(Error::IncompatibleName {
                left: left.to_string(),
                right: right.to_string(),
            });
        }

        let mut merged = Tree::new(merge_payload(left, right)?);
        let root = merged.root();
        if !left.is_file() {
            merge_children(&mut merged, root, (self, self.root()), (other, other.root()))?;
        }
        Ok(Cow::Owned(merged))
    }

    /// Merges a list of trees.
    ///
    /// Trees are grouped by root name and metric in order of appearance and
    /// each group is reduced with [`Tree::merge`]. If more than one group
    /// remains, the results become children of a synthetic container root.
    pub fn merge_all(trees: Vec<Tree>) -> Result<Tree> {
        let mut groups: Vec<Vec<Tree>> = Vec::new();
        for tree in trees {
            let position = groups.iter().position(|group| {
                let (first, root) = (&group[0], &tree[tree.root()]);
                first[first.root()].name == root.name && first[first.root()].metric() == root.metric()
            });
            match position {
                Some(index) => groups[index].push(tree),
                None => groups.push(vec![tree]),
            }
        }

        let mut merged = groups
            .into_iter()
            .map(reduce_group)
            .collect::<Result<Vec<_>>>()?;
        match merged.len() {
            0 => Err(Error::EmptyMerge),
            1 => merged.pop().ok_or(Error::EmptyMerge),
            _ => {
                debug!(groups = merged.len(), "Wrapping incompatible trees in a container");
                let mut container = Tree::new(Node::container(CONTAINER_NAME));
                let root = container.root();
                for tree in &merged {
                    container.add_subtree(root, tree)?;
                }
                Ok(container)
            }
        }
    }
}

fn reduce_group(group: Vec<Tree>) -> Result<Tree> {
    let mut trees = group.into_iter();
    let first = trees.next().ok_or(Error::EmptyMerge)?;
    trees.try_fold(first, |merged, tree| Ok(merged.merge(&tree)?.into_owned()))
}

/// Creates the merged node itself: files are reconciled, containers start
/// without values since those are aggregated from the merged children.
fn merge_payload(left: &Node, right: &Node) -> Result<Node> {
    match (left.file(), right.file()) {
        (Some(left_file), Some(right_file)) => merge_files(left, left_file, right, right_file),
        _ => Ok(left.copy()),
    }
}

fn merge_children(
    merged: &mut Tree,
    target: NodeId,
    (left, left_id): (&Tree, NodeId),
    (right, right_id): (&Tree, NodeId),
) -> Result<()> {
    for &child in left.children(left_id) {
        let node = &left[child];
        match right.child_by_name(right_id, &node.name) {
            Some(other) => {
                let other_node = &right[other];
                if node.metric() != other_node.metric() {
                    return Err(Error::IncompatibleMetric {
                        left: node.metric(),
                        right: other_node.metric(),
                    });
                }
                let id = merged.push(target, merge_payload(node, other_node)?);
                if !node.is_file() {
                    merge_children(merged, id, (left, child), (right, other))?;
                }
            }
            None => {
                merged.graft(target, left, child);
            }
        }
    }
    for &child in right.children(right_id) {
        if !left.has_child(left_id, &right[child].name) {
            merged.graft(target, right, child);
        }
    }
    Ok(())
}

/// Reconciles two versions of a file.
///
/// Children of the file are dropped and the line and branch values are
/// recomputed from the merged counters. Complexity is taken from the right
/// side since it cannot be merged line by line.
fn merge_files(left: &Node, left_file: &FileData, right: &Node, right_file: &FileData) -> Result<Node> {
    let mut data = left_file.empty_copy();
    data.merge_supplements(left_file);
    data.merge_supplements(right_file);

    let counters = data.counters_mut();
    let lines = left_file.counters().keys().chain(right_file.counters().keys());
    for &line in lines {
        if counters.contains_key(&line) {
            continue;
        }
        let counter = match (left_file.counter(line), right_file.counter(line)) {
            (Some(l), Some(r)) => merge_line(left_file.relative_path(), line, l, r)?,
            (Some(counter), None) | (None, Some(counter)) => counter,
            (None, None) => continue,
        };
        counters.insert(line, counter);
    }

    let mut values = summarize(data.counters());
    values.extend(mutation_coverage(data.mutations()).map(Into::<super::value::Value>::into));
    values.extend(
        right
            .values()
            .iter()
            .filter(|v| v.metric() == Metric::Complexity)
            .copied(),
    );

    let mut node = Node::new(NodeKind::File(Box::new(data)), left.name.clone());
    for value in values {
        node.add_value(value)?;
    }
    Ok(node)
}

fn merge_line(file: &str, line: u32, left: LineCounter, right: LineCounter) -> Result<LineCounter> {
    if left.total() != right.total() {
        return Err(Error::LineHitCountMismatch {
            file: file.to_string(),
            line,
            left: left.total(),
            right: right.total(),
        });
    }
    if !left.is_branch() {
        return Ok(LineCounter::new(
            left.covered.max(right.covered),
            left.missed.min(right.missed),
        ));
    }
    // The exact branch pattern cannot be recovered, take the better side.
    let winner = if left.covered > right.covered { left } else { right };
    debug!(
        file,
        line,
        left = left.covered,
        right = right.covered,
        "Branch counters differ, keeping {} of {} covered",
        winner.covered,
        winner.total()
    );
    Ok(winner)
}
