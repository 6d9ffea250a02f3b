//! Change-aware views of a coverage tree.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::node::{Node, NodeId, NodeKind};
use super::tree::Tree;

/// Selects which part of a tree survives filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterStrategy {
    /// Only modified lines that carry coverage data.
    ModifiedLines,
    /// Complete files that contain at least one modified line with coverage data.
    ModifiedFiles,
    /// Coverage gained or lost in unmodified lines.
    IndirectChanges,
}

impl FilterStrategy {
    pub const ALL: [FilterStrategy; 3] = [
        FilterStrategy::ModifiedLines,
        FilterStrategy::ModifiedFiles,
        FilterStrategy::IndirectChanges,
    ];
}

impl fmt::Display for FilterStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ModifiedLines => write!(f, "modified lines"),
            Self::ModifiedFiles => write!(f, "modified files"),
            Self::IndirectChanges => write!(f, "indirect changes"),
        }
    }
}

impl FromStr for FilterStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace(['-', ' '], "_").as_str() {
            "modified_lines" | "lines" => Ok(Self::ModifiedLines),
            "modified_files" | "files" => Ok(Self::ModifiedFiles),
            "indirect_changes" | "indirect" => Ok(Self::IndirectChanges),
            _ => Err(format!("Unknown filter strategy: {s}")),
        }
    }
}

/// A node that survived filtering.
enum Kept {
    /// The complete subtree of the source node.
    Subtree(NodeId),
    /// A new node with the surviving children.
    Node(Node, Vec<Kept>),
}

impl Tree {
    /// Returns the part of the tree selected by the strategy.
    ///
    /// Never fails: if nothing survives, the result is a copy of the root
    /// without values or children.
    pub fn filter_by(&self, strategy: FilterStrategy) -> Tree {
        match self.filter_node(self.root(), strategy) {
            Some(kept) => self.materialize(kept),
            None => Tree::new(self[self.root()].copy()),
        }
    }

    pub fn filter_by_modified_lines(&self) -> Tree {
        self.filter_by(FilterStrategy::ModifiedLines)
    }

    pub fn filter_by_modified_files(&self) -> Tree {
        self.filter_by(FilterStrategy::ModifiedFiles)
    }

    pub fn filter_by_indirect_changes(&self) -> Tree {
        self.filter_by(FilterStrategy::IndirectChanges)
    }

    fn filter_node(&self, id: NodeId, strategy: FilterStrategy) -> Option<Kept> {
        let node = &self[id];
        if let Some(data) = node.file() {
            return match strategy {
                FilterStrategy::ModifiedLines => {
                    let (data, values) = data.retain_modified()?;
                    let mut copy = Node::new(NodeKind::File(Box::new(data)), node.name.clone());
                    values.into_iter().for_each(|v| copy.replace_value(v));
                    Some(Kept::Node(copy, Vec::new()))
                }
                FilterStrategy::ModifiedFiles => data
                    .has_covered_and_modified_lines()
                    .then_some(Kept::Subtree(id)),
                FilterStrategy::IndirectChanges => {
                    let values = data.indirect_change_values()?;
                    let mut copy = node.copy();
                    values.into_iter().for_each(|v| copy.replace_value(v));
                    Some(Kept::Node(copy, Vec::new()))
                }
            };
        }

        let children: Vec<Kept> = self
            .children(id)
            .iter()
            .filter_map(|&child| self.filter_node(child, strategy))
            .collect();
        (!children.is_empty()).then(|| Kept::Node(node.copy(), children))
    }

    fn materialize(&self, kept: Kept) -> Tree {
        match kept {
            Kept::Subtree(id) => self.copy_subtree(id, |_| true),
            Kept::Node(node, children) => {
                let mut tree = Tree::new(node);
                let root = tree.root();
                self.attach(&mut tree, root, children);
                tree
            }
        }
    }

    fn attach(&self, tree: &mut Tree, parent: NodeId, children: Vec<Kept>) {
        for child in children {
            match child {
                Kept::Subtree(id) => {
                    tree.graft(parent, self, id);
                }
                Kept::Node(node, grandchildren) => {
                    let id = tree.push(parent, node);
                    self.attach(tree, id, grandchildren);
                }
            }
        }
    }
}
