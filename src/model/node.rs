//! Nodes of a coverage tree.

use std::fmt;

use xxhash_rust::xxh3::xxh3_64;

use super::file::FileData;
use super::metric::Metric;
use super::value::Value;
use crate::core::{Error, Result};

/// Name of the synthetic parent reported for root nodes.
pub const ROOT_NAME: &str = "^";

/// Name used for nodes whose name is unknown, such as the default package.
pub const EMPTY_NAME: &str = "-";

/// Index of a node in its tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Kind of a node together with its kind-specific state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    /// Synthetic root holding trees that cannot be merged.
    Container,
    Module,
    Package,
    File(Box<FileData>),
    Class,
    Method {
        signature: String,
        line: Option<u32>,
    },
}

impl NodeKind {
    pub fn metric(&self) -> Metric {
        match self {
            NodeKind::Container => Metric::Container,
            NodeKind::Module => Metric::Module,
            NodeKind::Package => Metric::Package,
            NodeKind::File(_) => Metric::File,
            NodeKind::Class => Metric::Class,
            NodeKind::Method { .. } => Metric::Method,
        }
    }
}

/// A node payload: identity, values and the links into the tree arena.
#[derive(Debug, Clone)]
pub struct Node {
    pub name: String,
    pub kind: NodeKind,
    pub(crate) values: Vec<Value>,
    pub(crate) children: Vec<NodeId>,
    pub(crate) parent: Option<NodeId>,
}

impl Node {
    pub fn new(kind: NodeKind, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            values: Vec::new(),
            children: Vec::new(),
            parent: None,
        }
    }

    pub fn container(name: impl Into<String>) -> Self {
        Self::new(NodeKind::Container, name)
    }

    pub fn module(name: impl Into<String>) -> Self {
        Self::new(NodeKind::Module, name)
    }

    pub fn package(name: impl Into<String>) -> Self {
        Self::new(NodeKind::Package, name)
    }

    /// Creates a file node; a blank relative path falls back to the name.
    pub fn new_file(name: impl Into<String>, relative_path: impl Into<String>) -> Self {
        let name = name.into();
        let relative_path = relative_path.into();
        let relative_path = if relative_path.trim().is_empty() {
            name.clone()
        } else {
            relative_path
        };
        Self::new(NodeKind::File(Box::new(FileData::new(relative_path))), name)
    }

    pub fn class(name: impl Into<String>) -> Self {
        Self::new(NodeKind::Class, name)
    }

    pub fn method(name: impl Into<String>, signature: impl Into<String>) -> Self {
        Self::new(
            NodeKind::Method {
                signature: signature.into(),
                line: None,
            },
            name,
        )
    }

    /// Sets the first line of a method node; ignored for other kinds.
    pub fn with_line(mut self, first_line: u32) -> Self {
        if let NodeKind::Method { line, .. } = &mut self.kind {
            *line = Some(first_line);
        }
        self
    }

    pub fn metric(&self) -> Metric {
        self.kind.metric()
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Returns the value stored directly on this node.
    pub fn stored_value(&self, metric: Metric) -> Option<&Value> {
        self.values.iter().find(|v| v.metric() == metric)
    }

    /// Adds a value to a node that is not yet part of a tree.
    pub fn add_value(&mut self, value: Value) -> Result<()> {
        if self.stored_value(value.metric()).is_some() {
            return Err(Error::DuplicateMetricValue {
                node: self.to_string(),
                metric: value.metric(),
            });
        }
        self.values.push(value);
        Ok(())
    }

    /// Stores the value, replacing any value of the same metric.
    pub fn replace_value(&mut self, value: Value) {
        self.values.retain(|v| v.metric() != value.metric());
        self.values.push(value);
    }

    pub fn with_value(mut self, value: Value) -> Result<Self> {
        self.add_value(value)?;
        Ok(self)
    }

    pub fn file(&self) -> Option<&FileData> {
        match &self.kind {
            NodeKind::File(data) => Some(data),
            _ => None,
        }
    }

    pub fn file_mut(&mut self) -> Option<&mut FileData> {
        match &mut self.kind {
            NodeKind::File(data) => Some(data),
            _ => None,
        }
    }

    pub fn signature(&self) -> Option<&str> {
        match &self.kind {
            NodeKind::Method { signature, .. } => Some(signature),
            _ => None,
        }
    }

    pub fn is_file(&self) -> bool {
        matches!(self.kind, NodeKind::File(_))
    }

    /// Returns a detached copy without values, children or line data.
    ///
    /// Files keep their relative path, methods their signature and line.
    pub fn copy(&self) -> Node {
        let kind = match &self.kind {
            NodeKind::File(data) => NodeKind::File(Box::new(data.empty_copy())),
            kind => kind.clone(),
        };
        Node::new(kind, self.name.clone())
    }

    /// Returns a detached copy that keeps values and kind-specific data.
    pub fn copy_node(&self) -> Node {
        Node {
            name: self.name.clone(),
            kind: self.kind.clone(),
            values: self.values.clone(),
            children: Vec::new(),
            parent: None,
        }
    }

    /// Returns true if the node has the metric and name. Files also match
    /// their relative path.
    pub fn matches(&self, metric: Metric, name: &str) -> bool {
        if self.metric() != metric {
            return false;
        }
        self.name == name || self.file().is_some_and(|f| f.relative_path() == name)
    }

    /// Same as [`Node::matches`] for a name hash computed with [`name_hash`].
    pub fn matches_hash(&self, metric: Metric, hash: u64) -> bool {
        if self.metric() != metric {
            return false;
        }
        name_hash(&self.name) == hash
            || self
                .file()
                .is_some_and(|f| name_hash(f.relative_path()) == hash)
    }

    pub(crate) fn same_content(&self, other: &Node) -> bool {
        self.name == other.name
            && self.kind == other.kind
            && self.values.len() == other.values.len()
            && self.values.iter().all(|v| other.values.contains(v))
    }
}

/// Hash of a node name used for compact name comparisons.
pub fn name_hash(name: &str) -> u64 {
    xxh3_64(name.as_bytes())
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.metric(), self.name)
    }
}
