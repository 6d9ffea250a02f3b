//! Catalog of measurable dimensions.
//!
//! Metrics are totally ordered: structural (container) metrics come first in
//! the order of the tree hierarchy, followed by value metrics and finally the
//! derived metrics that are computed on demand.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::node::NodeId;
use super::tree::Tree;
use super::value::{Coverage, Density, Fraction, Magnitude, Value};

/// A named, ordered dimension of measurement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Metric {
    /// Synthetic root for trees that cannot be merged into one.
    Container,
    Module,
    Package,
    File,
    Class,
    Method,
    Line,
    Branch,
    Instruction,
    Mutation,
    /// Cyclomatic complexity.
    Complexity,
    /// Largest method complexity within a subtree.
    ComplexityMaximum,
    /// Complexity per line of code.
    ComplexityDensity,
    /// Lines of code.
    Loc,
}

/// How values of a metric are represented.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    /// Covered and missed items.
    Coverage,
    /// A non-negative count.
    Magnitude,
    /// An exact ratio.
    Density,
}

impl Metric {
    /// All metrics in their natural order.
    pub const ALL: [Metric; 14] = [
        Metric::Container,
        Metric::Module,
        Metric::Package,
        Metric::File,
        Metric::Class,
        Metric::Method,
        Metric::Line,
        Metric::Branch,
        Metric::Instruction,
        Metric::Mutation,
        Metric::Complexity,
        Metric::ComplexityMaximum,
        Metric::ComplexityDensity,
        Metric::Loc,
    ];

    /// Returns true for structural metrics whose values are always aggregated from descendants.
    pub fn is_container(self) -> bool {
        matches!(
            self,
            Self::Container | Self::Module | Self::Package | Self::File | Self::Class | Self::Method
        )
    }

    /// Returns true for metrics that are computed from other metrics.
    pub fn is_derived(self) -> bool {
        matches!(
            self,
            Self::ComplexityMaximum | Self::ComplexityDensity | Self::Loc
        )
    }

    /// Returns how values of this metric are represented.
    pub fn value_kind(self) -> ValueKind {
        match self {
            Self::Complexity | Self::ComplexityMaximum | Self::Loc => ValueKind::Magnitude,
            Self::ComplexityDensity => ValueKind::Density,
            _ => ValueKind::Coverage,
        }
    }

    /// Returns the value of this metric for the subtree spanned by the given node.
    ///
    /// A value stored directly on the node is returned as is. Otherwise the
    /// values of the children are aggregated recursively. Container metrics
    /// count the nodes of that metric in the subtree and derived metrics are
    /// computed from their dependencies. Returns `None` if the metric is
    /// absent in the whole subtree.
    pub fn value_for(self, tree: &Tree, id: NodeId) -> Option<Value> {
        match self {
            metric if metric.is_container() => container_coverage(tree, id, metric),
            Self::Loc => {
                let lines = tree.value(id, Self::Line)?;
                let total = lines.as_coverage()?.total();
                Some(Value::Magnitude(Magnitude::of(Self::Loc, u64::from(total))))
            }
            Self::ComplexityDensity => {
                let complexity = tree.value(id, Self::Complexity)?.as_magnitude()?;
                let loc = tree.value(id, Self::Loc)?.as_magnitude()?;
                if loc == 0 {
                    return None;
                }
                let density = Fraction::new(to_i64(complexity), to_i64(loc));
                Some(Value::Density(Density::of(Self::ComplexityDensity, density)))
            }
            Self::ComplexityMaximum => maximum_complexity(tree, id),
            _ => aggregate(tree, id, self),
        }
    }

    /// Returns the human readable name of the metric.
    pub fn display_name(self) -> &'static str {
        match self {
            Self::Container => "Container",
            Self::Module => "Module",
            Self::Package => "Package",
            Self::File => "File",
            Self::Class => "Class",
            Self::Method => "Method",
            Self::Line => "Line",
            Self::Branch => "Branch",
            Self::Instruction => "Instruction",
            Self::Mutation => "Mutation",
            Self::Complexity => "Complexity",
            Self::ComplexityMaximum => "Maximum Complexity",
            Self::ComplexityDensity => "Complexity Density",
            Self::Loc => "Lines of Code",
        }
    }
}

fn to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn aggregate(tree: &Tree, id: NodeId, metric: Metric) -> Option<Value> {
    if let Some(value) = tree[id].stored_value(metric) {
        return Some(*value);
    }
    tree.children(id)
        .iter()
        .filter_map(|&child| aggregate(tree, child, metric))
        .reduce(|sum, value| sum.combine(&value))
}

fn container_coverage(tree: &Tree, id: NodeId, metric: Metric) -> Option<Value> {
    let mut covered = 0;
    let mut missed = 0;
    for node in tree.all(id, metric) {
        let lines = aggregate(tree, node, Metric::Line);
        match lines.as_ref().and_then(Value::as_coverage) {
            Some(coverage) if coverage.covered() > 0 => covered += 1,
            Some(_) => missed += 1,
            None => {}
        }
    }
    (covered + missed > 0).then(|| Value::Coverage(Coverage::counts(metric, covered, missed)))
}

fn maximum_complexity(tree: &Tree, id: NodeId) -> Option<Value> {
    let from_methods = tree
        .all(id, Metric::Method)
        .into_iter()
        .filter_map(|method| tree[method].stored_value(Metric::Complexity))
        .filter_map(Value::as_magnitude)
        .max();
    let maximum = match from_methods {
        Some(maximum) => maximum,
        None => tree.value(id, Metric::Complexity)?.as_magnitude()?,
    };
    Some(Value::Magnitude(Magnitude::of(
        Metric::ComplexityMaximum,
        maximum,
    )))
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl FromStr for Metric {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let normalized: String = s
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_lowercase();
        match normalized.as_str() {
            "container" => Ok(Self::Container),
            "module" => Ok(Self::Module),
            "package" => Ok(Self::Package),
            "file" => Ok(Self::File),
            "class" => Ok(Self::Class),
            "method" => Ok(Self::Method),
            "line" => Ok(Self::Line),
            "branch" => Ok(Self::Branch),
            "instruction" => Ok(Self::Instruction),
            "mutation" => Ok(Self::Mutation),
            "complexity" => Ok(Self::Complexity),
            "complexitymaximum" | "maximumcomplexity" => Ok(Self::ComplexityMaximum),
            "complexitydensity" => Ok(Self::ComplexityDensity),
            "loc" | "linesofcode" => Ok(Self::Loc),
            _ => Err(format!("Unknown metric: {s}")),
        }
    }
}
