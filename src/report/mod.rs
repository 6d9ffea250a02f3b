//! Serializable summaries of coverage trees.
//!
//! The summaries flatten a tree into plain data for the output formatters:
//! totals per metric, a row per file, deltas against a baseline and the
//! change-aware views of a tree with modified lines.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::config::GateConfig;
use crate::core::{Error, Result};
use crate::model::{to_percent, FilterStrategy, Fraction, Metric, NodeId, Tree, Value, ValueKind};
use crate::reader::ReportLog;

/// Totals of one metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSummary {
    pub metric: Metric,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub covered: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub missed: Option<u32>,
    /// Covered percentage for coverage metrics.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub percentage: Option<f64>,
    /// Plain value for magnitudes and densities.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
}

impl MetricSummary {
    pub fn from_value(value: &Value) -> Self {
        match value {
            Value::Coverage(coverage) => Self {
                metric: coverage.metric(),
                covered: Some(coverage.covered()),
                missed: Some(coverage.missed()),
                percentage: coverage.percentage(),
                value: None,
            },
            Value::Magnitude(magnitude) => Self {
                metric: magnitude.metric(),
                covered: None,
                missed: None,
                percentage: None,
                value: Some(magnitude.value() as f64),
            },
            Value::Density(density) => Self {
                metric: density.metric(),
                covered: None,
                missed: None,
                percentage: None,
                value: Some(to_percent(density.value()) / 100.0),
            },
        }
    }
}

/// Summaries of every metric present below a node, in metric order.
pub fn metric_summaries(tree: &Tree, id: NodeId) -> Vec<MetricSummary> {
    tree.metrics_distribution(id)
        .into_iter()
        .filter(|(metric, _)| !matches!(metric, Metric::Container | Metric::Module))
        .map(|(_, value)| MetricSummary::from_value(&value))
        .collect()
}

/// One row per file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileSummary {
    pub path: String,
    pub package: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mutation: Option<f64>,
    /// Ranges of consecutive missed lines, e.g. `3-5`.
    pub missed_lines: Vec<String>,
    pub partially_covered_lines: usize,
    pub survived_mutations: usize,
    pub modified_lines: usize,
}

impl FileSummary {
    /// Summarizes a file node; `None` for other nodes.
    pub fn from_file(tree: &Tree, id: NodeId) -> Option<Self> {
        let data = tree.file(id)?;
        let percentage = |metric| {
            tree.value(id, metric)
                .and_then(|value| value.as_coverage().and_then(|c| c.percentage()))
        };
        Some(Self {
            path: data.relative_path().to_string(),
            package: tree.parent_name(id),
            line: percentage(Metric::Line),
            branch: percentage(Metric::Branch),
            mutation: percentage(Metric::Mutation),
            missed_lines: data
                .missed_line_ranges()
                .iter()
                .map(ToString::to_string)
                .collect(),
            partially_covered_lines: data.partially_covered_lines().len(),
            survived_mutations: data.mutations().iter().filter(|m| m.has_survived()).count(),
            modified_lines: data.modified_lines().len(),
        })
    }
}

/// Overview of a complete tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeSummary {
    pub name: String,
    pub metric: Metric,
    pub metrics: Vec<MetricSummary>,
    pub files: Vec<FileSummary>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub skipped_errors: usize,
}

fn is_zero(count: &usize) -> bool {
    *count == 0
}

impl TreeSummary {
    pub fn new(tree: &Tree) -> Self {
        let root = tree.root();
        Self {
            name: tree[root].name.clone(),
            metric: tree[root].metric(),
            metrics: metric_summaries(tree, root),
            files: tree
                .all_files()
                .into_iter()
                .filter_map(|file| FileSummary::from_file(tree, file))
                .collect(),
            errors: Vec::new(),
            skipped_errors: 0,
        }
    }

    /// Attaches the errors collected while reading the reports.
    pub fn with_log(mut self, log: &ReportLog) -> Self {
        self.errors = log.error_messages().to_vec();
        self.skipped_errors = log.skipped_errors();
        self
    }

    pub fn metric(&self, metric: Metric) -> Option<&MetricSummary> {
        self.metrics.iter().find(|summary| summary.metric == metric)
    }

    /// Covered percentage of a coverage metric.
    pub fn percentage(&self, metric: Metric) -> Option<f64> {
        self.metric(metric).and_then(|summary| summary.percentage)
    }

    /// Fails with a threshold violation for the first metric below its
    /// minimum. A metric without data counts as 0%.
    pub fn check(&self, gate: &GateConfig) -> Result<()> {
        let thresholds = [
            (Metric::Line, gate.min_line_coverage),
            (Metric::Branch, gate.min_branch_coverage),
            (Metric::Mutation, gate.min_mutation_coverage),
        ];
        for (metric, minimum) in thresholds {
            let Some(minimum) = minimum else {
                continue;
            };
            let actual = self.percentage(metric).unwrap_or(0.0);
            if actual < minimum {
                return Err(Error::threshold_violation(
                    format!(
                        "{} coverage {actual:.1}% is below minimum {minimum:.1}%",
                        metric.display_name()
                    ),
                    actual,
                ));
            }
        }
        Ok(())
    }
}

/// Files and line coverage of one input of a merge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportEntry {
    pub path: String,
    pub files: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<f64>,
}

/// The inputs of a merge next to the merged result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeSummary {
    pub reports: Vec<ReportEntry>,
    pub merged: TreeSummary,
}

impl MergeSummary {
    pub fn new<'a>(inputs: impl IntoIterator<Item = (&'a Path, &'a Tree)>, merged: &Tree) -> Self {
        let reports = inputs
            .into_iter()
            .map(|(path, tree)| ReportEntry {
                path: path.display().to_string(),
                files: tree.all_files().len(),
                line: tree
                    .value(tree.root(), Metric::Line)
                    .and_then(|value| value.as_coverage().and_then(|c| c.percentage())),
            })
            .collect();
        Self {
            reports,
            merged: TreeSummary::new(merged),
        }
    }
}

/// Change of one metric against the baseline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricDelta {
    pub metric: Metric,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub baseline: Option<f64>,
    /// Percentage points for coverage metrics, plain difference otherwise.
    pub delta: f64,
}

/// Per-file deltas of the coverage metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileDelta {
    pub path: String,
    pub deltas: Vec<MetricDelta>,
}

/// Comparison of a tree with a baseline tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeltaSummary {
    pub metrics: Vec<MetricDelta>,
    pub files: Vec<FileDelta>,
}

impl DeltaSummary {
    /// Compares the roots of both trees. File rows are taken from the deltas
    /// stored by [`Tree::compute_file_deltas`], files without one are omitted.
    pub fn new(current: &Tree, baseline: &Tree) -> Self {
        let current_values = current.metrics_distribution(current.root());
        let baseline_values = baseline.metrics_distribution(baseline.root());
        let metrics = current
            .compute_delta(current.root(), baseline, baseline.root())
            .into_iter()
            .filter(|(metric, _)| !metric.is_container())
            .map(|(metric, delta)| MetricDelta {
                metric,
                current: current_values.get(&metric).and_then(scalar),
                baseline: baseline_values.get(&metric).and_then(scalar),
                delta: delta_value(metric, delta),
            })
            .collect();

        let files = current
            .all_files()
            .into_iter()
            .filter_map(|id| current.file(id))
            .filter(|data| !data.coverage_delta().is_empty())
            .map(|data| FileDelta {
                path: data.relative_path().to_string(),
                deltas: data
                    .coverage_delta()
                    .iter()
                    .filter(|(metric, _)| !metric.is_container())
                    .map(|(&metric, &delta)| MetricDelta {
                        metric,
                        current: None,
                        baseline: None,
                        delta: delta_value(metric, delta),
                    })
                    .collect(),
            })
            .collect();

        Self { metrics, files }
    }

    pub fn metric(&self, metric: Metric) -> Option<&MetricDelta> {
        self.metrics.iter().find(|delta| delta.metric == metric)
    }
}

fn scalar(value: &Value) -> Option<f64> {
    match value {
        Value::Coverage(coverage) => coverage.percentage(),
        Value::Magnitude(magnitude) => Some(magnitude.value() as f64),
        Value::Density(density) => Some(to_percent(density.value()) / 100.0),
    }
}

fn delta_value(metric: Metric, delta: Fraction) -> f64 {
    match metric.value_kind() {
        ValueKind::Coverage => to_percent(delta),
        _ => to_percent(delta) / 100.0,
    }
}

/// One change-aware view of a tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeView {
    pub strategy: FilterStrategy,
    pub files: Vec<String>,
    pub metrics: Vec<MetricSummary>,
}

/// Coverage of the modified code, one view per filter strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeSummary {
    pub changed_files: usize,
    pub views: Vec<ChangeView>,
}

impl ChangeSummary {
    /// Summarizes a tree whose files already carry modified lines and,
    /// optionally, indirect coverage changes.
    pub fn new(tree: &Tree, changed_files: usize) -> Self {
        let views = FilterStrategy::ALL
            .into_iter()
            .map(|strategy| {
                let filtered = tree.filter_by(strategy);
                let root = filtered.root();
                ChangeView {
                    strategy,
                    files: filtered.files(root).into_iter().collect(),
                    metrics: metric_summaries(&filtered, root),
                }
            })
            .collect();
        Self {
            changed_files,
            views,
        }
    }

    pub fn view(&self, strategy: FilterStrategy) -> Option<&ChangeView> {
        self.views.iter().find(|view| view.strategy == strategy)
    }
}
