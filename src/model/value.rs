//! Immutable measurements attached to nodes.

use std::fmt;

use num_rational::Ratio;

use super::metric::{Metric, ValueKind};
use crate::core::{Error, Result};

/// Exact rational number used for ratios and deltas.
pub type Fraction = Ratio<i64>;

/// Covered and missed items of a coverage metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Coverage {
    metric: Metric,
    covered: u32,
    missed: u32,
}

impl Coverage {
    /// Create a new coverage value; the metric must be a coverage metric.
    pub fn new(metric: Metric, covered: u32, missed: u32) -> Result<Self> {
        if metric.value_kind() != ValueKind::Coverage {
            return Err(Error::invalid_value(format!(
                "{metric} is not a coverage metric"
            )));
        }
        Ok(Self::counts(metric, covered, missed))
    }

    pub(crate) fn counts(metric: Metric, covered: u32, missed: u32) -> Self {
        Self {
            metric,
            covered,
            missed,
        }
    }

    /// An empty coverage of the given metric.
    pub(crate) fn empty(metric: Metric) -> Self {
        Self::counts(metric, 0, 0)
    }

    pub fn metric(&self) -> Metric {
        self.metric
    }

    pub fn covered(&self) -> u32 {
        self.covered
    }

    pub fn missed(&self) -> u32 {
        self.missed
    }

    pub fn total(&self) -> u32 {
        self.covered.saturating_add(self.missed)
    }

    /// Returns true if at least one item has been counted.
    pub fn is_set(&self) -> bool {
        self.total() > 0
    }

    /// Covered items divided by all items, or `None` for an empty coverage.
    pub fn ratio(&self) -> Option<Fraction> {
        if self.is_set() {
            Some(Fraction::new(
                i64::from(self.covered),
                i64::from(self.total()),
            ))
        } else {
            None
        }
    }

    /// Coverage in percent, for display only.
    pub fn percentage(&self) -> Option<f64> {
        self.ratio().map(to_percent)
    }

    pub(crate) fn plus(&self, other: &Coverage) -> Coverage {
        Self::counts(
            self.metric,
            self.covered.saturating_add(other.covered),
            self.missed.saturating_add(other.missed),
        )
    }
}

/// Incrementally counts covered and missed items of one metric.
#[derive(Debug, Clone, Copy)]
pub struct CoverageBuilder {
    metric: Metric,
    covered: u32,
    missed: u32,
}

impl CoverageBuilder {
    pub fn new(metric: Metric) -> Self {
        Self {
            metric,
            covered: 0,
            missed: 0,
        }
    }

    pub fn with_covered(mut self, covered: u32) -> Self {
        self.covered = covered;
        self
    }

    pub fn with_missed(mut self, missed: u32) -> Self {
        self.missed = missed;
        self
    }

    pub fn increment_covered(&mut self, items: u32) {
        self.covered = self.covered.saturating_add(items);
    }

    pub fn increment_missed(&mut self, items: u32) {
        self.missed = self.missed.saturating_add(items);
    }

    pub fn build(&self) -> Result<Coverage> {
        Coverage::new(self.metric, self.covered, self.missed)
    }

    pub(crate) fn build_counts(&self) -> Coverage {
        Coverage::counts(self.metric, self.covered, self.missed)
    }
}

/// A non-negative count such as complexity or lines of code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Magnitude {
    metric: Metric,
    value: u64,
}

impl Magnitude {
    pub fn new(metric: Metric, value: u64) -> Result<Self> {
        if metric.value_kind() != ValueKind::Magnitude {
            return Err(Error::invalid_value(format!(
                "{metric} is not a magnitude metric"
            )));
        }
        Ok(Self::of(metric, value))
    }

    pub(crate) fn of(metric: Metric, value: u64) -> Self {
        Self { metric, value }
    }

    pub fn metric(&self) -> Metric {
        self.metric
    }

    pub fn value(&self) -> u64 {
        self.value
    }
}

/// An exact ratio such as complexity per line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Density {
    metric: Metric,
    value: Fraction,
}

impl Density {
    pub fn new(metric: Metric, value: Fraction) -> Result<Self> {
        if metric.value_kind() != ValueKind::Density {
            return Err(Error::invalid_value(format!(
                "{metric} is not a density metric"
            )));
        }
        Ok(Self::of(metric, value))
    }

    pub(crate) fn of(metric: Metric, value: Fraction) -> Self {
        Self { metric, value }
    }

    pub fn metric(&self) -> Metric {
        self.metric
    }

    pub fn value(&self) -> Fraction {
        self.value
    }
}

/// A measurement for one metric on one node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Value {
    Coverage(Coverage),
    Magnitude(Magnitude),
    Density(Density),
}

impl Value {
    pub fn metric(&self) -> Metric {
        match self {
            Value::Coverage(coverage) => coverage.metric(),
            Value::Magnitude(magnitude) => magnitude.metric(),
            Value::Density(density) => density.metric(),
        }
    }

    pub fn as_coverage(&self) -> Option<&Coverage> {
        match self {
            Value::Coverage(coverage) => Some(coverage),
            _ => None,
        }
    }

    pub fn as_magnitude(&self) -> Option<u64> {
        match self {
            Value::Magnitude(magnitude) => Some(magnitude.value()),
            _ => None,
        }
    }

    pub fn as_density(&self) -> Option<Fraction> {
        match self {
            Value::Density(density) => Some(density.value()),
            _ => None,
        }
    }

    /// Adds two values of the same metric.
    pub fn add(&self, other: &Value) -> Result<Value> {
        if self.metric() != other.metric() {
            return Err(Error::IncompatibleMetric {
                left: self.metric(),
                right: other.metric(),
            });
        }
        Ok(self.combine(other))
    }

    /// Adds a value of the same metric. Every metric maps to exactly one
    /// representation, so mismatched variants cannot occur here.
    pub(crate) fn combine(&self, other: &Value) -> Value {
        match (self, other) {
            (Value::Coverage(left), Value::Coverage(right)) => Value::Coverage(left.plus(right)),
            (Value::Magnitude(left), Value::Magnitude(right)) => {
                let value = if left.metric() == Metric::ComplexityMaximum {
                    left.value().max(right.value())
                } else {
                    left.value().saturating_add(right.value())
                };
                Value::Magnitude(Magnitude::of(left.metric(), value))
            }
            (Value::Density(left), Value::Density(right)) => {
                Value::Density(Density::of(left.metric(), left.value() + right.value()))
            }
            (left, _) => *left,
        }
    }

    /// Signed difference between this value and the reference value.
    ///
    /// Coverage values compare their covered ratios, magnitudes and densities
    /// their plain values. Returns `None` if the metrics differ or a ratio is
    /// undefined.
    pub fn delta(&self, reference: &Value) -> Option<Fraction> {
        match (self, reference) {
            (Value::Coverage(current), Value::Coverage(baseline))
                if current.metric() == baseline.metric() =>
            {
                Some(current.ratio()? - baseline.ratio()?)
            }
            (Value::Magnitude(current), Value::Magnitude(baseline))
                if current.metric() == baseline.metric() =>
            {
                let current = i64::try_from(current.value()).ok()?;
                let baseline = i64::try_from(baseline.value()).ok()?;
                Some(Fraction::from_integer(current - baseline))
            }
            (Value::Density(current), Value::Density(baseline))
                if current.metric() == baseline.metric() =>
            {
                Some(current.value() - baseline.value())
            }
            _ => None,
        }
    }
}

/// Converts a ratio into a percentage for display.
pub fn to_percent(fraction: Fraction) -> f64 {
    *fraction.numer() as f64 * 100.0 / *fraction.denom() as f64
}

impl From<Coverage> for Value {
    fn from(coverage: Coverage) -> Self {
        Value::Coverage(coverage)
    }
}

impl From<Magnitude> for Value {
    fn from(magnitude: Magnitude) -> Self {
        Value::Magnitude(magnitude)
    }
}

impl fmt::Display for Coverage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.percentage() {
            Some(percentage) => write!(
                f,
                "{}: {:.2}% ({}/{})",
                self.metric,
                percentage,
                self.covered,
                self.total()
            ),
            None => write!(f, "{}: n/a", self.metric),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Coverage(coverage) => coverage.fmt(f),
            Value::Magnitude(magnitude) => write!(f, "{}: {}", magnitude.metric, magnitude.value),
            Value::Density(density) => write!(
                f,
                "{}: {:.2}",
                density.metric,
                *density.value.numer() as f64 / *density.value.denom() as f64
            ),
        }
    }
}
