//! The coverage tree model.
//!
//! A [`Tree`] holds modules, packages, files, classes and methods. Values
//! such as line or branch coverage are stored on the nodes where a report
//! provides them and are aggregated on demand for every other node. Files
//! additionally keep per-line counters, modified lines and mutations, which
//! drive merging ([`Tree::merge`]) and the change-aware views
//! ([`Tree::filter_by`]).

mod file;
mod filter;
mod merge;
mod metric;
mod mutation;
mod node;
mod tree;
mod value;

pub use file::{FileData, LineCounter, LineRange};
pub use filter::FilterStrategy;
pub use merge::CONTAINER_NAME;
pub use metric::{Metric, ValueKind};
pub use mutation::{Mutation, MutationBuilder, MutationStatus};
pub use node::{name_hash, Node, NodeId, NodeKind, EMPTY_NAME, ROOT_NAME};
pub use tree::Tree;
pub use value::{to_percent, Coverage, CoverageBuilder, Density, Fraction, Magnitude, Value};
