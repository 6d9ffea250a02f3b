//! covmodel - A tree model for code coverage and mutation testing results.
//!
//! Reports are read into a [`model::Tree`] of modules, packages, files,
//! classes and methods. Trees of several reports are merged line by line,
//! compared with a baseline and filtered down to the lines touched by a
//! change set.
//!
//! # Supported Reports
//!
//! llvm-cov JSON export, Istanbul `coverage-final.json`, coverage.py JSON and
//! the mutation testing report schema.
//!
//! # Example
//!
//! ```no_run
//! use std::path::PathBuf;
//!
//! use covmodel::model::Metric;
//! use covmodel::reader::{read_all, ProcessingMode, ReportFilter, ReportLog};
//!
//! let mut log = ReportLog::new("coverage");
//! let tree = read_all(
//!     &[PathBuf::from("target/llvm-cov.json")],
//!     None,
//!     ProcessingMode::FailFast,
//!     &ReportFilter::default(),
//!     &mut log,
//! )
//! .unwrap();
//! if let Some(lines) = tree.value(tree.root(), Metric::Line) {
//!     println!("Line coverage: {lines}");
//! }
//! ```

pub mod changes;
pub mod cli;
pub mod config;
pub mod core;
pub mod model;
pub mod output;
pub mod reader;
pub mod report;
