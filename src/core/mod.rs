//! Core types shared by all modules.

mod error;

pub use error::{Error, Result};
