//! Mutation-testing results.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::node::NodeId;
use super::tree::Tree;
use crate::core::{Error, Result};

/// Outcome of a single mutation trial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MutationStatus {
    /// A test failed, the mutant was detected.
    Killed,
    /// All tests passed, the mutant was not detected.
    Survived,
    /// No test covers the mutated line.
    NoCoverage,
    TimedOut,
    /// The mutant did not compile or load.
    NonViable,
    MemoryError,
    RunError,
}

impl MutationStatus {
    /// Returns true if the mutant has been detected by the test suite.
    pub fn is_detected(self) -> bool {
        !matches!(self, Self::Survived | Self::NoCoverage)
    }
}

impl fmt::Display for MutationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Killed => "KILLED",
            Self::Survived => "SURVIVED",
            Self::NoCoverage => "NO_COVERAGE",
            Self::TimedOut => "TIMED_OUT",
            Self::NonViable => "NON_VIABLE",
            Self::MemoryError => "MEMORY_ERROR",
            Self::RunError => "RUN_ERROR",
        };
        f.write_str(name)
    }
}

impl FromStr for MutationStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let normalized: String = s
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_ascii_uppercase();
        match normalized.as_str() {
            "KILLED" => Ok(Self::Killed),
            "SURVIVED" => Ok(Self::Survived),
            "NOCOVERAGE" => Ok(Self::NoCoverage),
            "TIMEDOUT" | "TIMEOUT" => Ok(Self::TimedOut),
            "NONVIABLE" => Ok(Self::NonViable),
            "MEMORYERROR" => Ok(Self::MemoryError),
            "RUNERROR" => Ok(Self::RunError),
            _ => Err(Error::invalid_value(format!("Unknown mutation status: {s}"))),
        }
    }
}

/// A single mutation-testing result.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Mutation {
    pub line: u32,
    /// Fully qualified name of the mutated class.
    pub mutated_class: String,
    pub method: String,
    /// Name of the mutation operator.
    pub mutator: String,
    pub description: String,
    pub status: MutationStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub killing_test: Option<String>,
}

impl Mutation {
    /// Returns true if the mutation has been detected, derived from the status.
    pub fn is_detected(&self) -> bool {
        self.status.is_detected()
    }

    pub fn has_survived(&self) -> bool {
        self.status == MutationStatus::Survived
    }

    pub fn is_killed(&self) -> bool {
        self.status == MutationStatus::Killed
    }
}

/// Collects the attributes of a mutation while a report record is parsed.
#[derive(Debug, Default, Clone)]
pub struct MutationBuilder {
    file: Option<String>,
    line: Option<u32>,
    mutated_class: Option<String>,
    method: Option<String>,
    mutator: Option<String>,
    description: Option<String>,
    status: Option<MutationStatus>,
    killing_test: Option<String>,
}

impl MutationBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Path of the source file that contains the mutation.
    pub fn with_file(mut self, file: impl Into<String>) -> Self {
        self.file = Some(file.into());
        self
    }

    pub fn with_line(mut self, line: u32) -> Self {
        self.line = Some(line);
        self
    }

    pub fn with_mutated_class(mut self, class: impl Into<String>) -> Self {
        self.mutated_class = Some(class.into());
        self
    }

    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }

    pub fn with_mutator(mut self, mutator: impl Into<String>) -> Self {
        self.mutator = Some(mutator.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_status(mut self, status: MutationStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_killing_test(mut self, test: impl Into<String>) -> Self {
        self.killing_test = Some(test.into());
        self
    }

    /// Builds the mutation, failing if the line or status is missing.
    pub fn build(&self) -> Result<Mutation> {
        let line = self.line.ok_or_else(|| self.missing("line"))?;
        let status = self.status.ok_or_else(|| self.missing("status"))?;
        Ok(Mutation {
            line,
            mutated_class: self.mutated_class.clone().unwrap_or_default(),
            method: self.method.clone().unwrap_or_default(),
            mutator: self.mutator.clone().unwrap_or_default(),
            description: self.description.clone().unwrap_or_default(),
            status,
            killing_test: self.killing_test.clone(),
        })
    }

    /// Builds the mutation and attaches it to its file in the tree.
    ///
    /// The file node (and its package) is created when missing, as is a class
    /// node for the mutated class. Returns the id of the file node, whose
    /// values still need a [`Tree::summarize_file`].
    pub fn build_and_add_to(&self, tree: &mut Tree) -> Result<NodeId> {
        let path = self.file.as_deref().ok_or_else(|| self.missing("file"))?;
        let mutation = self.build()?;
        let file = tree.find_or_create_file(path)?;
        if !mutation.mutated_class.is_empty() {
            tree.find_or_create_class(file, &mutation.mutated_class)?;
        }
        tree.add_mutation(file, mutation)?;
        Ok(file)
    }

    fn missing(&self, attribute: &str) -> Error {
        Error::MissingAttribute {
            attribute: attribute.to_string(),
            context: format!(
                "mutation in {}",
                self.file.as_deref().unwrap_or("<unknown file>")
            ),
        }
    }
}
