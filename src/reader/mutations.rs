//! Reader for the mutation testing report schema used by Stryker and
//! compatible mutation testing tools.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use serde::Deserialize;
use tracing::debug;

use super::{new_report_tree, ProcessingMode, ReportLog, ReportReader};
use crate::core::{Error, Result};
use crate::model::{MutationBuilder, MutationStatus, NodeId, Tree};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Report {
    files: BTreeMap<String, FileResult>,
    #[serde(default)]
    test_files: BTreeMap<String, TestFile>,
}

#[derive(Debug, Deserialize)]
struct FileResult {
    #[serde(default)]
    mutants: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Mutant {
    id: serde_json::Value,
    mutator_name: String,
    #[serde(default)]
    replacement: Option<String>,
    #[serde(default)]
    description: Option<String>,
    location: Location,
    status: String,
    #[serde(default)]
    killed_by: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct Location {
    start: Position,
}

#[derive(Debug, Deserialize)]
struct Position {
    line: u32,
}

#[derive(Debug, Default, Deserialize)]
struct TestFile {
    #[serde(default)]
    tests: Vec<TestDefinition>,
}

#[derive(Debug, Deserialize)]
struct TestDefinition {
    id: String,
    name: String,
}

/// Maps a schema status to a mutation status; `None` for mutants that
/// have not been tested.
fn parse_status(status: &str) -> Result<Option<MutationStatus>> {
    let status = match status {
        "Killed" => MutationStatus::Killed,
        "Survived" => MutationStatus::Survived,
        "NoCoverage" => MutationStatus::NoCoverage,
        "Timeout" => MutationStatus::TimedOut,
        "CompileError" => MutationStatus::NonViable,
        "RuntimeError" => MutationStatus::RunError,
        "Ignored" | "Pending" => return Ok(None),
        other => return Err(Error::invalid_value(format!("Unknown mutant status: {other}"))),
    };
    Ok(Some(status))
}

/// Reads mutation testing results into mutations on file nodes.
#[derive(Debug, Clone, Copy, Default)]
pub struct MutationReportReader {
    mode: ProcessingMode,
}

impl MutationReportReader {
    pub fn new(mode: ProcessingMode) -> Self {
        Self { mode }
    }

    fn read_mutant(
        &self,
        tree: &mut Tree,
        path: &str,
        mutant: Mutant,
        tests: &BTreeMap<&str, &str>,
    ) -> Result<Option<NodeId>> {
        let Some(status) = parse_status(&mutant.status)? else {
            debug!(file = path, id = %mutant.id, "Skipping untested mutant");
            return Ok(None);
        };
        let description = mutant
            .description
            .or(mutant.replacement)
            .unwrap_or_default();

        let mut builder = MutationBuilder::new()
            .with_file(path)
            .with_line(mutant.location.start.line)
            .with_mutator(mutant.mutator_name)
            .with_description(description)
            .with_status(status);
        if let Some(test) = mutant.killed_by.first() {
            let name = tests.get(test.as_str()).copied().unwrap_or(test.as_str());
            builder = builder.with_killing_test(name);
        }
        builder.build_and_add_to(tree).map(Some)
    }
}

impl ReportReader for MutationReportReader {
    fn name(&self) -> &'static str {
        "mutations"
    }

    fn mode(&self) -> ProcessingMode {
        self.mode
    }

    fn read_str(&self, content: &str, source: &Path, log: &mut ReportLog) -> Result<Tree> {
        let report: Report =
            serde_json::from_str(content).map_err(|e| Error::parse(source, e.to_string()))?;
        let tests: BTreeMap<&str, &str> = report
            .test_files
            .values()
            .flat_map(|file| &file.tests)
            .map(|test| (test.id.as_str(), test.name.as_str()))
            .collect();

        let mut tree = new_report_tree();
        let mut touched = BTreeSet::new();
        for (path, file) in &report.files {
            for mutant in &file.mutants {
                let result = serde_json::from_value::<Mutant>(mutant.clone())
                    .map_err(|e| Error::parse(source, format!("malformed mutant in {path}: {e}")))
                    .and_then(|mutant| self.read_mutant(&mut tree, path, mutant, &tests));
                match result {
                    Ok(file) => touched.extend(file),
                    Err(error) => self.handle_record_error(error, log)?,
                }
            }
        }
        for file in touched {
            tree.summarize_file(file)?;
        }
        Ok(tree)
    }
}
