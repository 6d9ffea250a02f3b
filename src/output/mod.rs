//! Output formatters for coverage summaries.

use std::io::Write;

use colored::Colorize;
use serde::Serialize;

use crate::core::Result;
use crate::model::{Metric, ValueKind};
use crate::report::{
    ChangeSummary, DeltaSummary, MergeSummary, MetricDelta, MetricSummary, TreeSummary,
};

/// Coverage at or above this percentage is rendered green.
const HIGH_COVERAGE: f64 = 80.0;
/// Coverage below this percentage is rendered red.
const LOW_COVERAGE: f64 = 50.0;

/// Output format enum.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Format {
    #[default]
    Text,
    Json,
    Markdown,
}

/// A summary that can be rendered as text and Markdown.
pub trait Render: Serialize {
    fn render_text<W: Write>(&self, writer: &mut W, color: bool) -> Result<()>;

    fn render_markdown<W: Write>(&self, writer: &mut W) -> Result<()>;
}

impl Format {
    /// Writes the summary; `color` only affects text output.
    pub fn write<T: Render, W: Write>(&self, data: &T, writer: &mut W, color: bool) -> Result<()> {
        match self {
            Format::Json => {
                serde_json::to_writer_pretty(&mut *writer, data)?;
                writeln!(writer)?;
                Ok(())
            }
            Format::Markdown => data.render_markdown(writer),
            Format::Text => data.render_text(writer, color),
        }
    }
}

fn percent(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{v:.2}%"))
}

fn painted_percent(value: Option<f64>, color: bool) -> String {
    let text = percent(value);
    match value {
        Some(v) if color && v >= HIGH_COVERAGE => text.green().to_string(),
        Some(v) if color && v < LOW_COVERAGE => text.red().to_string(),
        Some(_) if color => text.yellow().to_string(),
        _ => text,
    }
}

fn signed(delta: &MetricDelta) -> String {
    if delta.metric.value_kind() == ValueKind::Coverage {
        format!("{:+.2}", delta.delta)
    } else {
        format!("{:+}", delta.delta)
    }
}

fn painted_delta(delta: &MetricDelta, color: bool) -> String {
    let text = signed(delta);
    if !color || delta.delta == 0.0 {
        text
    } else if delta.delta > 0.0 {
        text.green().to_string()
    } else {
        text.red().to_string()
    }
}

fn heading(text: &str, color: bool) -> String {
    if color {
        text.bold().to_string()
    } else {
        text.to_string()
    }
}

/// Describes a metric summary as `covered/total (percent)` or its plain value.
fn metric_cell(summary: &MetricSummary, color: bool) -> String {
    match (summary.covered, summary.missed) {
        (Some(covered), Some(missed)) => format!(
            "{}/{} ({})",
            covered,
            covered + missed,
            painted_percent(summary.percentage, color)
        ),
        _ => summary
            .value
            .map_or_else(|| "-".to_string(), format_number),
    }
}

fn format_number(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{value:.0}")
    } else {
        format!("{value:.2}")
    }
}

fn write_metrics_text<W: Write>(
    writer: &mut W,
    metrics: &[MetricSummary],
    indent: &str,
    color: bool,
) -> Result<()> {
    let width = metrics
        .iter()
        .map(|m| m.metric.display_name().len())
        .max()
        .unwrap_or_default();
    for summary in metrics {
        writeln!(
            writer,
            "{indent}{:<width$}  {}",
            summary.metric.display_name(),
            metric_cell(summary, color)
        )?;
    }
    Ok(())
}

fn write_metrics_markdown<W: Write>(writer: &mut W, metrics: &[MetricSummary]) -> Result<()> {
    if metrics.is_empty() {
        writeln!(writer, "_No coverage data_\n")?;
        return Ok(());
    }
    writeln!(writer, "| Metric | Covered | Missed | Coverage |")?;
    writeln!(writer, "| --- | ---: | ---: | ---: |")?;
    for summary in metrics {
        match (summary.covered, summary.missed) {
            (Some(covered), Some(missed)) => writeln!(
                writer,
                "| {} | {} | {} | {} |",
                summary.metric.display_name(),
                covered,
                missed,
                percent(summary.percentage)
            )?,
            _ => writeln!(
                writer,
                "| {} | - | - | {} |",
                summary.metric.display_name(),
                summary.value.map_or_else(|| "-".to_string(), format_number)
            )?,
        }
    }
    writeln!(writer)?;
    Ok(())
}

impl Render for TreeSummary {
    fn render_text<W: Write>(&self, writer: &mut W, color: bool) -> Result<()> {
        writeln!(writer, "{}", heading(&format!("Coverage of {}", self.name), color))?;
        write_metrics_text(writer, &self.metrics, "  ", color)?;

        if !self.files.is_empty() {
            writeln!(writer)?;
            writeln!(writer, "{}", heading("Files", color))?;
        }
        for file in &self.files {
            writeln!(
                writer,
                "  {}  line {}  branch {}",
                file.path,
                painted_percent(file.line, color),
                painted_percent(file.branch, color)
            )?;
            if file.mutation.is_some() {
                writeln!(
                    writer,
                    "    mutations {} ({} survived)",
                    painted_percent(file.mutation, color),
                    file.survived_mutations
                )?;
            }
            if !file.missed_lines.is_empty() {
                writeln!(writer, "    missed lines: {}", file.missed_lines.join(", "))?;
            }
        }

        if !self.errors.is_empty() {
            writeln!(writer)?;
            writeln!(writer, "{}", heading("Errors", color))?;
            for error in &self.errors {
                writeln!(writer, "  {error}")?;
            }
            if self.skipped_errors > 0 {
                writeln!(writer, "  ... {} more errors", self.skipped_errors)?;
            }
        }
        Ok(())
    }

    fn render_markdown<W: Write>(&self, writer: &mut W) -> Result<()> {
        writeln!(writer, "# Coverage of {}\n", self.name)?;
        write_metrics_markdown(writer, &self.metrics)?;

        if !self.files.is_empty() {
            writeln!(writer, "## Files\n")?;
            writeln!(writer, "| File | Line | Branch | Mutation | Missed lines |")?;
            writeln!(writer, "| --- | ---: | ---: | ---: | --- |")?;
            for file in &self.files {
                writeln!(
                    writer,
                    "| {} | {} | {} | {} | {} |",
                    file.path,
                    percent(file.line),
                    percent(file.branch),
                    percent(file.mutation),
                    file.missed_lines.join(", ")
                )?;
            }
            writeln!(writer)?;
        }

        if !self.errors.is_empty() {
            writeln!(writer, "## Errors\n")?;
            for error in &self.errors {
                writeln!(writer, "- {error}")?;
            }
            if self.skipped_errors > 0 {
                writeln!(writer, "- ... {} more errors", self.skipped_errors)?;
            }
            writeln!(writer)?;
        }
        Ok(())
    }
}

impl Render for MergeSummary {
    fn render_text<W: Write>(&self, writer: &mut W, color: bool) -> Result<()> {
        writeln!(writer, "{}", heading("Reports", color))?;
        for report in &self.reports {
            writeln!(
                writer,
                "  {}  {} files  line {}",
                report.path,
                report.files,
                painted_percent(report.line, color)
            )?;
        }
        writeln!(writer)?;
        self.merged.render_text(writer, color)
    }

    fn render_markdown<W: Write>(&self, writer: &mut W) -> Result<()> {
        writeln!(writer, "# Reports\n")?;
        writeln!(writer, "| Report | Files | Line |")?;
        writeln!(writer, "| --- | ---: | ---: |")?;
        for report in &self.reports {
            writeln!(
                writer,
                "| {} | {} | {} |",
                report.path,
                report.files,
                percent(report.line)
            )?;
        }
        writeln!(writer)?;
        self.merged.render_markdown(writer)
    }
}

impl Render for DeltaSummary {
    fn render_text<W: Write>(&self, writer: &mut W, color: bool) -> Result<()> {
        writeln!(writer, "{}", heading("Coverage delta", color))?;
        for delta in &self.metrics {
            writeln!(
                writer,
                "  {:<20} {:>10} -> {:<10} {}",
                delta.metric.display_name(),
                delta_cell(delta, delta.baseline),
                delta_cell(delta, delta.current),
                painted_delta(delta, color)
            )?;
        }
        for file in &self.files {
            let line = file.deltas.iter().find(|d| d.metric == Metric::Line);
            if let Some(line) = line.filter(|d| d.delta != 0.0) {
                writeln!(writer, "  {}  {}", file.path, painted_delta(line, color))?;
            }
        }
        Ok(())
    }

    fn render_markdown<W: Write>(&self, writer: &mut W) -> Result<()> {
        writeln!(writer, "# Coverage delta\n")?;
        writeln!(writer, "| Metric | Baseline | Current | Delta |")?;
        writeln!(writer, "| --- | ---: | ---: | ---: |")?;
        for delta in &self.metrics {
            writeln!(
                writer,
                "| {} | {} | {} | {} |",
                delta.metric.display_name(),
                delta_cell(delta, delta.baseline),
                delta_cell(delta, delta.current),
                signed(delta)
            )?;
        }
        writeln!(writer)?;
        Ok(())
    }
}

fn delta_cell(delta: &MetricDelta, value: Option<f64>) -> String {
    if delta.metric.value_kind() == ValueKind::Coverage {
        percent(value)
    } else {
        value.map_or_else(|| "-".to_string(), format_number)
    }
}

impl Render for ChangeSummary {
    fn render_text<W: Write>(&self, writer: &mut W, color: bool) -> Result<()> {
        writeln!(
            writer,
            "{}",
            heading(&format!("Changed files: {}", self.changed_files), color)
        )?;
        for view in &self.views {
            writeln!(writer)?;
            writeln!(writer, "{} ({} files)", heading(&view.strategy.to_string(), color), view.files.len())?;
            write_metrics_text(writer, &view.metrics, "  ", color)?;
        }
        Ok(())
    }

    fn render_markdown<W: Write>(&self, writer: &mut W) -> Result<()> {
        writeln!(writer, "# Change coverage\n")?;
        writeln!(writer, "**Changed files**: {}\n", self.changed_files)?;
        for view in &self.views {
            let title = view.strategy.to_string();
            let mut chars = title.chars();
            let title: String = match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => title,
            };
            writeln!(writer, "## {title}\n")?;
            write_metrics_markdown(writer, &view.metrics)?;
        }
        Ok(())
    }
}
