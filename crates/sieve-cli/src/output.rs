//! Output formatting for the CLI.

use crate::config::OutputFormat;
use crate::error::Result;
use colored::*;
use sieve_domain::{ChunkStatus, ExtractedPair, PipelineResult};
use tabled::{
    builder::Builder,
    settings::{object::Rows, Alignment, Modify, Style},
};

/// Widest question or answer cell in table output
const CELL_CHARS: usize = 60;

/// Output formatter.
pub struct Formatter {
    format: OutputFormat,
    color_enabled: bool,
}

impl Formatter {
    /// Create a new formatter.
    pub fn new(format: OutputFormat, color_enabled: bool) -> Self {
        Self {
            format,
            color_enabled,
        }
    }

    /// Format the result of an extraction run.
    pub fn format_result(&self, result: &PipelineResult) -> Result<String> {
        match self.format {
            OutputFormat::Json => self.format_result_json(result),
            OutputFormat::Table => Ok(self.format_result_table(result)),
            OutputFormat::Quiet => Ok(format_result_quiet(result)),
        }
    }

    fn format_result_json(&self, result: &PipelineResult) -> Result<String> {
        let pairs: Vec<serde_json::Value> = result.pairs.iter().map(pair_json).collect();
        let chunks: Vec<serde_json::Value> = result
            .chunk_reports
            .iter()
            .map(|report| {
                let (status, detail) = match &report.status {
                    ChunkStatus::Extracted { pairs } => ("extracted", serde_json::json!(pairs)),
                    ChunkStatus::Malformed => ("malformed", serde_json::Value::Null),
                    ChunkStatus::Failed { reason } => ("failed", serde_json::json!(reason)),
                };
                serde_json::json!({
                    "index": report.index,
                    "status": status,
                    "detail": detail,
                    "estimated_tokens": report.estimated_tokens,
                })
            })
            .collect();

        let output = serde_json::json!({
            "pairs": pairs,
            "degraded": result.degraded,
            "degraded_reason": result.degraded_reason.map(|r| r.as_str()),
            "chunk_count": result.chunk_count,
            "successful_chunks": result.successful_chunks(),
            "total_estimated_tokens": result.total_estimated_tokens,
            "processing_time_ms": result.processing_time_ms,
            "chunks": chunks,
        });
        Ok(serde_json::to_string_pretty(&output)?)
    }

    fn format_result_table(&self, result: &PipelineResult) -> String {
        let mut out = String::new();

        if result.pairs.is_empty() {
            out.push_str(&self.colorize("No Q&A pairs found.", "yellow"));
        } else {
            let mut builder = Builder::default();
            builder.push_record(["#", "Question", "Answer", "Confidence", "Quality", "Method", "Issue"]);
            for (i, pair) in result.pairs.iter().enumerate() {
                builder.push_record([
                    (i + 1).to_string(),
                    truncate(&pair.question, CELL_CHARS),
                    truncate(&pair.answer, CELL_CHARS),
                    format!("{:.2}", pair.confidence),
                    format!("{:.2}", pair.quality),
                    pair.extraction_method.to_string(),
                    pair.issue_type.clone().unwrap_or_else(|| "-".to_string()),
                ]);
            }

            let mut table = builder.build();
            table
                .with(Style::rounded())
                .with(Modify::new(Rows::first()).with(Alignment::center()));
            out.push_str(&table.to_string());
        }

        out.push('\n');
        out.push_str(&self.summary(result));
        out
    }

    /// One-line run summary.
    pub fn summary(&self, result: &PipelineResult) -> String {
        let line = format!(
            "{} pair(s), {}/{} chunk(s) succeeded, ~{} tokens, {}ms",
            result.pairs.len(),
            result.successful_chunks(),
            result.chunk_count,
            result.total_estimated_tokens,
            result.processing_time_ms
        );
        match result.degraded_reason {
            Some(reason) => self.warning(&format!("{} (degraded: {})", line, reason)),
            None => self.success(&line),
        }
    }

    /// Format a success message.
    pub fn success(&self, message: &str) -> String {
        self.colorize(&format!("✓ {}", message), "green")
    }

    /// Format an info message.
    pub fn info(&self, message: &str) -> String {
        self.colorize(&format!("ℹ {}", message), "blue")
    }

    /// Format a warning message.
    pub fn warning(&self, message: &str) -> String {
        self.colorize(&format!("⚠ {}", message), "yellow")
    }

    /// Colorize text if color is enabled.
    fn colorize(&self, text: &str, color: &str) -> String {
        if !self.color_enabled {
            return text.to_string();
        }

        match color {
            "green" => text.green().to_string(),
            "blue" => text.blue().to_string(),
            "yellow" => text.yellow().to_string(),
            _ => text.to_string(),
        }
    }
}

fn format_result_quiet(result: &PipelineResult) -> String {
    result
        .pairs
        .iter()
        .map(|p| p.question.replace('\n', " "))
        .collect::<Vec<_>>()
        .join("\n")
}

fn pair_json(pair: &ExtractedPair) -> serde_json::Value {
    serde_json::json!({
        "question": pair.question,
        "answer": pair.answer,
        "context_before": pair.context_before,
        "context_after": pair.context_after,
        "confidence": pair.confidence,
        "quality": pair.quality,
        "issue_type": pair.issue_type,
        "resolution_type": pair.resolution_type,
        "tags": pair.tags,
        "metadata": pair.metadata,
        "extraction_method": pair.extraction_method.as_str(),
    })
}

/// Shorten `text` to `max` characters on one line
fn truncate(text: &str, max: usize) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= max {
        return flat;
    }
    let cut: String = flat.chars().take(max.saturating_sub(1)).collect();
    format!("{}…", cut.trim_end())
}
