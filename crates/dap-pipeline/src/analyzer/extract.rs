//! Model response extraction
//!
//! LLM output is rarely a clean JSON document. The extraction order is fixed:
//! a json-fenced code block first, then the outermost bracketed span, then
//! the trimmed raw text as a last chance. The parsed value is classified by
//! shape; anything unparseable becomes an AnalysisError carrying the raw text.

use regex::Regex;
use serde_json::Value;
use tracing::debug;

use super::{AnalysisFailure, AnalysisOutcome};

/// Turn raw model text into an outcome.
pub fn outcome_from_text(raw: &str) -> AnalysisOutcome {
    match candidate_json(raw) {
        Ok(candidate) => classify(&candidate, raw),
        Err(e) => AnalysisOutcome::AnalysisError(AnalysisFailure::with_raw(
            format!("Response extraction failed: {}", e),
            raw,
        )),
    }
}

/// Pick the most likely JSON payload out of the raw text.
fn candidate_json(raw: &str) -> Result<String, regex::Error> {
    let fenced = Regex::new(r"```json\s*([\s\S]*?)\s*```")?;
    if let Some(captures) = fenced.captures(raw) {
        if let Some(block) = captures.get(1) {
            debug!("Extracted fenced JSON block from response");
            return Ok(block.as_str().trim().to_string());
        }
    }

    let trimmed = raw.trim();

    // Outermost array span, for responses with prose around the payload
    if let (Some(start), Some(end)) = (trimmed.find('['), trimmed.rfind(']')) {
        if end > start {
            debug!("Extracted bracketed array span from response");
            return Ok(trimmed[start..=end].to_string());
        }
    }

    Ok(trimmed.to_string())
}

/// Classify a parsed payload by shape.
fn classify(candidate: &str, raw: &str) -> AnalysisOutcome {
    let value: Value = match serde_json::from_str(candidate) {
        Ok(value) => value,
        Err(e) => {
            return AnalysisOutcome::AnalysisError(AnalysisFailure::with_raw(
                format!("Failed to parse JSON response: {}", e),
                raw,
            ));
        },
    };

    match value {
        Value::Array(items) if items.is_empty() => AnalysisOutcome::EmptyResult,
        Value::Array(items) => AnalysisOutcome::RecordList(items),
        Value::Object(fields) => AnalysisOutcome::SingleRecord(fields),
        other => AnalysisOutcome::AnalysisError(AnalysisFailure::with_raw(
            format!("Response is not a JSON array or object (got {})", json_kind(&other)),
            raw,
        )),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
