//! Dialogue analysis boundary
//!
//! Provider adapters absorb every transport and parse failure: callers only
//! ever see an AnalysisOutcome, never an Err. The outcome is decided exactly
//! once, here, and downstream stages branch on the variant.

use async_trait::async_trait;
use serde_json::Value;

use crate::models::{Batch, FieldMap};

pub mod deepseek;
pub mod extract;
pub mod gemini;
pub mod prompt;

// Re-export main types
pub use deepseek::DeepSeekAnalyzer;
pub use gemini::GeminiAnalyzer;
pub use prompt::PromptTemplate;

/// What the model produced for one batch
#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisOutcome {
    /// A JSON array of result objects
    RecordList(Vec<Value>),
    /// A single JSON object
    SingleRecord(FieldMap),
    /// An explicit empty result set
    EmptyResult,
    /// Anything that prevented a usable result
    AnalysisError(AnalysisFailure),
}

impl AnalysisOutcome {
    pub fn is_error(&self) -> bool {
        matches!(self, AnalysisOutcome::AnalysisError(_))
    }
}

/// Details of a failed analysis
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisFailure {
    /// Human-readable reason
    pub message: String,
    /// Raw model text, when there was one to keep
    pub raw_response: Option<String>,
}

impl AnalysisFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            raw_response: None,
        }
    }

    pub fn with_raw(message: impl Into<String>, raw: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            raw_response: Some(raw.into()),
        }
    }
}

/// Analyzer for one batch of dialogue records
///
/// Implementations must not panic and must not leak errors; anything that
/// goes wrong becomes `AnalysisOutcome::AnalysisError`.
#[async_trait]
pub trait DialogueAnalyzer: Send + Sync {
    /// Analyze one serialized batch
    ///
    /// # Arguments
    /// * `batch_text` - JSON array of the batch records' field maps
    async fn analyze(&self, batch_text: &str) -> AnalysisOutcome;

    /// Provider name for logging
    fn name(&self) -> &'static str;
}

/// Serialize a batch for the prompt: a pretty-printed JSON array of the
/// records' field maps, in table order.
pub fn batch_to_prompt_text(batch: &Batch) -> Result<String, serde_json::Error> {
    let maps: Vec<&FieldMap> = batch.records.iter().map(|r| &r.fields).collect();
    serde_json::to_string_pretty(&maps)
}
