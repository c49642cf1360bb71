//! Prompt template loading and rendering

use std::path::Path;
use tracing::warn;

use dap_common::{DapError, Result};

/// Placeholder replaced with the serialized batch
pub const TRANSACTION_PLACEHOLDER: &str = "{{TRANSACTION}}";

/// The analysis prompt, loaded once per run
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    template: String,
}

impl PromptTemplate {
    /// Load the template from a file.
    ///
    /// A missing or empty file is a configuration error; the pipeline refuses
    /// to start without a usable prompt.
    pub fn load(path: &Path) -> Result<Self> {
        let template = std::fs::read_to_string(path).map_err(|e| {
            DapError::Prompt(format!(
                "Cannot read prompt template '{}': {}",
                path.display(),
                e
            ))
        })?;

        if template.trim().is_empty() {
            return Err(DapError::Prompt(format!(
                "Prompt template '{}' is empty",
                path.display()
            )));
        }

        if !template.contains(TRANSACTION_PLACEHOLDER) {
            warn!(
                path = %path.display(),
                placeholder = TRANSACTION_PLACEHOLDER,
                "Prompt template has no transaction placeholder; batches will not be injected"
            );
        }

        Ok(Self { template })
    }

    /// Build a template from a literal string.
    pub fn from_text(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
        }
    }

    /// Render the template for one batch.
    pub fn render(&self, batch_text: &str) -> String {
        self.template.replace(TRANSACTION_PLACEHOLDER, batch_text)
    }
}
