//! Gemini adapter speaking the `generateContent` REST endpoint.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::analyzer::extract::outcome_from_text;
use crate::analyzer::prompt::PromptTemplate;
use crate::analyzer::{AnalysisFailure, AnalysisOutcome, DialogueAnalyzer};
use crate::config::AnalyzerConfig;

const TEMPERATURE: f32 = 0.7;
const MAX_OUTPUT_TOKENS: u32 = 1024;

/// Analyzer backed by Google's Gemini API.
#[derive(Debug)]
pub struct GeminiAnalyzer {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    template: PromptTemplate,
}

impl GeminiAnalyzer {
    pub fn new(config: &AnalyzerConfig, template: PromptTemplate) -> Result<Self> {
        let api_key = config
            .gemini_api_key
            .clone()
            .context("GOOGLE_API_KEY is not set")?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent("DAP-Analyzer/1.0")
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: config.gemini_base_url.trim_end_matches('/').to_string(),
            api_key,
            model: config.gemini_model.clone(),
            template,
        })
    }

    /// Sends one prompt and returns the raw text of the first candidate.
    async fn complete(&self, prompt: &str) -> Result<String> {
        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);
        let request = GenerateRequest {
            contents: vec![ContentPayload {
                parts: vec![Part { text: prompt }],
            }],
            generation_config: GenerationConfig {
                temperature: TEMPERATURE,
                max_output_tokens: MAX_OUTPUT_TOKENS,
            },
        };

        debug!(model = %self.model, "Sending Gemini generateContent request");

        let response = self
            .client
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&request)
            .send()
            .await
            .context("Gemini request failed to send")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Gemini returned {status}: {body}");
        }

        let payload: GenerateResponse = response
            .json()
            .await
            .context("Failed to decode Gemini response body")?;

        payload
            .candidates
            .and_then(|mut candidates| {
                if candidates.is_empty() {
                    None
                } else {
                    candidates.remove(0).content
                }
            })
            .and_then(|mut content| {
                if content.parts.is_empty() {
                    None
                } else {
                    Some(content.parts.remove(0).text)
                }
            })
            .context("Gemini response contained no candidate text")
    }
}

#[async_trait]
impl DialogueAnalyzer for GeminiAnalyzer {
    async fn analyze(&self, batch_text: &str) -> AnalysisOutcome {
        let prompt = self.template.render(batch_text);
        match self.complete(&prompt).await {
            Ok(text) => outcome_from_text(&text),
            Err(e) => {
                warn!(error = %e, "Gemini call failed");
                AnalysisOutcome::AnalysisError(AnalysisFailure::new(format!(
                    "Gemini request failed: {e:#}"
                )))
            }
        }
    }

    fn name(&self) -> &'static str {
        "gemini"
    }
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<ContentPayload<'a>>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct ContentPayload<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    temperature: f32,
    #[serde(rename = "maxOutputTokens")]
    max_output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    candidates: Option<Vec<Candidate>>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Provider;

    fn config_with_key(key: Option<&str>) -> AnalyzerConfig {
        let mut config = AnalyzerConfig::default();
        config.provider = Provider::Gemini;
        config.gemini_api_key = key.map(String::from);
        config
    }

    #[test]
    fn test_new_requires_api_key() {
        let template = PromptTemplate::from_text("analyze: {{TRANSACTION}}");
        let result = GeminiAnalyzer::new(&config_with_key(None), template);
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("GOOGLE_API_KEY"));
    }

    #[test]
    fn test_new_with_key_succeeds() {
        let template = PromptTemplate::from_text("analyze: {{TRANSACTION}}");
        let analyzer =
            GeminiAnalyzer::new(&config_with_key(Some("test-key")), template).unwrap();
        assert_eq!(analyzer.name(), "gemini");
        assert!(analyzer.base_url.ends_with("/v1beta"));
    }
}
