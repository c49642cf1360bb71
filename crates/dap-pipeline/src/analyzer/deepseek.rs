//! DeepSeek adapter speaking the OpenAI-compatible chat completions endpoint.

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
const MAX_TOKENS: u32 = 2048;

/// Fixed user turn; the full instructions live in the rendered system prompt.
const USER_INSTRUCTION: &str = "请根据系统提示中的信息进行分析并按要求格式输出。";

/// Analyzer backed by DeepSeek's chat API.
#[derive(Debug)]
pub struct DeepSeekAnalyzer {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    template: PromptTemplate,
}

impl DeepSeekAnalyzer {
    pub fn new(config: &AnalyzerConfig, template: PromptTemplate) -> Result<Self> {
        let api_key = config
            .deepseek_api_key
            .clone()
            .context("DEEPSEEK_API_KEY is not set")?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent("DAP-Analyzer/1.0")
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: config.deepseek_base_url.trim_end_matches('/').to_string(),
            api_key,
            model: config.deepseek_model.clone(),
            template,
        })
    }

    /// Sends one chat completion and returns the assistant message text.
    async fn complete(&self, prompt: &str) -> Result<String> {
        let url = format!("{}/chat/completions", self.base_url);
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: prompt,
                },
                ChatMessage {
                    role: "user",
                    content: USER_INSTRUCTION,
                },
            ],
            temperature: TEMPERATURE,
            max_tokens: MAX_TOKENS,
            stream: false,
        };

        debug!(model = %self.model, "Sending DeepSeek chat completion request");

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .context("DeepSeek request failed to send")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("DeepSeek returned {status}: {body}");
        }

        let payload: ChatResponse = response
            .json()
            .await
            .context("Failed to decode DeepSeek response body")?;

        payload
            .choices
            .and_then(|mut choices| {
                if choices.is_empty() {
                    None
                } else {
                    choices.remove(0).message
                }
            })
            .and_then(|message| message.content)
            .context("DeepSeek response contained no message content")
    }
}

#[async_trait]
impl DialogueAnalyzer for DeepSeekAnalyzer {
    async fn analyze(&self, batch_text: &str) -> AnalysisOutcome {
        let prompt = self.template.render(batch_text);
        match self.complete(&prompt).await {
            Ok(text) => outcome_from_text(&text),
            Err(e) => {
                warn!(error = %e, "DeepSeek call failed");
                AnalysisOutcome::AnalysisError(AnalysisFailure::new(format!(
                    "DeepSeek request failed: {e:#}"
                )))
            }
        }
    }

    fn name(&self) -> &'static str {
        "deepseek"
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Option<Vec<Choice>>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Option<ResponseMessage>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Provider;

    fn config_with_key(key: Option<&str>) -> AnalyzerConfig {
        let mut config = AnalyzerConfig::default();
        config.provider = Provider::DeepSeek;
        config.deepseek_api_key = key.map(String::from);
        config
    }

    #[test]
    fn test_new_requires_api_key() {
        let template = PromptTemplate::from_text("analyze: {{TRANSACTION}}");
        let result = DeepSeekAnalyzer::new(&config_with_key(None), template);
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("DEEPSEEK_API_KEY"));
    }

    #[test]
    fn test_new_with_key_succeeds() {
        let template = PromptTemplate::from_text("analyze: {{TRANSACTION}}");
        let analyzer =
            DeepSeekAnalyzer::new(&config_with_key(Some("test-key")), template).unwrap();
        assert_eq!(analyzer.name(), "deepseek");
        assert!(analyzer.base_url.ends_with("/v1"));
    }
}
