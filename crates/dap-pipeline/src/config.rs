//! Pipeline configuration
//!
//! Everything is driven by environment variables (a .env file is loaded by
//! the binary before this runs), with CLI flags layered on top by the caller.
//! Invalid numeric values fall back to the defaults; missing required values
//! are reported by validate() before any work is dispatched.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

// ============================================================================
// Defaults
// ============================================================================

/// Records per analysis batch
pub const DEFAULT_BATCH_SIZE: usize = 2;

/// Maximum batches in flight at once
pub const DEFAULT_CONCURRENCY: usize = 5;

/// Field that uniquely identifies a dialogue record
pub const DEFAULT_IDENTIFIER_FIELD: &str = "编号";

/// Columns requested from the source table
pub const DEFAULT_FIELD_NAMES: &[&str] = &["编号", "round5", "round10"];

/// Output fields coerced to integers before writing
pub const DEFAULT_INTEGER_FIELDS: &[&str] = &["编号"];

/// Local JSON Lines log of produced records
pub const DEFAULT_OUTPUT_PATH: &str = "analysis_results.jsonl";

/// Analysis prompt template file
pub const DEFAULT_PROMPT_PATH: &str = "system_prompt.txt";

/// Feishu open platform endpoint
pub const DEFAULT_BITABLE_BASE_URL: &str = "https://open.feishu.cn";

/// Records per page when listing a table
pub const DEFAULT_PAGE_SIZE: u32 = 100;

/// HTTP timeout for Bitable calls in seconds
pub const DEFAULT_BITABLE_TIMEOUT_SECS: u64 = 30;

/// HTTP timeout for LLM calls in seconds (models can be slow)
pub const DEFAULT_LLM_TIMEOUT_SECS: u64 = 120;

/// Default Gemini endpoint and model
pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.5-pro-preview-03-25";

/// Default DeepSeek endpoint and model (OpenAI-compatible API)
pub const DEFAULT_DEEPSEEK_BASE_URL: &str = "https://api.deepseek.com/v1";
pub const DEFAULT_DEEPSEEK_MODEL: &str = "deepseek-chat";

// ============================================================================
// Provider Selection
// ============================================================================

/// LLM provider used for dialogue analysis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// Google Gemini (generateContent API)
    #[default]
    Gemini,
    /// DeepSeek (OpenAI-compatible chat completions API)
    DeepSeek,
}

impl std::str::FromStr for Provider {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "gemini" => Ok(Provider::Gemini),
            "deepseek" => Ok(Provider::DeepSeek),
            _ => Err(anyhow::anyhow!(
                "Invalid provider: {} (expected 'gemini' or 'deepseek')",
                s
            )),
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Provider::Gemini => write!(f, "gemini"),
            Provider::DeepSeek => write!(f, "deepseek"),
        }
    }
}

// ============================================================================
// Configuration Sections
// ============================================================================

/// Connection settings for the Bitable store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BitableConfig {
    /// Base URL of the open platform API
    pub base_url: String,

    /// App ID for dynamic token acquisition
    pub app_id: Option<String>,

    /// App secret for dynamic token acquisition
    pub app_secret: Option<String>,

    /// Static bearer token, used when app id/secret are not configured
    pub bearer_token: Option<String>,

    /// Bitable app token (identifies the base)
    pub app_token: String,

    /// Table read from
    pub table_id: String,

    /// Table written to (defaults to `table_id`)
    pub write_table_id: Option<String>,

    /// View scoping the read
    pub view_id: Option<String>,

    /// Page size for record listing
    pub page_size: u32,

    /// HTTP timeout in seconds
    pub timeout_secs: u64,
}

impl Default for BitableConfig {
    fn default() -> Self {
        BitableConfig {
            base_url: DEFAULT_BITABLE_BASE_URL.to_string(),
            app_id: None,
            app_secret: None,
            bearer_token: None,
            app_token: String::new(),
            table_id: String::new(),
            write_table_id: None,
            view_id: None,
            page_size: DEFAULT_PAGE_SIZE,
            timeout_secs: DEFAULT_BITABLE_TIMEOUT_SECS,
        }
    }
}

impl BitableConfig {
    /// Table id used for writes
    pub fn write_table(&self) -> &str {
        self.write_table_id.as_deref().unwrap_or(&self.table_id)
    }

    /// Load from environment variables
    pub fn from_env() -> Self {
        BitableConfig {
            base_url: std::env::var("FEISHU_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_BITABLE_BASE_URL.to_string()),
            // An exported-but-blank variable must not mask the fallback chain.
            app_id: non_empty_var("FEISHU_APP_ID"),
            app_secret: non_empty_var("FEISHU_APP_SECRET"),
            bearer_token: non_empty_var("FEISHU_BEARER_TOKEN"),
            app_token: std::env::var("FEISHU_APP_TOKEN").unwrap_or_default(),
            table_id: std::env::var("FEISHU_TABLE_ID").unwrap_or_default(),
            write_table_id: non_empty_var("FEISHU_WRITE_TABLE_ID"),
            view_id: non_empty_var("FEISHU_VIEW_ID"),
            page_size: std::env::var("FEISHU_PAGE_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_PAGE_SIZE),
            timeout_secs: std::env::var("FEISHU_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_BITABLE_TIMEOUT_SECS),
        }
    }
}

/// Settings for the analysis provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzerConfig {
    /// Which provider to use
    pub provider: Provider,

    /// Google API key (Gemini)
    pub gemini_api_key: Option<String>,

    /// Gemini model name
    pub gemini_model: String,

    /// Gemini API base URL
    pub gemini_base_url: String,

    /// DeepSeek API key
    pub deepseek_api_key: Option<String>,

    /// DeepSeek model name
    pub deepseek_model: String,

    /// DeepSeek API base URL
    pub deepseek_base_url: String,

    /// HTTP timeout in seconds
    pub timeout_secs: u64,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        AnalyzerConfig {
            provider: Provider::default(),
            gemini_api_key: None,
            gemini_model: DEFAULT_GEMINI_MODEL.to_string(),
            gemini_base_url: DEFAULT_GEMINI_BASE_URL.to_string(),
            deepseek_api_key: None,
            deepseek_model: DEFAULT_DEEPSEEK_MODEL.to_string(),
            deepseek_base_url: DEFAULT_DEEPSEEK_BASE_URL.to_string(),
            timeout_secs: DEFAULT_LLM_TIMEOUT_SECS,
        }
    }
}

impl AnalyzerConfig {
    /// Load from environment variables
    pub fn from_env() -> Self {
        AnalyzerConfig {
            provider: std::env::var("DAP_PROVIDER")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or_default(),
            gemini_api_key: std::env::var("GOOGLE_API_KEY").ok(),
            gemini_model: std::env::var("GEMINI_MODEL")
                .unwrap_or_else(|_| DEFAULT_GEMINI_MODEL.to_string()),
            gemini_base_url: std::env::var("GEMINI_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_GEMINI_BASE_URL.to_string()),
            deepseek_api_key: std::env::var("DEEPSEEK_API_KEY").ok(),
            deepseek_model: std::env::var("DEEPSEEK_MODEL")
                .unwrap_or_else(|_| DEFAULT_DEEPSEEK_MODEL.to_string()),
            deepseek_base_url: std::env::var("DEEPSEEK_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_DEEPSEEK_BASE_URL.to_string()),
            timeout_secs: std::env::var("LLM_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_LLM_TIMEOUT_SECS),
        }
    }
}

/// Batching and output settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Records per batch
    pub batch_size: usize,

    /// Batches in flight at once
    pub concurrency: usize,

    /// Field used for deduplication
    pub identifier_field: String,

    /// Columns requested from the source table
    pub field_names: Vec<String>,

    /// Output fields coerced to integers
    pub integer_fields: Vec<String>,

    /// Path of the local JSON Lines record log
    pub output_path: PathBuf,

    /// Path of the prompt template file
    pub prompt_path: PathBuf,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            batch_size: DEFAULT_BATCH_SIZE,
            concurrency: DEFAULT_CONCURRENCY,
            identifier_field: DEFAULT_IDENTIFIER_FIELD.to_string(),
            field_names: DEFAULT_FIELD_NAMES.iter().map(|s| s.to_string()).collect(),
            integer_fields: DEFAULT_INTEGER_FIELDS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            output_path: PathBuf::from(DEFAULT_OUTPUT_PATH),
            prompt_path: PathBuf::from(DEFAULT_PROMPT_PATH),
        }
    }
}

impl PipelineConfig {
    /// Load from environment variables
    pub fn from_env() -> Self {
        let defaults = PipelineConfig::default();

        PipelineConfig {
            batch_size: std::env::var("DAP_BATCH_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_BATCH_SIZE),
            concurrency: std::env::var("DAP_CONCURRENCY")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_CONCURRENCY),
            identifier_field: std::env::var("DAP_IDENTIFIER_FIELD")
                .unwrap_or_else(|_| DEFAULT_IDENTIFIER_FIELD.to_string()),
            field_names: std::env::var("DAP_FIELD_NAMES")
                .ok()
                .map(|s| parse_field_list(&s))
                .unwrap_or(defaults.field_names),
            integer_fields: std::env::var("DAP_INTEGER_FIELDS")
                .ok()
                .map(|s| parse_field_list(&s))
                .unwrap_or(defaults.integer_fields),
            output_path: std::env::var("DAP_OUTPUT_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.output_path),
            prompt_path: std::env::var("DAP_PROMPT_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.prompt_path),
        }
    }
}

/// Read an environment variable, treating a blank value as unset
fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.is_empty())
}

/// Split a comma-separated field list, dropping empty segments
fn parse_field_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}

// ============================================================================
// Application Configuration
// ============================================================================

/// Full configuration for one pipeline run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    pub bitable: BitableConfig,
    pub analyzer: AnalyzerConfig,
    pub pipeline: PipelineConfig,
}

impl AppConfig {
    /// Load all sections from environment variables
    pub fn from_env() -> Self {
        AppConfig {
            bitable: BitableConfig::from_env(),
            analyzer: AnalyzerConfig::from_env(),
            pipeline: PipelineConfig::from_env(),
        }
    }

    /// Validate the Bitable section (enough for fetch-only operation)
    pub fn validate_bitable(&self) -> std::result::Result<(), String> {
        if self.bitable.base_url.is_empty() {
            return Err("Bitable base URL cannot be empty".to_string());
        }

        if self.bitable.app_token.is_empty() {
            return Err("FEISHU_APP_TOKEN is required".to_string());
        }

        if self.bitable.table_id.is_empty() {
            return Err("FEISHU_TABLE_ID is required".to_string());
        }

        let has_app_credentials =
            self.bitable.app_id.is_some() && self.bitable.app_secret.is_some();
        if !has_app_credentials && self.bitable.bearer_token.is_none() {
            return Err(
                "Set FEISHU_APP_ID and FEISHU_APP_SECRET, or FEISHU_BEARER_TOKEN".to_string(),
            );
        }

        if self.bitable.page_size == 0 {
            return Err("Page size must be greater than 0".to_string());
        }

        if self.bitable.timeout_secs == 0 {
            return Err("Bitable timeout must be greater than 0".to_string());
        }

        Ok(())
    }

    /// Validate everything needed for a full pipeline run
    pub fn validate(&self) -> std::result::Result<(), String> {
        self.validate_bitable()?;

        if self.pipeline.batch_size == 0 {
            return Err("Batch size must be greater than 0".to_string());
        }

        if self.pipeline.concurrency == 0 {
            return Err("Concurrency must be greater than 0".to_string());
        }

        if self.pipeline.identifier_field.is_empty() {
            return Err("Identifier field cannot be empty".to_string());
        }

        match self.analyzer.provider {
            Provider::Gemini if self.analyzer.gemini_api_key.is_none() => {
                return Err("GOOGLE_API_KEY is required for the gemini provider".to_string());
            },
            Provider::DeepSeek if self.analyzer.deepseek_api_key.is_none() => {
                return Err("DEEPSEEK_API_KEY is required for the deepseek provider".to_string());
            },
            _ => {},
        }

        if self.analyzer.timeout_secs == 0 {
            return Err("LLM timeout must be greater than 0".to_string());
        }

        Ok(())
    }
}

// ============================================================================
// Preset Configurations
// ============================================================================

impl AppConfig {
    /// Configuration for tests: static token, small batches
    pub fn test_config() -> Self {
        AppConfig {
            bitable: BitableConfig {
                bearer_token: Some("test-token".to_string()),
                app_token: "bascnTest00000000".to_string(),
                table_id: "tblTest0000".to_string(),
                ..BitableConfig::default()
            },
            analyzer: AnalyzerConfig {
                provider: Provider::DeepSeek,
                deepseek_api_key: Some("test-key".to_string()),
                ..AnalyzerConfig::default()
            },
            pipeline: PipelineConfig {
                batch_size: 2,
                concurrency: 2,
                ..PipelineConfig::default()
            },
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
