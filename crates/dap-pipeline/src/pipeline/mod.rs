//! Batch-parallel analysis pipeline.
//!
//! [`AnalysisPipeline::run`] drives one full pass: fetch, dedup, partition,
//! dispatch, aggregate. Batches run independently under a concurrency bound;
//! one failed batch never stops the others.

pub mod normalizer;
pub mod orchestrator;
pub mod sink;

pub use orchestrator::{dispatch_batches, BatchContext};
pub use sink::RecordLog;

use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::analyzer::{DeepSeekAnalyzer, DialogueAnalyzer, GeminiAnalyzer, PromptTemplate};
use crate::bitable::{BitableClient, BitableSource};
use crate::config::{AppConfig, Provider};
use crate::models::{dedup_records, partition_batches, InputRecord, OutputRecord};

/// Source of input records.
#[async_trait]
pub trait RecordSource: Send + Sync {
    /// Fetches the full input set for one run.
    async fn fetch(&self) -> Result<Vec<InputRecord>>;
}

/// Destination for analyzed records.
#[async_trait]
pub trait RecordSink: Send + Sync {
    /// Writes one batch of analyzed records.
    async fn write(&self, records: &[OutputRecord], credential: &str) -> Result<()>;
}

/// Summary of one pipeline run.
#[derive(Debug, Clone, Serialize)]
pub struct RunStats {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub fetched_records: usize,
    pub unique_records: usize,
    pub total_batches: usize,
    pub successful_batches: usize,
    pub failed_batches: usize,
    pub duration_seconds: f64,
}

impl RunStats {
    /// True when every dispatched batch completed its full chain.
    pub fn is_success(&self) -> bool {
        self.failed_batches == 0
    }

    pub fn summary(&self) -> String {
        format!(
            "Processed {} batches ({} successful, {} failed) from {} records in {:.2}s",
            self.total_batches,
            self.successful_batches,
            self.failed_batches,
            self.unique_records,
            self.duration_seconds
        )
    }
}

/// One-shot analysis pipeline over a configured record source and sink.
pub struct AnalysisPipeline {
    config: AppConfig,
}

impl AnalysisPipeline {
    pub fn new(config: AppConfig) -> Self {
        Self { config }
    }

    /// Runs the pipeline once and returns aggregate statistics.
    ///
    /// Configuration, prompt, credential, and analyzer problems are fatal
    /// and surface before any batch is dispatched. A failed fetch is not:
    /// the run degrades to an empty record set and ends cleanly.
    pub async fn run(&self) -> Result<RunStats> {
        let started_at = Utc::now();
        let started = Instant::now();
        let run_id = Uuid::new_v4();

        self.config.validate().map_err(anyhow::Error::msg)?;

        info!(
            run_id = %run_id,
            provider = %self.config.analyzer.provider,
            batch_size = self.config.pipeline.batch_size,
            concurrency = self.config.pipeline.concurrency,
            "Starting analysis pipeline"
        );

        info!("Phase 1: Loading prompt template and opening the record log");
        let template = PromptTemplate::load(&self.config.pipeline.prompt_path)?;
        let log = RecordLog::create(&self.config.pipeline.output_path).with_context(|| {
            format!(
                "Failed to open record log at {}",
                self.config.pipeline.output_path.display()
            )
        })?;

        info!("Phase 2: Resolving credentials and building the analyzer");
        let client = Arc::new(BitableClient::new(self.config.bitable.clone())?);
        let credential = client
            .resolve_credential()
            .await
            .context("Failed to resolve a Bitable credential")?;
        let analyzer = build_analyzer(&self.config, template)?;

        info!("Phase 3: Fetching input records");
        let source = BitableSource::new(
            Arc::clone(&client),
            credential.clone(),
            self.config.pipeline.field_names.clone(),
        );
        let fetched = match source.fetch().await {
            Ok(records) => records,
            Err(e) => {
                warn!(error = %e, "Fetch failed; continuing with an empty record set");
                Vec::new()
            }
        };
        let fetched_records = fetched.len();
        let records = dedup_records(fetched, &self.config.pipeline.identifier_field);
        let unique_records = records.len();
        info!(
            fetched = fetched_records,
            unique = unique_records,
            dropped = fetched_records - unique_records,
            "Deduplication complete"
        );

        let batches = partition_batches(records, self.config.pipeline.batch_size);
        let total_batches = batches.len();
        if batches.is_empty() {
            info!(run_id = %run_id, "No records to analyze");
            return Ok(RunStats {
                run_id,
                started_at,
                fetched_records,
                unique_records,
                total_batches: 0,
                successful_batches: 0,
                failed_batches: 0,
                duration_seconds: started.elapsed().as_secs_f64(),
            });
        }

        info!(total_batches, "Phase 4: Dispatching batches");
        let sink: Arc<dyn RecordSink> = client;
        let ctx = Arc::new(BatchContext {
            analyzer,
            sink,
            log: Arc::new(log),
            credential,
            integer_fields: self.config.pipeline.integer_fields.clone(),
        });
        let (successful_batches, failed_batches) =
            dispatch_batches(batches, ctx, self.config.pipeline.concurrency).await;

        let stats = RunStats {
            run_id,
            started_at,
            fetched_records,
            unique_records,
            total_batches,
            successful_batches,
            failed_batches,
            duration_seconds: started.elapsed().as_secs_f64(),
        };
        info!(run_id = %run_id, "{}", stats.summary());
        Ok(stats)
    }
}

fn build_analyzer(
    config: &AppConfig,
    template: PromptTemplate,
) -> Result<Arc<dyn DialogueAnalyzer>> {
    let analyzer: Arc<dyn DialogueAnalyzer> = match config.analyzer.provider {
        Provider::Gemini => Arc::new(GeminiAnalyzer::new(&config.analyzer, template)?),
        Provider::DeepSeek => Arc::new(DeepSeekAnalyzer::new(&config.analyzer, template)?),
    };
    info!(analyzer = analyzer.name(), "Analyzer ready");
    Ok(analyzer)
}
