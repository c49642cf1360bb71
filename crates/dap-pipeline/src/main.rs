//! DAP - Dialogue analysis pipeline tool

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use dap_common::logging::{init_logging, LogConfig, LogLevel};
use dap_pipeline::bitable::{BitableClient, BitableSource};
use dap_pipeline::config::AppConfig;
use dap_pipeline::models::dedup_records;
use dap_pipeline::pipeline::{AnalysisPipeline, RecordSource};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "dap")]
#[command(author, version, about = "Batch dialogue analysis over Bitable records")]
struct Cli {
    /// What to do
    #[command(subcommand)]
    command: Command,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Parser, Debug)]
enum Command {
    /// Run the full analysis pipeline
    Run {
        /// Analysis provider (gemini or deepseek)
        #[arg(long)]
        provider: Option<String>,

        /// Records per batch
        #[arg(long)]
        batch_size: Option<usize>,

        /// Concurrent batch workers
        #[arg(long)]
        concurrency: Option<usize>,

        /// Path of the local JSON Lines record log
        #[arg(long)]
        output: Option<PathBuf>,

        /// Path of the system prompt template
        #[arg(long)]
        prompt: Option<PathBuf>,
    },

    /// Fetch and print the deduplicated input records without analyzing
    Fetch,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    // Environment first, verbose flag on top.
    let mut log_config = LogConfig::from_env()?;
    if cli.verbose {
        log_config.level = LogLevel::Debug;
    }
    init_logging(&log_config)?;

    match cli.command {
        Command::Run {
            provider,
            batch_size,
            concurrency,
            output,
            prompt,
        } => {
            info!("Running analysis pipeline");
            let mut config = AppConfig::from_env();
            if let Some(provider) = provider {
                config.analyzer.provider = provider.parse()?;
            }
            if let Some(batch_size) = batch_size {
                config.pipeline.batch_size = batch_size;
            }
            if let Some(concurrency) = concurrency {
                config.pipeline.concurrency = concurrency;
            }
            if let Some(output) = output {
                config.pipeline.output_path = output;
            }
            if let Some(prompt) = prompt {
                config.pipeline.prompt_path = prompt;
            }

            AnalysisPipeline::new(config).run().await?;
        },
        Command::Fetch => {
            info!("Fetching input records");
            fetch_records().await?;
        },
    }

    Ok(())
}

/// Pulls, deduplicates, and prints the input set, one JSON object per line.
async fn fetch_records() -> Result<()> {
    let config = AppConfig::from_env();
    config.validate_bitable().map_err(anyhow::Error::msg)?;

    let client = Arc::new(BitableClient::new(config.bitable.clone())?);
    let credential = client.resolve_credential().await?;
    let source = BitableSource::new(client, credential, config.pipeline.field_names.clone());

    let records = source.fetch().await?;
    let records = dedup_records(records, &config.pipeline.identifier_field);
    info!(count = records.len(), "Fetched records");

    for record in &records {
        println!("{}", serde_json::to_string(record)?);
    }

    Ok(())
}
