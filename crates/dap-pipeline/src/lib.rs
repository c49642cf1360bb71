//! Dialogue Analysis Pipeline
//!
//! Fetches dialogue records from a Feishu Bitable table, analyzes them in
//! parallel batches with an LLM provider, normalizes the structured output,
//! and writes the results back to the table plus a local JSON Lines log.
//!
//! # Architecture
//!
//! - [`bitable`]: REST client for the Bitable store (token acquisition,
//!   paginated reads, batch writes)
//! - [`analyzer`]: the analysis boundary (provider adapters, prompt
//!   rendering, response extraction)
//! - [`models`]: record types, deduplication, batch partitioning
//! - [`pipeline`]: orchestration (bounded worker pool, normalization,
//!   local record log, run statistics)
//! - [`config`]: environment-driven configuration
//!
//! Control flow for one run: fetch -> dedup -> partition -> dispatch batches
//! to a bounded pool -> per batch: analyze, normalize, append to the local
//! log, write remotely -> aggregate counts.

pub mod analyzer;
pub mod bitable;
pub mod config;
pub mod models;
pub mod pipeline;

// Re-export main types
pub use config::AppConfig;
pub use pipeline::{AnalysisPipeline, RunStats};
