//! Bounded fan-out of batch workers.

use std::sync::Arc;

use futures::{stream, StreamExt};
use tracing::{error, info, warn};

use crate::analyzer::{batch_to_prompt_text, DialogueAnalyzer};
use crate::models::Batch;
use crate::pipeline::normalizer::normalize;
use crate::pipeline::sink::RecordLog;
use crate::pipeline::RecordSink;

/// Shared state handed to every batch worker.
pub struct BatchContext {
    pub analyzer: Arc<dyn DialogueAnalyzer>,
    pub sink: Arc<dyn RecordSink>,
    pub log: Arc<RecordLog>,
    pub credential: String,
    pub integer_fields: Vec<String>,
}

/// Processes one batch end to end. Returns whether the full chain succeeded.
async fn process_batch(batch: Batch, ctx: Arc<BatchContext>) -> bool {
    info!(
        batch = batch.index,
        total = batch.total,
        records = batch.records.len(),
        "Analyzing batch"
    );

    let batch_text = match batch_to_prompt_text(&batch) {
        Ok(text) => text,
        Err(e) => {
            error!(batch = batch.index, error = %e, "Failed to serialize batch");
            return false;
        }
    };

    let outcome = ctx.analyzer.analyze(&batch_text).await;
    let records = match normalize(outcome, &ctx.integer_fields) {
        Ok(records) => records,
        Err(failure) => {
            error!(
                batch = batch.index,
                error = %failure.message,
                has_raw = failure.raw_response.is_some(),
                "Analysis failed"
            );
            return false;
        }
    };

    if records.is_empty() {
        info!(batch = batch.index, "Analysis produced no records");
        return true;
    }

    // The local log is best-effort; only the remote write decides the outcome.
    if let Err(e) = ctx.log.append(&records) {
        warn!(batch = batch.index, error = %e, "Failed to append to the record log");
    }

    match ctx.sink.write(&records, &ctx.credential).await {
        Ok(()) => {
            info!(batch = batch.index, written = records.len(), "Batch complete");
            true
        }
        Err(e) => {
            error!(batch = batch.index, error = %e, "Remote write failed");
            false
        }
    }
}

/// Runs every batch with at most `concurrency` workers in flight and
/// returns `(successful, failed)` counts.
///
/// Each batch runs on its own task, so a panicking worker is contained at
/// the join boundary and counted as a failure.
pub async fn dispatch_batches(
    batches: Vec<Batch>,
    ctx: Arc<BatchContext>,
    concurrency: usize,
) -> (usize, usize) {
    let total = batches.len();
    info!(total, concurrency, "Dispatching batch workers");

    let results: Vec<bool> = stream::iter(batches)
        .map(|batch| {
            let ctx = Arc::clone(&ctx);
            async move {
                let batch_no = batch.index;
                match tokio::spawn(process_batch(batch, ctx)).await {
                    Ok(succeeded) => succeeded,
                    Err(e) => {
                        error!(batch = batch_no, error = %e, "Batch worker panicked");
                        false
                    }
                }
            }
        })
        .buffer_unordered(concurrency)
        .collect()
        .await;

    let successful = results.iter().filter(|ok| **ok).count();
    let failed = total - successful;
    info!(successful, failed, "All batches complete");
    (successful, failed)
}
