//! End-to-end tests for the analysis pipeline
//!
//! These tests validate the full workflow:
//! - Fetch, dedup, partition, dispatch, and aggregate over mock services
//! - Graceful degradation when the fetch fails
//! - Fatal setup errors surfacing before any batch is dispatched
//! - Batch independence under mixed outcomes
//! - The local record log running ahead of the remote write

use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use dap_pipeline::analyzer::{AnalysisFailure, AnalysisOutcome, DialogueAnalyzer};
use dap_pipeline::config::AppConfig;
use dap_pipeline::models::{partition_batches, InputRecord, OutputRecord};
use dap_pipeline::pipeline::{
    dispatch_batches, AnalysisPipeline, BatchContext, RecordLog, RecordSink,
};
use serde_json::{json, Value};
use tempfile::TempDir;
use wiremock::{
    matchers::{method, path},
    Mock, MockServer, ResponseTemplate,
};

const RECORDS_PATH: &str = "/open-apis/bitable/v1/apps/bascnTest00000000/tables/tblTest0000/records";
const BATCH_CREATE_PATH: &str =
    "/open-apis/bitable/v1/apps/bascnTest00000000/tables/tblTest0000/records/batch_create";

/// Helper to write a prompt template into a temp dir
fn write_prompt(dir: &TempDir) -> PathBuf {
    let path = dir.path().join("system_prompt.txt");
    let mut file = std::fs::File::create(&path).unwrap();
    write!(file, "分析以下对话并输出 JSON:\n{{{{TRANSACTION}}}}").unwrap();
    path
}

/// Full config pointing every remote surface at the mock server.
fn mock_config(server: &MockServer, dir: &TempDir) -> AppConfig {
    let mut config = AppConfig::test_config();
    config.bitable.base_url = server.uri();
    config.analyzer.deepseek_base_url = server.uri();
    config.pipeline.output_path = dir.path().join("results.jsonl");
    config.pipeline.prompt_path = write_prompt(dir);
    config
}

/// Helper to build one listing page of input records
fn listing_page(items: Value) -> Value {
    json!({
        "code": 0,
        "msg": "success",
        "data": {
            "has_more": false,
            "page_token": null,
            "items": items,
        }
    })
}

fn input_record(value: Value) -> InputRecord {
    match value {
        Value::Object(map) => InputRecord { fields: map },
        other => panic!("expected an object, got {other}"),
    }
}

fn read_log_lines(path: &std::path::Path) -> Vec<Value> {
    std::fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

/// Analyzer that echoes each input object back as one result object,
/// failing any batch that contains the poisoned identifier.
struct EchoAnalyzer {
    poison: i64,
}

#[async_trait]
impl DialogueAnalyzer for EchoAnalyzer {
    async fn analyze(&self, batch_text: &str) -> AnalysisOutcome {
        let items: Vec<Value> = match serde_json::from_str(batch_text) {
            Ok(items) => items,
            Err(e) => {
                return AnalysisOutcome::AnalysisError(AnalysisFailure::new(e.to_string()));
            }
        };
        if items.iter().any(|item| item["编号"] == json!(self.poison)) {
            return AnalysisOutcome::AnalysisError(AnalysisFailure::with_raw(
                "model rejected the batch",
                batch_text.to_string(),
            ));
        }
        AnalysisOutcome::RecordList(items)
    }

    fn name(&self) -> &'static str {
        "echo"
    }
}

/// Sink that records every write instead of talking to a server.
#[derive(Default)]
struct RecordingSink {
    writes: Mutex<Vec<usize>>,
}

#[async_trait]
impl RecordSink for RecordingSink {
    async fn write(&self, records: &[OutputRecord], _credential: &str) -> anyhow::Result<()> {
        self.writes.lock().unwrap().push(records.len());
        Ok(())
    }
}

/// Sink that rejects every write.
struct FailingSink;

#[async_trait]
impl RecordSink for FailingSink {
    async fn write(&self, _records: &[OutputRecord], _credential: &str) -> anyhow::Result<()> {
        anyhow::bail!("table write rejected")
    }
}

#[tokio::test]
async fn test_full_run_processes_every_batch() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    // Five fetched rows: one duplicate identifier, one missing identifier.
    // Three unique records survive and form two batches of size 2.
    Mock::given(method("GET"))
        .and(path(RECORDS_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(listing_page(json!([
            {"fields": {"编号": 1, "round5": "对话一"}},
            {"fields": {"编号": 2, "round5": "对话二"}},
            {"fields": {"编号": 2, "round5": "重复"}},
            {"fields": {"round5": "缺少编号"}},
            {"fields": {"编号": 3, "round5": "对话三"}}
        ]))))
        .mount(&server)
        .await;

    // The static bearer token must be used as-is.
    Mock::given(method("POST"))
        .and(path("/open-apis/auth/v3/tenant_access_token/internal"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"code": 0})))
        .expect(0)
        .mount(&server)
        .await;

    let reply = "```json\n[{\"编号\": \"1\", \"总结\": \"稳定\"}]\n```";
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"content": reply}}]
        })))
        .expect(2)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path(BATCH_CREATE_PATH))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"code": 0, "msg": "success"})),
        )
        .expect(2)
        .mount(&server)
        .await;

    let config = mock_config(&server, &dir);
    let output_path = config.pipeline.output_path.clone();
    let stats = AnalysisPipeline::new(config).run().await.unwrap();

    assert_eq!(stats.fetched_records, 5);
    assert_eq!(stats.unique_records, 3);
    assert_eq!(stats.total_batches, 2);
    assert_eq!(stats.successful_batches, 2);
    assert_eq!(stats.failed_batches, 0);
    assert!(stats.is_success());

    // One echoed record per batch, with the identifier coerced to an integer.
    let lines = read_log_lines(&output_path);
    assert_eq!(lines.len(), 2);
    for line in &lines {
        assert_eq!(line["编号"], json!(1));
        assert_eq!(line["总结"], json!("稳定"));
    }
}

#[tokio::test]
async fn test_fetch_failure_degrades_to_empty_run() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path(RECORDS_PATH))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
        .expect(0)
        .mount(&server)
        .await;

    let config = mock_config(&server, &dir);
    let output_path = config.pipeline.output_path.clone();
    let stats = AnalysisPipeline::new(config).run().await.unwrap();

    assert_eq!(stats.fetched_records, 0);
    assert_eq!(stats.total_batches, 0);
    assert!(stats.is_success());

    // The log is opened (and truncated) before the fetch.
    assert_eq!(std::fs::read_to_string(&output_path).unwrap(), "");
}

#[tokio::test]
async fn test_missing_prompt_is_fatal() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    let mut config = mock_config(&server, &dir);
    config.pipeline.prompt_path = dir.path().join("does_not_exist.txt");

    let err = AnalysisPipeline::new(config).run().await.unwrap_err();
    assert!(err.to_string().contains("prompt template"));
}

#[tokio::test]
async fn test_invalid_config_is_fatal() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    let mut config = mock_config(&server, &dir);
    config.pipeline.batch_size = 0;

    let err = AnalysisPipeline::new(config).run().await.unwrap_err();
    assert!(err.to_string().contains("Batch size"));
}

#[tokio::test]
async fn test_one_failed_batch_does_not_stop_the_others() {
    let dir = TempDir::new().unwrap();

    let mut records: Vec<InputRecord> = (1..=8)
        .map(|id| input_record(json!({"编号": id, "round5": format!("对话{id}")})))
        .collect();
    records.push(input_record(json!({"编号": "N/A", "round5": "无编号对话"})));
    records.push(input_record(json!({"编号": 10, "round5": "对话十"})));
    let batches = partition_batches(records, 2);
    assert_eq!(batches.len(), 5);

    let sink = Arc::new(RecordingSink::default());
    let log = Arc::new(RecordLog::create(dir.path().join("results.jsonl")).unwrap());
    let ctx = Arc::new(BatchContext {
        // 编号 3 lands in the second batch and poisons only that one.
        analyzer: Arc::new(EchoAnalyzer { poison: 3 }),
        sink: Arc::clone(&sink) as Arc<dyn RecordSink>,
        log: Arc::clone(&log),
        credential: "test-token".to_string(),
        integer_fields: vec!["编号".to_string()],
    });

    let (successful, failed) = dispatch_batches(batches, ctx, 5).await;
    assert_eq!(successful, 4);
    assert_eq!(failed, 1);

    // Four surviving batches wrote two records each.
    let mut writes = sink.writes.lock().unwrap().clone();
    writes.sort_unstable();
    assert_eq!(writes, vec![2, 2, 2, 2]);

    // Only records from successful batches reach the log, in any order.
    let lines = read_log_lines(log.path());
    assert_eq!(lines.len(), 8);

    // An identifier that does not parse as an integer is kept verbatim
    // and does not fail its batch.
    let unparsed = lines
        .iter()
        .filter(|line| line["编号"] == json!("N/A"))
        .count();
    assert_eq!(unparsed, 1);

    let mut ids: Vec<i64> = lines
        .iter()
        .filter_map(|line| line["编号"].as_i64())
        .collect();
    ids.sort_unstable();
    assert_eq!(ids, vec![1, 2, 5, 6, 7, 8, 10]);
}

#[tokio::test]
async fn test_local_log_runs_ahead_of_a_failing_sink() {
    let dir = TempDir::new().unwrap();

    let records = vec![
        input_record(json!({"编号": 1, "round5": "对话一"})),
        input_record(json!({"编号": 2, "round5": "对话二"})),
    ];
    let batches = partition_batches(records, 2);

    let log = Arc::new(RecordLog::create(dir.path().join("results.jsonl")).unwrap());
    let ctx = Arc::new(BatchContext {
        analyzer: Arc::new(EchoAnalyzer { poison: -1 }),
        sink: Arc::new(FailingSink),
        log: Arc::clone(&log),
        credential: "test-token".to_string(),
        integer_fields: vec!["编号".to_string()],
    });

    let (successful, failed) = dispatch_batches(batches, ctx, 1).await;
    assert_eq!(successful, 0);
    assert_eq!(failed, 1);

    // The append happens before the remote write, so the log still has
    // both records even though the batch failed.
    assert_eq!(read_log_lines(log.path()).len(), 2);
}
