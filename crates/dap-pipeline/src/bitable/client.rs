//! Record listing and batch creation against a Bitable table.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::bitable::{auth, BitableError, Result};
use crate::config::BitableConfig;
use crate::models::{FieldMap, InputRecord, OutputRecord};
use crate::pipeline::{RecordSink, RecordSource};

/// `FieldNameNotFound`: a write referenced a column the table does not have.
const CODE_FIELD_NAME_NOT_FOUND: i64 = 1254045;

/// Codes the open platform returns for a missing or rejected access token.
const TOKEN_ERROR_CODES: [i64; 2] = [99991661, 10014];

pub struct BitableClient {
    client: Client,
    config: BitableConfig,
}

impl BitableClient {
    pub fn new(config: BitableConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent("DAP-Bitable-Client/1.0")
            .build()?;

        Ok(Self { client, config })
    }

    /// Resolves the bearer credential used by every call in this run.
    pub async fn resolve_credential(&self) -> Result<String> {
        auth::resolve_credential(&self.client, &self.config).await
    }

    fn records_url(&self) -> String {
        format!(
            "{}/open-apis/bitable/v1/apps/{}/tables/{}/records",
            self.config.base_url.trim_end_matches('/'),
            self.config.app_token,
            self.config.table_id
        )
    }

    fn batch_create_url(&self) -> String {
        format!(
            "{}/open-apis/bitable/v1/apps/{}/tables/{}/records/batch_create",
            self.config.base_url.trim_end_matches('/'),
            self.config.app_token,
            self.config.write_table()
        )
    }

    /// Fetches every record from the configured table, following pagination.
    pub async fn fetch_records(
        &self,
        token: &str,
        field_names: &[String],
    ) -> Result<Vec<InputRecord>> {
        let url = self.records_url();
        let mut records = Vec::new();
        let mut page_token: Option<String> = None;
        let mut page = 0usize;

        loop {
            let mut request = self
                .client
                .get(&url)
                .bearer_auth(token)
                .query(&[("page_size", self.config.page_size.to_string())]);

            if let Some(view_id) = &self.config.view_id {
                request = request.query(&[("view_id", view_id.as_str())]);
            }
            if !field_names.is_empty() {
                // The open platform wants the list as one JSON-encoded array string.
                let encoded = serde_json::to_string(field_names)?;
                request = request.query(&[("field_names", encoded.as_str())]);
            }
            if let Some(cursor) = &page_token {
                request = request.query(&[("page_token", cursor.as_str())]);
            }

            let response = request.send().await?.error_for_status()?;
            let payload: ListResponse = response.json().await?;

            if payload.code != 0 {
                if TOKEN_ERROR_CODES.contains(&payload.code) {
                    error!(
                        code = payload.code,
                        "Missing or invalid access token; check the FEISHU_* credentials"
                    );
                }
                return Err(BitableError::Api {
                    code: payload.code,
                    message: payload.msg,
                });
            }

            let ListData {
                has_more,
                page_token: next_token,
                items,
            } = payload.data.unwrap_or_default();

            page += 1;
            debug!(page, fetched = items.len(), "Fetched record page");
            records.extend(
                items
                    .into_iter()
                    .map(|item| InputRecord { fields: item.fields }),
            );

            if !has_more || next_token.is_none() {
                break;
            }
            page_token = next_token;
        }

        info!(total = records.len(), "Record listing complete");
        Ok(records)
    }

    /// Writes one batch of records to the output table.
    ///
    /// An empty batch is a no-op success.
    pub async fn batch_create(&self, token: &str, records: &[OutputRecord]) -> Result<()> {
        if records.is_empty() {
            debug!("No records to write, skipping batch create");
            return Ok(());
        }

        let payload = BatchCreateRequest {
            records: records
                .iter()
                .map(|record| RecordPayload {
                    fields: &record.fields,
                })
                .collect(),
        };

        let response = self
            .client
            .post(self.batch_create_url())
            .bearer_auth(token)
            .json(&payload)
            .send()
            .await?
            .error_for_status()?;

        let body: ApiStatus = response.json().await?;
        if body.code != 0 {
            if body.code == CODE_FIELD_NAME_NOT_FOUND {
                let mut names: Vec<&str> = records
                    .iter()
                    .flat_map(|record| record.fields.keys())
                    .map(String::as_str)
                    .collect();
                names.sort_unstable();
                names.dedup();
                error!(
                    fields = ?names,
                    "Bitable rejected a field name; check the output table columns"
                );
            }
            return Err(BitableError::Api {
                code: body.code,
                message: body.msg,
            });
        }

        debug!(written = records.len(), "Batch create complete");
        Ok(())
    }
}

/// Record source backed by the configured Bitable table.
pub struct BitableSource {
    client: Arc<BitableClient>,
    credential: String,
    field_names: Vec<String>,
}

impl BitableSource {
    pub fn new(client: Arc<BitableClient>, credential: String, field_names: Vec<String>) -> Self {
        Self {
            client,
            credential,
            field_names,
        }
    }
}

#[async_trait]
impl RecordSource for BitableSource {
    async fn fetch(&self) -> anyhow::Result<Vec<InputRecord>> {
        Ok(self
            .client
            .fetch_records(&self.credential, &self.field_names)
            .await?)
    }
}

#[async_trait]
impl RecordSink for BitableClient {
    async fn write(&self, records: &[OutputRecord], credential: &str) -> anyhow::Result<()> {
        Ok(self.batch_create(credential, records).await?)
    }
}

#[derive(Debug, Deserialize)]
struct ListResponse {
    code: i64,
    #[serde(default)]
    msg: String,
    data: Option<ListData>,
}

#[derive(Debug, Default, Deserialize)]
struct ListData {
    #[serde(default)]
    has_more: bool,
    page_token: Option<String>,
    #[serde(default)]
    items: Vec<RecordItem>,
}

#[derive(Debug, Deserialize)]
struct RecordItem {
    fields: FieldMap,
}

#[derive(Debug, Serialize)]
struct BatchCreateRequest<'a> {
    records: Vec<RecordPayload<'a>>,
}

#[derive(Debug, Serialize)]
struct RecordPayload<'a> {
    fields: &'a FieldMap,
}

#[derive(Debug, Deserialize)]
struct ApiStatus {
    code: i64,
    #[serde(default)]
    msg: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> BitableConfig {
        let mut config = BitableConfig::default();
        config.base_url = "https://open.example.com/".to_string();
        config.app_token = "bascnTest00000000".to_string();
        config.table_id = "tblInput000".to_string();
        config
    }

    #[test]
    fn test_records_url_strips_trailing_slash() {
        let client = BitableClient::new(test_config()).unwrap();
        assert_eq!(
            client.records_url(),
            "https://open.example.com/open-apis/bitable/v1/apps/bascnTest00000000/tables/tblInput000/records"
        );
    }

    #[test]
    fn test_batch_create_defaults_to_read_table() {
        let client = BitableClient::new(test_config()).unwrap();
        assert!(client
            .batch_create_url()
            .ends_with("/tables/tblInput000/records/batch_create"));
    }

    #[test]
    fn test_batch_create_prefers_write_table() {
        let mut config = test_config();
        config.write_table_id = Some("tblOutput00".to_string());
        let client = BitableClient::new(config).unwrap();
        assert!(client
            .batch_create_url()
            .ends_with("/tables/tblOutput00/records/batch_create"));
    }
}
