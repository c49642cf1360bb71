//! Tenant access token acquisition.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::bitable::{BitableError, Result};
use crate::config::BitableConfig;

const TOKEN_ENDPOINT: &str = "/open-apis/auth/v3/tenant_access_token/internal";

#[derive(Debug, Serialize)]
struct TokenRequest<'a> {
    app_id: &'a str,
    app_secret: &'a str,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    code: i64,
    #[serde(default)]
    msg: String,
    tenant_access_token: Option<String>,
}

/// Exchanges an app id/secret pair for a tenant access token.
pub async fn fetch_tenant_token(
    client: &Client,
    base_url: &str,
    app_id: &str,
    app_secret: &str,
) -> Result<String> {
    let url = format!("{}{}", base_url.trim_end_matches('/'), TOKEN_ENDPOINT);

    let response = client
        .post(&url)
        .json(&TokenRequest { app_id, app_secret })
        .send()
        .await?
        .error_for_status()?;

    let payload: TokenResponse = response.json().await?;
    if payload.code != 0 {
        return Err(BitableError::Auth(format!(
            "token endpoint returned code {}: {}",
            payload.code, payload.msg
        )));
    }

    payload.tenant_access_token.ok_or_else(|| {
        BitableError::Shape("token response missing tenant_access_token".to_string())
    })
}

/// Resolves the bearer credential for this run.
///
/// An app id/secret pair takes precedence and yields a fresh tenant token;
/// otherwise a static bearer token from the environment is used as-is.
pub async fn resolve_credential(client: &Client, config: &BitableConfig) -> Result<String> {
    if let (Some(app_id), Some(app_secret)) = (&config.app_id, &config.app_secret) {
        info!("Fetching tenant access token");
        let token = fetch_tenant_token(client, &config.base_url, app_id, app_secret).await?;
        debug!("Tenant access token acquired");
        return Ok(token);
    }

    if let Some(token) = &config.bearer_token {
        debug!("Using static bearer token from the environment");
        return Ok(token.clone());
    }

    Err(BitableError::MissingCredentials(
        "Set FEISHU_APP_ID and FEISHU_APP_SECRET, or FEISHU_BEARER_TOKEN".to_string(),
    ))
}
