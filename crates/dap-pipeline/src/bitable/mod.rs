//! Feishu Bitable REST client.
//!
//! Covers the three calls the pipeline needs: tenant token acquisition,
//! paginated record listing, and batch record creation. Every request
//! carries a bearer credential resolved once per run by [`auth`].

pub mod auth;
pub mod client;

pub use client::{BitableClient, BitableSource};

use thiserror::Error;

pub type Result<T> = std::result::Result<T, BitableError>;

#[derive(Error, Debug)]
pub enum BitableError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Failed to encode request payload: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Bitable API error (code {code}): {message}")]
    Api { code: i64, message: String },

    #[error("Missing credentials: {0}")]
    MissingCredentials(String),

    #[error("Unexpected response shape: {0}")]
    Shape(String),
}
