use async_trait::async_trait;
use media_ingestion_domain::ProviderKind;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::rate_limiter::RateLimiterError;

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("Rate limiter error: {0}")]
    RateLimit(#[from] RateLimiterError),

    #[error("Provider API error: {status} - {body}")]
    Api { status: u16, body: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Failed to decode provider response: {0}")]
    Decode(String),

    #[error("Invalid provider id: {0}")]
    InvalidId(String),
}

/// One page of a provider's "recently changed" feed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangesPage {
    pub ids: Vec<i64>,
    pub total_pages: Option<u32>,
}

#[async_trait]
pub trait ChangedIdsSource: Send + Sync {
    async fn changed_ids_page(&self, page: u32) -> Result<ChangesPage, ProviderError>;
}

/// Raw, provider-shaped details for one item.
#[async_trait]
pub trait DetailsSource: Send + Sync {
    fn provider(&self) -> ProviderKind;

    async fn fetch_details(&self, api_id: &str) -> Result<Value, ProviderError>;
}

/// Normalized media row produced from provider details.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaRecord {
    pub api_id: String,
    pub name: String,
    pub release_date: Option<String>,
    pub synopsis: Option<String>,
    #[serde(default)]
    pub genres: Vec<String>,
    pub payload: Value,
}

pub trait DetailsTransformer: Send + Sync {
    fn transform(&self, raw: &Value) -> Result<MediaRecord, TransformError>;
}

/// Optional post-transform step, e.g. LLM genre classification.
#[async_trait]
pub trait RecordEnricher: Send + Sync {
    async fn enrich(&self, record: &mut MediaRecord) -> Result<(), ProviderError>;
}

#[derive(Debug, thiserror::Error)]
pub enum TransformError {
    #[error("Missing field in provider payload: {0}")]
    MissingField(&'static str),

    #[error("Unexpected value for {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },
}
