use async_trait::async_trait;
use media_ingestion_application::{DetailsSource, ProviderError, RateLimiter};
use media_ingestion_domain::ProviderKind;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;

use super::http::{parse_numeric_id, HttpSettings, RateLimitedHttp, RESULTS_PER_PAGE};

pub const JIKAN_BASE_URL: &str = "https://api.jikan.moe/v4";

#[derive(Debug, Clone, Default)]
pub struct JikanConfig {
    pub http: HttpSettings,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct JikanPagination {
    #[serde(default)]
    pub last_visible_page: u32,
    #[serde(default)]
    pub has_next_page: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JikanPage {
    #[serde(default)]
    pub data: Vec<Value>,
    #[serde(default)]
    pub pagination: JikanPagination,
}

#[derive(Deserialize)]
struct JikanEnvelope {
    data: Value,
}

/// MyAnimeList data through the public Jikan API (manga only).
pub struct JikanClient {
    http: RateLimitedHttp,
    base_url: String,
}

impl JikanClient {
    pub async fn create(
        config: &JikanConfig,
        limiter: Arc<dyn RateLimiter>,
    ) -> Result<Self, ProviderError> {
        Self::with_base_url(JIKAN_BASE_URL, config, limiter)
    }

    pub fn with_base_url(
        base_url: impl Into<String>,
        config: &JikanConfig,
        limiter: Arc<dyn RateLimiter>,
    ) -> Result<Self, ProviderError> {
        Ok(Self {
            http: RateLimitedHttp::new(&config.http, limiter, ProviderKind::Jikan.consume_key())?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub async fn search_manga(&self, query: &str, page: u32) -> Result<JikanPage, ProviderError> {
        let page = page.max(1).to_string();
        let limit = RESULTS_PER_PAGE.to_string();
        self.http
            .get_json(
                &format!("{}/manga", self.base_url),
                &[("q", query), ("page", page.as_str()), ("limit", limit.as_str())],
            )
            .await
    }

    pub async fn manga_details(&self, manga_id: i64) -> Result<Value, ProviderError> {
        let envelope: JikanEnvelope = self
            .http
            .get_json(
                &format!("{}/manga/{}/full", self.base_url, manga_id),
                &[] as &[(&str, &str)],
            )
            .await?;
        Ok(envelope.data)
    }
}

#[async_trait]
impl DetailsSource for JikanClient {
    fn provider(&self) -> ProviderKind {
        ProviderKind::Jikan
    }

    async fn fetch_details(&self, api_id: &str) -> Result<Value, ProviderError> {
        self.manga_details(parse_numeric_id(api_id)?).await
    }
}
