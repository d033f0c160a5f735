use async_trait::async_trait;
use media_ingestion_application::{DetailsSource, ProviderError, RateLimiter};
use media_ingestion_domain::ProviderKind;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;

use super::http::{start_index, HttpSettings, RateLimitedHttp, RESULTS_PER_PAGE};

pub const GOOGLE_BOOKS_BASE_URL: &str = "https://www.googleapis.com/books/v1";

#[derive(Debug, Clone)]
pub struct GoogleBooksConfig {
    pub api_key: String,
    pub http: HttpSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoogleBooksPage {
    #[serde(default)]
    pub total_items: u64,
    #[serde(default)]
    pub items: Vec<Value>,
}

pub struct GoogleBooksClient {
    http: RateLimitedHttp,
    base_url: String,
    api_key: String,
}

impl GoogleBooksClient {
    pub async fn create(
        config: &GoogleBooksConfig,
        limiter: Arc<dyn RateLimiter>,
    ) -> Result<Self, ProviderError> {
        Self::with_base_url(GOOGLE_BOOKS_BASE_URL, config, limiter)
    }

    pub fn with_base_url(
        base_url: impl Into<String>,
        config: &GoogleBooksConfig,
        limiter: Arc<dyn RateLimiter>,
    ) -> Result<Self, ProviderError> {
        Ok(Self {
            http: RateLimitedHttp::new(
                &config.http,
                limiter,
                ProviderKind::GoogleBooks.consume_key(),
            )?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }

    pub async fn search(&self, query: &str, page: u32) -> Result<GoogleBooksPage, ProviderError> {
        let start_index = start_index(page).to_string();
        let max_results = RESULTS_PER_PAGE.to_string();
        self.http
            .get_json(
                &format!("{}/volumes", self.base_url),
                &[
                    ("q", query),
                    ("key", self.api_key.as_str()),
                    ("startIndex", start_index.as_str()),
                    ("maxResults", max_results.as_str()),
                ],
            )
            .await
    }

    pub async fn book_details(&self, book_id: &str) -> Result<Value, ProviderError> {
        let book_id = book_id.trim();
        if book_id.is_empty() || book_id.contains('/') {
            return Err(ProviderError::InvalidId(book_id.to_string()));
        }
        self.http
            .get_json(
                &format!("{}/volumes/{}", self.base_url, book_id),
                &[("key", self.api_key.as_str())],
            )
            .await
    }
}

#[async_trait]
impl DetailsSource for GoogleBooksClient {
    fn provider(&self) -> ProviderKind {
        ProviderKind::GoogleBooks
    }

    async fn fetch_details(&self, api_id: &str) -> Result<Value, ProviderError> {
        self.book_details(api_id).await
    }
}
