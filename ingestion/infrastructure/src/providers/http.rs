use media_ingestion_application::{ProviderError, RateLimiter};
use reqwest::header::HeaderMap;
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

pub const RESULTS_PER_PAGE: u32 = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpSettings {
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(15),
            connect_timeout: Duration::from_secs(5),
        }
    }
}

impl HttpSettings {
    pub fn build_client(&self, headers: HeaderMap) -> Result<Client, ProviderError> {
        Client::builder()
            .connect_timeout(self.connect_timeout)
            .timeout(self.request_timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| ProviderError::Transport(e.to_string()))
    }
}

/// HTTP client whose every request first draws one point from a shared
/// rate limiter. Provider clients hold one of these and add their own typed
/// operations on top.
#[derive(Clone)]
pub struct RateLimitedHttp {
    client: Client,
    limiter: Arc<dyn RateLimiter>,
    consume_key: String,
}

impl RateLimitedHttp {
    pub fn new(
        settings: &HttpSettings,
        limiter: Arc<dyn RateLimiter>,
        consume_key: impl Into<String>,
    ) -> Result<Self, ProviderError> {
        Self::with_headers(settings, limiter, consume_key, HeaderMap::new())
    }

    /// `headers` are sent with every request, e.g. provider credentials.
    pub fn with_headers(
        settings: &HttpSettings,
        limiter: Arc<dyn RateLimiter>,
        consume_key: impl Into<String>,
        headers: HeaderMap,
    ) -> Result<Self, ProviderError> {
        Ok(Self {
            client: settings.build_client(headers)?,
            limiter,
            consume_key: consume_key.into(),
        })
    }

    pub fn consume_key(&self) -> &str {
        &self.consume_key
    }

    pub fn limiter(&self) -> &Arc<dyn RateLimiter> {
        &self.limiter
    }

    pub async fn get_json<T, Q>(&self, url: &str, query: &Q) -> Result<T, ProviderError>
    where
        T: DeserializeOwned,
        Q: Serialize + ?Sized,
    {
        self.send(self.client.get(url).query(query)).await
    }

    pub async fn post_json<T, B>(&self, url: &str, body: &B) -> Result<T, ProviderError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.send(self.client.post(url).json(body)).await
    }

    /// POSTs a plain-text body and decodes a JSON response. `headers` are
    /// added to this request only, e.g. a credential that rotates.
    pub async fn post_text_with<T>(
        &self,
        url: &str,
        body: impl Into<String>,
        headers: HeaderMap,
    ) -> Result<T, ProviderError>
    where
        T: DeserializeOwned,
    {
        self.send(
            self.client
                .post(url)
                .header(reqwest::header::CONTENT_TYPE, "text/plain")
                .headers(headers)
                .body(body.into()),
        )
        .await
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ProviderError> {
        self.limiter.consume(&self.consume_key).await?;

        let response = request
            .send()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;
        debug!("{} {} -> {}", self.consume_key, response.url().path(), response.status());

        handle_response(response).await
    }
}

/// Maps non-2xx statuses to [`ProviderError::Api`] and decodes the body.
pub async fn handle_response<T: DeserializeOwned>(response: Response) -> Result<T, ProviderError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ProviderError::Api {
            status: status.as_u16(),
            body,
        });
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|e| ProviderError::Transport(e.to_string()))?;
    serde_json::from_slice(&bytes).map_err(|e| ProviderError::Decode(e.to_string()))
}

pub fn parse_numeric_id(api_id: &str) -> Result<i64, ProviderError> {
    api_id
        .trim()
        .parse()
        .map_err(|_| ProviderError::InvalidId(api_id.to_string()))
}

pub fn start_index(page: u32) -> u32 {
    page.max(1).saturating_sub(1) * RESULTS_PER_PAGE
}
