use async_trait::async_trait;
use media_ingestion_application::{MediaRecord, ProviderError, RateLimiter, RecordEnricher};
use media_ingestion_domain::ProviderKind;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use super::http::{HttpSettings, RateLimitedHttp};

pub const LLM_BASE_URL: &str = "https://api.openai.com/v1";

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_key: String,
    pub base_url: Option<String>,
    pub model: String,
    pub http: HttpSettings,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

/// OpenAI-compatible chat completions client used as a book genre classifier.
pub struct LlmClient {
    http: RateLimitedHttp,
    base_url: String,
    model: String,
}

impl LlmClient {
    pub async fn create(
        config: &LlmConfig,
        limiter: Arc<dyn RateLimiter>,
    ) -> Result<Self, ProviderError> {
        let base_url = config.base_url.as_deref().unwrap_or(LLM_BASE_URL).to_string();
        Self::with_base_url(base_url, config, limiter)
    }

    pub fn with_base_url(
        base_url: impl Into<String>,
        config: &LlmConfig,
        limiter: Arc<dyn RateLimiter>,
    ) -> Result<Self, ProviderError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", config.api_key))
                .map_err(|e| ProviderError::Transport(e.to_string()))?,
        );

        Ok(Self {
            http: RateLimitedHttp::with_headers(
                &config.http,
                limiter,
                ProviderKind::Llm.consume_key(),
                headers,
            )?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: config.model.clone(),
        })
    }

    /// Genres for a book description, restricted to `allowed` and spelled as
    /// in `allowed`.
    pub async fn classify_book_genres(
        &self,
        description: &str,
        allowed: &[String],
    ) -> Result<Vec<String>, ProviderError> {
        let system = format!(
            "You classify books. Answer with a JSON array of at most 3 genres \
             chosen only from: {}. No other text.",
            allowed.join(", ")
        );
        let request = ChatRequest {
            model: &self.model,
            temperature: 0.0,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &system,
                },
                ChatMessage {
                    role: "user",
                    content: description,
                },
            ],
        };

        let response: ChatResponse = self
            .http
            .post_json(&format!("{}/chat/completions", self.base_url), &request)
            .await?;

        let content = response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| ProviderError::Decode("LLM response has no content".to_string()))?;

        Ok(restrict_genres(&content, allowed))
    }
}

/// Accepts a JSON array or a comma separated list; unknown genres are dropped.
fn restrict_genres(content: &str, allowed: &[String]) -> Vec<String> {
    let candidates: Vec<String> = serde_json::from_str::<Vec<String>>(content.trim())
        .unwrap_or_else(|_| {
            content
                .trim_matches(|c| c == '[' || c == ']')
                .split(',')
                .map(|s| s.trim().trim_matches('"').to_string())
                .collect()
        });

    let mut genres = Vec::new();
    for candidate in candidates {
        if let Some(genre) = allowed
            .iter()
            .find(|genre| genre.eq_ignore_ascii_case(candidate.trim()))
        {
            if !genres.contains(genre) {
                genres.push(genre.clone());
            }
        }
    }
    genres
}

/// Fills `genres` of book records from their synopsis.
pub struct LlmGenreEnricher {
    client: Arc<LlmClient>,
    allowed: Vec<String>,
}

impl LlmGenreEnricher {
    pub fn new(client: Arc<LlmClient>, allowed: Vec<String>) -> Self {
        Self { client, allowed }
    }
}

#[async_trait]
impl RecordEnricher for LlmGenreEnricher {
    async fn enrich(&self, record: &mut MediaRecord) -> Result<(), ProviderError> {
        let Some(synopsis) = record.synopsis.as_deref().filter(|s| !s.trim().is_empty()) else {
            debug!("No synopsis for {}, skipping genre classification", record.api_id);
            return Ok(());
        };

        let genres = self.client.classify_book_genres(synopsis, &self.allowed).await?;
        if !genres.is_empty() {
            record.genres = genres;
        }
        Ok(())
    }
}
