use async_trait::async_trait;
use media_ingestion_application::{MediaRecord, ProviderError, RateLimiter, RecordEnricher};
use media_ingestion_domain::ProviderKind;
use reqwest::header::{HeaderMap, HeaderValue, REFERER};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::debug;

use super::http::{HttpSettings, RateLimitedHttp, RESULTS_PER_PAGE};

pub const HLTB_BASE_URL: &str = "https://howlongtobeat.com";

#[derive(Debug, Clone, Default)]
pub struct HltbConfig {
    pub http: HttpSettings,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SearchRequest<'a> {
    search_type: &'a str,
    search_terms: Vec<&'a str>,
    search_page: u32,
    size: u32,
    search_options: Value,
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    data: Vec<HltbGame>,
}

/// Completion times in seconds; 0 means nobody submitted one.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct HltbGame {
    pub game_id: i64,
    pub game_name: String,
    #[serde(default)]
    pub comp_main: u64,
    #[serde(default)]
    pub comp_plus: u64,
    #[serde(default)]
    pub comp_100: u64,
}

impl HltbGame {
    /// `{ "main": h, "extra": h, "completionist": h }` in hours, missing
    /// times left out.
    pub fn playtime(&self) -> Value {
        let mut times = serde_json::Map::new();
        for (name, secs) in [
            ("main", self.comp_main),
            ("extra", self.comp_plus),
            ("completionist", self.comp_100),
        ] {
            if secs > 0 {
                times.insert(name.to_string(), json!(hours(secs)));
            }
        }
        Value::Object(times)
    }
}

fn hours(secs: u64) -> f64 {
    (secs as f64 / 360.0).round() / 10.0
}

/// HowLongToBeat search. There is no official API; this is the JSON endpoint
/// the website's own search box calls.
pub struct HltbClient {
    http: RateLimitedHttp,
    base_url: String,
}

impl HltbClient {
    pub fn create(config: &HltbConfig, limiter: Arc<dyn RateLimiter>) -> Result<Self, ProviderError> {
        Self::with_base_url(HLTB_BASE_URL, config, limiter)
    }

    pub fn with_base_url(
        base_url: impl Into<String>,
        config: &HltbConfig,
        limiter: Arc<dyn RateLimiter>,
    ) -> Result<Self, ProviderError> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let mut headers = HeaderMap::new();
        headers.insert(
            REFERER,
            HeaderValue::from_str(&format!("{}/", base_url))
                .map_err(|e| ProviderError::Transport(e.to_string()))?,
        );

        Ok(Self {
            http: RateLimitedHttp::with_headers(
                &config.http,
                limiter,
                ProviderKind::Hltb.consume_key(),
                headers,
            )?,
            base_url,
        })
    }

    pub async fn search(&self, name: &str) -> Result<Vec<HltbGame>, ProviderError> {
        let request = SearchRequest {
            search_type: "games",
            search_terms: name.split_whitespace().collect(),
            search_page: 1,
            size: RESULTS_PER_PAGE,
            search_options: json!({
                "games": {
                    "userId": 0,
                    "platform": "",
                    "sortCategory": "popular",
                    "rangeCategory": "main",
                    "rangeTime": { "min": 0, "max": 0 },
                    "gameplay": { "perspective": "", "flow": "", "genre": "" },
                    "modifier": ""
                },
                "filter": "",
                "sort": 0,
                "randomizer": 0
            }),
        };

        let response: SearchResponse = self
            .http
            .post_json(&format!("{}/api/search", self.base_url), &request)
            .await?;
        Ok(response.data)
    }

    /// The result whose name matches `name` ignoring case, else the first one.
    pub async fn find_game(&self, name: &str) -> Result<Option<HltbGame>, ProviderError> {
        let mut games = self.search(name).await?;
        let exact = games
            .iter()
            .position(|game| game.game_name.trim().eq_ignore_ascii_case(name.trim()));
        Ok(match exact {
            Some(index) => Some(games.swap_remove(index)),
            None => games.into_iter().next(),
        })
    }
}

/// Adds HowLongToBeat completion times to game records under `payload.hltb`.
pub struct HltbPlaytimeEnricher {
    client: Arc<HltbClient>,
}

impl HltbPlaytimeEnricher {
    pub fn new(client: Arc<HltbClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl RecordEnricher for HltbPlaytimeEnricher {
    async fn enrich(&self, record: &mut MediaRecord) -> Result<(), ProviderError> {
        let Some(game) = self.client.find_game(&record.name).await? else {
            debug!("No HowLongToBeat entry for {}", record.name);
            return Ok(());
        };

        if let Value::Object(payload) = &mut record.payload {
            payload.insert("hltb".to_string(), game.playtime());
        }
        Ok(())
    }
}
