use async_trait::async_trait;
use media_ingestion_application::{
    ChangedIdsSource, ChangesPage, DetailsSource, ProviderError, RateLimiter,
};
use media_ingestion_domain::ProviderKind;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;

use super::http::{parse_numeric_id, HttpSettings, RateLimitedHttp};

pub const TMDB_BASE_URL: &str = "https://api.themoviedb.org/3";

#[derive(Debug, Clone)]
pub struct TmdbConfig {
    pub api_key: String,
    pub http: HttpSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TmdbPage<T> {
    #[serde(default)]
    pub page: u32,
    #[serde(default = "Vec::new")]
    pub results: Vec<T>,
    #[serde(default)]
    pub total_pages: Option<u32>,
    #[serde(default)]
    pub total_results: Option<u64>,
}

/// One hit of `/search/multi` or a trending list.
#[derive(Debug, Clone, Deserialize)]
pub struct TmdbSearchItem {
    pub id: i64,
    #[serde(default)]
    pub media_type: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub release_date: Option<String>,
    #[serde(default)]
    pub first_air_date: Option<String>,
    #[serde(default)]
    pub poster_path: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TmdbChangeEntry {
    pub id: i64,
    #[serde(default)]
    pub adult: Option<bool>,
}

pub struct TmdbClient {
    http: RateLimitedHttp,
    base_url: String,
    api_key: String,
}

impl TmdbClient {
    pub async fn create(
        config: &TmdbConfig,
        limiter: Arc<dyn RateLimiter>,
    ) -> Result<Self, ProviderError> {
        Self::with_base_url(TMDB_BASE_URL, config, limiter)
    }

    pub fn with_base_url(
        base_url: impl Into<String>,
        config: &TmdbConfig,
        limiter: Arc<dyn RateLimiter>,
    ) -> Result<Self, ProviderError> {
        Ok(Self {
            http: RateLimitedHttp::new(
                &config.http,
                limiter,
                ProviderKind::Tmdb.consume_key(),
            )?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub async fn search_multi(
        &self,
        query: &str,
        page: u32,
    ) -> Result<TmdbPage<TmdbSearchItem>, ProviderError> {
        let page = page.max(1).to_string();
        self.http
            .get_json(
                &self.url("/search/multi"),
                &[
                    ("query", query),
                    ("api_key", self.api_key.as_str()),
                    ("page", page.as_str()),
                ],
            )
            .await
    }

    pub async fn movie_details(&self, movie_id: i64) -> Result<Value, ProviderError> {
        self.details("movie", movie_id).await
    }

    pub async fn tv_details(&self, tv_id: i64) -> Result<Value, ProviderError> {
        self.details("tv", tv_id).await
    }

    async fn details(&self, kind: &str, id: i64) -> Result<Value, ProviderError> {
        self.http
            .get_json(
                &self.url(&format!("/{}/{}", kind, id)),
                &[
                    ("api_key", self.api_key.as_str()),
                    ("append_to_response", "credits"),
                ],
            )
            .await
    }

    pub async fn trending_tv(&self) -> Result<TmdbPage<TmdbSearchItem>, ProviderError> {
        self.trending("tv").await
    }

    pub async fn trending_movies(&self) -> Result<TmdbPage<TmdbSearchItem>, ProviderError> {
        self.trending("movie").await
    }

    async fn trending(&self, kind: &str) -> Result<TmdbPage<TmdbSearchItem>, ProviderError> {
        self.http
            .get_json(
                &self.url(&format!("/trending/{}/week", kind)),
                &[("api_key", self.api_key.as_str())],
            )
            .await
    }

    pub async fn tv_changes(&self, page: u32) -> Result<TmdbPage<TmdbChangeEntry>, ProviderError> {
        self.changes("tv", page).await
    }

    pub async fn movie_changes(&self, page: u32) -> Result<TmdbPage<TmdbChangeEntry>, ProviderError> {
        self.changes("movie", page).await
    }

    async fn changes(&self, kind: &str, page: u32) -> Result<TmdbPage<TmdbChangeEntry>, ProviderError> {
        let page = page.max(1).to_string();
        self.http
            .get_json(
                &self.url(&format!("/{}/changes", kind)),
                &[("api_key", self.api_key.as_str()), ("page", page.as_str())],
            )
            .await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TmdbMediaKind {
    Movie,
    Tv,
}

/// Detail lookups for one TMDB media kind.
pub struct TmdbDetails {
    client: Arc<TmdbClient>,
    kind: TmdbMediaKind,
}

impl TmdbDetails {
    pub fn new(client: Arc<TmdbClient>, kind: TmdbMediaKind) -> Self {
        Self { client, kind }
    }
}

#[async_trait]
impl DetailsSource for TmdbDetails {
    fn provider(&self) -> ProviderKind {
        ProviderKind::Tmdb
    }

    async fn fetch_details(&self, api_id: &str) -> Result<Value, ProviderError> {
        let id = parse_numeric_id(api_id)?;
        match self.kind {
            TmdbMediaKind::Movie => self.client.movie_details(id).await,
            TmdbMediaKind::Tv => self.client.tv_details(id).await,
        }
    }
}

/// `/tv/changes` or `/movie/changes` as a paginated change feed.
pub struct TmdbChangedIds {
    client: Arc<TmdbClient>,
    kind: TmdbMediaKind,
}

impl TmdbChangedIds {
    pub fn new(client: Arc<TmdbClient>, kind: TmdbMediaKind) -> Self {
        Self { client, kind }
    }

    pub fn feed_key(&self) -> &'static str {
        match self.kind {
            TmdbMediaKind::Movie => "tmdb:movieChangedIds",
            TmdbMediaKind::Tv => "tmdb:tvChangedIds",
        }
    }
}

#[async_trait]
impl ChangedIdsSource for TmdbChangedIds {
    async fn changed_ids_page(&self, page: u32) -> Result<ChangesPage, ProviderError> {
        let response = match self.kind {
            TmdbMediaKind::Movie => self.client.movie_changes(page).await?,
            TmdbMediaKind::Tv => self.client.tv_changes(page).await?,
        };
        Ok(ChangesPage {
            ids: response.results.into_iter().map(|entry| entry.id).collect(),
            total_pages: response.total_pages,
        })
    }
}
