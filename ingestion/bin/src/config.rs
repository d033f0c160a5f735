//! Runtime configuration loaded from `media-sync.toml`.
//!
//! Every field has a default, so the file is optional. Credentials and
//! endpoints can be overridden from the environment.

use anyhow::{Context, Result};
use media_ingestion_domain::{BudgetError, ProviderKind, RateLimitBudget};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

pub const CONFIG_FILE: &str = "media-sync.toml";

/// Where rate-limit counters, the change-feed cache and task run state live.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    Redis,
    Memory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct BudgetOverride {
    pub points: u32,
    pub window_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub backend: Backend,

    #[serde(default = "default_redis_url")]
    pub redis_url: String,

    #[serde(default = "default_database_url")]
    pub database_url: String,

    #[serde(default)]
    pub tmdb_api_key: String,

    #[serde(default)]
    pub google_books_api_key: String,

    #[serde(default)]
    pub igdb_client_id: String,

    #[serde(default)]
    pub igdb_client_secret: String,

    /// Without a key, books keep the categories Google Books reports.
    #[serde(default)]
    pub llm_api_key: String,

    #[serde(default)]
    pub llm_base_url: Option<String>,

    #[serde(default = "default_llm_model")]
    pub llm_model: String,

    /// Adds HowLongToBeat completion times to games.
    #[serde(default = "default_hltb_enabled")]
    pub hltb_enabled: bool,

    #[serde(default = "default_book_genres")]
    pub book_genres: Vec<String>,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// Longest a provider call waits for rate-limit points before failing.
    #[serde(default = "default_rate_limit_max_wait_secs")]
    pub rate_limit_max_wait_secs: u64,

    #[serde(default = "default_feed_ttl_secs")]
    pub feed_ttl_secs: u64,

    #[serde(default = "default_page_cap")]
    pub page_cap: u32,

    #[serde(default = "default_stale_after_days")]
    pub stale_after_days: i64,

    /// Keyed by provider name (`tmdb`, `google_books`, `jikan`, `igdb`, `hltb`,
    /// `llm`).
    #[serde(default)]
    pub rate_limits: HashMap<String, BudgetOverride>,
}

fn default_redis_url() -> String {
    "redis://127.0.0.1".to_string()
}

fn default_database_url() -> String {
    "sqlite://media-sync.db".to_string()
}

fn default_llm_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_hltb_enabled() -> bool {
    true
}

fn default_book_genres() -> Vec<String> {
    [
        "Fantasy",
        "Science Fiction",
        "Mystery",
        "Thriller",
        "Romance",
        "Horror",
        "Historical Fiction",
        "Biography",
        "History",
        "Philosophy",
        "Poetry",
        "Young Adult",
        "Children",
        "Comics",
        "Self-Help",
        "Science",
    ]
    .iter()
    .map(|genre| genre.to_string())
    .collect()
}

fn default_request_timeout_secs() -> u64 {
    15
}

fn default_connect_timeout_secs() -> u64 {
    5
}

fn default_rate_limit_max_wait_secs() -> u64 {
    30
}

fn default_feed_ttl_secs() -> u64 {
    300
}

fn default_page_cap() -> u32 {
    20
}

fn default_stale_after_days() -> i64 {
    7
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            backend: Backend::default(),
            redis_url: default_redis_url(),
            database_url: default_database_url(),
            tmdb_api_key: String::new(),
            google_books_api_key: String::new(),
            igdb_client_id: String::new(),
            igdb_client_secret: String::new(),
            llm_api_key: String::new(),
            llm_base_url: None,
            llm_model: default_llm_model(),
            hltb_enabled: default_hltb_enabled(),
            book_genres: default_book_genres(),
            request_timeout_secs: default_request_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
            rate_limit_max_wait_secs: default_rate_limit_max_wait_secs(),
            feed_ttl_secs: default_feed_ttl_secs(),
            page_cap: default_page_cap(),
            stale_after_days: default_stale_after_days(),
            rate_limits: HashMap::new(),
        }
    }
}

impl AppConfig {
    /// Reads `path` if it exists, then applies environment overrides.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            toml::from_str::<AppConfig>(&contents)
                .with_context(|| format!("invalid configuration in {}", path.display()))?
        } else {
            Self::default()
        };

        config.apply_env(|name| std::env::var(name).ok());
        Ok(config)
    }

    /// Non-empty values returned by `lookup` replace the configured ones.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|value| !value.is_empty());

        if let Some(value) = var("REDIS_URL") {
            self.redis_url = value;
        }
        if let Some(value) = var("DATABASE_URL") {
            self.database_url = value;
        }
        if let Some(value) = var("THEMOVIEDB_API_KEY") {
            self.tmdb_api_key = value;
        }
        if let Some(value) = var("GOOGLE_BOOKS_API_KEY") {
            self.google_books_api_key = value;
        }
        if let Some(value) = var("IGDB_CLIENT_ID") {
            self.igdb_client_id = value;
        }
        if let Some(value) = var("IGDB_CLIENT_SECRET") {
            self.igdb_client_secret = value;
        }
        if let Some(value) = var("LLM_API_KEY") {
            self.llm_api_key = value;
        }
        if let Some(value) = var("LLM_BASE_URL") {
            self.llm_base_url = Some(value);
        }
        if let Some(value) = var("LLM_MODEL") {
            self.llm_model = value;
        }
        if let Some(value) = var("HLTB_ENABLED") {
            self.hltb_enabled = !matches!(value.to_ascii_lowercase().as_str(), "0" | "false" | "no");
        }
    }

    pub fn budget(&self, provider: ProviderKind) -> Result<RateLimitBudget, BudgetError> {
        match self.rate_limits.get(provider.as_str()) {
            Some(limit) => provider.budget(limit.points, Duration::from_millis(limit.window_ms)),
            None => provider.default_budget(),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn rate_limit_max_wait(&self) -> Duration {
        Duration::from_secs(self.rate_limit_max_wait_secs)
    }

    pub fn feed_ttl(&self) -> Duration {
        Duration::from_secs(self.feed_ttl_secs)
    }

    pub fn stale_after(&self) -> chrono::Duration {
        chrono::Duration::days(self.stale_after_days)
    }
}
