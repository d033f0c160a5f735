use async_trait::async_trait;
use media_ingestion_application::{DetailsSource, ProviderError, RateLimiter};
use media_ingestion_domain::ProviderKind;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{info, warn};

use super::http::{
    handle_response, parse_numeric_id, start_index, HttpSettings, RateLimitedHttp,
    RESULTS_PER_PAGE,
};

pub const IGDB_BASE_URL: &str = "https://api.igdb.com/v4";
pub const TWITCH_TOKEN_URL: &str = "https://id.twitch.tv/oauth2/token";

/// A token is replaced this long before Twitch says it expires.
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(60);

const GAME_FIELDS: &str = "fields name, summary, first_release_date, cover.image_id, \
genres.name, platforms.name, involved_companies.company.name, \
involved_companies.developer, involved_companies.publisher";

#[derive(Debug, Clone)]
pub struct IgdbConfig {
    pub client_id: String,
    pub client_secret: String,
    pub http: HttpSettings,
}

#[derive(Debug, Deserialize)]
struct TwitchToken {
    access_token: String,
    #[serde(default)]
    expires_in: u64,
}

/// `refresh_at` is `None` when Twitch gave no lifetime; such a token is kept
/// until IGDB rejects it.
#[derive(Clone)]
struct AppToken {
    bearer: HeaderValue,
    refresh_at: Option<Instant>,
}

impl AppToken {
    fn from_twitch(token: TwitchToken) -> Result<Self, ProviderError> {
        let refresh_at = (token.expires_in > 0).then(|| {
            Instant::now()
                + Duration::from_secs(token.expires_in).saturating_sub(TOKEN_REFRESH_MARGIN)
        });
        Ok(Self {
            bearer: header_value(&format!("Bearer {}", token.access_token))?,
            refresh_at,
        })
    }

    fn is_fresh(&self) -> bool {
        self.refresh_at.map_or(true, |at| Instant::now() < at)
    }
}

/// IGDB game catalog. Requests are Apicalypse queries sent as POST bodies,
/// authorized with a Twitch app token. The token is renewed shortly before it
/// expires and whenever IGDB answers 401.
pub struct IgdbClient {
    http: RateLimitedHttp,
    base_url: String,
    token_url: String,
    config: IgdbConfig,
    token: RwLock<AppToken>,
}

impl IgdbClient {
    pub async fn create(
        config: &IgdbConfig,
        limiter: Arc<dyn RateLimiter>,
    ) -> Result<Self, ProviderError> {
        Self::with_base_url(IGDB_BASE_URL, TWITCH_TOKEN_URL, config, limiter).await
    }

    pub async fn with_base_url(
        base_url: impl Into<String>,
        token_url: &str,
        config: &IgdbConfig,
        limiter: Arc<dyn RateLimiter>,
    ) -> Result<Self, ProviderError> {
        let token = fetch_app_token(token_url, config).await?;

        let mut headers = HeaderMap::new();
        headers.insert("Client-ID", header_value(&config.client_id)?);

        Ok(Self {
            http: RateLimitedHttp::with_headers(
                &config.http,
                limiter,
                ProviderKind::Igdb.consume_key(),
                headers,
            )?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token_url: token_url.to_string(),
            config: config.clone(),
            token: RwLock::new(token),
        })
    }

    async fn bearer(&self) -> Result<HeaderValue, ProviderError> {
        {
            let token = self.token.read().await;
            if token.is_fresh() {
                return Ok(token.bearer.clone());
            }
        }
        self.renew_token(None).await
    }

    /// Replaces the token unless another caller already replaced `rejected`.
    async fn renew_token(&self, rejected: Option<&HeaderValue>) -> Result<HeaderValue, ProviderError> {
        let mut token = self.token.write().await;
        let replaced = match rejected {
            Some(rejected) => &token.bearer != rejected,
            None => token.is_fresh(),
        };
        if !replaced {
            *token = fetch_app_token(&self.token_url, &self.config).await?;
        }
        Ok(token.bearer.clone())
    }

    async fn query<T: DeserializeOwned>(&self, endpoint: &str, body: String) -> Result<T, ProviderError> {
        let url = format!("{}/{}", self.base_url, endpoint);
        let bearer = self.bearer().await?;

        match self
            .http
            .post_text_with(&url, body.clone(), authorization(bearer.clone()))
            .await
        {
            Err(ProviderError::Api { status: 401, .. }) => {
                warn!("IGDB rejected the app token, fetching a new one");
                let bearer = self.renew_token(Some(&bearer)).await?;
                self.http.post_text_with(&url, body, authorization(bearer)).await
            }
            other => other,
        }
    }

    pub async fn search_games(&self, query: &str, page: u32) -> Result<Vec<Value>, ProviderError> {
        let body = format!(
            "{}; search \"{}\"; limit {}; offset {};",
            GAME_FIELDS,
            escape_query(query),
            RESULTS_PER_PAGE,
            start_index(page)
        );
        self.query("games", body).await
    }

    pub async fn game_details(&self, game_id: i64) -> Result<Value, ProviderError> {
        let body = format!("{}; where id = {};", GAME_FIELDS, game_id);
        let games: Vec<Value> = self.query("games", body).await?;

        games.into_iter().next().ok_or_else(|| ProviderError::Api {
            status: 404,
            body: format!("IGDB game {} not found", game_id),
        })
    }
}

#[async_trait]
impl DetailsSource for IgdbClient {
    fn provider(&self) -> ProviderKind {
        ProviderKind::Igdb
    }

    async fn fetch_details(&self, api_id: &str) -> Result<Value, ProviderError> {
        self.game_details(parse_numeric_id(api_id)?).await
    }
}

async fn fetch_app_token(token_url: &str, config: &IgdbConfig) -> Result<AppToken, ProviderError> {
    let client = config.http.build_client(HeaderMap::new())?;
    let response = client
        .post(token_url)
        .query(&[
            ("client_id", config.client_id.as_str()),
            ("client_secret", config.client_secret.as_str()),
            ("grant_type", "client_credentials"),
        ])
        .send()
        .await
        .map_err(|e| ProviderError::Transport(e.to_string()))?;
    let token: TwitchToken = handle_response(response).await?;
    info!("Obtained IGDB access token (expires in {}s)", token.expires_in);
    AppToken::from_twitch(token)
}

fn authorization(bearer: HeaderValue) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(AUTHORIZATION, bearer);
    headers
}

fn header_value(value: &str) -> Result<HeaderValue, ProviderError> {
    HeaderValue::from_str(value).map_err(|e| ProviderError::Transport(e.to_string()))
}

fn escape_query(query: &str) -> String {
    query.replace('\\', "\\\\").replace('"', "\\\"")
}
