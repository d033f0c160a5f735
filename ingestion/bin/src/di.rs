use anyhow::{Context, Result};
use media_ingestion_application::media_service::RefreshPolicy;
use media_ingestion_application::tasks::{standard_tasks, TaskDependencies};
use media_ingestion_application::{
    CacheManager, CacheStore, ChangeFeed, ChangeFeedFetcher, MediaProviderService,
    MediaRepository, ProviderServiceRegistry, ProviderServiceRegistryBuilder, RateLimiter,
    TaskRunRepository, TaskRunner, WaitPolicy,
};
use media_ingestion_domain::{MediaType, ProviderKind};
use media_ingestion_infrastructure::connection::RedisConnectionManagerParameters;
use media_ingestion_infrastructure::providers::{
    GoogleBooksClient, GoogleBooksConfig, GoogleBooksTransformer, HltbClient, HltbConfig,
    HltbPlaytimeEnricher, HttpSettings, IgdbClient, IgdbConfig, IgdbGameTransformer, JikanClient, JikanConfig, JikanMangaTransformer, LlmClient,
    LlmConfig, LlmGenreEnricher, TmdbChangedIds, TmdbClient, TmdbConfig, TmdbDetails,
    TmdbMediaKind, TmdbMovieTransformer, TmdbTvTransformer,
};
use media_ingestion_infrastructure::{
    InMemoryCacheStore, InMemoryRateLimiter, InMemoryTaskRunRepository, RedisCacheStore,
    RedisConnection, RedisConnectionManager, RedisRateLimiter, RedisTaskRunRepository,
    SqliteStorage,
};
use shaku::{module, HasComponent};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{info, warn};

use crate::config::{AppConfig, Backend};

module! {
    pub RedisModule {
        components = [
            RedisConnectionManager,
            RedisCacheStore,
            RedisTaskRunRepository
        ],
        providers = []
    }
}

pub fn create_redis_module(redis_url: &str) -> RedisModule {
    RedisModule::builder()
        .with_component_parameters::<RedisConnectionManager>(RedisConnectionManagerParameters {
            redis_url: redis_url.to_string(),
            connection: OnceCell::new(),
        })
        .build()
}

/// Shared state backends selected by [`Backend`].
struct SharedState {
    cache: Arc<dyn CacheStore>,
    runs: Arc<dyn TaskRunRepository>,
    redis: Option<Arc<dyn RedisConnection>>,
}

impl SharedState {
    fn new(config: &AppConfig) -> Self {
        match config.backend {
            Backend::Redis => {
                let module = create_redis_module(&config.redis_url);
                Self {
                    cache: module.resolve(),
                    runs: module.resolve(),
                    redis: Some(module.resolve()),
                }
            }
            Backend::Memory => Self {
                cache: Arc::new(InMemoryCacheStore::new()),
                runs: Arc::new(InMemoryTaskRunRepository::new()),
                redis: None,
            },
        }
    }

    fn limiter(&self, config: &AppConfig, provider: ProviderKind) -> Result<Arc<dyn RateLimiter>> {
        let budget = config
            .budget(provider)
            .with_context(|| format!("invalid rate limit for {}", provider))?;
        let policy = WaitPolicy::Block {
            max_wait: config.rate_limit_max_wait(),
        };

        Ok(match &self.redis {
            Some(redis) => Arc::new(RedisRateLimiter::new(redis.clone(), budget, policy)),
            None => Arc::new(InMemoryRateLimiter::new(budget, policy)),
        })
    }
}

pub struct App {
    pub runner: TaskRunner,
    pub providers: Arc<ProviderServiceRegistry>,
}

pub async fn build_app(config: &AppConfig) -> Result<App> {
    let shared = SharedState::new(config);

    let storage = SqliteStorage::connect(&config.database_url)
        .await
        .with_context(|| format!("failed to open {}", config.database_url))?;
    storage.migrate().await?;
    let storage = Arc::new(storage);
    let media: Arc<dyn MediaRepository> = Arc::new(storage.media_repository());

    let providers = Arc::new(build_providers(config, &shared, media).await?);
    info!(
        "Registered media types: {:?}",
        providers
            .media_types()
            .iter()
            .map(MediaType::as_str)
            .collect::<Vec<_>>()
    );

    let tasks = standard_tasks(TaskDependencies {
        providers: providers.clone(),
        activity: Arc::new(storage.activity_repository()),
        transactions: storage,
    })?;

    Ok(App {
        runner: TaskRunner::new(Arc::new(tasks), shared.runs.clone()),
        providers,
    })
}

async fn build_providers(
    config: &AppConfig,
    shared: &SharedState,
    media: Arc<dyn MediaRepository>,
) -> Result<ProviderServiceRegistry> {
    let http = HttpSettings {
        request_timeout: config.request_timeout(),
        connect_timeout: config.connect_timeout(),
    };
    let fetcher = ChangeFeedFetcher::new(CacheManager::new(shared.cache.clone()), config.feed_ttl())
        .with_page_cap(config.page_cap);
    let stale = || RefreshPolicy::Stale {
        after: config.stale_after(),
    };

    let mut builder = ProviderServiceRegistry::builder();
    builder = register_tmdb(builder, config, shared, &http, &fetcher, media.clone()).await?;

    if config.google_books_api_key.is_empty() {
        warn!("GOOGLE_BOOKS_API_KEY not set, books are disabled");
    } else {
        let books = GoogleBooksClient::create(
            &GoogleBooksConfig {
                api_key: config.google_books_api_key.clone(),
                http,
            },
            shared.limiter(config, ProviderKind::GoogleBooks)?,
        )
        .await?;
        let mut service = MediaProviderService::new(
            MediaType::Books,
            Arc::new(books),
            Arc::new(GoogleBooksTransformer),
            media.clone(),
            RefreshPolicy::Never,
        );

        if config.llm_api_key.is_empty() {
            warn!("LLM_API_KEY not set, book genres come from Google Books categories");
        } else {
            let llm = LlmClient::create(
                &LlmConfig {
                    api_key: config.llm_api_key.clone(),
                    base_url: config.llm_base_url.clone(),
                    model: config.llm_model.clone(),
                    http,
                },
                shared.limiter(config, ProviderKind::Llm)?,
            )
            .await?;
            service = service.with_enricher(Arc::new(LlmGenreEnricher::new(
                Arc::new(llm),
                config.book_genres.clone(),
            )));
        }
        builder = builder.register(service)?;
    }

    let jikan = JikanClient::create(
        &JikanConfig { http },
        shared.limiter(config, ProviderKind::Jikan)?,
    )
    .await?;
    builder = builder.register(MediaProviderService::new(
        MediaType::Manga,
        Arc::new(jikan),
        Arc::new(JikanMangaTransformer),
        media.clone(),
        stale(),
    ))?;

    if config.igdb_client_id.is_empty() || config.igdb_client_secret.is_empty() {
        warn!("IGDB_CLIENT_ID or IGDB_CLIENT_SECRET not set, games are disabled");
    } else {
        let igdb = IgdbClient::create(
            &IgdbConfig {
                client_id: config.igdb_client_id.clone(),
                client_secret: config.igdb_client_secret.clone(),
                http,
            },
            shared.limiter(config, ProviderKind::Igdb)?,
        )
        .await?;
        let mut service = MediaProviderService::new(
            MediaType::Games,
            Arc::new(igdb),
            Arc::new(IgdbGameTransformer),
            media,
            stale(),
        );
        if config.hltb_enabled {
            let hltb = HltbClient::create(
                &HltbConfig { http },
                shared.limiter(config, ProviderKind::Hltb)?,
            )?;
            service = service.with_enricher(Arc::new(HltbPlaytimeEnricher::new(Arc::new(hltb))));
        }
        builder = builder.register(service)?;
    }

    Ok(builder.build())
}

/// Movies, series and anime all come from TMDB and share one budget.
async fn register_tmdb(
    mut builder: ProviderServiceRegistryBuilder,
    config: &AppConfig,
    shared: &SharedState,
    http: &HttpSettings,
    fetcher: &ChangeFeedFetcher,
    media: Arc<dyn MediaRepository>,
) -> Result<ProviderServiceRegistryBuilder> {
    if config.tmdb_api_key.is_empty() {
        warn!("THEMOVIEDB_API_KEY not set, movies, series and anime are disabled");
        return Ok(builder);
    }

    let tmdb = Arc::new(
        TmdbClient::create(
            &TmdbConfig {
                api_key: config.tmdb_api_key.clone(),
                http: *http,
            },
            shared.limiter(config, ProviderKind::Tmdb)?,
        )
        .await?,
    );

    let feed = |kind: TmdbMediaKind| {
        let source = TmdbChangedIds::new(tmdb.clone(), kind);
        Arc::new(ChangeFeed::new(
            source.feed_key(),
            Arc::new(source),
            fetcher.clone(),
        ))
    };
    let movie_feed = feed(TmdbMediaKind::Movie);
    let tv_feed = feed(TmdbMediaKind::Tv);

    builder = builder.register(MediaProviderService::new(
        MediaType::Movies,
        Arc::new(TmdbDetails::new(tmdb.clone(), TmdbMediaKind::Movie)),
        Arc::new(TmdbMovieTransformer),
        media.clone(),
        RefreshPolicy::ChangeFeed(movie_feed),
    ))?;
    for media_type in [MediaType::Series, MediaType::Anime] {
        builder = builder.register(MediaProviderService::new(
            media_type,
            Arc::new(TmdbDetails::new(tmdb.clone(), TmdbMediaKind::Tv)),
            Arc::new(TmdbTvTransformer),
            media.clone(),
            RefreshPolicy::ChangeFeed(tv_feed.clone()),
        ))?;
    }

    Ok(builder)
}
