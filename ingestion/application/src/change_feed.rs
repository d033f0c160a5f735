use media_ingestion_domain::{ChangeFeedResult, DEFAULT_PAGE_CAP};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::cache::{CacheError, CacheManager};
use crate::provider::{ChangedIdsSource, ProviderError};

pub const DEFAULT_FEED_TTL: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, thiserror::Error)]
pub enum ChangeFeedError {
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),
}

/// Walks a paginated change feed and caches the merged id list.
#[derive(Clone)]
pub struct ChangeFeedFetcher {
    cache: CacheManager,
    ttl: Duration,
    page_cap: u32,
}

impl ChangeFeedFetcher {
    pub fn new(cache: CacheManager, ttl: Duration) -> Self {
        Self {
            cache,
            ttl,
            page_cap: DEFAULT_PAGE_CAP,
        }
    }

    pub fn with_page_cap(mut self, page_cap: u32) -> Self {
        self.page_cap = page_cap.max(1);
        self
    }

    pub fn page_cap(&self) -> u32 {
        self.page_cap
    }

    pub async fn fetch(
        &self,
        feed_key: &str,
        source: &dyn ChangedIdsSource,
    ) -> Result<ChangeFeedResult, ChangeFeedError> {
        self.cache
            .wrap(feed_key, self.ttl, || {
                fetch_all_pages(feed_key, source, self.page_cap)
            })
            .await
    }

    pub async fn invalidate(&self, feed_key: &str) -> Result<(), ChangeFeedError> {
        Ok(self.cache.invalidate(feed_key).await?)
    }
}

async fn fetch_all_pages(
    feed_key: &str,
    source: &dyn ChangedIdsSource,
    page_cap: u32,
) -> Result<ChangeFeedResult, ChangeFeedError> {
    let mut seen = HashSet::new();
    let mut ids = Vec::new();
    let mut page = 1;
    let mut total_pages = 1;
    let mut pages_fetched = 0;

    while page <= total_pages.min(page_cap) {
        match source.changed_ids_page(page).await {
            Ok(response) => {
                ids.extend(response.ids.into_iter().filter(|id| seen.insert(*id)));
                total_pages = response.total_pages.filter(|n| *n > 0).unwrap_or(1);
                pages_fetched += 1;
                page += 1;
            }
            Err(e) if ids.is_empty() => return Err(e.into()),
            Err(e) => {
                warn!(
                    "Change feed {} failed on page {}, keeping {} ids from {} pages: {}",
                    feed_key,
                    page,
                    ids.len(),
                    pages_fetched,
                    e
                );
                return Ok(ChangeFeedResult {
                    ids,
                    pages_fetched,
                    complete: false,
                });
            }
        }
    }

    if total_pages > page_cap {
        debug!(
            "Change feed {} capped at {} of {} pages",
            feed_key, page_cap, total_pages
        );
    }

    Ok(ChangeFeedResult {
        ids,
        pages_fetched,
        complete: true,
    })
}

/// A feed key bound to the source that serves it.
pub struct ChangeFeed {
    key: String,
    source: Arc<dyn ChangedIdsSource>,
    fetcher: ChangeFeedFetcher,
}

impl ChangeFeed {
    pub fn new(
        key: impl Into<String>,
        source: Arc<dyn ChangedIdsSource>,
        fetcher: ChangeFeedFetcher,
    ) -> Self {
        Self {
            key: key.into(),
            source,
            fetcher,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub async fn changed_ids(&self) -> Result<ChangeFeedResult, ChangeFeedError> {
        self.fetcher.fetch(&self.key, self.source.as_ref()).await
    }
}
