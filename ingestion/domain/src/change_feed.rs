use serde::{Deserialize, Serialize};

/// Hard ceiling on pages walked per change-feed fetch.
pub const DEFAULT_PAGE_CAP: u32 = 20;

/// Merged ids of a paginated "what changed" feed.
///
/// `complete` is false when pagination stopped early after a failure on a
/// page past the first; the ids gathered up to that point are kept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeFeedResult {
    pub ids: Vec<i64>,
    pub pages_fetched: u32,
    pub complete: bool,
}

impl ChangeFeedResult {
    pub fn empty() -> Self {
        Self {
            ids: Vec::new(),
            pages_fetched: 0,
            complete: true,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn contains(&self, id: i64) -> bool {
        self.ids.contains(&id)
    }
}
