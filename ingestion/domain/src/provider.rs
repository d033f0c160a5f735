use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::rate_budget::{BudgetError, RateLimitBudget};

/// External metadata sources. Each one owns its own rate budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    Tmdb,
    GoogleBooks,
    Jikan,
    Igdb,
    Hltb,
    Llm,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Tmdb => "tmdb",
            ProviderKind::GoogleBooks => "google_books",
            ProviderKind::Jikan => "jikan",
            ProviderKind::Igdb => "igdb",
            ProviderKind::Hltb => "hltb",
            ProviderKind::Llm => "llm",
        }
    }

    /// Identifier every caller of this provider consumes points under.
    pub fn consume_key(&self) -> &'static str {
        match self {
            ProviderKind::Tmdb => "tmdb-API",
            ProviderKind::GoogleBooks => "gBooks-API",
            ProviderKind::Jikan => "jikan-API",
            ProviderKind::Igdb => "igdb-API",
            ProviderKind::Hltb => "hltb-API",
            ProviderKind::Llm => "llm-API",
        }
    }

    pub fn key_prefix(&self) -> &'static str {
        match self {
            ProviderKind::Tmdb => "tmdbAPI",
            ProviderKind::GoogleBooks => "gBooksAPI",
            ProviderKind::Jikan => "jikanAPI",
            ProviderKind::Igdb => "igdbAPI",
            ProviderKind::Hltb => "hltbAPI",
            ProviderKind::Llm => "llmAPI",
        }
    }

    /// (points, window) published by the upstream service.
    pub fn default_limits(&self) -> (u32, Duration) {
        match self {
            ProviderKind::Tmdb => (30, Duration::from_secs(1)),
            ProviderKind::GoogleBooks => (4, Duration::from_secs(1)),
            ProviderKind::Jikan => (3, Duration::from_secs(1)),
            ProviderKind::Igdb => (4, Duration::from_secs(1)),
            ProviderKind::Hltb => (1, Duration::from_secs(1)),
            ProviderKind::Llm => (10, Duration::from_secs(60)),
        }
    }

    pub fn budget(&self, points: u32, window: Duration) -> Result<RateLimitBudget, BudgetError> {
        RateLimitBudget::new(self.key_prefix(), points, window)
    }

    pub fn default_budget(&self) -> Result<RateLimitBudget, BudgetError> {
        let (points, window) = self.default_limits();
        self.budget(points, window)
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
