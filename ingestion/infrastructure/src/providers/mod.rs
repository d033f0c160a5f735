pub mod google_books;
pub mod hltb;
pub mod http;
pub mod igdb;
pub mod jikan;
pub mod llm;
pub mod tmdb;
pub mod transformers;

pub use google_books::{GoogleBooksClient, GoogleBooksConfig};
pub use hltb::{HltbClient, HltbConfig, HltbGame, HltbPlaytimeEnricher};
pub use http::{HttpSettings, RateLimitedHttp, RESULTS_PER_PAGE};
pub use igdb::{IgdbClient, IgdbConfig};
pub use jikan::{JikanClient, JikanConfig};
pub use llm::{LlmClient, LlmConfig, LlmGenreEnricher};
pub use tmdb::{TmdbChangedIds, TmdbClient, TmdbConfig, TmdbDetails, TmdbMediaKind};
pub use transformers::{
    GoogleBooksTransformer, IgdbGameTransformer, JikanMangaTransformer, TmdbMovieTransformer,
    TmdbTvTransformer,
};
