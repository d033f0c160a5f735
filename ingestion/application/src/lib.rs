pub mod cache;
pub mod change_feed;
pub mod media_service;
pub mod provider;
pub mod rate_limiter;
pub mod registry;
pub mod repositories;
pub mod task_state;
pub mod tasks;
pub mod transaction;

pub use cache::{CacheError, CacheManager, CacheStore};
pub use change_feed::{ChangeFeed, ChangeFeedError, ChangeFeedFetcher};
pub use media_service::{BulkRefreshIds, MediaProviderService, MediaServiceError, RefreshPolicy};
pub use provider::{
    ChangedIdsSource, ChangesPage, DetailsSource, DetailsTransformer, MediaRecord, ProviderError,
    RecordEnricher, TransformError,
};
pub use rate_limiter::{RateDecision, RateLimiter, RateLimiterError, WaitPolicy};
pub use registry::{ProviderServiceRegistry, ProviderServiceRegistryBuilder};
pub use repositories::{MediaActivityRepository, MediaRepository, RepositoryError};
pub use task_state::{ClaimOutcome, RunId, TaskRunRepository, TaskRunState, TaskRunStateError};
pub use tasks::{
    TaskContext, TaskDefinition, TaskError, TaskHandler, TaskRegistry, TaskRunError, TaskRunner,
    ValidationError,
};
pub use transaction::{
    with_transaction, Transaction, TransactionContext, TransactionError, TransactionGuard,
    TransactionManager,
};
