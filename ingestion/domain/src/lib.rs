pub mod change_feed;
pub mod media_type;
pub mod provider;
pub mod rate_budget;
pub mod task;

pub use change_feed::{ChangeFeedResult, DEFAULT_PAGE_CAP};
pub use media_type::{MediaType, MediaTypeError};
pub use provider::ProviderKind;
pub use rate_budget::{BudgetError, RateLimitBudget};
pub use task::{StepRecord, StepStatus, TaskReport, TaskStatus, TaskVisibility};
