pub mod context;
pub mod definition;
pub mod definitions;
pub mod error;
pub mod runner;

pub use context::TaskContext;
pub use definition::{TaskDefinition, TaskHandler, TaskInput, TaskRegistry};
pub use error::{TaskError, TaskRunError, ValidationError};
pub use runner::TaskRunner;
pub use definitions::{
    standard_tasks, BulkMediaRefresh, EmptyInput, RefreshMedia, RefreshMediaInput,
    RemoveAllOrphansMedia, TaskDependencies, BULK_MEDIA_REFRESH, REFRESH_MEDIA,
    REMOVE_ALL_ORPHANS_MEDIA,
};
