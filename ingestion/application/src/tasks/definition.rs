use async_trait::async_trait;
use media_ingestion_domain::TaskVisibility;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::any::Any;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;

use super::context::TaskContext;
use super::error::{TaskError, TaskRunError, ValidationError};

/// A named unit of maintenance work with a typed input.
///
/// Input is deserialized from JSON before the handler runs, so schema
/// rules (`#[serde(deny_unknown_fields)]`, required fields) are enforced
/// with no side effects.
#[async_trait]
pub trait TaskHandler: Send + Sync + 'static {
    type Input: DeserializeOwned + Send + 'static;

    async fn handle(&self, ctx: &TaskContext, input: Self::Input) -> Result<(), TaskError>;
}

/// Validated, type-erased handler input.
pub struct TaskInput(Box<dyn Any + Send>);

#[async_trait]
trait ErasedHandler: Send + Sync {
    fn validate(&self, raw: Value) -> Result<TaskInput, serde_json::Error>;
    async fn invoke(&self, ctx: &TaskContext, input: TaskInput) -> Result<(), TaskError>;
}

struct Typed<H: TaskHandler> {
    handler: H,
    _input: PhantomData<fn() -> H::Input>,
}

#[async_trait]
impl<H: TaskHandler> ErasedHandler for Typed<H> {
    fn validate(&self, raw: Value) -> Result<TaskInput, serde_json::Error> {
        let input: H::Input = serde_json::from_value(raw)?;
        Ok(TaskInput(Box::new(input)))
    }

    async fn invoke(&self, ctx: &TaskContext, input: TaskInput) -> Result<(), TaskError> {
        let input = input
            .0
            .downcast::<H::Input>()
            .map_err(|_| TaskError::Failed("task input has the wrong type".to_string()))?;
        self.handler.handle(ctx, *input).await
    }
}

#[derive(Clone)]
pub struct TaskDefinition {
    name: &'static str,
    description: &'static str,
    visibility: TaskVisibility,
    exclusive: bool,
    handler: Arc<dyn ErasedHandler>,
}

impl TaskDefinition {
    /// Exclusive by default: at most one live run per task name.
    pub fn new<H: TaskHandler>(
        name: &'static str,
        description: &'static str,
        visibility: TaskVisibility,
        handler: H,
    ) -> Self {
        Self {
            name,
            description,
            visibility,
            exclusive: true,
            handler: Arc::new(Typed {
                handler,
                _input: PhantomData,
            }),
        }
    }

    pub fn exclusive(mut self, exclusive: bool) -> Self {
        self.exclusive = exclusive;
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn description(&self) -> &'static str {
        self.description
    }

    pub fn visibility(&self) -> TaskVisibility {
        self.visibility
    }

    pub fn is_exclusive(&self) -> bool {
        self.exclusive
    }

    /// `null` is treated as an empty object.
    pub fn validate(&self, raw: Value) -> Result<TaskInput, ValidationError> {
        let raw = match raw {
            Value::Null => Value::Object(Default::default()),
            other => other,
        };
        self.handler.validate(raw).map_err(|e| ValidationError {
            task: self.name.to_string(),
            message: e.to_string(),
        })
    }

    pub(crate) async fn invoke(&self, ctx: &TaskContext, input: TaskInput) -> Result<(), TaskError> {
        self.handler.invoke(ctx, input).await
    }
}

impl std::fmt::Debug for TaskDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskDefinition")
            .field("name", &self.name)
            .field("visibility", &self.visibility)
            .field("exclusive", &self.exclusive)
            .finish()
    }
}

#[derive(Default)]
pub struct TaskRegistry {
    tasks: HashMap<&'static str, TaskDefinition>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, definition: TaskDefinition) -> Result<(), TaskRunError> {
        if self.tasks.contains_key(definition.name()) {
            return Err(TaskRunError::DuplicateTask(definition.name().to_string()));
        }
        self.tasks.insert(definition.name(), definition);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&TaskDefinition> {
        self.tasks.get(name)
    }

    /// Definitions sorted by name.
    pub fn definitions(&self) -> Vec<&TaskDefinition> {
        let mut definitions: Vec<_> = self.tasks.values().collect();
        definitions.sort_by_key(|d| d.name());
        definitions
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}
