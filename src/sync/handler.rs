use crate::sync::events::{EventNotifier, SyncEvent};
use crate::sync::types::{RequestId, TaskOutput, TaskParameters, TaskType};
use anyhow::Result;
use async_trait::async_trait;
use dashmap::DashMap;
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Fires progress events on behalf of a running handler
#[derive(Clone, Debug)]
pub struct ProgressReporter {
    task_type: TaskType,
    notifier: Arc<EventNotifier>,
}

impl ProgressReporter {
    pub fn new(task_type: TaskType, notifier: Arc<EventNotifier>) -> Self {
        Self {
            task_type,
            notifier,
        }
    }

    pub fn report(&self, stage: impl Into<String>, current: u64, total: u64) {
        self.notifier.emit(SyncEvent::Progress {
            task_type: self.task_type,
            stage: stage.into(),
            current,
            total,
        });
    }
}

/// Everything a handler gets for one invocation
#[derive(Clone, Debug)]
pub struct TaskContext {
    pub task_type: TaskType,
    pub request_id: RequestId,
    pub parameters: TaskParameters,
    /// 0 for the first attempt
    pub attempt: u32,
    /// Cancelled on timeout or coordinator stop
    pub cancel: CancellationToken,
    pub progress: ProgressReporter,
}

impl TaskContext {
    pub fn parameter_i64(&self, key: &str) -> Option<i64> {
        self.parameters.get(key).and_then(serde_json::Value::as_i64)
    }
}

/// The job behind a task type, supplied by the surrounding application
#[async_trait]
pub trait TaskHandler: Send + Sync {
    async fn execute(&self, context: TaskContext) -> Result<TaskOutput>;
}

/// Adapter turning an async closure into a handler
pub struct FnTaskHandler<F>(F);

#[async_trait]
impl<F, Fut> TaskHandler for FnTaskHandler<F>
where
    F: Fn(TaskContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<TaskOutput>> + Send + 'static,
{
    async fn execute(&self, context: TaskContext) -> Result<TaskOutput> {
        (self.0)(context).await
    }
}

/// Wrap an async closure as a shareable handler
pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn TaskHandler>
where
    F: Fn(TaskContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<TaskOutput>> + Send + 'static,
{
    Arc::new(FnTaskHandler(f))
}

/// Handler that only logs the invocation. Used by the daemon binary when no
/// application services are wired in.
pub struct NoopHandler;

#[async_trait]
impl TaskHandler for NoopHandler {
    async fn execute(&self, context: TaskContext) -> Result<TaskOutput> {
        info!(
            "No handler wired for {}, request {} acknowledged",
            context.task_type, context.request_id
        );
        Ok(TaskOutput::success())
    }
}

/// Task type to handler lookup
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: DashMap<TaskType, Arc<dyn TaskHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler, returning the one it replaced
    pub fn register(
        &self,
        task_type: TaskType,
        handler: Arc<dyn TaskHandler>,
    ) -> Option<Arc<dyn TaskHandler>> {
        self.handlers.insert(task_type, handler)
    }

    pub fn get(&self, task_type: TaskType) -> Option<Arc<dyn TaskHandler>> {
        self.handlers.get(&task_type).map(|entry| entry.value().clone())
    }

    pub fn contains(&self, task_type: TaskType) -> bool {
        self.handlers.contains_key(&task_type)
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut registered: Vec<_> = self.handlers.iter().map(|e| *e.key()).collect();
        registered.sort();
        f.debug_struct("HandlerRegistry")
            .field("registered", &registered)
            .finish()
    }
}
