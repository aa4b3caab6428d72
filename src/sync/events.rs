use crate::sync::types::{CoordinatorState, TaskResults, TaskType};
use anyhow::Result;
use chrono::{DateTime, Utc};
use std::sync::{Arc, RwLock};
use tracing::{debug, error, info, warn};

/// Events emitted by the coordinator
#[derive(Debug, Clone)]
pub enum SyncEvent {
    StatusChanged {
        old_status: CoordinatorState,
        new_status: CoordinatorState,
    },
    TaskStarted {
        task_type: TaskType,
        started_at: DateTime<Utc>,
    },
    TaskCompleted {
        task_type: TaskType,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
        success: bool,
        error: Option<String>,
        results: TaskResults,
    },
    Error {
        task_type: Option<TaskType>,
        message: String,
        /// Advisory only
        is_fatal: bool,
    },
    Progress {
        task_type: TaskType,
        stage: String,
        current: u64,
        total: u64,
    },
}

/// Observer for coordinator events
pub trait SyncEventHandler {
    fn handle_event(&self, event: &SyncEvent) -> Result<()>;
}

/// Adapter turning a closure into an event handler
pub struct FnEventHandler<F>(pub F);

impl<F> SyncEventHandler for FnEventHandler<F>
where
    F: Fn(&SyncEvent) + Send + Sync,
{
    fn handle_event(&self, event: &SyncEvent) -> Result<()> {
        (self.0)(event);
        Ok(())
    }
}

type SharedHandler = Arc<dyn SyncEventHandler + Send + Sync>;

/// Append-only list of observers, invoked synchronously in registration order
#[derive(Default)]
pub struct EventNotifier {
    handlers: RwLock<Vec<SharedHandler>>,
}

impl EventNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, handler: SharedHandler) {
        self.handlers
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(handler);
    }

    pub fn subscriber_count(&self) -> usize {
        self.handlers
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    /// Deliver an event to every handler. Handler failures are logged, never propagated.
    pub fn emit(&self, event: SyncEvent) {
        let handlers = self
            .handlers
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone();

        for handler in handlers {
            if let Err(e) = handler.handle_event(&event) {
                error!("Event handler error: {}", e);
            }
        }
    }
}

impl std::fmt::Debug for EventNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventNotifier")
            .field("handlers", &self.subscriber_count())
            .finish()
    }
}

/// Simple event handler that logs events
pub struct LoggingEventHandler;

impl SyncEventHandler for LoggingEventHandler {
    fn handle_event(&self, event: &SyncEvent) -> Result<()> {
        match event {
            SyncEvent::StatusChanged {
                old_status,
                new_status,
            } => {
                info!("Coordinator status: {} -> {}", old_status, new_status);
            }
            SyncEvent::TaskStarted { task_type, .. } => {
                info!("Task started: {}", task_type);
            }
            SyncEvent::TaskCompleted {
                task_type,
                started_at,
                finished_at,
                success,
                error,
                ..
            } => {
                let elapsed_ms = finished_at.signed_duration_since(*started_at).num_milliseconds();
                if *success {
                    info!("Task completed: {} in {}ms", task_type, elapsed_ms);
                } else {
                    warn!(
                        "Task failed: {} after {}ms - {}",
                        task_type,
                        elapsed_ms,
                        error.as_deref().unwrap_or("unknown error")
                    );
                }
            }
            SyncEvent::Error {
                task_type,
                message,
                is_fatal,
            } => match task_type {
                Some(task_type) => error!(
                    "Sync error in {} (fatal: {}): {}",
                    task_type, is_fatal, message
                ),
                None => error!("Coordinator error (fatal: {}): {}", is_fatal, message),
            },
            SyncEvent::Progress {
                task_type,
                stage,
                current,
                total,
            } => {
                debug!("{} progress: {} {}/{}", task_type, stage, current, total);
            }
        }
        Ok(())
    }
}
