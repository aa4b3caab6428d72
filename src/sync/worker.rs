//! Worker pool: each worker drains the shared queue and executes one
//! request at a time under the coordinator's execution timeout.

use crate::sync::coordinator::CoordinatorCore;
use crate::sync::events::SyncEvent;
use crate::sync::handler::{ProgressReporter, TaskContext, TaskHandler};
use crate::sync::scheduler::panic_message;
use crate::sync::tracker::RunRecord;
use crate::sync::types::{ErrorRecord, TaskOutput, TaskRequest, TaskResults, TaskStatus};
use chrono::Utc;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

/// How one handler invocation ended
#[derive(Debug)]
pub enum ExecutionOutcome {
    Succeeded(TaskOutput),
    /// The handler returned an error or reported `success = false`
    Failed {
        message: String,
        stack_trace: Option<String>,
        output: Option<TaskOutput>,
    },
    TimedOut(Duration),
    /// The coordinator was stopped mid-execution
    Cancelled,
    Panicked(String),
    NoHandler,
}

impl ExecutionOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ExecutionOutcome::Succeeded(_))
    }

    /// Whether the retry policy applies to this outcome
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ExecutionOutcome::Failed { .. }
                | ExecutionOutcome::TimedOut(_)
                | ExecutionOutcome::Panicked(_)
        )
    }

    pub fn error_message(&self) -> Option<String> {
        match self {
            ExecutionOutcome::Succeeded(_) => None,
            ExecutionOutcome::Failed { message, .. } => Some(message.clone()),
            ExecutionOutcome::TimedOut(limit) => {
                Some(format!("Execution cancelled after exceeding {:?}", limit))
            }
            ExecutionOutcome::Cancelled => {
                Some("Execution cancelled by coordinator shutdown".to_string())
            }
            ExecutionOutcome::Panicked(message) => Some(format!("Handler panicked: {}", message)),
            ExecutionOutcome::NoHandler => Some("No handler registered".to_string()),
        }
    }

    fn output(&self) -> Option<&TaskOutput> {
        match self {
            ExecutionOutcome::Succeeded(output) => Some(output),
            ExecutionOutcome::Failed { output, .. } => output.as_ref(),
            _ => None,
        }
    }
}

/// Invoke a handler, bounded by `timeout` and by the context's cancellation token.
/// On timeout the token is cancelled so cooperative handlers can stop side work.
pub async fn run_handler(
    handler: Arc<dyn TaskHandler>,
    context: TaskContext,
    timeout: Duration,
) -> ExecutionOutcome {
    let cancel = context.cancel.clone();
    let invocation = AssertUnwindSafe(handler.execute(context)).catch_unwind();

    tokio::select! {
        biased;
        _ = cancel.cancelled() => ExecutionOutcome::Cancelled,
        result = tokio::time::timeout(timeout, invocation) => match result {
            Err(_) => {
                cancel.cancel();
                ExecutionOutcome::TimedOut(timeout)
            }
            Ok(Err(panic)) => ExecutionOutcome::Panicked(panic_message(panic.as_ref())),
            Ok(Ok(Ok(output))) if output.success => ExecutionOutcome::Succeeded(output),
            Ok(Ok(Ok(output))) => ExecutionOutcome::Failed {
                message: output
                    .message
                    .clone()
                    .unwrap_or_else(|| "Task reported failure".to_string()),
                stack_trace: None,
                output: Some(output),
            },
            Ok(Ok(Err(e))) => ExecutionOutcome::Failed {
                message: e.to_string(),
                stack_trace: Some(format!("{:?}", e)),
                output: None,
            },
        }
    }
}

pub(crate) async fn run_worker(
    core: Arc<CoordinatorCore>,
    worker_id: usize,
    cancel: CancellationToken,
    retries: TaskTracker,
) {
    debug!("Worker {} started", worker_id);

    while let Some(request) = core.queue.dequeue(&cancel).await {
        debug!(
            "Worker {} picked up {} request {}",
            worker_id, request.task_type, request.id
        );
        execute_request(&core, request, &cancel, &retries).await;
    }

    debug!("Worker {} stopped", worker_id);
}

/// Execute one request and apply its outcome to status, statistics, error
/// history and the retry policy
pub(crate) async fn execute_request(
    core: &Arc<CoordinatorCore>,
    request: TaskRequest,
    cancel: &CancellationToken,
    retries: &TaskTracker,
) {
    let task_type = request.task_type;
    let started_at = Utc::now();

    let Some(definition) = core.registry.update(task_type, |definition| {
        definition.current_status = TaskStatus::Running;
        definition.current_run_start = Some(started_at);
        definition.clone()
    }) else {
        error!("Dropping request {} for unregistered task type", request.id);
        return;
    };

    core.tracker.record_start(task_type, started_at);
    core.notifier.emit(SyncEvent::TaskStarted {
        task_type,
        started_at,
    });
    info!(
        "Executing {} (manual: {}, attempt {})",
        task_type,
        request.is_manual,
        request.retry_count + 1
    );

    let outcome = match core.handlers.get(task_type) {
        Some(handler) => {
            let context = TaskContext {
                task_type,
                request_id: request.id,
                parameters: request.parameters.clone(),
                attempt: request.retry_count,
                cancel: cancel.child_token(),
                progress: ProgressReporter::new(task_type, core.notifier.clone()),
            };
            run_handler(handler, context, core.max_sync_duration()).await
        }
        None => ExecutionOutcome::NoHandler,
    };

    let finished_at = Utc::now();
    let error_message = outcome.error_message();
    core.tracker.record_finish(RunRecord {
        task_type,
        started_at,
        finished_at,
        success: outcome.is_success(),
        error: error_message.as_deref(),
        output: outcome.output(),
    });

    let results = outcome
        .output()
        .map(|output| output.results.clone())
        .unwrap_or_else(TaskResults::new);

    match &outcome {
        ExecutionOutcome::Succeeded(_) => {
            core.registry.update(task_type, |definition| {
                definition.current_status = TaskStatus::Completed;
                definition.current_run_start = None;
                if !request.is_manual {
                    definition.mark_scheduled(finished_at);
                }
            });
            if !request.is_manual {
                let next = core
                    .registry
                    .get(task_type)
                    .and_then(|definition| definition.next_scheduled);
                core.tracker.set_next_scheduled(task_type, next);
                core.refresh_next_sync(finished_at);
            }
            info!("Completed {} in {:?}", task_type, finished_at - started_at);
        }
        ExecutionOutcome::Cancelled => {
            core.registry.update(task_type, |definition| {
                definition.current_status = TaskStatus::Idle;
                definition.current_run_start = None;
            });
            warn!("Execution of {} cancelled by shutdown", task_type);
            let message = error_message.clone().unwrap_or_default();
            core.report_error(ErrorRecord::new(Some(task_type), message, true), false)
                .await;
        }
        failure => {
            core.registry.update(task_type, |definition| {
                definition.current_status = TaskStatus::Failed;
                definition.current_run_start = None;
            });

            let message = error_message.clone().unwrap_or_default();
            if let ExecutionOutcome::TimedOut(_) = failure {
                warn!("{}: {}", task_type, message);
            } else {
                error!("{} failed: {}", task_type, message);
            }

            let mut record = ErrorRecord::new(Some(task_type), message, failure.is_retryable());
            if let ExecutionOutcome::Failed {
                stack_trace: Some(trace),
                ..
            } = failure
            {
                record = record.with_stack_trace(trace.clone());
            }
            core.report_error(record, false).await;
        }
    }

    core.notifier.emit(SyncEvent::TaskCompleted {
        task_type,
        started_at,
        finished_at,
        success: outcome.is_success(),
        error: error_message,
        results,
    });

    if outcome.is_retryable() {
        if request.retry_count < definition.max_retries {
            schedule_retry(core, request, definition.retry_delay_minutes, cancel, retries).await;
        } else {
            warn!(
                "Dropping {} request {} after {} attempt(s)",
                task_type,
                request.id,
                request.retry_count + 1
            );
        }
    }
}

/// Re-enqueue a failed request once its retry delay has elapsed
async fn schedule_retry(
    core: &Arc<CoordinatorCore>,
    mut request: TaskRequest,
    retry_delay_minutes: u32,
    cancel: &CancellationToken,
    retries: &TaskTracker,
) {
    let delay = Duration::from_secs(retry_delay_minutes as u64 * 60);
    request.retry_count += 1;
    request.retry_at = Some(Utc::now() + chrono::Duration::minutes(retry_delay_minutes as i64));

    warn!(
        "Retrying {} (retry {}) in {} minute(s)",
        request.task_type, request.retry_count, retry_delay_minutes
    );

    if delay.is_zero() {
        core.queue.enqueue(request).await;
        return;
    }

    let core = core.clone();
    let cancel = cancel.clone();
    retries.spawn(async move {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!(
                    "Retry of {} request {} abandoned on shutdown",
                    request.task_type, request.id
                );
            }
            _ = tokio::time::sleep(delay) => core.queue.enqueue(request).await,
        }
    });
}
