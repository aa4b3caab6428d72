//! Scheduler loop: once per tick, enqueue an automatic request for every
//! enabled task type whose interval has elapsed.

use crate::sync::coordinator::CoordinatorCore;
use crate::sync::registry::TaskRegistry;
use crate::sync::types::{ErrorRecord, TaskRequest, TaskType};
use chrono::{DateTime, Utc};
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Select due task types at `now`, stamp their schedule and build their
/// requests. Running or disabled types are skipped.
pub fn collect_due_requests(registry: &TaskRegistry, now: DateTime<Utc>) -> Vec<TaskRequest> {
    TaskType::ALL
        .into_iter()
        .filter_map(|task_type| {
            registry
                .update(task_type, |definition| {
                    if !definition.is_due(now) {
                        return None;
                    }
                    definition.mark_scheduled(now);
                    Some(TaskRequest::automatic(definition))
                })
                .flatten()
        })
        .collect()
}

/// One scheduler pass. Returns the number of requests enqueued.
pub(crate) async fn tick(core: &CoordinatorCore, now: DateTime<Utc>) -> usize {
    if core.is_paused() {
        debug!("Scheduler paused, skipping tick");
        return 0;
    }

    let due = collect_due_requests(&core.registry, now);
    let enqueued = due.len();

    for request in due {
        let next = core
            .registry
            .get(request.task_type)
            .and_then(|definition| definition.next_scheduled);
        core.tracker.set_next_scheduled(request.task_type, next);

        debug!("Scheduling automatic {}", request.task_type);
        core.queue.enqueue(request).await;
    }

    let next_sync = core.refresh_next_sync(now);
    if enqueued > 0 {
        info!(
            "Scheduled {} automatic task(s), next sync at {}",
            enqueued, next_sync
        );
    }
    enqueued
}

pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Runs until `cancel` fires. A faulting pass is recorded and retried after
/// the configured backoff.
pub(crate) async fn run_scheduler_loop(core: Arc<CoordinatorCore>, cancel: CancellationToken) {
    info!("Scheduler loop started (tick: {:?})", core.tick_interval);

    while !cancel.is_cancelled() {
        let pass = AssertUnwindSafe(tick(&core, Utc::now()))
            .catch_unwind()
            .await;

        let delay = match pass {
            Ok(_) => core.tick_interval,
            Err(panic) => {
                let message = format!("Scheduler loop fault: {}", panic_message(panic.as_ref()));
                error!("{}", message);
                core.report_error(ErrorRecord::new(None, message, true), false)
                    .await;
                core.loop_error_backoff
            }
        };

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(delay) => {}
        }
    }

    info!("Scheduler loop stopped");
}
