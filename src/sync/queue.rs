use crate::config::QueueOrdering;
use crate::sync::types::TaskRequest;
use std::collections::VecDeque;
use tokio::sync::{Mutex, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Unbounded task queue. A counting semaphore tracks how many requests are
/// available so idle workers block instead of polling.
#[derive(Debug)]
pub struct TaskQueue {
    ordering: QueueOrdering,
    pending: Mutex<VecDeque<TaskRequest>>,
    available: Semaphore,
}

impl TaskQueue {
    pub fn new(ordering: QueueOrdering) -> Self {
        Self {
            ordering,
            pending: Mutex::new(VecDeque::new()),
            available: Semaphore::new(0),
        }
    }

    pub fn ordering(&self) -> QueueOrdering {
        self.ordering
    }

    pub async fn enqueue(&self, request: TaskRequest) {
        {
            let mut pending = self.pending.lock().await;
            debug!(
                "Enqueued {} request {} (manual: {}, priority: {:?}, retry: {})",
                request.task_type,
                request.id,
                request.is_manual,
                request.priority,
                request.retry_count
            );

            match self.ordering {
                QueueOrdering::Fifo => pending.push_back(request),
                QueueOrdering::Priority => {
                    // Insert after the last request of equal or higher priority
                    let position = pending
                        .iter()
                        .position(|queued| queued.priority < request.priority)
                        .unwrap_or(pending.len());
                    pending.insert(position, request);
                }
            }
        }
        self.available.add_permits(1);
    }

    /// Wait until a request is available or `cancel` fires
    pub async fn dequeue(&self, cancel: &CancellationToken) -> Option<TaskRequest> {
        loop {
            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => return None,
                permit = self.available.acquire() => permit.ok()?,
            };
            permit.forget();

            // A wake-up nudge carries no request; wait again
            if let Some(request) = self.pending.lock().await.pop_front() {
                return Some(request);
            }
        }
    }

    /// Take a request without waiting
    pub async fn try_dequeue(&self) -> Option<TaskRequest> {
        let permit = self.available.try_acquire().ok()?;
        permit.forget();
        self.pending.lock().await.pop_front()
    }

    /// Wake up to `count` waiting workers so they re-check the queue
    pub fn nudge(&self, count: usize) {
        self.available.add_permits(count);
    }

    pub async fn len(&self) -> usize {
        self.pending.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.pending.lock().await.is_empty()
    }

    /// Copy of the pending requests in dequeue order
    pub async fn snapshot(&self) -> Vec<TaskRequest> {
        self.pending.lock().await.iter().cloned().collect()
    }
}
