use crate::config::{CoordinatorConfig, MemorySettings, SettingsProvider, TomlSettingsStore};
use crate::env::{keys, params};
use crate::sync::error::SyncError;
use crate::sync::events::{EventNotifier, FnEventHandler, SyncEvent, SyncEventHandler};
use crate::sync::handler::{HandlerRegistry, TaskHandler};
use crate::sync::history::ErrorHistory;
use crate::sync::queue::TaskQueue;
use crate::sync::registry::TaskRegistry;
use crate::sync::tracker::ExecutionTracker;
use crate::sync::types::*;
use crate::sync::{scheduler, worker};
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

/// State shared by the control surface, the scheduler loop and the workers
pub(crate) struct CoordinatorCore {
    pub(crate) registry: TaskRegistry,
    pub(crate) queue: TaskQueue,
    pub(crate) tracker: ExecutionTracker,
    pub(crate) history: ErrorHistory,
    pub(crate) notifier: Arc<EventNotifier>,
    pub(crate) handlers: HandlerRegistry,
    pub(crate) paused: AtomicBool,
    pub(crate) tick_interval: Duration,
    pub(crate) loop_error_backoff: Duration,
    max_sync_duration_ms: AtomicU64,
    next_sync_scheduled_ms: AtomicI64,
}

impl CoordinatorCore {
    pub(crate) fn max_sync_duration(&self) -> Duration {
        Duration::from_millis(self.max_sync_duration_ms.load(Ordering::Relaxed))
    }

    pub(crate) fn set_max_sync_duration(&self, duration: Duration) {
        let millis = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
        self.max_sync_duration_ms.store(millis, Ordering::Relaxed);
    }

    pub(crate) fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    pub(crate) fn next_sync_scheduled(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.next_sync_scheduled_ms.load(Ordering::Relaxed))
    }

    /// Recompute the coordinator-wide next run from the registry
    pub(crate) fn refresh_next_sync(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let next = self.registry.next_sync_scheduled(now);
        self.next_sync_scheduled_ms
            .store(next.timestamp_millis(), Ordering::Relaxed);
        next
    }

    /// Append to the error history and notify observers
    pub(crate) async fn report_error(&self, record: ErrorRecord, is_fatal: bool) {
        self.notifier.emit(SyncEvent::Error {
            task_type: record.task_type,
            message: record.message.clone(),
            is_fatal,
        });
        self.history.record(record).await;
    }
}

/// Handles owned while the coordinator is running
struct RunningWorkers {
    cancel: CancellationToken,
    scheduler: JoinHandle<()>,
    workers: Vec<JoinHandle<()>>,
    retries: TaskTracker,
}

/// Background synchronization coordinator.
///
/// Owns the scheduler loop and the worker pool. Construct one per process
/// and share it by reference or `Arc`.
pub struct SyncCoordinator {
    core: Arc<CoordinatorCore>,
    config: CoordinatorConfig,
    state: RwLock<CoordinatorState>,
    lifecycle: Mutex<Option<RunningWorkers>>,
}

impl SyncCoordinator {
    /// Create a coordinator and load persisted task configuration. Settings
    /// that cannot be read fall back to built-in defaults.
    pub async fn new(config: CoordinatorConfig, settings: Arc<dyn SettingsProvider>) -> Self {
        let core = Arc::new(CoordinatorCore {
            registry: TaskRegistry::new(settings),
            queue: TaskQueue::new(config.queue_ordering),
            tracker: ExecutionTracker::new(),
            history: ErrorHistory::new(config.max_error_history),
            notifier: Arc::new(EventNotifier::new()),
            handlers: HandlerRegistry::new(),
            paused: AtomicBool::new(false),
            tick_interval: config.tick_interval(),
            loop_error_backoff: config.loop_error_backoff(),
            max_sync_duration_ms: AtomicU64::new(0),
            next_sync_scheduled_ms: AtomicI64::new(0),
        });
        core.set_max_sync_duration(config.max_sync_duration());

        let coordinator = Self {
            core,
            config,
            state: RwLock::new(CoordinatorState::Stopped),
            lifecycle: Mutex::new(None),
        };
        coordinator.load_settings().await;
        coordinator
    }

    /// Create a coordinator whose settings provider is chosen by the config
    pub async fn from_config(config: CoordinatorConfig) -> Self {
        let settings: Arc<dyn SettingsProvider> = match &config.settings_path {
            Some(path) => Arc::new(TomlSettingsStore::new(path)),
            None => Arc::new(MemorySettings::new()),
        };
        Self::new(config, settings).await
    }

    async fn load_settings(&self) {
        let mut failures = self.core.registry.hydrate().await;

        let default_minutes = self.config.max_sync_duration_minutes as i64;
        match self
            .core
            .registry
            .settings()
            .get_int(keys::MAX_SYNC_DURATION, default_minutes)
            .await
        {
            Ok(minutes) if (1..=u32::MAX as i64).contains(&minutes) => {
                if minutes != default_minutes {
                    self.core
                        .set_max_sync_duration(Duration::from_secs(minutes as u64 * 60));
                }
            }
            Ok(minutes) => {
                warn!("Ignoring persisted max sync duration of {} minutes", minutes);
                failures += 1;
            }
            Err(e) => {
                warn!("Failed to load max sync duration: {}", e);
                failures += 1;
            }
        }

        if failures > 0 {
            self.core
                .report_error(
                    ErrorRecord::new(
                        None,
                        format!(
                            "{} setting(s) could not be loaded, built-in defaults used",
                            failures
                        ),
                        true,
                    ),
                    false,
                )
                .await;
        }

        self.core.refresh_next_sync(Utc::now());
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Start the scheduler loop and worker pool. No-op unless stopped.
    pub async fn start(&self) -> Result<(), SyncError> {
        let mut lifecycle = self.lifecycle.lock().await;
        let current = self.current_status();
        if !current.can_start() {
            debug!("Start ignored, coordinator is {}", current);
            return Ok(());
        }

        let cancel = CancellationToken::new();
        let retries = TaskTracker::new();
        self.core.paused.store(false, Ordering::SeqCst);

        let worker_count = self.worker_count();
        let scheduler = tokio::spawn(scheduler::run_scheduler_loop(
            self.core.clone(),
            cancel.clone(),
        ));
        let workers = (0..worker_count)
            .map(|worker_id| {
                tokio::spawn(worker::run_worker(
                    self.core.clone(),
                    worker_id,
                    cancel.clone(),
                    retries.clone(),
                ))
            })
            .collect();

        *lifecycle = Some(RunningWorkers {
            cancel,
            scheduler,
            workers,
            retries,
        });
        self.set_state(CoordinatorState::Running);

        info!("Sync coordinator started with {} workers", worker_count);
        for task_type in self.missing_handlers() {
            warn!("{} is enabled but has no registered handler", task_type);
        }
        Ok(())
    }

    /// Cancel all background work and wait for it to drain
    pub async fn stop(&self) -> Result<(), SyncError> {
        let mut lifecycle = self.lifecycle.lock().await;
        let Some(running) = lifecycle.take() else {
            debug!("Stop ignored, coordinator is {}", self.current_status());
            return Ok(());
        };

        self.set_state(CoordinatorState::Stopping);
        info!("Stopping sync coordinator...");

        running.cancel.cancel();
        running.retries.close();

        let mut join_failure: Option<SyncError> = None;
        if let Err(e) = running.scheduler.await {
            error!("Scheduler loop terminated abnormally: {}", e);
            join_failure = Some(e.into());
        }
        for handle in running.workers {
            if let Err(e) = handle.await {
                error!("Worker terminated abnormally: {}", e);
                join_failure.get_or_insert(e.into());
            }
        }
        running.retries.wait().await;
        self.core.paused.store(false, Ordering::SeqCst);

        match join_failure {
            Some(err) => {
                self.core
                    .report_error(ErrorRecord::new(None, err.to_string(), false), true)
                    .await;
                self.set_state(CoordinatorState::Error);
                Err(err)
            }
            None => {
                self.set_state(CoordinatorState::Stopped);
                info!("Sync coordinator stopped");
                Ok(())
            }
        }
    }

    /// Suspend automatic scheduling. Queued and running work continues.
    pub async fn pause(&self) -> Result<(), SyncError> {
        let _lifecycle = self.lifecycle.lock().await;
        self.require_running("pause")?;

        if !self.core.paused.swap(true, Ordering::SeqCst) {
            info!("Sync coordinator paused");
        }
        Ok(())
    }

    /// Resume automatic scheduling on the next tick
    pub async fn resume(&self) -> Result<(), SyncError> {
        let _lifecycle = self.lifecycle.lock().await;
        self.require_running("resume")?;

        if self.core.paused.swap(false, Ordering::SeqCst) {
            self.core.queue.nudge(self.worker_count());
            info!("Sync coordinator resumed");
        }
        Ok(())
    }

    fn require_running(&self, operation: &'static str) -> Result<(), SyncError> {
        match self.current_status() {
            CoordinatorState::Running => Ok(()),
            from => Err(SyncError::InvalidTransition { from, operation }),
        }
    }

    fn set_state(&self, new_status: CoordinatorState) {
        let old_status = {
            let mut state = self
                .state
                .write()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            std::mem::replace(&mut *state, new_status)
        };

        if old_status != new_status {
            self.core.notifier.emit(SyncEvent::StatusChanged {
                old_status,
                new_status,
            });
        }
    }

    // ------------------------------------------------------------------
    // Manual triggers
    // ------------------------------------------------------------------

    /// Enqueue a manual run of any task type at its configured priority
    pub async fn trigger_task(
        &self,
        task_type: TaskType,
        parameters: TaskParameters,
    ) -> Result<RequestId, SyncError> {
        let priority = self
            .core
            .registry
            .get(task_type)
            .map(|definition| definition.priority)
            .ok_or_else(|| SyncError::UnknownTaskType(task_type.to_string()))?;

        self.enqueue_manual(
            TaskRequest::manual(task_type, priority).with_parameters(parameters),
        )
        .await
    }

    pub async fn trigger_feed_sync(&self) -> Result<RequestId, SyncError> {
        self.enqueue_manual(TaskRequest::manual(TaskType::FeedUpdate, TaskPriority::High))
            .await
    }

    pub async fn trigger_single_feed_sync(&self, feed_id: i64) -> Result<RequestId, SyncError> {
        let request = TaskRequest::manual(TaskType::FeedUpdate, TaskPriority::High)
            .with_parameter(params::FEED_ID, serde_json::Value::from(feed_id));
        self.enqueue_manual(request).await
    }

    pub async fn trigger_cleanup_sync(&self) -> Result<RequestId, SyncError> {
        self.enqueue_manual(TaskRequest::manual(TaskType::ArticleCleanup, TaskPriority::Low))
            .await
    }

    pub async fn trigger_tag_processing_sync(&self) -> Result<RequestId, SyncError> {
        self.enqueue_manual(TaskRequest::manual(
            TaskType::TagProcessing,
            TaskPriority::Medium,
        ))
        .await
    }

    pub async fn trigger_backup_sync(&self) -> Result<RequestId, SyncError> {
        self.enqueue_manual(TaskRequest::manual(TaskType::BackupCreation, TaskPriority::Low))
            .await
    }

    pub async fn trigger_full_sync(&self) -> Result<RequestId, SyncError> {
        self.enqueue_manual(TaskRequest::manual(TaskType::FullSync, TaskPriority::Critical))
            .await
    }

    async fn enqueue_manual(&self, request: TaskRequest) -> Result<RequestId, SyncError> {
        let id = request.id;
        info!(
            "Manual {} requested (priority {:?})",
            request.task_type, request.priority
        );
        self.core.queue.enqueue(request).await;
        Ok(id)
    }

    // ------------------------------------------------------------------
    // Configuration
    // ------------------------------------------------------------------

    pub async fn configure_task(
        &self,
        task_type: TaskType,
        enabled: bool,
    ) -> Result<(), SyncError> {
        self.core.registry.configure_task(task_type, enabled).await?;
        self.core.refresh_next_sync(Utc::now());
        Ok(())
    }

    pub async fn configure_task_interval(
        &self,
        task_type: TaskType,
        minutes: u32,
    ) -> Result<(), SyncError> {
        self.core
            .registry
            .configure_interval(task_type, minutes)
            .await?;

        let next = self
            .core
            .registry
            .get(task_type)
            .and_then(|definition| definition.next_scheduled);
        self.core.tracker.set_next_scheduled(task_type, next);
        self.core.refresh_next_sync(Utc::now());
        Ok(())
    }

    pub fn configure_task_retry(
        &self,
        task_type: TaskType,
        max_retries: u32,
        retry_delay_minutes: u32,
    ) -> Result<(), SyncError> {
        self.core
            .registry
            .configure_retry(task_type, max_retries, retry_delay_minutes)
    }

    pub fn configure_task_priority(
        &self,
        task_type: TaskType,
        priority: TaskPriority,
    ) -> Result<(), SyncError> {
        self.core.registry.configure_priority(task_type, priority)
    }

    /// Set the per-execution timeout and persist it. Applies to executions
    /// started after the call.
    pub async fn set_max_sync_duration(&self, minutes: u32) -> Result<(), SyncError> {
        if minutes == 0 {
            return Err(SyncError::InvalidInterval(minutes));
        }

        self.core
            .set_max_sync_duration(Duration::from_secs(minutes as u64 * 60));
        self.core
            .registry
            .settings()
            .set_int(keys::MAX_SYNC_DURATION, minutes as i64)
            .await?;

        info!("Max sync duration set to {} minutes", minutes);
        Ok(())
    }

    pub fn register_handler(&self, task_type: TaskType, handler: Arc<dyn TaskHandler>) {
        if self.core.handlers.register(task_type, handler).is_some() {
            debug!("Replaced handler for {}", task_type);
        }
    }

    pub fn subscribe(&self, handler: Arc<dyn SyncEventHandler + Send + Sync>) {
        self.core.notifier.subscribe(handler);
    }

    pub fn subscribe_fn<F>(&self, f: F)
    where
        F: Fn(&SyncEvent) + Send + Sync + 'static,
    {
        self.core.notifier.subscribe(Arc::new(FnEventHandler(f)));
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    pub fn current_status(&self) -> CoordinatorState {
        *self
            .state
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn is_paused(&self) -> bool {
        self.core.is_paused()
    }

    /// Whether any handler invocation is in flight
    pub fn is_synchronizing(&self) -> bool {
        self.core.tracker.active_runs() > 0
    }

    pub fn last_sync_completed(&self) -> Option<DateTime<Utc>> {
        self.core.tracker.last_sync_completed()
    }

    pub fn next_sync_scheduled(&self) -> Option<DateTime<Utc>> {
        self.core.next_sync_scheduled()
    }

    pub fn statistics(&self) -> SyncStatistics {
        self.core.tracker.statistics()
    }

    pub fn reset_statistics(&self) {
        self.core.tracker.reset();
    }

    pub fn task_statuses(&self) -> Vec<TaskDefinition> {
        self.core.registry.all()
    }

    /// Enabled task types that would fail for lack of a handler
    pub fn missing_handlers(&self) -> Vec<TaskType> {
        self.core
            .registry
            .all()
            .into_iter()
            .filter(|definition| definition.enabled)
            .map(|definition| definition.task_type)
            .filter(|task_type| !self.core.handlers.contains(*task_type))
            .collect()
    }

    pub fn task_execution_info(&self, task_type: TaskType) -> Option<ExecutionInfo> {
        self.core.tracker.get(task_type)
    }

    pub fn all_execution_info(&self) -> Vec<ExecutionInfo> {
        self.core.tracker.all()
    }

    /// Up to `max` recent errors, newest first
    pub async fn recent_errors(&self, max: usize) -> Vec<ErrorRecord> {
        self.core.history.recent(max).await
    }

    pub async fn clear_error_history(&self) {
        self.core.history.clear().await;
        debug!("Error history cleared");
    }

    pub async fn pending_requests(&self) -> Vec<TaskRequest> {
        self.core.queue.snapshot().await
    }

    pub async fn queue_len(&self) -> usize {
        self.core.queue.len().await
    }

    pub fn max_sync_duration(&self) -> Duration {
        self.core.max_sync_duration()
    }

    pub fn worker_count(&self) -> usize {
        self.config.effective_worker_count()
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    #[cfg(test)]
    pub(crate) fn core(&self) -> &Arc<CoordinatorCore> {
        &self.core
    }
}

impl Drop for SyncCoordinator {
    fn drop(&mut self) {
        if let Some(running) = self.lifecycle.get_mut().as_ref() {
            warn!("Sync coordinator dropped while running, cancelling background work");
            running.cancel.cancel();
        }
    }
}
