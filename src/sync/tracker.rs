use crate::env::results;
use crate::sync::types::{ExecutionInfo, SyncStatistics, TaskOutput, TaskType};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::atomic::{AtomicI64, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

const NO_TIMESTAMP: i64 = i64::MIN;

/// Result of one finished execution as seen by the tracker
#[derive(Debug, Clone, Copy)]
pub struct RunRecord<'a> {
    pub task_type: TaskType,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub success: bool,
    pub error: Option<&'a str>,
    pub output: Option<&'a TaskOutput>,
}

impl RunRecord<'_> {
    pub fn duration(&self) -> Duration {
        self.finished_at
            .signed_duration_since(self.started_at)
            .to_std()
            .unwrap_or_default()
    }
}

/// Coordinator-wide counters, updated lock-free by concurrent workers
#[derive(Debug)]
pub struct CoordinatorStatistics {
    total_sync_cycles: AtomicU64,
    successful_syncs: AtomicU64,
    failed_syncs: AtomicU64,
    total_sync_time_micros: AtomicU64,
    feeds_updated: AtomicU64,
    tags_applied: AtomicU64,
    last_sync_completed_ms: AtomicI64,
}

impl Default for CoordinatorStatistics {
    fn default() -> Self {
        Self {
            total_sync_cycles: AtomicU64::new(0),
            successful_syncs: AtomicU64::new(0),
            failed_syncs: AtomicU64::new(0),
            total_sync_time_micros: AtomicU64::new(0),
            feeds_updated: AtomicU64::new(0),
            tags_applied: AtomicU64::new(0),
            last_sync_completed_ms: AtomicI64::new(NO_TIMESTAMP),
        }
    }
}

impl CoordinatorStatistics {
    fn record(&self, run: &RunRecord<'_>) {
        self.total_sync_cycles.fetch_add(1, Ordering::Relaxed);
        let micros = u64::try_from(run.duration().as_micros()).unwrap_or(u64::MAX);
        self.total_sync_time_micros
            .fetch_add(micros, Ordering::Relaxed);

        if run.success {
            self.successful_syncs.fetch_add(1, Ordering::Relaxed);
            self.last_sync_completed_ms
                .fetch_max(run.finished_at.timestamp_millis(), Ordering::Relaxed);
        } else {
            self.failed_syncs.fetch_add(1, Ordering::Relaxed);
        }

        if let Some(output) = run.output {
            self.feeds_updated
                .fetch_add(output.counter(results::FEEDS_UPDATED), Ordering::Relaxed);
            self.tags_applied
                .fetch_add(output.counter(results::TAGS_APPLIED), Ordering::Relaxed);
        }
    }

    pub fn snapshot(&self) -> SyncStatistics {
        let total_sync_cycles = self.total_sync_cycles.load(Ordering::Relaxed);
        let total_sync_time =
            Duration::from_micros(self.total_sync_time_micros.load(Ordering::Relaxed));
        let average_sync_duration_seconds = if total_sync_cycles == 0 {
            0.0
        } else {
            total_sync_time.as_secs_f64() / total_sync_cycles as f64
        };

        SyncStatistics {
            total_sync_cycles,
            successful_syncs: self.successful_syncs.load(Ordering::Relaxed),
            failed_syncs: self.failed_syncs.load(Ordering::Relaxed),
            total_sync_time,
            average_sync_duration_seconds,
            feeds_updated: self.feeds_updated.load(Ordering::Relaxed),
            tags_applied: self.tags_applied.load(Ordering::Relaxed),
        }
    }

    pub fn last_sync_completed(&self) -> Option<DateTime<Utc>> {
        match self.last_sync_completed_ms.load(Ordering::Relaxed) {
            NO_TIMESTAMP => None,
            millis => DateTime::from_timestamp_millis(millis),
        }
    }

    fn reset(&self) {
        for counter in [
            &self.total_sync_cycles,
            &self.successful_syncs,
            &self.failed_syncs,
            &self.total_sync_time_micros,
            &self.feeds_updated,
            &self.tags_applied,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
        self.last_sync_completed_ms
            .store(NO_TIMESTAMP, Ordering::Relaxed);
    }
}

/// Per-task-type execution statistics plus the aggregate counters
#[derive(Debug, Default)]
pub struct ExecutionTracker {
    infos: DashMap<TaskType, ExecutionInfo>,
    statistics: CoordinatorStatistics,
    active_runs: AtomicUsize,
}

impl ExecutionTracker {
    pub fn new() -> Self {
        let tracker = Self::default();
        for task_type in TaskType::ALL {
            tracker.infos.insert(task_type, ExecutionInfo::new(task_type));
        }
        tracker
    }

    /// Mark an execution as in flight
    pub fn record_start(&self, task_type: TaskType, started_at: DateTime<Utc>) {
        self.active_runs.fetch_add(1, Ordering::SeqCst);
        self.infos
            .entry(task_type)
            .or_insert_with(|| ExecutionInfo::new(task_type))
            .last_run_start = Some(started_at);
    }

    /// Fold a finished execution into the statistics
    pub fn record_finish(&self, run: RunRecord<'_>) {
        let duration = run.duration();

        {
            let mut info = self
                .infos
                .entry(run.task_type)
                .or_insert_with(|| ExecutionInfo::new(run.task_type));

            info.last_run_start = Some(run.started_at);
            info.last_run_end = Some(run.finished_at);
            info.last_run_duration = Some(duration);
            info.last_run_successful = run.success;
            info.last_run_error = run.error.map(str::to_string);

            info.total_runs += 1;
            let n = info.total_runs as f64;
            let previous = info.average_run_duration.as_secs_f64();
            info.average_run_duration =
                Duration::from_secs_f64((previous * (n - 1.0) + duration.as_secs_f64()) / n);

            if run.success {
                info.successful_runs += 1;
                info.consecutive_failures = 0;
            } else {
                info.consecutive_failures += 1;
            }
        }

        self.statistics.record(&run);

        // Saturating: a reset between start and finish must not underflow
        let _ = self
            .active_runs
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
    }

    pub fn set_next_scheduled(&self, task_type: TaskType, next: Option<DateTime<Utc>>) {
        self.infos
            .entry(task_type)
            .or_insert_with(|| ExecutionInfo::new(task_type))
            .next_scheduled_run = next;
    }

    pub fn get(&self, task_type: TaskType) -> Option<ExecutionInfo> {
        self.infos.get(&task_type).map(|info| info.clone())
    }

    pub fn all(&self) -> Vec<ExecutionInfo> {
        let mut infos: Vec<_> = self.infos.iter().map(|e| e.value().clone()).collect();
        infos.sort_by_key(|info| info.task_type);
        infos
    }

    pub fn active_runs(&self) -> usize {
        self.active_runs.load(Ordering::SeqCst)
    }

    pub fn statistics(&self) -> SyncStatistics {
        self.statistics.snapshot()
    }

    pub fn last_sync_completed(&self) -> Option<DateTime<Utc>> {
        self.statistics.last_sync_completed()
    }

    /// Zero the aggregate counters and per-type run history. Schedules are kept.
    pub fn reset(&self) {
        self.statistics.reset();
        for mut entry in self.infos.iter_mut() {
            let task_type = entry.task_type;
            let next = entry.next_scheduled_run;
            *entry = ExecutionInfo::new(task_type);
            entry.next_scheduled_run = next;
        }
    }
}
