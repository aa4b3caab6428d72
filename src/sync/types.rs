use crate::sync::error::SyncError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use uuid::Uuid;

/// Unique identifier for a queued request, kept across retries
pub type RequestId = Uuid;

/// Opaque key/value bag handed to task handlers
pub type TaskParameters = HashMap<String, serde_json::Value>;

/// Opaque key/value bag returned by task handlers
pub type TaskResults = HashMap<String, serde_json::Value>;

/// The fixed set of maintenance jobs the coordinator knows how to schedule
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    FeedUpdate,
    TagProcessing,
    ArticleCleanup,
    BackupCreation,
    StatisticsUpdate,
    RuleProcessing,
    CacheMaintenance,
    FullSync,
}

impl TaskType {
    /// Every task type, in registry order
    pub const ALL: [TaskType; 8] = [
        TaskType::FeedUpdate,
        TaskType::TagProcessing,
        TaskType::ArticleCleanup,
        TaskType::BackupCreation,
        TaskType::StatisticsUpdate,
        TaskType::RuleProcessing,
        TaskType::CacheMaintenance,
        TaskType::FullSync,
    ];

    /// Stable snake_case key used in settings keys and on the command line
    pub fn key(&self) -> &'static str {
        match self {
            TaskType::FeedUpdate => "feed_update",
            TaskType::TagProcessing => "tag_processing",
            TaskType::ArticleCleanup => "article_cleanup",
            TaskType::BackupCreation => "backup_creation",
            TaskType::StatisticsUpdate => "statistics_update",
            TaskType::RuleProcessing => "rule_processing",
            TaskType::CacheMaintenance => "cache_maintenance",
            TaskType::FullSync => "full_sync",
        }
    }

    /// Human readable name
    pub fn display_name(&self) -> &'static str {
        match self {
            TaskType::FeedUpdate => "Feed Update",
            TaskType::TagProcessing => "Tag Processing",
            TaskType::ArticleCleanup => "Article Cleanup",
            TaskType::BackupCreation => "Backup Creation",
            TaskType::StatisticsUpdate => "Statistics Update",
            TaskType::RuleProcessing => "Rule Processing",
            TaskType::CacheMaintenance => "Cache Maintenance",
            TaskType::FullSync => "Full Sync",
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for TaskType {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        TaskType::ALL
            .into_iter()
            .find(|task_type| task_type.key() == normalized)
            .ok_or_else(|| SyncError::UnknownTaskType(s.to_string()))
    }
}

/// Task priority levels. Ordering is ascending, so `Critical` is the greatest.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    Low,
    Medium,
    High,
    Critical,
}

/// Per-type execution status
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Idle,
    Running,
    Completed,
    Failed,
}

/// Coordinator lifecycle state. `paused` is tracked separately and only
/// meaningful while `Running`.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CoordinatorState {
    Stopped,
    Running,
    Stopping,
    Error,
}

impl CoordinatorState {
    /// `start` is only accepted from these states
    pub fn can_start(&self) -> bool {
        matches!(self, CoordinatorState::Stopped | CoordinatorState::Error)
    }
}

impl fmt::Display for CoordinatorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            CoordinatorState::Stopped => "stopped",
            CoordinatorState::Running => "running",
            CoordinatorState::Stopping => "stopping",
            CoordinatorState::Error => "error",
        };
        f.write_str(label)
    }
}

/// Schedule, retry policy and live status of one task type
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct TaskDefinition {
    pub task_type: TaskType,
    pub name: String,
    pub enabled: bool,
    pub interval_minutes: u32,
    pub priority: TaskPriority,
    pub max_retries: u32,
    pub retry_delay_minutes: u32,
    pub current_status: TaskStatus,
    pub last_scheduled: Option<DateTime<Utc>>,
    pub next_scheduled: Option<DateTime<Utc>>,
    pub current_run_start: Option<DateTime<Utc>>,
}

impl TaskDefinition {
    /// Build the built-in definition for a task type
    pub fn with_defaults(task_type: TaskType) -> Self {
        // (enabled, interval, priority, max retries, retry delay)
        let (enabled, interval_minutes, priority, max_retries, retry_delay_minutes) =
            match task_type {
                TaskType::FeedUpdate => (true, 30, TaskPriority::High, 3, 5),
                TaskType::TagProcessing => (true, 60, TaskPriority::Medium, 2, 10),
                TaskType::ArticleCleanup => (true, 24 * 60, TaskPriority::Low, 1, 30),
                TaskType::BackupCreation => (false, 7 * 24 * 60, TaskPriority::Low, 2, 60),
                TaskType::StatisticsUpdate => (true, 6 * 60, TaskPriority::Low, 1, 15),
                TaskType::RuleProcessing => (true, 60, TaskPriority::Medium, 2, 10),
                TaskType::CacheMaintenance => (true, 12 * 60, TaskPriority::Low, 1, 30),
                TaskType::FullSync => (false, 24 * 60, TaskPriority::Critical, 1, 60),
            };

        Self {
            task_type,
            name: task_type.display_name().to_string(),
            enabled,
            interval_minutes,
            priority,
            max_retries,
            retry_delay_minutes,
            current_status: TaskStatus::Idle,
            last_scheduled: None,
            next_scheduled: None,
            current_run_start: None,
        }
    }

    pub fn interval(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.interval_minutes as i64)
    }

    /// Whether the scheduler loop should enqueue an automatic run at `now`
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        if !self.enabled || self.current_status == TaskStatus::Running {
            return false;
        }

        match self.last_scheduled {
            None => true,
            Some(last) => now >= last + self.interval(),
        }
    }

    /// Stamp an automatic scheduling decision
    pub fn mark_scheduled(&mut self, now: DateTime<Utc>) {
        self.last_scheduled = Some(now);
        self.next_scheduled = Some(now + self.interval());
    }

    pub fn is_running(&self) -> bool {
        self.current_status == TaskStatus::Running
    }
}

/// A unit of work waiting in, or taken from, the task queue
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct TaskRequest {
    pub id: RequestId,
    pub task_type: TaskType,
    pub is_manual: bool,
    pub priority: TaskPriority,
    pub parameters: TaskParameters,
    pub enqueued_at: DateTime<Utc>,
    pub retry_count: u32,
    pub retry_at: Option<DateTime<Utc>>,
}

impl TaskRequest {
    /// Request created by the scheduler loop
    pub fn automatic(definition: &TaskDefinition) -> Self {
        Self::new(definition.task_type, false, definition.priority)
    }

    /// Request created by one of the trigger operations
    pub fn manual(task_type: TaskType, priority: TaskPriority) -> Self {
        Self::new(task_type, true, priority)
    }

    fn new(task_type: TaskType, is_manual: bool, priority: TaskPriority) -> Self {
        Self {
            id: Uuid::new_v4(),
            task_type,
            is_manual,
            priority,
            parameters: TaskParameters::new(),
            enqueued_at: Utc::now(),
            retry_count: 0,
            retry_at: None,
        }
    }

    pub fn with_parameter(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.parameters.insert(key.into(), value);
        self
    }

    pub fn with_parameters(mut self, parameters: TaskParameters) -> Self {
        self.parameters.extend(parameters);
        self
    }
}

/// What a task handler reports back for one invocation
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct TaskOutput {
    pub success: bool,
    pub results: TaskResults,
    pub message: Option<String>,
}

impl TaskOutput {
    pub fn success() -> Self {
        Self {
            success: true,
            ..Default::default()
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            results: TaskResults::new(),
            message: Some(message.into()),
        }
    }

    pub fn with_result(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.results.insert(key.into(), value);
        self
    }

    /// Read an integer counter out of the result bag, 0 when absent
    pub fn counter(&self, key: &str) -> u64 {
        self.results
            .get(key)
            .and_then(serde_json::Value::as_u64)
            .unwrap_or(0)
    }
}

/// Rolling statistics for one task type
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ExecutionInfo {
    pub task_type: TaskType,
    pub last_run_start: Option<DateTime<Utc>>,
    pub last_run_end: Option<DateTime<Utc>>,
    pub last_run_duration: Option<Duration>,
    pub last_run_successful: bool,
    pub last_run_error: Option<String>,
    pub total_runs: u64,
    pub successful_runs: u64,
    pub consecutive_failures: u32,
    pub average_run_duration: Duration,
    pub next_scheduled_run: Option<DateTime<Utc>>,
}

impl ExecutionInfo {
    pub fn new(task_type: TaskType) -> Self {
        Self {
            task_type,
            last_run_start: None,
            last_run_end: None,
            last_run_duration: None,
            last_run_successful: false,
            last_run_error: None,
            total_runs: 0,
            successful_runs: 0,
            consecutive_failures: 0,
            average_run_duration: Duration::ZERO,
            next_scheduled_run: None,
        }
    }

    pub fn failed_runs(&self) -> u64 {
        self.total_runs - self.successful_runs
    }
}

/// One entry of the bounded error history
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ErrorRecord {
    pub error_time: DateTime<Utc>,
    /// `None` for faults of the coordinator itself (scheduler loop, settings)
    pub task_type: Option<TaskType>,
    pub message: String,
    pub stack_trace: Option<String>,
    pub is_recoverable: bool,
}

impl ErrorRecord {
    pub fn new(
        task_type: Option<TaskType>,
        message: impl Into<String>,
        is_recoverable: bool,
    ) -> Self {
        Self {
            error_time: Utc::now(),
            task_type,
            message: message.into(),
            stack_trace: None,
            is_recoverable,
        }
    }

    pub fn with_stack_trace(mut self, trace: impl Into<String>) -> Self {
        self.stack_trace = Some(trace.into());
        self
    }
}

/// Point-in-time copy of the coordinator-wide counters
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct SyncStatistics {
    pub total_sync_cycles: u64,
    pub successful_syncs: u64,
    pub failed_syncs: u64,
    pub total_sync_time: Duration,
    pub average_sync_duration_seconds: f64,
    pub feeds_updated: u64,
    pub tags_applied: u64,
}
