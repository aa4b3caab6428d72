use crate::config::SettingsProvider;
use crate::env::{defaults, keys};
use crate::sync::error::SyncError;
use crate::sync::types::{TaskDefinition, TaskPriority, TaskType};
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Catalog of task definitions, one per task type
pub struct TaskRegistry {
    definitions: DashMap<TaskType, TaskDefinition>,
    settings: Arc<dyn SettingsProvider>,
}

impl TaskRegistry {
    /// Registry populated with the built-in defaults
    pub fn new(settings: Arc<dyn SettingsProvider>) -> Self {
        let definitions = DashMap::new();
        for task_type in TaskType::ALL {
            definitions.insert(task_type, TaskDefinition::with_defaults(task_type));
        }

        Self {
            definitions,
            settings,
        }
    }

    pub fn settings(&self) -> &Arc<dyn SettingsProvider> {
        &self.settings
    }

    /// Overlay persisted enabled/interval values. Read failures keep the
    /// default for that value and are counted, never propagated.
    pub async fn hydrate(&self) -> usize {
        let mut failures = 0;

        for task_type in TaskType::ALL {
            let Some(default) = self.get(task_type) else {
                continue;
            };

            let enabled = match self
                .settings
                .get_bool(&keys::task_enabled(task_type), default.enabled)
                .await
            {
                Ok(enabled) => enabled,
                Err(e) => {
                    warn!("Failed to load enabled flag for {}: {}", task_type, e);
                    failures += 1;
                    default.enabled
                }
            };

            let interval_minutes = match self
                .settings
                .get_int(
                    &keys::task_interval(task_type),
                    default.interval_minutes as i64,
                )
                .await
            {
                Ok(minutes) if minutes >= 1 => u32::try_from(minutes).unwrap_or(u32::MAX),
                Ok(minutes) => {
                    warn!(
                        "Ignoring persisted interval {} for {}, using {}",
                        minutes, task_type, default.interval_minutes
                    );
                    failures += 1;
                    default.interval_minutes
                }
                Err(e) => {
                    warn!("Failed to load interval for {}: {}", task_type, e);
                    failures += 1;
                    default.interval_minutes
                }
            };

            self.update(task_type, |definition| {
                definition.enabled = enabled;
                definition.interval_minutes = interval_minutes;
            });
        }

        if failures > 0 {
            warn!(
                "Task configuration loaded with {} fallback(s) to defaults",
                failures
            );
        } else {
            debug!("Task configuration loaded from settings");
        }
        failures
    }

    pub fn get(&self, task_type: TaskType) -> Option<TaskDefinition> {
        self.definitions.get(&task_type).map(|d| d.clone())
    }

    /// All definitions in task type order
    pub fn all(&self) -> Vec<TaskDefinition> {
        let mut all: Vec<_> = self.definitions.iter().map(|d| d.value().clone()).collect();
        all.sort_by_key(|d| d.task_type);
        all
    }

    /// Mutate one definition in place, returning the closure's result
    pub fn update<R>(
        &self,
        task_type: TaskType,
        f: impl FnOnce(&mut TaskDefinition) -> R,
    ) -> Option<R> {
        self.definitions
            .get_mut(&task_type)
            .map(|mut definition| f(definition.value_mut()))
    }

    /// Enable or disable a task type and persist the flag
    pub async fn configure_task(
        &self,
        task_type: TaskType,
        enabled: bool,
    ) -> Result<(), SyncError> {
        self.update(task_type, |definition| definition.enabled = enabled)
            .ok_or_else(|| SyncError::UnknownTaskType(task_type.to_string()))?;

        self.settings
            .set_bool(&keys::task_enabled(task_type), enabled)
            .await?;

        info!(
            "Task {} {}",
            task_type,
            if enabled { "enabled" } else { "disabled" }
        );
        Ok(())
    }

    /// Change a task type's interval and persist it
    pub async fn configure_interval(
        &self,
        task_type: TaskType,
        minutes: u32,
    ) -> Result<(), SyncError> {
        if minutes == 0 {
            return Err(SyncError::InvalidInterval(minutes));
        }

        self.update(task_type, |definition| {
            definition.interval_minutes = minutes;
            if let Some(last) = definition.last_scheduled {
                definition.next_scheduled = Some(last + definition.interval());
            }
        })
        .ok_or_else(|| SyncError::UnknownTaskType(task_type.to_string()))?;

        self.settings
            .set_int(&keys::task_interval(task_type), minutes as i64)
            .await?;

        info!("Task {} interval set to {} minutes", task_type, minutes);
        Ok(())
    }

    /// Change the retry policy of a task type (not persisted)
    pub fn configure_retry(
        &self,
        task_type: TaskType,
        max_retries: u32,
        retry_delay_minutes: u32,
    ) -> Result<(), SyncError> {
        self.update(task_type, |definition| {
            definition.max_retries = max_retries;
            definition.retry_delay_minutes = retry_delay_minutes;
        })
        .ok_or_else(|| SyncError::UnknownTaskType(task_type.to_string()))?;

        debug!(
            "Task {} retry policy: {} retries, {} minute delay",
            task_type, max_retries, retry_delay_minutes
        );
        Ok(())
    }

    /// Change the priority used for a task type's requests (not persisted)
    pub fn configure_priority(
        &self,
        task_type: TaskType,
        priority: TaskPriority,
    ) -> Result<(), SyncError> {
        self.update(task_type, |definition| definition.priority = priority)
            .ok_or_else(|| SyncError::UnknownTaskType(task_type.to_string()))
    }

    /// Earliest upcoming automatic run across enabled task types. A type
    /// that was never scheduled runs on the next tick.
    pub fn next_sync_scheduled(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        self.definitions
            .iter()
            .filter(|d| d.enabled)
            .map(|d| d.next_scheduled.unwrap_or(now))
            .min()
            .unwrap_or_else(|| now + Duration::minutes(defaults::IDLE_NEXT_SYNC_MINUTES))
    }
}

impl std::fmt::Debug for TaskRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskRegistry")
            .field("definitions", &self.all())
            .finish()
    }
}
