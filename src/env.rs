//! Environment constants and path utilities for the sync coordinator.
//!
//! This module centralizes the settings keys, default limits and
//! configuration file locations used throughout the crate.

use std::path::{Path, PathBuf};

/// Main application directory name (hidden directory like .git, .vscode)
pub const FEEDSYNC_DIR_NAME: &str = ".feedsync";

/// Configuration file name inside the application directory
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Stand-alone configuration file name looked up in the working directory
pub const LOCAL_CONFIG_FILE_NAME: &str = "feedsync.toml";

/// Default settings store file name inside the application directory
pub const SETTINGS_FILE_NAME: &str = "settings.toml";

/// Hard cap on retained error records unless overridden by configuration
pub const MAX_ERROR_HISTORY: usize = 100;

/// Scheduling defaults
pub mod defaults {
    /// Scheduler tick interval (one minute)
    pub const TICK_INTERVAL_MS: u64 = 60_000;

    /// Backoff after an unexpected fault inside the scheduler loop
    pub const LOOP_ERROR_BACKOFF_MS: u64 = 5_000;

    /// Upper bound on a single handler invocation
    pub const MAX_SYNC_DURATION_MINUTES: u32 = 30;

    /// `next_sync_scheduled` offset used when no task is enabled
    pub const IDLE_NEXT_SYNC_MINUTES: i64 = 5;
}

/// Settings keys persisted through the settings provider
pub mod keys {
    use crate::sync::TaskType;

    /// Global execution timeout in minutes
    pub const MAX_SYNC_DURATION: &str = "sync.max_duration_minutes";

    /// Per-task enabled flag
    pub fn task_enabled(task_type: TaskType) -> String {
        format!("sync.tasks.{}.enabled", task_type.key())
    }

    /// Per-task interval in minutes
    pub fn task_interval(task_type: TaskType) -> String {
        format!("sync.tasks.{}.interval_minutes", task_type.key())
    }
}

/// Result bag keys the coordinator aggregates into its statistics
pub mod results {
    /// Number of feeds refreshed by a run
    pub const FEEDS_UPDATED: &str = "feedsUpdated";

    /// Number of tags applied by a run
    pub const TAGS_APPLIED: &str = "tagsApplied";
}

/// Parameter bag keys understood by the task handlers
pub mod params {
    /// Restricts a feed update to a single feed
    pub const FEED_ID: &str = "feedId";
}

/// Build the main .feedsync directory path from a root directory
pub fn feedsync_dir_path(root: &Path) -> PathBuf {
    root.join(FEEDSYNC_DIR_NAME)
}

/// Build config file path in user's home directory
pub fn user_config_file_path(home_dir: &Path) -> PathBuf {
    feedsync_dir_path(home_dir).join(CONFIG_FILE_NAME)
}

/// Build local config file path in current directory
pub fn local_config_file_path(current_dir: &Path) -> PathBuf {
    feedsync_dir_path(current_dir).join(CONFIG_FILE_NAME)
}

/// Build the default settings store path under a root directory
pub fn settings_file_path(root: &Path) -> PathBuf {
    feedsync_dir_path(root).join(SETTINGS_FILE_NAME)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::TaskType;

    #[test]
    fn test_config_paths() {
        let home_dir = Path::new("/home/user");
        let current_dir = Path::new("/current/project");

        assert_eq!(
            user_config_file_path(home_dir),
            Path::new("/home/user/.feedsync/config.toml")
        );

        assert_eq!(
            local_config_file_path(current_dir),
            Path::new("/current/project/.feedsync/config.toml")
        );

        assert_eq!(
            settings_file_path(current_dir),
            Path::new("/current/project/.feedsync/settings.toml")
        );
    }

    #[test]
    fn test_settings_keys() {
        assert_eq!(
            keys::task_enabled(TaskType::FeedUpdate),
            "sync.tasks.feed_update.enabled"
        );
        assert_eq!(
            keys::task_interval(TaskType::ArticleCleanup),
            "sync.tasks.article_cleanup.interval_minutes"
        );
    }
}
