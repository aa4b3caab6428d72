//! # Feedsync
//!
//! Background synchronization coordinator for a feed reader backend.
//!
//! The coordinator owns a registry of recurring maintenance jobs (feed
//! refresh, tag processing, article cleanup, backups, statistics, rule
//! processing, cache maintenance and full syncs), a scheduler loop that
//! enqueues them when their interval elapses, and a worker pool that runs
//! the application-supplied handlers with a timeout, retries and
//! statistics.
//!
//! ## Architecture Overview
//!
//! - **[`sync`]**: the coordinator, its registry, queue, workers, execution
//!   tracker, error history and event notifier
//! - **[`config`]**: static coordinator configuration, config file discovery
//!   and the key/value settings providers used for persistence
//! - **[`env`]**: settings keys, defaults and file locations
//! - **[`cli`]**: argument parsing for the `feedsync` daemon
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use feedsync::{CoordinatorConfig, SyncCoordinator, TaskOutput, TaskType, handler_fn};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let coordinator = SyncCoordinator::from_config(CoordinatorConfig::default()).await;
//!
//!     coordinator.register_handler(
//!         TaskType::FeedUpdate,
//!         handler_fn(|_context| async { Ok::<_, anyhow::Error>(TaskOutput::success()) }),
//!     );
//!
//!     coordinator.start().await?;
//!     coordinator.trigger_feed_sync().await?;
//!     coordinator.stop().await?;
//!     Ok(())
//! }
//! ```

/// Environment constants, settings keys and path utilities.
pub mod env;

/// Coordinator configuration, discovery and settings persistence.
pub mod config;

/// The synchronization coordinator and its components.
pub mod sync;

/// Command line interface for the daemon binary.
pub mod cli;

pub use config::{
    ConfigDiscovery, CoordinatorConfig, MemorySettings, QueueOrdering, SettingsError,
    SettingsProvider, TomlSettingsStore,
};
pub use sync::{
    CoordinatorState, ErrorRecord, ExecutionInfo, LoggingEventHandler, SyncCoordinator, SyncError,
    SyncEvent, SyncEventHandler, SyncStatistics, TaskContext, TaskDefinition, TaskHandler,
    TaskOutput, TaskPriority, TaskRequest, TaskStatus, TaskType, handler_fn,
};
