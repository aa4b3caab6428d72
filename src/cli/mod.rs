//! CLI-specific functionality for the feedsync daemon
//!
//! Argument parsing lives here; configuration discovery is shared with the
//! library through [`crate::config::ConfigDiscovery`].

pub mod args;

pub use args::{Args, Commands, ExecutionMode, RunConfig};
