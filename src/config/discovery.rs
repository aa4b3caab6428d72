//! Configuration discovery and loading
//!
//! This module handles the configuration discovery hierarchy:
//! 1. Current directory: ./feedsync.toml or ./.feedsync/config.toml
//! 2. User config: ~/.feedsync/config.toml
//! 3. System config: /etc/feedsync/config.toml
//! 4. Built-in defaults

use crate::config::CoordinatorConfig;
use crate::env;
use anyhow::{Context, Result};
use std::env as std_env;
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// Configuration discovery system
pub struct ConfigDiscovery;

impl ConfigDiscovery {
    /// Discover and load configuration using the hierarchy
    pub fn discover_config() -> Result<CoordinatorConfig> {
        if let Some(config_path) = Self::find_config_file() {
            info!("Loading configuration from: {:?}", config_path);
            return CoordinatorConfig::from_toml_file(&config_path)
                .with_context(|| format!("Invalid configuration in {:?}", config_path));
        }

        info!("No configuration file found, using defaults");
        Ok(CoordinatorConfig::default())
    }

    /// Find configuration file using discovery hierarchy
    pub fn find_config_file() -> Option<PathBuf> {
        for candidate in Self::get_config_candidates() {
            debug!("Checking for config file: {:?}", candidate);
            if candidate.is_file() {
                debug!("Found config file: {:?}", candidate);
                return Some(candidate);
            }
        }

        debug!("No config file found in discovery hierarchy");
        None
    }

    /// Get list of configuration file candidates in priority order
    pub(crate) fn get_config_candidates() -> Vec<PathBuf> {
        let mut candidates = Vec::new();

        if let Ok(current_dir) = std_env::current_dir() {
            candidates.push(current_dir.join(env::LOCAL_CONFIG_FILE_NAME));
            candidates.push(env::local_config_file_path(&current_dir));
        }

        if let Some(home_dir) = Self::get_home_dir() {
            candidates.push(env::user_config_file_path(&home_dir));
        }

        #[cfg(unix)]
        candidates.push(PathBuf::from("/etc/feedsync/config.toml"));

        candidates
    }

    /// Get home directory path
    pub fn get_home_dir() -> Option<PathBuf> {
        std_env::var("HOME")
            .ok()
            .or_else(|| std_env::var("USERPROFILE").ok())
            .map(PathBuf::from)
    }

    /// Write the default configuration to `path` unless a file already exists there
    pub fn write_default_config(path: &std::path::Path) -> Result<bool> {
        if path.exists() {
            warn!("Configuration file already exists: {:?}", path);
            return Ok(false);
        }

        CoordinatorConfig::default().to_toml_file(path)?;
        info!("Created default configuration file: {:?}", path);
        Ok(true)
    }

    /// Show configuration discovery information for debugging
    pub fn show_discovery_info() {
        println!("Configuration Discovery Hierarchy:");
        println!();

        for (i, candidate) in Self::get_config_candidates().iter().enumerate() {
            let status = if candidate.exists() {
                if candidate.is_file() {
                    "✓ EXISTS"
                } else {
                    "✗ NOT A FILE"
                }
            } else {
                "✗ NOT FOUND"
            };

            println!("  {}. {:?} - {}", i + 1, candidate, status);
        }

        println!();
        match Self::find_config_file() {
            Some(found) => println!("Active configuration: {:?}", found),
            None => println!("Active configuration: Built-in defaults"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_config_candidates() {
        let candidates = ConfigDiscovery::get_config_candidates();

        assert!(!candidates.is_empty());
        assert_eq!(
            candidates[0].file_name().unwrap(),
            env::LOCAL_CONFIG_FILE_NAME
        );
    }

    #[test]
    fn test_write_default_config_does_not_overwrite() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("feedsync.toml");

        assert!(ConfigDiscovery::write_default_config(&path).unwrap());
        std::fs::write(&path, "tick_interval_ms = 10\n").unwrap();
        assert!(!ConfigDiscovery::write_default_config(&path).unwrap());

        let loaded = CoordinatorConfig::from_toml_file(&path).unwrap();
        assert_eq!(loaded.tick_interval_ms, 10);
    }
}
