//! Key/value settings persistence consumed by the coordinator.
//!
//! The coordinator only needs `get/set` of booleans and integers. Two
//! providers ship with the crate: [`MemorySettings`] for tests and embedding,
//! and [`TomlSettingsStore`] which keeps a flat TOML table on disk.

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::debug;

/// Settings provider failures
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("IO error on settings file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse settings file {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("Failed to serialize settings: {0}")]
    Serialize(String),

    #[error("Setting '{key}' is not a {expected}")]
    TypeMismatch { key: String, expected: &'static str },

    #[error("Settings backend unavailable: {0}")]
    Unavailable(String),
}

/// A stored setting value
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(untagged)]
pub enum SettingValue {
    Bool(bool),
    Int(i64),
}

impl SettingValue {
    fn as_bool(&self, key: &str) -> Result<bool, SettingsError> {
        match self {
            SettingValue::Bool(value) => Ok(*value),
            SettingValue::Int(_) => Err(SettingsError::TypeMismatch {
                key: key.to_string(),
                expected: "bool",
            }),
        }
    }

    fn as_int(&self, key: &str) -> Result<i64, SettingsError> {
        match self {
            SettingValue::Int(value) => Ok(*value),
            SettingValue::Bool(_) => Err(SettingsError::TypeMismatch {
                key: key.to_string(),
                expected: "integer",
            }),
        }
    }
}

/// Get/set configuration interface supplied by the surrounding application
#[async_trait]
pub trait SettingsProvider: Send + Sync {
    async fn get_bool(&self, key: &str, default: bool) -> Result<bool, SettingsError>;
    async fn set_bool(&self, key: &str, value: bool) -> Result<(), SettingsError>;
    async fn get_int(&self, key: &str, default: i64) -> Result<i64, SettingsError>;
    async fn set_int(&self, key: &str, value: i64) -> Result<(), SettingsError>;
}

/// Process-local settings
#[derive(Debug, Default)]
pub struct MemorySettings {
    values: DashMap<String, SettingValue>,
}

impl MemorySettings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw value lookup, mostly useful in tests
    pub fn value(&self, key: &str) -> Option<SettingValue> {
        self.values.get(key).map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[async_trait]
impl SettingsProvider for MemorySettings {
    async fn get_bool(&self, key: &str, default: bool) -> Result<bool, SettingsError> {
        match self.values.get(key) {
            Some(entry) => entry.value().as_bool(key),
            None => Ok(default),
        }
    }

    async fn set_bool(&self, key: &str, value: bool) -> Result<(), SettingsError> {
        self.values.insert(key.to_string(), SettingValue::Bool(value));
        Ok(())
    }

    async fn get_int(&self, key: &str, default: i64) -> Result<i64, SettingsError> {
        match self.values.get(key) {
            Some(entry) => entry.value().as_int(key),
            None => Ok(default),
        }
    }

    async fn set_int(&self, key: &str, value: i64) -> Result<(), SettingsError> {
        self.values.insert(key.to_string(), SettingValue::Int(value));
        Ok(())
    }
}

/// Settings kept as a flat TOML table, rewritten on every update
#[derive(Debug)]
pub struct TomlSettingsStore {
    path: PathBuf,
    values: Mutex<Option<BTreeMap<String, SettingValue>>>,
}

impl TomlSettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            values: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<BTreeMap<String, SettingValue>, SettingsError> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("Settings file {:?} not found, starting empty", self.path);
                return Ok(BTreeMap::new());
            }
            Err(source) => {
                return Err(SettingsError::Io {
                    path: self.path.clone(),
                    source,
                });
            }
        };

        toml::from_str(&content).map_err(|e| SettingsError::Parse {
            path: self.path.clone(),
            message: e.to_string(),
        })
    }

    async fn save(&self, values: &BTreeMap<String, SettingValue>) -> Result<(), SettingsError> {
        let content =
            toml::to_string(values).map_err(|e| SettingsError::Serialize(e.to_string()))?;

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| SettingsError::Io {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }

        tokio::fs::write(&self.path, content)
            .await
            .map_err(|source| SettingsError::Io {
                path: self.path.clone(),
                source,
            })
    }

    async fn get(&self, key: &str) -> Result<Option<SettingValue>, SettingsError> {
        let mut guard = self.values.lock().await;
        if guard.is_none() {
            *guard = Some(self.load().await?);
        }
        Ok(guard.as_ref().and_then(|values| values.get(key).cloned()))
    }

    async fn set(&self, key: &str, value: SettingValue) -> Result<(), SettingsError> {
        let mut guard = self.values.lock().await;
        let mut values = match guard.take() {
            Some(values) => values,
            None => self.load().await?,
        };
        values.insert(key.to_string(), value);

        let saved = self.save(&values).await;
        *guard = Some(values);
        saved
    }
}

#[async_trait]
impl SettingsProvider for TomlSettingsStore {
    async fn get_bool(&self, key: &str, default: bool) -> Result<bool, SettingsError> {
        match self.get(key).await? {
            Some(value) => value.as_bool(key),
            None => Ok(default),
        }
    }

    async fn set_bool(&self, key: &str, value: bool) -> Result<(), SettingsError> {
        self.set(key, SettingValue::Bool(value)).await
    }

    async fn get_int(&self, key: &str, default: i64) -> Result<i64, SettingsError> {
        match self.get(key).await? {
            Some(value) => value.as_int(key),
            None => Ok(default),
        }
    }

    async fn set_int(&self, key: &str, value: i64) -> Result<(), SettingsError> {
        self.set(key, SettingValue::Int(value)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_memory_settings_defaults_and_updates() {
        let settings = MemorySettings::new();

        assert!(settings.get_bool("a.flag", true).await.unwrap());
        assert_eq!(settings.get_int("a.number", 42).await.unwrap(), 42);

        settings.set_bool("a.flag", false).await.unwrap();
        settings.set_int("a.number", 7).await.unwrap();

        assert!(!settings.get_bool("a.flag", true).await.unwrap());
        assert_eq!(settings.get_int("a.number", 42).await.unwrap(), 7);
        assert_eq!(settings.len(), 2);
    }

    #[tokio::test]
    async fn test_memory_settings_type_mismatch() {
        let settings = MemorySettings::new();
        settings.set_int("key", 1).await.unwrap();

        let err = settings.get_bool("key", false).await.unwrap_err();
        assert!(matches!(
            err,
            SettingsError::TypeMismatch { expected: "bool", .. }
        ));
    }

    #[tokio::test]
    async fn test_toml_store_persists_across_instances() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("state").join("settings.toml");

        let store = TomlSettingsStore::new(&path);
        assert!(store.get_bool("sync.tasks.feed_update.enabled", true).await.unwrap());

        store
            .set_bool("sync.tasks.feed_update.enabled", false)
            .await
            .unwrap();
        store
            .set_int("sync.tasks.feed_update.interval_minutes", 15)
            .await
            .unwrap();
        assert!(path.exists());

        let reopened = TomlSettingsStore::new(&path);
        assert!(
            !reopened
                .get_bool("sync.tasks.feed_update.enabled", true)
                .await
                .unwrap()
        );
        assert_eq!(
            reopened
                .get_int("sync.tasks.feed_update.interval_minutes", 30)
                .await
                .unwrap(),
            15
        );
    }

    #[tokio::test]
    async fn test_toml_store_reports_parse_errors() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("settings.toml");
        std::fs::write(&path, "this is = = not toml").unwrap();

        let store = TomlSettingsStore::new(&path);
        let err = store.get_int("anything", 0).await.unwrap_err();
        assert!(matches!(err, SettingsError::Parse { .. }));
    }
}
