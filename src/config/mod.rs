pub mod discovery;
pub mod settings;
pub mod types;

pub use discovery::ConfigDiscovery;
pub use settings::{
    MemorySettings, SettingValue, SettingsError, SettingsProvider, TomlSettingsStore,
};
pub use types::{CoordinatorConfig, QueueOrdering};
