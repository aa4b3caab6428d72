use feedsync::{
    ConfigDiscovery, CoordinatorConfig, QueueOrdering, SettingsProvider, SyncCoordinator,
    SyncError, TaskType, TomlSettingsStore,
};
use serial_test::serial;
use std::time::Duration;
use tempfile::{NamedTempFile, TempDir};

fn definition(coordinator: &SyncCoordinator, task_type: TaskType) -> feedsync::TaskDefinition {
    coordinator
        .task_statuses()
        .into_iter()
        .find(|definition| definition.task_type == task_type)
        .expect("Every task type should be registered")
}

#[test]
fn test_config_serialization_roundtrip() {
    let original_config = CoordinatorConfig {
        worker_count: Some(3),
        queue_ordering: QueueOrdering::Priority,
        ..Default::default()
    };

    let toml_str = original_config
        .to_toml_string()
        .expect("Should be able to serialize config to TOML");
    assert!(toml_str.contains("tick_interval_ms"));
    assert!(toml_str.contains("queue_ordering = \"priority\""));

    let deserialized_config = CoordinatorConfig::from_toml_str(&toml_str)
        .expect("Should be able to deserialize TOML string");
    assert_eq!(original_config, deserialized_config);
}

#[test]
fn test_config_file_operations() {
    let original_config = CoordinatorConfig::default();
    let temp_file = NamedTempFile::new().expect("Should be able to create temporary file");

    original_config
        .to_toml_file(temp_file.path())
        .expect("Should be able to save config to file");
    let loaded_config = CoordinatorConfig::from_toml_file(temp_file.path())
        .expect("Should be able to load config from file");

    assert_eq!(original_config, loaded_config);
    assert_eq!(loaded_config.max_sync_duration(), Duration::from_secs(30 * 60));
}

#[tokio::test]
async fn test_task_configuration_survives_restart() {
    let temp_dir = TempDir::new().unwrap();
    let settings_path = temp_dir.path().join("state").join("settings.toml");
    let config = CoordinatorConfig {
        settings_path: Some(settings_path.clone()),
        ..Default::default()
    };

    {
        let coordinator = SyncCoordinator::from_config(config.clone()).await;
        coordinator
            .configure_task(TaskType::BackupCreation, true)
            .await
            .unwrap();
        coordinator
            .configure_task(TaskType::ArticleCleanup, false)
            .await
            .unwrap();
        coordinator
            .configure_task_interval(TaskType::FeedUpdate, 45)
            .await
            .unwrap();
        coordinator.set_max_sync_duration(10).await.unwrap();
        assert!(coordinator.recent_errors(10).await.is_empty());
    }

    let content = std::fs::read_to_string(&settings_path).unwrap();
    assert!(content.contains("sync.tasks.feed_update.interval_minutes"));
    assert!(content.contains("sync.max_duration_minutes"));

    let restarted = SyncCoordinator::from_config(config).await;
    assert!(definition(&restarted, TaskType::BackupCreation).enabled);
    assert!(!definition(&restarted, TaskType::ArticleCleanup).enabled);
    assert_eq!(definition(&restarted, TaskType::FeedUpdate).interval_minutes, 45);
    assert_eq!(
        definition(&restarted, TaskType::TagProcessing).interval_minutes,
        60
    );
    assert_eq!(restarted.max_sync_duration(), Duration::from_secs(10 * 60));
    assert!(restarted.recent_errors(10).await.is_empty());
}

#[tokio::test]
async fn test_invalid_values_are_rejected_and_not_persisted() {
    let temp_dir = TempDir::new().unwrap();
    let settings_path = temp_dir.path().join("settings.toml");
    let coordinator = SyncCoordinator::from_config(CoordinatorConfig {
        settings_path: Some(settings_path.clone()),
        ..Default::default()
    })
    .await;

    assert!(matches!(
        coordinator
            .configure_task_interval(TaskType::FeedUpdate, 0)
            .await,
        Err(SyncError::InvalidInterval(0))
    ));
    assert!(matches!(
        coordinator.set_max_sync_duration(0).await,
        Err(SyncError::InvalidInterval(0))
    ));

    assert_eq!(definition(&coordinator, TaskType::FeedUpdate).interval_minutes, 30);
    assert_eq!(coordinator.max_sync_duration(), Duration::from_secs(30 * 60));
    assert!(!settings_path.exists());
}

#[tokio::test]
async fn test_corrupt_settings_fall_back_to_defaults() {
    let temp_dir = TempDir::new().unwrap();
    let settings_path = temp_dir.path().join("settings.toml");
    std::fs::write(&settings_path, "this is = = not toml").unwrap();

    let coordinator = SyncCoordinator::from_config(CoordinatorConfig {
        settings_path: Some(settings_path),
        ..Default::default()
    })
    .await;

    let feed = definition(&coordinator, TaskType::FeedUpdate);
    assert!(feed.enabled);
    assert_eq!(feed.interval_minutes, 30);
    assert!(!definition(&coordinator, TaskType::FullSync).enabled);

    let errors = coordinator.recent_errors(10).await;
    assert_eq!(errors.len(), 1);
    assert!(errors[0].is_recoverable);
    assert!(errors[0].task_type.is_none());
}

#[tokio::test]
async fn test_settings_type_mismatch_is_reported() {
    let temp_dir = TempDir::new().unwrap();
    let settings_path = temp_dir.path().join("settings.toml");
    std::fs::write(
        &settings_path,
        concat!(
            "\"sync.tasks.feed_update.enabled\" = 5\n",
            "\"sync.tasks.feed_update.interval_minutes\" = 20\n",
        ),
    )
    .unwrap();

    let store = TomlSettingsStore::new(&settings_path);
    assert!(
        store
            .get_bool("sync.tasks.feed_update.enabled", true)
            .await
            .is_err()
    );
    assert_eq!(
        store
            .get_int("sync.tasks.feed_update.interval_minutes", 30)
            .await
            .unwrap(),
        20
    );

    let coordinator = SyncCoordinator::from_config(CoordinatorConfig {
        settings_path: Some(settings_path),
        ..Default::default()
    })
    .await;
    let feed = definition(&coordinator, TaskType::FeedUpdate);
    assert!(feed.enabled);
    assert_eq!(feed.interval_minutes, 20);
    assert_eq!(coordinator.recent_errors(10).await.len(), 1);
}

#[test]
#[serial]
fn test_discovery_prefers_local_config_file() {
    let temp_dir = TempDir::new().unwrap();
    std::fs::write(
        temp_dir.path().join("feedsync.toml"),
        "tick_interval_ms = 250\nworker_count = 2\nqueue_ordering = \"priority\"\n",
    )
    .unwrap();

    let original_dir = std::env::current_dir().unwrap();
    std::env::set_current_dir(temp_dir.path()).unwrap();
    let found = ConfigDiscovery::find_config_file();
    let discovered = ConfigDiscovery::discover_config();
    std::env::set_current_dir(original_dir).unwrap();

    assert_eq!(
        found.and_then(|path| path.file_name().map(|name| name.to_owned())),
        Some("feedsync.toml".into())
    );
    let config = discovered.unwrap();
    assert_eq!(config.tick_interval_ms, 250);
    assert_eq!(config.effective_worker_count(), 2);
    assert_eq!(config.queue_ordering, QueueOrdering::Priority);
    assert_eq!(config.max_sync_duration_minutes, 30);
}

#[test]
#[serial]
fn test_discovery_reports_invalid_local_config() {
    let temp_dir = TempDir::new().unwrap();
    std::fs::write(
        temp_dir.path().join("feedsync.toml"),
        "tick_interval_ms = \"soon\"\n",
    )
    .unwrap();

    let original_dir = std::env::current_dir().unwrap();
    std::env::set_current_dir(temp_dir.path()).unwrap();
    let discovered = ConfigDiscovery::discover_config();
    std::env::set_current_dir(original_dir).unwrap();

    let err = discovered.unwrap_err();
    assert!(format!("{:#}", err).contains("feedsync.toml"));
}
