use feedsync::sync::TaskContext;
use feedsync::{
    CoordinatorConfig, SyncCoordinator, SyncEvent, TaskOutput, TaskStatus, TaskType, handler_fn,
};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

async fn quiet_coordinator() -> SyncCoordinator {
    let config = CoordinatorConfig {
        tick_interval_ms: 10,
        worker_count: Some(1),
        ..Default::default()
    };
    let coordinator = SyncCoordinator::from_config(config).await;
    for task_type in TaskType::ALL {
        coordinator.configure_task(task_type, false).await.unwrap();
    }
    coordinator
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "Condition not reached within timeout"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

fn total_runs(coordinator: &SyncCoordinator, task_type: TaskType) -> u64 {
    coordinator
        .task_execution_info(task_type)
        .map(|info| info.total_runs)
        .unwrap_or(0)
}

#[tokio::test]
async fn test_always_failing_task_runs_max_retries_plus_one() {
    let coordinator = quiet_coordinator().await;
    let calls = Arc::new(AtomicU32::new(0));
    let failures = Arc::new(AtomicU32::new(0));

    coordinator
        .configure_task_retry(TaskType::FeedUpdate, 3, 0)
        .unwrap();
    {
        let calls = calls.clone();
        coordinator.register_handler(
            TaskType::FeedUpdate,
            handler_fn(move |_context| {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err::<TaskOutput, _>(anyhow::anyhow!("upstream returned 503"))
                }
            }),
        );
    }
    {
        let failures = failures.clone();
        coordinator.subscribe_fn(move |event| {
            if let SyncEvent::TaskCompleted { success: false, .. } = event {
                failures.fetch_add(1, Ordering::SeqCst);
            }
        });
    }

    coordinator.start().await.unwrap();
    coordinator.trigger_feed_sync().await.unwrap();

    wait_until(|| total_runs(&coordinator, TaskType::FeedUpdate) == 4).await;
    // Give a fifth attempt the chance to show up if the policy were wrong
    tokio::time::sleep(Duration::from_millis(100)).await;
    coordinator.stop().await.unwrap();

    let info = coordinator.task_execution_info(TaskType::FeedUpdate).unwrap();
    assert_eq!(info.total_runs, 4);
    assert_eq!(info.successful_runs, 0);
    assert_eq!(info.consecutive_failures, 4);
    assert_eq!(info.last_run_error.as_deref(), Some("upstream returned 503"));
    assert_eq!(calls.load(Ordering::SeqCst), 4);
    assert_eq!(failures.load(Ordering::SeqCst), 4);
    assert_eq!(coordinator.queue_len().await, 0);

    let stats = coordinator.statistics();
    assert_eq!(stats.total_sync_cycles, 4);
    assert_eq!(stats.failed_syncs, 4);
    assert_eq!(stats.successful_syncs, 0);

    let errors = coordinator.recent_errors(100).await;
    assert_eq!(errors.len(), 4);
    assert!(errors.iter().all(|record| record.is_recoverable));
    assert!(
        errors
            .windows(2)
            .all(|pair| pair[0].error_time >= pair[1].error_time)
    );

    let feed = coordinator
        .task_statuses()
        .into_iter()
        .find(|definition| definition.task_type == TaskType::FeedUpdate)
        .unwrap();
    assert_eq!(feed.current_status, TaskStatus::Failed);
}

#[tokio::test]
async fn test_retry_succeeds_on_second_attempt() {
    let coordinator = quiet_coordinator().await;
    let attempts = Arc::new(Mutex::new(Vec::new()));

    coordinator
        .configure_task_retry(TaskType::TagProcessing, 2, 0)
        .unwrap();
    {
        let attempts = attempts.clone();
        coordinator.register_handler(
            TaskType::TagProcessing,
            handler_fn(move |context: TaskContext| {
                let attempts = attempts.clone();
                async move {
                    attempts.lock().unwrap().push(context.attempt);
                    if context.attempt == 0 {
                        Ok::<_, anyhow::Error>(TaskOutput::failure("tag index locked"))
                    } else {
                        Ok(TaskOutput::success().with_result("tagsApplied", serde_json::json!(5)))
                    }
                }
            }),
        );
    }

    coordinator.start().await.unwrap();
    coordinator.trigger_tag_processing_sync().await.unwrap();
    wait_until(|| coordinator.statistics().successful_syncs == 1).await;
    coordinator.stop().await.unwrap();

    assert_eq!(*attempts.lock().unwrap(), vec![0, 1]);

    let info = coordinator
        .task_execution_info(TaskType::TagProcessing)
        .unwrap();
    assert_eq!(info.total_runs, 2);
    assert_eq!(info.successful_runs, 1);
    assert_eq!(info.consecutive_failures, 0);
    assert!(info.last_run_successful);
    assert_eq!(coordinator.statistics().tags_applied, 5);

    let errors = coordinator.recent_errors(10).await;
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].message, "tag index locked");
}

#[tokio::test]
async fn test_stop_abandons_delayed_retry() {
    let coordinator = quiet_coordinator().await;
    let calls = Arc::new(AtomicU32::new(0));

    // Default retry policy waits minutes before the next attempt
    {
        let calls = calls.clone();
        coordinator.register_handler(
            TaskType::ArticleCleanup,
            handler_fn(move |_context| {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, anyhow::Error>(TaskOutput::failure("database busy"))
                }
            }),
        );
    }

    coordinator.start().await.unwrap();
    coordinator.trigger_cleanup_sync().await.unwrap();
    wait_until(|| total_runs(&coordinator, TaskType::ArticleCleanup) == 1).await;

    tokio::time::timeout(Duration::from_secs(5), coordinator.stop())
        .await
        .expect("Stop should cancel pending retry timers")
        .unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(coordinator.queue_len().await, 0);
}

#[tokio::test]
async fn test_missing_handler_fails_without_retry() {
    let coordinator = quiet_coordinator().await;
    coordinator
        .configure_task_retry(TaskType::RuleProcessing, 3, 0)
        .unwrap();

    coordinator.start().await.unwrap();
    coordinator
        .trigger_task(TaskType::RuleProcessing, Default::default())
        .await
        .unwrap();
    wait_until(|| total_runs(&coordinator, TaskType::RuleProcessing) == 1).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    coordinator.stop().await.unwrap();

    assert_eq!(total_runs(&coordinator, TaskType::RuleProcessing), 1);
    let errors = coordinator.recent_errors(10).await;
    assert_eq!(errors.len(), 1);
    assert!(!errors[0].is_recoverable);
}

#[tokio::test]
async fn test_error_history_is_capped() {
    let config = CoordinatorConfig {
        tick_interval_ms: 10,
        worker_count: Some(1),
        max_error_history: 5,
        ..Default::default()
    };
    let coordinator = SyncCoordinator::from_config(config).await;
    for task_type in TaskType::ALL {
        coordinator.configure_task(task_type, false).await.unwrap();
    }
    coordinator
        .configure_task_retry(TaskType::CacheMaintenance, 0, 0)
        .unwrap();
    coordinator.register_handler(
        TaskType::CacheMaintenance,
        handler_fn(|context: TaskContext| async move {
            Err::<TaskOutput, _>(anyhow::anyhow!(
                "eviction failed for request {}",
                context.request_id
            ))
        }),
    );

    coordinator.start().await.unwrap();
    for _ in 0..8 {
        coordinator
            .trigger_task(TaskType::CacheMaintenance, Default::default())
            .await
            .unwrap();
    }
    wait_until(|| total_runs(&coordinator, TaskType::CacheMaintenance) == 8).await;
    coordinator.stop().await.unwrap();

    let errors = coordinator.recent_errors(100).await;
    assert_eq!(errors.len(), 5);
    assert!(
        errors
            .windows(2)
            .all(|pair| pair[0].error_time >= pair[1].error_time)
    );

    coordinator.clear_error_history().await;
    assert!(coordinator.recent_errors(100).await.is_empty());
}
