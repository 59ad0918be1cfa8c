
use std::sync::Arc;
use std::time::Duration;

use test_harness::{wire_resources, wire_task, MockTesClient};

use tes_scheduler::cache::Cache;
use tes_scheduler::models::TaskState;

async fn build_cache(client: &Arc<MockTesClient>) -> Cache {
    Cache::new(client.clone(), Duration::from_secs(10))
        .await
        .expect("cache boot should succeed")
}

#[tokio::test]
async fn test_initial_fill_indexes_by_cluster() {
    let client = Arc::new(MockTesClient::new());
    client.tasks.lock().unwrap().extend([
        wire_task("task-01", TaskState::Queued, ""),
        wire_task("task-02", TaskState::Running, "cluster-01"),
        wire_task("task-03", TaskState::Initializing, "cluster-01"),
    ]);
    let cache = build_cache(&client).await;

    assert_eq!(cache.tasks.list_tasks("").await.len(), 1);
    assert_eq!(cache.tasks.list_tasks("cluster-01").await.len(), 2);
    assert_eq!(cache.tasks.list_scheduled_tasks().await.len(), 2);
    assert_eq!(
        cache.tasks.list_task_cluster_ids().await,
        vec!["cluster-01".to_string()]
    );
}

#[tokio::test]
async fn test_update_task_moves_between_buckets() {
    let client = Arc::new(MockTesClient::new());
    client
        .tasks
        .lock()
        .unwrap()
        .push(wire_task("task-01", TaskState::Queued, ""));
    let cache = build_cache(&client).await;

    cache
        .tasks
        .update_task("task-01", None, Some("cluster-01".to_string()), None)
        .await
        .unwrap();

    assert!(cache.tasks.list_tasks("").await.is_empty());
    let scheduled = cache.tasks.list_tasks("cluster-01").await;
    assert_eq!(scheduled.len(), 1);
    assert_eq!(scheduled[0].id, "task-01");
    assert_eq!(scheduled[0].cluster_id, "cluster-01");
    // State was not part of the update.
    assert_eq!(scheduled[0].state, TaskState::Queued);
}

#[tokio::test]
async fn test_update_task_terminal_state_removes_from_cache() {
    let client = Arc::new(MockTesClient::new());
    client
        .tasks
        .lock()
        .unwrap()
        .push(wire_task("task-01", TaskState::Running, "cluster-01"));
    let cache = build_cache(&client).await;

    cache
        .tasks
        .update_task("task-01", Some(TaskState::Complete), None, None)
        .await
        .unwrap();

    assert!(cache.tasks.list_tasks("cluster-01").await.is_empty());
    assert!(cache.tasks.list_scheduled_tasks().await.is_empty());
    assert!(cache.tasks.list_task_cluster_ids().await.is_empty());
}

#[tokio::test]
async fn test_update_task_replaces_entity_copy_on_write() {
    let client = Arc::new(MockTesClient::new());
    client
        .tasks
        .lock()
        .unwrap()
        .push(wire_task("task-01", TaskState::Queued, ""));
    let cache = build_cache(&client).await;

    let before = cache.tasks.list_tasks("").await;
    assert_eq!(before[0].cluster_id, "");

    cache
        .tasks
        .update_task(
            "task-01",
            Some(TaskState::Initializing),
            Some("cluster-01".to_string()),
            None,
        )
        .await
        .unwrap();

    // The reference captured before the update still observes the old value.
    assert_eq!(before[0].cluster_id, "");
    assert_eq!(before[0].state, TaskState::Queued);

    let after = cache.tasks.list_tasks("cluster-01").await;
    assert_eq!(after[0].state, TaskState::Initializing);
}

#[tokio::test]
async fn test_update_task_failure_leaves_cache_unchanged() {
    let client = Arc::new(MockTesClient::new());
    client
        .tasks
        .lock()
        .unwrap()
        .push(wire_task("task-01", TaskState::Queued, ""));
    let cache = build_cache(&client).await;
    client
        .fail_update_ids
        .lock()
        .unwrap()
        .push("task-01".to_string());

    let result = cache
        .tasks
        .update_task("task-01", None, Some("cluster-01".to_string()), None)
        .await;
    assert!(result.is_err());

    // The upstream call is the commit point; nothing moved.
    assert_eq!(cache.tasks.list_tasks("").await.len(), 1);
    assert!(cache.tasks.list_tasks("cluster-01").await.is_empty());
}

#[tokio::test]
async fn test_update_task_message_becomes_scheduler_log() {
    let client = Arc::new(MockTesClient::new());
    client
        .tasks
        .lock()
        .unwrap()
        .push(wire_task("task-01", TaskState::Queued, ""));
    let cache = build_cache(&client).await;

    cache
        .tasks
        .update_task(
            "task-01",
            Some(TaskState::SystemError),
            None,
            Some("no cluster fits".to_string()),
        )
        .await
        .unwrap();

    let update = client.update_for("task-01").unwrap();
    assert_eq!(update.log_cluster_id.as_deref(), Some("scheduler"));
    assert_eq!(update.system_logs, vec!["no cluster fits".to_string()]);
}

#[tokio::test]
async fn test_sync_applies_state_and_drops_vanished_tasks() {
    let client = Arc::new(MockTesClient::new());
    {
        let mut task = wire_task("task-01", TaskState::Queued, "cluster-01");
        task.resources = Some(wire_resources(4, 8.0, 100.0));
        client.tasks.lock().unwrap().extend([
            task,
            wire_task("task-02", TaskState::Running, "cluster-02"),
        ]);
    }
    let cache = build_cache(&client).await;

    // Upstream moves task-01 to RUNNING, task-02 finishes (disappears from
    // the non-terminal set), and task-03 appears.
    {
        let mut tasks = client.tasks.lock().unwrap();
        tasks.retain(|task| task.id != "task-02");
        tasks[0].state = TaskState::Running;
        tasks.push(wire_task("task-03", TaskState::Queued, "cluster-03"));
    }

    cache.tasks.sync().await.unwrap();

    // task-01 was carried over: new state, everything else preserved (the
    // MINIMAL listing has no resources to clobber them with).
    let carried = cache.tasks.list_tasks("cluster-01").await;
    assert_eq!(carried.len(), 1);
    assert_eq!(carried[0].state, TaskState::Running);
    assert_eq!(carried[0].resources.as_ref().unwrap().cpu_cores, 4);

    assert!(cache.tasks.list_tasks("cluster-02").await.is_empty());

    // task-03 was fetched individually at BASIC view.
    let added = cache.tasks.list_tasks("cluster-03").await;
    assert_eq!(added.len(), 1);
    assert_eq!(added[0].id, "task-03");

    let mut cluster_ids = cache.tasks.list_task_cluster_ids().await;
    cluster_ids.sort();
    assert_eq!(cluster_ids, vec!["cluster-01", "cluster-03"]);
}
