
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use test_harness::{wire_cluster, wire_resources, wire_task, MockTesClient, RecordedUpdate};

use tes_scheduler::cache::Cache;
use tes_scheduler::client::models as wire;
use tes_scheduler::config::ControllerOptions;
use tes_scheduler::controller::Controller;
use tes_scheduler::models::TaskState;

fn controller_options() -> ControllerOptions {
    ControllerOptions {
        period: Duration::from_secs(10),
        cluster_reschedule_timeout: Duration::from_secs(20 * 60),
    }
}

async fn build_controller(client: &Arc<MockTesClient>) -> (Controller, Arc<Cache>) {
    let cache = Arc::new(
        Cache::new(client.clone(), Duration::from_secs(10))
            .await
            .expect("cache boot should succeed"),
    );
    let controller = Controller::new(&controller_options(), cache.clone()).unwrap();
    (controller, cache)
}

#[tokio::test]
async fn test_reschedule_sweep_moves_tasks_off_dead_clusters() {
    let client = Arc::new(MockTesClient::new());
    client.clusters.lock().unwrap().extend([
        wire_cluster("cluster-normal", Utc::now()),
        wire_cluster("cluster-too-old", Utc::now() - chrono::Duration::hours(1)),
    ]);
    client.tasks.lock().unwrap().extend([
        wire_task("task-01", TaskState::Running, "cluster-too-old"),
        wire_task("task-02", TaskState::Canceling, "cluster-too-old"),
        wire_task("task-03", TaskState::Queued, "cluster-deleted"),
        wire_task("task-04", TaskState::Canceling, "cluster-deleted"),
        wire_task("task-05", TaskState::Running, "cluster-normal"),
    ]);
    let (controller, _cache) = build_controller(&client).await;

    controller.reschedule_tasks().await.unwrap();

    let expect_requeued = |update: &RecordedUpdate| {
        assert_eq!(update.state, Some(TaskState::Queued));
        assert_eq!(update.cluster_id.as_deref(), Some(""));
    };
    let expect_canceled = |update: &RecordedUpdate| {
        assert_eq!(update.state, Some(TaskState::Canceled));
        assert_eq!(update.cluster_id, None);
    };

    expect_requeued(&client.update_for("task-01").unwrap());
    expect_canceled(&client.update_for("task-02").unwrap());
    expect_requeued(&client.update_for("task-03").unwrap());
    expect_canceled(&client.update_for("task-04").unwrap());

    // The healthy cluster's task is untouched.
    assert!(client.update_for("task-05").is_none());
    assert_eq!(client.recorded_updates().len(), 4);
}

#[tokio::test]
async fn test_reschedule_sweep_returns_tasks_to_unscheduled_pool() {
    let client = Arc::new(MockTesClient::new());
    client
        .tasks
        .lock()
        .unwrap()
        .push(wire_task("task-01", TaskState::Running, "cluster-gone"));
    let (controller, cache) = build_controller(&client).await;

    controller.reschedule_tasks().await.unwrap();

    assert_eq!(cache.tasks.list_tasks("").await.len(), 1);
    assert!(cache.tasks.list_tasks("cluster-gone").await.is_empty());
}

#[tokio::test]
async fn test_one_failed_update_does_not_abort_the_sweep() {
    let client = Arc::new(MockTesClient::new());
    client.tasks.lock().unwrap().extend([
        wire_task("task-01", TaskState::Running, "cluster-gone"),
        wire_task("task-02", TaskState::Running, "cluster-gone"),
    ]);
    client
        .fail_update_ids
        .lock()
        .unwrap()
        .push("task-01".to_string());
    let (controller, _cache) = build_controller(&client).await;

    let result = controller.reschedule_tasks().await;
    assert!(result.is_err());

    // The other task was still rescheduled.
    let update = client.update_for("task-02").unwrap();
    assert_eq!(update.state, Some(TaskState::Queued));
}

#[tokio::test]
async fn test_fail_limits_sweep_marks_unsatisfiable_tasks() {
    let client = Arc::new(MockTesClient::new());
    {
        let mut cluster = wire_cluster("cluster-01", Utc::now());
        cluster.limits = Some(wire::Limits {
            cpu_cores: Some(4),
            ram_gb: None,
            gpu_limit: None,
        });
        client.clusters.lock().unwrap().push(cluster);
    }
    {
        let mut too_big = wire_task("task-too-big", TaskState::Queued, "");
        too_big.resources = Some(wire_resources(8, 1.0, 1.0));
        let mut fits = wire_task("task-fits", TaskState::Queued, "");
        fits.resources = Some(wire_resources(2, 1.0, 1.0));
        let mut canceling = wire_task("task-canceling", TaskState::Canceling, "");
        canceling.resources = Some(wire_resources(8, 1.0, 1.0));
        client
            .tasks
            .lock()
            .unwrap()
            .extend([too_big, fits, canceling]);
    }
    let (controller, _cache) = build_controller(&client).await;

    controller.mark_tasks_failed_not_meet_limits().await.unwrap();

    let update = client.update_for("task-too-big").unwrap();
    assert_eq!(update.state, Some(TaskState::SystemError));
    assert!(update.system_logs[0].contains("no cluster limits match task resources"));
    assert!(update.system_logs[0].contains("cluster[cluster-01]"));

    // Fitting and non-queued tasks are untouched.
    assert!(client.update_for("task-fits").is_none());
    assert!(client.update_for("task-canceling").is_none());
}

#[tokio::test]
async fn test_fail_limits_sweep_skipped_with_no_known_clusters() {
    let client = Arc::new(MockTesClient::new());
    let mut too_big = wire_task("task-too-big", TaskState::Queued, "");
    too_big.resources = Some(wire_resources(64, 1.0, 1.0));
    client.tasks.lock().unwrap().push(too_big);
    let (controller, _cache) = build_controller(&client).await;

    controller.mark_tasks_failed_not_meet_limits().await.unwrap();

    // A transient control-plane outage must not mass-fail the queue.
    assert!(client.recorded_updates().is_empty());
}
