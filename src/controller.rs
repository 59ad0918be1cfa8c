//! Periodic sweeps that move tasks off dead clusters and terminally fail
//! tasks no cluster can ever admit.

use std::collections::HashSet;
use std::sync::Arc;

use crate::cache::Cache;
use crate::config::ControllerOptions;
use crate::error::{Result, SchedulerError};
use crate::limits::resources_meet_limits;
use crate::models::{ClusterInfo, TaskInfo, TaskState};

pub struct Controller {
    cache: Arc<Cache>,
    cluster_reschedule_timeout: chrono::Duration,
}

impl Controller {
    pub fn new(opts: &ControllerOptions, cache: Arc<Cache>) -> Result<Self> {
        Ok(Self {
            cache,
            cluster_reschedule_timeout: chrono::Duration::from_std(
                opts.cluster_reschedule_timeout,
            )
            .map_err(|err| SchedulerError::Validation(err.to_string()))?,
        })
    }

    /// Move every task off clusters that have stopped heartbeating for too
    /// long or disappeared from the cluster list entirely. Canceling tasks
    /// are canceled directly; everything else returns to the queue.
    pub async fn reschedule_tasks(&self) -> Result<()> {
        let clusters = self.cache.clusters.list_clusters();
        let task_cluster_ids = self.cache.tasks.list_task_cluster_ids().await;

        let now = chrono::Utc::now();
        let mut existing: HashSet<&str> = HashSet::with_capacity(clusters.len());
        let mut to_reschedule: Vec<String> = Vec::new();
        for cluster in clusters.iter() {
            existing.insert(cluster.id.as_str());
            if now.signed_duration_since(cluster.heartbeat_timestamp)
                > self.cluster_reschedule_timeout
            {
                to_reschedule.push(cluster.id.clone());
            }
        }
        for cluster_id in task_cluster_ids {
            if !existing.contains(cluster_id.as_str()) {
                to_reschedule.push(cluster_id);
            }
        }

        let mut failures = Vec::new();
        for cluster_id in &to_reschedule {
            for task in self.cache.tasks.list_tasks(cluster_id).await {
                if let Err(err) = self.reschedule_task(&task).await {
                    failures.push(format!("task[{}]: {err}", task.id));
                }
            }
        }
        aggregate(failures)
    }

    async fn reschedule_task(&self, task: &TaskInfo) -> Result<()> {
        if task.state == TaskState::Canceling {
            self.cache
                .tasks
                .update_task(&task.id, Some(TaskState::Canceled), None, None)
                .await?;
            tracing::info!(task = %task.id, "Directly canceled task pending reschedule");
            return Ok(());
        }
        self.cache
            .tasks
            .update_task(&task.id, Some(TaskState::Queued), Some(String::new()), None)
            .await?;
        metrics::counter!("controller_tasks_rescheduled_total").increment(1);
        tracing::info!(task = %task.id, "Rescheduled task");
        Ok(())
    }

    /// Terminally fail queued tasks whose resource request no known
    /// cluster's per-task limits admit. With zero clusters known the sweep
    /// is skipped, so a transient control-plane outage cannot mass-fail the
    /// queue.
    pub async fn mark_tasks_failed_not_meet_limits(&self) -> Result<()> {
        let tasks = self.cache.tasks.list_tasks("").await;
        let clusters = self.cache.clusters.list_clusters();

        if clusters.is_empty() {
            return Ok(());
        }

        let mut failures = Vec::new();
        for task in tasks {
            if task.state != TaskState::Queued {
                continue;
            }
            let Some(reason) = task_meets_no_limits(&task, &clusters) else {
                continue;
            };
            if let Err(err) = self
                .cache
                .tasks
                .update_task(
                    &task.id,
                    Some(TaskState::SystemError),
                    None,
                    Some(format!("no cluster limits match task resources: {reason}")),
                )
                .await
            {
                failures.push(format!("task[{}]: {err}", task.id));
            } else {
                metrics::counter!("controller_tasks_failed_total").increment(1);
                tracing::info!(task = %task.id, "Marked task failed: no cluster limits match");
            }
        }
        aggregate(failures)
    }
}

/// Returns `None` when at least one cluster admits the task, otherwise the
/// aggregated per-cluster reasons.
fn task_meets_no_limits(task: &TaskInfo, clusters: &[Arc<ClusterInfo>]) -> Option<String> {
    let mut reasons = Vec::with_capacity(clusters.len());
    for cluster in clusters {
        match resources_meet_limits(task.resources.as_ref(), cluster.limits.as_ref()) {
            Ok(()) => return None,
            Err(err) => reasons.push(format!("cluster[{}]: {err}", cluster.id)),
        }
    }
    Some(reasons.join("; "))
}

fn aggregate(failures: Vec<String>) -> Result<()> {
    if failures.is_empty() {
        Ok(())
    } else {
        Err(SchedulerError::Internal(failures.join("; ")))
    }
}
