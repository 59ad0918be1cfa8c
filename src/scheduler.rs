//! The scheduling engine: each tick gathers queued tasks, runs the plugin
//! pipeline per task, and writes the chosen assignment through the task
//! cache.

use std::collections::HashMap;
use std::sync::Arc;

use rand::seq::SliceRandom;
use tokio_util::sync::CancellationToken;

use crate::cache::Cache;
use crate::client::TesClient;
use crate::config::Options;
use crate::controller::Controller;
use crate::cron::CronRunner;
use crate::error::{Result, SchedulerError};
use crate::models::{ClusterInfo, TaskInfo, TaskState};
use crate::plugin::{create_plugins, CycleState, PluginsGroup, MAX_SCORE, MIN_SCORE};

pub struct Scheduler {
    cron: CronRunner,
}

/// The scheduling engine proper: the per-tick pipeline over the shared
/// caches, without the periodic plumbing.
pub struct SchedulerCore {
    cache: Arc<Cache>,
    plugins: PluginsGroup,
    cluster_not_ready_timeout: chrono::Duration,
}

impl Scheduler {
    /// Boot the caches, build the plugin pipeline and the controller, and
    /// register every periodic job. Any failure here is fatal to startup.
    pub async fn new(opts: &Options, client: Arc<dyn TesClient>) -> Result<Self> {
        let cache = Arc::new(Cache::new(client, opts.cache.sync_period).await?);
        let plugins = create_plugins(&opts.plugins, &cache)?;

        let core = Arc::new(SchedulerCore::new(
            cache.clone(),
            plugins,
            opts.cluster_not_ready_timeout,
        )?);
        let controller = Arc::new(Controller::new(&opts.controller, cache.clone())?);

        let mut cron = CronRunner::new();

        let sync_cache = cache.clone();
        cron.register(opts.cache.sync_period, move || {
            let cache = sync_cache.clone();
            async move {
                if let Err(err) = cache.clusters.sync().await {
                    tracing::error!(error = %err, "Failed to sync clusters");
                }
            }
        });
        let sync_cache = cache.clone();
        cron.register(opts.cache.sync_period, move || {
            let cache = sync_cache.clone();
            async move {
                if let Err(err) = cache.tasks.sync().await {
                    tracing::error!(error = %err, "Failed to sync tasks");
                }
            }
        });
        let sync_cache = cache.clone();
        cron.register(opts.cache.sync_period, move || {
            let cache = sync_cache.clone();
            async move {
                if let Err(err) = cache.extra_priorities.sync().await {
                    tracing::error!(error = %err, "Failed to sync extra priorities");
                }
            }
        });

        let reschedule_controller = controller.clone();
        cron.register(opts.controller.period, move || {
            let controller = reschedule_controller.clone();
            async move {
                if let Err(err) = controller.reschedule_tasks().await {
                    tracing::error!(error = %err, "Reschedule sweep failed");
                }
            }
        });
        let fail_controller = controller.clone();
        cron.register(opts.controller.period, move || {
            let controller = fail_controller.clone();
            async move {
                if let Err(err) = controller.mark_tasks_failed_not_meet_limits().await {
                    tracing::error!(error = %err, "Fail-limits sweep failed");
                }
            }
        });

        let schedule_core = core.clone();
        cron.register(opts.schedule_period, move || {
            let core = schedule_core.clone();
            async move { core.schedule_tasks().await }
        });

        Ok(Self { cron })
    }

    /// Run all periodic jobs until cancellation, then wait for in-flight
    /// jobs to finish.
    pub async fn run(mut self, token: CancellationToken) {
        self.cron.start();
        token.cancelled().await;
        self.cron.stop().await;
    }
}

impl SchedulerCore {
    pub fn new(
        cache: Arc<Cache>,
        plugins: PluginsGroup,
        cluster_not_ready_timeout: std::time::Duration,
    ) -> Result<Self> {
        Ok(Self {
            cache,
            plugins,
            cluster_not_ready_timeout: chrono::Duration::from_std(cluster_not_ready_timeout)
                .map_err(|err| SchedulerError::Validation(err.to_string()))?,
        })
    }

    /// One scheduling tick.
    pub async fn schedule_tasks(&self) {
        let tasks = self.cache.tasks.list_tasks("").await;
        let mut to_schedule: Vec<Arc<TaskInfo>> = Vec::with_capacity(tasks.len());
        for task in tasks {
            if task.state == TaskState::Canceling {
                self.cancel_unscheduled_task(&task).await;
                continue;
            }
            if task.state != TaskState::Queued {
                continue;
            }
            to_schedule.push(task);
        }
        if to_schedule.is_empty() {
            return;
        }

        let now = chrono::Utc::now();
        let ready_clusters: Vec<Arc<ClusterInfo>> = self
            .cache
            .clusters
            .list_clusters()
            .iter()
            .filter(|cluster| {
                now.signed_duration_since(cluster.heartbeat_timestamp)
                    <= self.cluster_not_ready_timeout
            })
            .cloned()
            .collect();
        if ready_clusters.is_empty() {
            return;
        }

        if let Some(sort) = self.plugins.sort.as_ref() {
            to_schedule.sort_by(|a, b| {
                if sort.less(a, b) {
                    std::cmp::Ordering::Less
                } else if sort.less(b, a) {
                    std::cmp::Ordering::Greater
                } else {
                    std::cmp::Ordering::Equal
                }
            });
        }

        for task in &to_schedule {
            self.schedule_task(task, &ready_clusters).await;
        }
    }

    /// A canceling task with no cluster has no executor to signal, so the
    /// scheduler owns the transition to CANCELED.
    async fn cancel_unscheduled_task(&self, task: &TaskInfo) {
        if let Err(err) = self
            .cache
            .tasks
            .update_task(&task.id, Some(TaskState::Canceled), None, None)
            .await
        {
            tracing::error!(task = %task.id, error = %err, "Failed to cancel unscheduled task");
            return;
        }
        tracing::info!(task = %task.id, "Directly canceled unscheduled task");
    }

    async fn schedule_task(&self, task: &TaskInfo, clusters: &[Arc<ClusterInfo>]) {
        let mut cycle_state = CycleState::new();

        for global_filter in &self.plugins.global_filters {
            if let Err(err) = global_filter.global_filter(task, &mut cycle_state).await {
                self.record_unscheduled_reason(
                    &task.id,
                    HashMap::from([(global_filter.name(), vec![err])]),
                );
                return;
            }
        }

        let (available_clusters, reasons) = self
            .filter_available_clusters(task, clusters, &mut cycle_state)
            .await;
        if available_clusters.is_empty() {
            self.record_unscheduled_reason(&task.id, reasons);
            return;
        }

        let cluster_scores = self.score_clusters(task, &available_clusters, &cycle_state);
        let chosen = pick_max_score(&cluster_scores);

        if let Err(err) = self
            .cache
            .tasks
            .update_task(&task.id, None, Some(chosen.clone()), None)
            .await
        {
            self.record_unscheduled_reason(&task.id, HashMap::from([("finalUpdate", vec![err])]));
            return;
        }
        metrics::counter!("scheduler_tasks_scheduled_total").increment(1);
        tracing::info!(task = %task.id, cluster = %chosen, "Successfully scheduled task");
    }

    async fn filter_available_clusters(
        &self,
        task: &TaskInfo,
        clusters: &[Arc<ClusterInfo>],
        cycle_state: &mut CycleState,
    ) -> (Vec<Arc<ClusterInfo>>, HashMap<&'static str, Vec<SchedulerError>>) {
        let mut available = Vec::new();
        let mut reasons: HashMap<&'static str, Vec<SchedulerError>> = HashMap::new();
        for cluster in clusters {
            let mut cluster_available = true;
            for filter in &self.plugins.filters {
                if let Err(err) = filter.filter(task, cluster, cycle_state).await {
                    reasons.entry(filter.name()).or_default().push(
                        SchedulerError::Unschedulable(format!("cluster[{}]: {err}", cluster.id)),
                    );
                    cluster_available = false;
                    break;
                }
            }
            if cluster_available {
                available.push(cluster.clone());
            }
        }
        (available, reasons)
    }

    fn score_clusters(
        &self,
        task: &TaskInfo,
        available_clusters: &[Arc<ClusterInfo>],
        cycle_state: &CycleState,
    ) -> Vec<(String, i64)> {
        available_clusters
            .iter()
            .map(|cluster| {
                if self.plugins.scores.is_empty() {
                    return (cluster.id.clone(), MAX_SCORE);
                }
                let sum: i64 = self
                    .plugins
                    .scores
                    .iter()
                    .map(|score| score.score(task, cluster, cycle_state).clamp(MIN_SCORE, MAX_SCORE))
                    .sum();
                (cluster.id.clone(), sum / self.plugins.scores.len() as i64)
            })
            .collect()
    }

    fn record_unscheduled_reason(
        &self,
        task_id: &str,
        reasons: HashMap<&'static str, Vec<SchedulerError>>,
    ) {
        let details: Vec<String> = reasons
            .iter()
            .map(|(name, errs)| {
                let joined: Vec<String> = errs.iter().map(ToString::to_string).collect();
                format!("{name}: {}", joined.join("; "))
            })
            .collect();
        metrics::counter!("scheduler_tasks_unschedulable_total").increment(1);
        tracing::info!(task = %task_id, reasons = %details.join(" | "), "Failed to schedule task");
    }
}

/// Choose among the clusters that share the maximum score, uniformly at
/// random. Must be called with at least one entry.
fn pick_max_score(cluster_scores: &[(String, i64)]) -> String {
    let max = cluster_scores
        .iter()
        .map(|(_, score)| *score)
        .max()
        .unwrap_or(MIN_SCORE);
    let tied: Vec<&String> = cluster_scores
        .iter()
        .filter(|(_, score)| *score == max)
        .map(|(cluster_id, _)| cluster_id)
        .collect();
    tied.choose(&mut rand::thread_rng())
        .map(|cluster_id| (*cluster_id).clone())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pick_max_score_single_max() {
        let scores = vec![
            ("cluster-01".to_string(), 10),
            ("cluster-02".to_string(), 20),
            ("cluster-03".to_string(), 8),
        ];
        for _ in 0..20 {
            assert_eq!(pick_max_score(&scores), "cluster-02");
        }
    }

    #[test]
    fn test_pick_max_score_excludes_losers_from_tie_set() {
        // First entry is the maximum, later entries strictly smaller: the
        // tie set must contain only the maximum entries.
        let scores = vec![
            ("cluster-max".to_string(), 50),
            ("cluster-low".to_string(), 10),
            ("cluster-lower".to_string(), 5),
        ];
        for _ in 0..50 {
            assert_eq!(pick_max_score(&scores), "cluster-max");
        }
    }

    #[test]
    fn test_pick_max_score_ties_are_random() {
        let scores = vec![
            ("cluster-01".to_string(), 30),
            ("cluster-02".to_string(), 30),
        ];
        let mut seen = std::collections::HashSet::new();
        for _ in 0..200 {
            seen.insert(pick_max_score(&scores));
        }
        assert!(seen.contains("cluster-01"));
        assert!(seen.contains("cluster-02"));
    }
}
