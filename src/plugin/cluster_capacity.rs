use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::cache::Cache;
use crate::error::{Result, SchedulerError};
use crate::models::{ClusterInfo, TaskInfo};

use super::{CycleState, FilterPlugin, Plugin, ScorePlugin, MAX_SCORE, MIN_SCORE};

pub const NAME: &str = "ClusterCapacity";

/// Cycle-state key holding a `HashMap<String, CapacityUsage>` of per-cluster
/// occupancy computed during Filter, so Score does not recompute the sums.
const USAGE_KEY: &str = "ClusterCapacity.usage";

/// Resources occupied by the tasks already assigned to one cluster.
#[derive(Debug, Clone, Default)]
pub struct CapacityUsage {
    pub count: i32,
    pub cpu_cores: i32,
    pub ram_gb: f64,
    pub disk_gb: f64,
    pub gpu_count: f64,
    pub gpu_by_type: HashMap<String, f64>,
}

/// Filters on remaining cluster capacity and scores survivors by headroom
/// (least-requested).
pub struct ClusterCapacity {
    cache: Arc<Cache>,
}

impl ClusterCapacity {
    pub fn new(cache: Arc<Cache>) -> Self {
        Self { cache }
    }

    async fn occupied(&self, cluster_id: &str) -> CapacityUsage {
        let mut usage = CapacityUsage::default();
        for scheduled in self.cache.tasks.list_tasks(cluster_id).await {
            usage.count += 1;
            let Some(resources) = scheduled.resources.as_ref() else {
                continue;
            };
            usage.cpu_cores += resources.cpu_cores;
            usage.ram_gb += resources.ram_gb;
            usage.disk_gb += resources.disk_gb;
            let Some(gpu) = resources.gpu.as_ref() else {
                continue;
            };
            usage.gpu_count += gpu.count;
            if !gpu.gpu_type.is_empty() {
                *usage.gpu_by_type.entry(gpu.gpu_type.clone()).or_default() += gpu.count;
            }
        }
        usage
    }
}

impl Plugin for ClusterCapacity {
    fn name(&self) -> &'static str {
        NAME
    }
}

#[async_trait]
impl FilterPlugin for ClusterCapacity {
    async fn filter(
        &self,
        task: &TaskInfo,
        cluster: &ClusterInfo,
        cycle_state: &mut CycleState,
    ) -> Result<()> {
        let Some(capacity) = cluster.capacity.as_ref() else {
            return Ok(());
        };

        let usage = self.occupied(&cluster.id).await;

        let mut reasons = Vec::new();
        if let Some(count) = capacity.count {
            if count < usage.count + 1 {
                reasons.push(format!(
                    "count should be no more than {count}, occupied {}",
                    usage.count
                ));
            }
        }
        if let Some(resources) = task.resources.as_ref() {
            if let Some(cpu_cores) = capacity.cpu_cores {
                if resources.cpu_cores > 0 && cpu_cores < usage.cpu_cores + resources.cpu_cores {
                    reasons.push(format!(
                        "CPUCores should be no more than {cpu_cores}, occupied {}, claimed {}",
                        usage.cpu_cores, resources.cpu_cores
                    ));
                }
            }
            if let Some(ram_gb) = capacity.ram_gb {
                if resources.ram_gb > 0.0 && ram_gb < usage.ram_gb + resources.ram_gb {
                    reasons.push(format!(
                        "RamGB should be no more than {ram_gb:.2}, occupied {:.2}, claimed {:.2}",
                        usage.ram_gb, resources.ram_gb
                    ));
                }
            }
            if let Some(disk_gb) = capacity.disk_gb {
                if resources.disk_gb > 0.0 && disk_gb < usage.disk_gb + resources.disk_gb {
                    reasons.push(format!(
                        "DiskGB should be no more than {disk_gb:.2}, occupied {:.2}, claimed {:.2}",
                        usage.disk_gb, resources.disk_gb
                    ));
                }
            }
            if let (Some(gpu_capacity), Some(gpu)) =
                (capacity.gpu_capacity.as_ref(), resources.gpu.as_ref())
            {
                // The total-count check applies even for a typed request:
                // already-scheduled tasks without a type may be drawing from
                // the same pool.
                let sum_capacity: f64 = gpu_capacity.gpu.values().sum();
                if sum_capacity < usage.gpu_count + gpu.count {
                    reasons.push(format!(
                        "GPUCount should be no more than {sum_capacity:.2}, occupied {:.2}, claimed {:.2}",
                        usage.gpu_count, gpu.count
                    ));
                }
                if !gpu.gpu_type.is_empty() {
                    let occupied = usage
                        .gpu_by_type
                        .get(gpu.gpu_type.as_str())
                        .copied()
                        .unwrap_or(0.0);
                    match gpu_capacity.gpu.get(&gpu.gpu_type) {
                        None => reasons.push(format!("no match GPUType: {}", gpu.gpu_type)),
                        Some(&count_capacity) if count_capacity < occupied + gpu.count => {
                            reasons.push(format!(
                                "GPUCount should be no more than {count_capacity:.2}, occupied {occupied:.2}, claimed {:.2}",
                                gpu.count
                            ));
                        }
                        Some(_) => {}
                    }
                }
            }
        }

        if !reasons.is_empty() {
            return Err(SchedulerError::Unschedulable(reasons.join("; ")));
        }

        if cycle_state
            .get::<HashMap<String, CapacityUsage>>(USAGE_KEY)
            .is_none()
        {
            cycle_state.insert(USAGE_KEY, HashMap::<String, CapacityUsage>::new());
        }
        if let Some(by_cluster) =
            cycle_state.get_mut::<HashMap<String, CapacityUsage>>(USAGE_KEY)
        {
            by_cluster.insert(cluster.id.clone(), usage);
        }
        Ok(())
    }
}

impl ScorePlugin for ClusterCapacity {
    fn score(&self, task: &TaskInfo, cluster: &ClusterInfo, cycle_state: &CycleState) -> i64 {
        let Some(capacity) = cluster.capacity.as_ref() else {
            return MAX_SCORE;
        };

        let default_usage = CapacityUsage::default();
        let usage = cycle_state
            .get::<HashMap<String, CapacityUsage>>(USAGE_KEY)
            .and_then(|by_cluster| by_cluster.get(cluster.id.as_str()))
            .unwrap_or(&default_usage);

        let mut total_score: i64 = 0;
        let mut total_items: i64 = 0;

        if let Some(count) = capacity.count {
            total_score += least_requested_score(f64::from(usage.count + 1), f64::from(count));
            total_items += 1;
        }
        if let Some(resources) = task.resources.as_ref() {
            if let Some(cpu_cores) = capacity.cpu_cores {
                if resources.cpu_cores > 0 {
                    total_score += least_requested_score(
                        f64::from(usage.cpu_cores + resources.cpu_cores),
                        f64::from(cpu_cores),
                    );
                    total_items += 1;
                }
            }
            if let Some(ram_gb) = capacity.ram_gb {
                if resources.ram_gb > 0.0 {
                    total_score += least_requested_score(usage.ram_gb + resources.ram_gb, ram_gb);
                    total_items += 1;
                }
            }
            if let Some(disk_gb) = capacity.disk_gb {
                if resources.disk_gb > 0.0 {
                    total_score +=
                        least_requested_score(usage.disk_gb + resources.disk_gb, disk_gb);
                    total_items += 1;
                }
            }
            if let (Some(gpu_capacity), Some(gpu)) =
                (capacity.gpu_capacity.as_ref(), resources.gpu.as_ref())
            {
                if gpu.gpu_type.is_empty() {
                    let sum_capacity: f64 = gpu_capacity.gpu.values().sum();
                    total_score +=
                        least_requested_score(usage.gpu_count + gpu.count, sum_capacity);
                } else {
                    let occupied = usage
                        .gpu_by_type
                        .get(gpu.gpu_type.as_str())
                        .copied()
                        .unwrap_or(0.0);
                    let count_capacity = gpu_capacity
                        .gpu
                        .get(&gpu.gpu_type)
                        .copied()
                        .unwrap_or(0.0);
                    total_score += least_requested_score(occupied + gpu.count, count_capacity);
                }
                total_items += 1;
            }
        }

        if total_items == 0 {
            return MAX_SCORE;
        }
        total_score / total_items
    }
}

/// `(capacity - requested) / capacity * 100`, clamped to [0, 100]. Prefers
/// clusters with more headroom left after admitting the task.
fn least_requested_score(requested: f64, capacity: f64) -> i64 {
    if capacity == 0.0 || requested > capacity {
        return MIN_SCORE;
    }
    ((capacity - requested) / capacity * MAX_SCORE as f64) as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_least_requested_score() {
        assert_eq!(least_requested_score(3.0, 10.0), 70);
        assert_eq!(least_requested_score(10.0, 10.0), 0);
        assert_eq!(least_requested_score(0.0, 10.0), 100);
        assert_eq!(least_requested_score(11.0, 10.0), 0);
        assert_eq!(least_requested_score(1.0, 0.0), 0);
    }
}
