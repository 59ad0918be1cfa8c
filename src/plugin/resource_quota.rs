use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::cache::Cache;
use crate::error::{Result, SchedulerError};
use crate::models::{ResourceQuota as Quota, TaskInfo};

use super::{CycleState, GlobalFilterPlugin, Plugin};

pub const NAME: &str = "ResourceQuota";

/// Rejects a task whose admission would exceed the global, account, or user
/// resource quota, counting all currently scheduled tasks in the scope plus
/// the candidate itself.
pub struct ResourceQuota {
    cache: Arc<Cache>,
}

impl ResourceQuota {
    pub fn new(cache: Arc<Cache>) -> Self {
        Self { cache }
    }
}

impl Plugin for ResourceQuota {
    fn name(&self) -> &'static str {
        NAME
    }
}

#[async_trait]
impl GlobalFilterPlugin for ResourceQuota {
    async fn global_filter(&self, task: &TaskInfo, _cycle_state: &mut CycleState) -> Result<()> {
        let scheduled_tasks = self.cache.tasks.list_scheduled_tasks().await;

        if let Some(global_quota) = self.cache.quotas.get_global_quota().await? {
            check_quota(&global_quota, task, &scheduled_tasks, |_| true)
                .map_err(|err| SchedulerError::Unschedulable(format!("global quota: {err}")))?;
        }

        let Some(info) = task.bioos_info.as_ref() else {
            return Ok(());
        };

        if !info.account_id.is_empty() {
            if let Some(account_quota) =
                self.cache.quotas.get_account_quota(&info.account_id).await?
            {
                check_quota(&account_quota, task, &scheduled_tasks, |scheduled| {
                    scheduled
                        .bioos_info
                        .as_ref()
                        .is_some_and(|scheduled_info| scheduled_info.account_id == info.account_id)
                })
                .map_err(|err| {
                    SchedulerError::Unschedulable(format!(
                        "account[{}] quota: {err}",
                        info.account_id
                    ))
                })?;
            }
        }

        if !info.account_id.is_empty() && !info.user_id.is_empty() {
            if let Some(user_quota) = self
                .cache
                .quotas
                .get_user_quota(&info.account_id, &info.user_id)
                .await?
            {
                check_quota(&user_quota, task, &scheduled_tasks, |scheduled| {
                    scheduled.bioos_info.as_ref().is_some_and(|scheduled_info| {
                        scheduled_info.account_id == info.account_id
                            && scheduled_info.user_id == info.user_id
                    })
                })
                .map_err(|err| {
                    SchedulerError::Unschedulable(format!(
                        "user[{}/{}] quota: {err}",
                        info.account_id, info.user_id
                    ))
                })?;
            }
        }

        Ok(())
    }
}

fn check_quota<F>(
    quota: &Quota,
    task: &TaskInfo,
    scheduled_tasks: &[Arc<TaskInfo>],
    in_scope: F,
) -> Result<()>
where
    F: Fn(&TaskInfo) -> bool,
{
    let mut total_count: i32 = 0;
    let mut total_cpu_cores: i32 = 0;
    let mut total_ram_gb: f64 = 0.0;
    let mut total_disk_gb: f64 = 0.0;
    let mut total_gpu_count: f64 = 0.0;
    let mut total_gpu: HashMap<&str, f64> = HashMap::new();

    for scheduled in scheduled_tasks {
        if !in_scope(scheduled) {
            continue;
        }
        total_count += 1;
        let Some(resources) = scheduled.resources.as_ref() else {
            continue;
        };
        total_cpu_cores += resources.cpu_cores;
        total_ram_gb += resources.ram_gb;
        total_disk_gb += resources.disk_gb;
        let Some(gpu) = resources.gpu.as_ref() else {
            continue;
        };
        total_gpu_count += gpu.count;
        *total_gpu.entry(gpu.gpu_type.as_str()).or_default() += gpu.count;
    }

    let mut reasons = Vec::new();
    if let Some(count) = quota.count {
        if count < total_count + 1 {
            reasons.push(format!(
                "count should be no more than {count}, occupied {total_count}"
            ));
        }
    }
    if let Some(resources) = task.resources.as_ref() {
        if let Some(cpu_cores) = quota.cpu_cores {
            if resources.cpu_cores > 0 && cpu_cores < total_cpu_cores + resources.cpu_cores {
                reasons.push(format!(
                    "CPUCores should be no more than {cpu_cores}, occupied {total_cpu_cores}, claimed {}",
                    resources.cpu_cores
                ));
            }
        }
        if let Some(ram_gb) = quota.ram_gb {
            if resources.ram_gb > 0.0 && ram_gb < total_ram_gb + resources.ram_gb {
                reasons.push(format!(
                    "RamGB should be no more than {ram_gb:.2}, occupied {total_ram_gb:.2}, claimed {:.2}",
                    resources.ram_gb
                ));
            }
        }
        if let Some(disk_gb) = quota.disk_gb {
            if resources.disk_gb > 0.0 && disk_gb < total_disk_gb + resources.disk_gb {
                reasons.push(format!(
                    "DiskGB should be no more than {disk_gb:.2}, occupied {total_disk_gb:.2}, claimed {:.2}",
                    resources.disk_gb
                ));
            }
        }
        if let (Some(gpu_quota), Some(gpu)) = (quota.gpu_quota.as_ref(), resources.gpu.as_ref()) {
            if !gpu.gpu_type.is_empty() {
                // A typed request is checked only against its own type's quota.
                let occupied = total_gpu.get(gpu.gpu_type.as_str()).copied().unwrap_or(0.0);
                match gpu_quota.gpu.get(&gpu.gpu_type) {
                    None => reasons.push(format!("no match GPUType: {}", gpu.gpu_type)),
                    Some(&count_quota) if count_quota < occupied + gpu.count => {
                        reasons.push(format!(
                            "GPUCount should be no more than {count_quota:.2}, occupied {occupied:.2}, claimed {:.2}",
                            gpu.count
                        ));
                    }
                    Some(_) => {}
                }
            } else {
                let sum_quota: f64 = gpu_quota.gpu.values().sum();
                if sum_quota < total_gpu_count + gpu.count {
                    reasons.push(format!(
                        "GPUCount should be no more than {sum_quota:.2}, occupied {total_gpu_count:.2}, claimed {:.2}",
                        gpu.count
                    ));
                }
            }
        }
    }

    if reasons.is_empty() {
        Ok(())
    } else {
        Err(SchedulerError::Unschedulable(reasons.join("; ")))
    }
}
