use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::client::models as wire;
use crate::client::models::{
    GetTaskRequest, ListTasksRequest, TaskLog, UpdateTaskRequest, View, DEFAULT_PAGE_SIZE,
    MAXIMUM_PAGE_SIZE,
};
use crate::client::TesClient;
use crate::error::Result;
use crate::models::{
    BioosInfo, GpuResource, Resources, TaskInfo, TaskState, NON_FINISHED_STATES,
};

/// `cluster_id` attached to task log entries written by this process.
const SCHEDULER_LOG_CLUSTER_ID: &str = "scheduler";

#[derive(Default)]
struct TaskData {
    tasks: HashMap<String, Arc<TaskInfo>>,
    /// clusterID -> taskID set. The empty-string bucket holds unscheduled
    /// tasks; every cached task appears in exactly one bucket.
    cluster_index: HashMap<String, HashSet<String>>,
}

impl TaskData {
    fn add_task(&mut self, task: Arc<TaskInfo>) {
        self.cluster_index
            .entry(task.cluster_id.clone())
            .or_default()
            .insert(task.id.clone());
        self.tasks.insert(task.id.clone(), task);
    }

    /// Replace the entity rather than mutating it, so readers holding an
    /// `Arc` from a previous list call keep observing the old value.
    fn update_task(&mut self, id: &str, state: Option<TaskState>, cluster_id: Option<&str>) {
        let Some(old_task) = self.tasks.get(id) else {
            return;
        };
        let mut new_task = TaskInfo::clone(old_task);

        if let Some(state) = state {
            new_task.state = state;
        }
        if let Some(cluster_id) = cluster_id {
            if new_task.cluster_id != cluster_id {
                let old_cluster = new_task.cluster_id.clone();
                new_task.cluster_id = cluster_id.to_string();
                if let Some(bucket) = self.cluster_index.get_mut(&old_cluster) {
                    bucket.remove(id);
                    if bucket.is_empty() {
                        self.cluster_index.remove(&old_cluster);
                    }
                }
                self.cluster_index
                    .entry(cluster_id.to_string())
                    .or_default()
                    .insert(id.to_string());
            }
        }
        self.tasks.insert(id.to_string(), Arc::new(new_task));
    }

    fn delete_task(&mut self, id: &str) {
        let Some(old_task) = self.tasks.remove(id) else {
            return;
        };
        if let Some(bucket) = self.cluster_index.get_mut(&old_task.cluster_id) {
            bucket.remove(id);
            if bucket.is_empty() {
                self.cluster_index.remove(&old_task.cluster_id);
            }
        }
    }
}

/// Authoritative in-memory mirror of the upstream's non-terminal tasks,
/// indexed by assigned cluster.
pub struct TaskCache {
    client: Arc<dyn TesClient>,
    data: RwLock<TaskData>,
}

impl TaskCache {
    /// Performs the initial fill; startup fails if it does.
    pub async fn new(client: Arc<dyn TesClient>) -> Result<Self> {
        let cache = Self {
            client,
            data: RwLock::new(TaskData::default()),
        };
        {
            let tasks = cache.list_all(View::Basic, DEFAULT_PAGE_SIZE).await?;
            let mut data = cache.data.write().await;
            for task in tasks {
                data.add_task(Arc::new(task_info_from_wire(task)));
            }
        }
        Ok(cache)
    }

    /// Tasks assigned to the given cluster; the empty string lists
    /// unscheduled tasks.
    pub async fn list_tasks(&self, cluster_id: &str) -> Vec<Arc<TaskInfo>> {
        let data = self.data.read().await;
        let Some(ids) = data.cluster_index.get(cluster_id) else {
            return Vec::new();
        };
        ids.iter()
            .filter_map(|id| data.tasks.get(id).cloned())
            .collect()
    }

    pub async fn list_scheduled_tasks(&self) -> Vec<Arc<TaskInfo>> {
        let data = self.data.read().await;
        data.tasks
            .values()
            .filter(|task| !task.cluster_id.is_empty())
            .cloned()
            .collect()
    }

    pub async fn list_task_cluster_ids(&self) -> Vec<String> {
        let data = self.data.read().await;
        data.cluster_index
            .keys()
            .filter(|cluster_id| !cluster_id.is_empty())
            .cloned()
            .collect()
    }

    /// Write-through update: the upstream call is the commit point, and the
    /// cache is only touched after it succeeds. A terminal state removes the
    /// task from the cache.
    pub async fn update_task(
        &self,
        id: &str,
        state: Option<TaskState>,
        cluster_id: Option<String>,
        message: Option<String>,
    ) -> Result<()> {
        let req = UpdateTaskRequest {
            id: id.to_string(),
            state,
            cluster_id: cluster_id.clone(),
            logs: message.map(|message| {
                vec![TaskLog {
                    cluster_id: SCHEDULER_LOG_CLUSTER_ID.to_string(),
                    system_logs: vec![message],
                }]
            }),
        };
        self.client.update_task(&req).await?;

        let mut data = self.data.write().await;
        if state.is_some_and(TaskState::is_finished) {
            data.delete_task(id);
            return Ok(());
        }
        data.update_task(id, state, cluster_id.as_deref());
        Ok(())
    }

    /// Rebuild the snapshot from the upstream's current non-terminal set.
    ///
    /// The write lock is held for the whole run, list call included: if the
    /// list happened before an in-flight `update_task` committed, swapping
    /// in the stale snapshot afterwards would silently revert it. Tasks that
    /// have disappeared from the upstream's non-terminal set are dropped.
    pub async fn sync(&self) -> Result<()> {
        let mut data = self.data.write().await;

        let tasks = self.list_all(View::Minimal, MAXIMUM_PAGE_SIZE).await?;

        let mut new_data = TaskData::default();
        for task in tasks {
            if let Some(old_task) = data.tasks.get(&task.id) {
                new_data.add_task(old_task.clone());
                new_data.update_task(&task.id, Some(task.state), None);
                continue;
            }
            let resp = self
                .client
                .get_task(&GetTaskRequest {
                    id: task.id.clone(),
                    view: Some(View::Basic),
                })
                .await?;
            new_data.add_task(Arc::new(task_info_from_wire(resp.task)));
        }

        *data = new_data;
        Ok(())
    }

    async fn list_all(&self, view: View, page_size: i32) -> Result<Vec<wire::Task>> {
        let mut tasks = Vec::new();
        let mut page_token = String::new();
        loop {
            let resp = self
                .client
                .list_tasks(&ListTasksRequest {
                    state: NON_FINISHED_STATES.to_vec(),
                    view: Some(view),
                    page_size,
                    page_token: page_token.clone(),
                    ..Default::default()
                })
                .await?;
            tasks.extend(resp.tasks);
            if resp.next_page_token.is_empty() {
                break;
            }
            page_token = resp.next_page_token;
        }
        Ok(tasks)
    }
}

fn task_info_from_wire(task: wire::Task) -> TaskInfo {
    let creation_time = parse_creation_time(&task.id, &task.creation_time);
    TaskInfo {
        id: task.id,
        state: task.state,
        cluster_id: task.cluster_id,
        creation_time,
        resources: task.resources.map(resources_from_wire),
        bioos_info: task.bioos_info.map(bioos_info_from_wire),
        priority_value: task.priority_value,
    }
}

fn parse_creation_time(task_id: &str, raw: &str) -> DateTime<Utc> {
    if raw.is_empty() {
        return DateTime::<Utc>::UNIX_EPOCH;
    }
    match DateTime::parse_from_rfc3339(raw) {
        Ok(ts) => ts.with_timezone(&Utc),
        Err(err) => {
            tracing::error!(task = task_id, error = %err, "Failed to parse task creation time");
            DateTime::<Utc>::UNIX_EPOCH
        }
    }
}

fn resources_from_wire(resources: wire::Resources) -> Resources {
    Resources {
        cpu_cores: resources.cpu_cores,
        ram_gb: resources.ram_gb,
        disk_gb: resources.disk_gb,
        gpu: resources.gpu.map(|gpu| GpuResource {
            count: gpu.count,
            gpu_type: gpu.gpu_type,
        }),
    }
}

fn bioos_info_from_wire(bioos_info: wire::BioosInfo) -> BioosInfo {
    BioosInfo {
        account_id: bioos_info.account_id,
        user_id: bioos_info.user_id,
        submission_id: bioos_info.submission_id,
        run_id: bioos_info.run_id,
    }
}
