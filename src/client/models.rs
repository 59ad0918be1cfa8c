//! Wire types of the upstream task service API.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::models::TaskState;

/// Projection of task fields returned by list/get calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    Minimal,
    Basic,
    Full,
}

impl View {
    pub fn as_str(self) -> &'static str {
        match self {
            View::Minimal => "MINIMAL",
            View::Basic => "BASIC",
            View::Full => "FULL",
        }
    }
}

pub const DEFAULT_PAGE_SIZE: i32 = 256;
pub const MAXIMUM_PAGE_SIZE: i32 = 2048;

#[derive(Debug, Clone, Default)]
pub struct ListTasksRequest {
    pub state: Vec<TaskState>,
    pub view: Option<View>,
    pub page_size: i32,
    pub page_token: String,
    pub name_prefix: Option<String>,
    pub cluster_id: Option<String>,
    pub without_cluster: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ListTasksResponse {
    #[serde(default)]
    pub tasks: Vec<Task>,
    #[serde(default)]
    pub next_page_token: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Task {
    pub id: String,
    pub state: TaskState,
    #[serde(default)]
    pub cluster_id: String,
    #[serde(default)]
    pub creation_time: String,
    #[serde(default)]
    pub resources: Option<Resources>,
    #[serde(default)]
    pub bioos_info: Option<BioosInfo>,
    #[serde(default)]
    pub priority_value: i32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Resources {
    #[serde(default)]
    pub cpu_cores: i32,
    #[serde(default)]
    pub ram_gb: f64,
    #[serde(default)]
    pub disk_gb: f64,
    #[serde(default)]
    pub gpu: Option<GpuResource>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GpuResource {
    #[serde(default)]
    pub count: f64,
    #[serde(rename = "type", default)]
    pub gpu_type: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BioosInfo {
    #[serde(default)]
    pub account_id: String,
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub submission_id: String,
    #[serde(default)]
    pub run_id: String,
}

#[derive(Debug, Clone)]
pub struct GetTaskRequest {
    pub id: String,
    pub view: Option<View>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GetTaskResponse {
    pub task: Task,
}

/// PATCH body for a task update. `state` and `cluster_id` are omitted when
/// unset, so the upstream treats an absent field as "no change"; an empty
/// `cluster_id` explicitly clears the assignment.
#[derive(Debug, Clone, Serialize)]
pub struct UpdateTaskRequest {
    #[serde(skip_serializing)]
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<TaskState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cluster_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logs: Option<Vec<TaskLog>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskLog {
    pub cluster_id: String,
    pub system_logs: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateTaskResponse {}

#[derive(Debug, Clone, Deserialize)]
pub struct Cluster {
    pub id: String,
    #[serde(default)]
    pub heartbeat_timestamp: String,
    #[serde(default)]
    pub capacity: Option<Capacity>,
    #[serde(default)]
    pub limits: Option<Limits>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Capacity {
    #[serde(default)]
    pub count: Option<i32>,
    #[serde(default)]
    pub cpu_cores: Option<i32>,
    #[serde(default)]
    pub ram_gb: Option<f64>,
    #[serde(default)]
    pub disk_gb: Option<f64>,
    #[serde(default)]
    pub gpu_capacity: Option<GpuCapacity>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GpuCapacity {
    #[serde(default)]
    pub gpu: HashMap<String, f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Limits {
    #[serde(default)]
    pub cpu_cores: Option<i32>,
    #[serde(default)]
    pub ram_gb: Option<f64>,
    #[serde(default)]
    pub gpu_limit: Option<GpuLimit>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GpuLimit {
    #[serde(default)]
    pub gpu: HashMap<String, f64>,
}

#[derive(Debug, Clone, Default)]
pub struct GetQuotaRequest {
    pub global: bool,
    pub account_id: String,
    pub user_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResourceQuota {
    #[serde(default)]
    pub count: Option<i32>,
    #[serde(default)]
    pub cpu_cores: Option<i32>,
    #[serde(default)]
    pub ram_gb: Option<f64>,
    #[serde(default)]
    pub disk_gb: Option<f64>,
    #[serde(default)]
    pub gpu_quota: Option<GpuQuota>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GpuQuota {
    #[serde(default)]
    pub gpu: HashMap<String, f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExtraPriority {
    #[serde(default)]
    pub account_id: String,
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub submission_id: String,
    #[serde(default)]
    pub run_id: String,
    #[serde(default)]
    pub extra_priority_value: i32,
}
