use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskState {
    #[serde(rename = "QUEUED")]
    Queued,
    #[serde(rename = "INITIALIZING")]
    Initializing,
    #[serde(rename = "RUNNING")]
    Running,
    #[serde(rename = "COMPLETE")]
    Complete,
    #[serde(rename = "SYSTEM_ERROR")]
    SystemError,
    #[serde(rename = "EXECUTOR_ERROR")]
    ExecutorError,
    #[serde(rename = "CANCELING")]
    Canceling,
    #[serde(rename = "CANCELED")]
    Canceled,
}

/// States in which a task is still owned by the control plane. Everything
/// else is terminal and must not appear in the task cache.
pub const NON_FINISHED_STATES: [TaskState; 4] = [
    TaskState::Queued,
    TaskState::Initializing,
    TaskState::Running,
    TaskState::Canceling,
];

impl TaskState {
    pub fn is_finished(self) -> bool {
        !NON_FINISHED_STATES.contains(&self)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskState::Queued => "QUEUED",
            TaskState::Initializing => "INITIALIZING",
            TaskState::Running => "RUNNING",
            TaskState::Complete => "COMPLETE",
            TaskState::SystemError => "SYSTEM_ERROR",
            TaskState::ExecutorError => "EXECUTOR_ERROR",
            TaskState::Canceling => "CANCELING",
            TaskState::Canceled => "CANCELED",
        }
    }
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A non-terminal task as cached by the scheduler.
#[derive(Debug, Clone)]
pub struct TaskInfo {
    pub id: String,
    pub state: TaskState,
    /// Empty string means the task has not been scheduled to any cluster.
    pub cluster_id: String,
    pub creation_time: DateTime<Utc>,
    pub resources: Option<Resources>,
    pub bioos_info: Option<BioosInfo>,
    pub priority_value: i32,
}

#[derive(Debug, Clone)]
pub struct Resources {
    pub cpu_cores: i32,
    pub ram_gb: f64,
    pub disk_gb: f64,
    pub gpu: Option<GpuResource>,
}

#[derive(Debug, Clone)]
pub struct GpuResource {
    pub count: f64,
    /// Empty string means the task does not require a specific GPU type.
    pub gpu_type: String,
}

#[derive(Debug, Clone)]
pub struct BioosInfo {
    pub account_id: String,
    pub user_id: String,
    pub submission_id: String,
    pub run_id: String,
}

#[derive(Debug, Clone)]
pub struct ClusterInfo {
    pub id: String,
    pub heartbeat_timestamp: DateTime<Utc>,
    pub capacity: Option<Capacity>,
    pub limits: Option<Limits>,
}

/// Total schedulable resources of a cluster. A `None` field means the
/// dimension is unconstrained. A present `gpu_capacity` with an empty map
/// means the cluster explicitly offers no GPUs.
#[derive(Debug, Clone)]
pub struct Capacity {
    pub count: Option<i32>,
    pub cpu_cores: Option<i32>,
    pub ram_gb: Option<f64>,
    pub disk_gb: Option<f64>,
    pub gpu_capacity: Option<GpuCapacity>,
}

#[derive(Debug, Clone)]
pub struct GpuCapacity {
    pub gpu: HashMap<String, f64>,
}

/// Per-task hard caps of a cluster, independent of current occupancy.
#[derive(Debug, Clone)]
pub struct Limits {
    pub cpu_cores: Option<i32>,
    pub ram_gb: Option<f64>,
    pub gpu_limit: Option<GpuLimit>,
}

#[derive(Debug, Clone)]
pub struct GpuLimit {
    pub gpu: HashMap<String, f64>,
}

/// A priority-boost rule scoped to an account/user, a submission, or a run.
#[derive(Debug, Clone)]
pub struct ExtraPriorityInfo {
    pub account_id: String,
    pub user_id: String,
    pub submission_id: String,
    pub run_id: String,
    pub extra_priority_value: i32,
}

impl ExtraPriorityInfo {
    /// Whether this rule applies to the given task.
    ///
    /// An account-scoped rule whose user field is set but differs from the
    /// task's user rejects outright, without falling through to the
    /// submission/run checks.
    pub fn matches_task(&self, task: &TaskInfo) -> bool {
        let Some(info) = task.bioos_info.as_ref() else {
            return false;
        };
        if !self.account_id.is_empty() && self.account_id == info.account_id {
            return self.user_id.is_empty() || self.user_id == info.user_id;
        }
        if !self.submission_id.is_empty() && self.submission_id == info.submission_id {
            return true;
        }
        if !self.run_id.is_empty() && self.run_id == info.run_id {
            return true;
        }
        false
    }
}

/// Resource quota for a scope (global, account, or account/user). Null
/// semantics match `Capacity`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceQuota {
    pub count: Option<i32>,
    pub cpu_cores: Option<i32>,
    pub ram_gb: Option<f64>,
    pub disk_gb: Option<f64>,
    pub gpu_quota: Option<GpuQuota>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GpuQuota {
    pub gpu: HashMap<String, f64>,
}
