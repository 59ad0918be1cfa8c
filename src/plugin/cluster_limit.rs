use async_trait::async_trait;

use crate::error::Result;
use crate::limits::resources_meet_limits;
use crate::models::{ClusterInfo, TaskInfo};

use super::{CycleState, FilterPlugin, Plugin};

pub const NAME: &str = "ClusterLimit";

/// Rejects a task whose request exceeds a cluster's per-task hard caps.
#[derive(Default)]
pub struct ClusterLimit;

impl ClusterLimit {
    pub fn new() -> Self {
        Self
    }
}

impl Plugin for ClusterLimit {
    fn name(&self) -> &'static str {
        NAME
    }
}

#[async_trait]
impl FilterPlugin for ClusterLimit {
    async fn filter(
        &self,
        task: &TaskInfo,
        cluster: &ClusterInfo,
        _cycle_state: &mut CycleState,
    ) -> Result<()> {
        resources_meet_limits(task.resources.as_ref(), cluster.limits.as_ref())
    }
}
