use std::sync::Arc;

use crate::cache::Cache;
use crate::models::{ExtraPriorityInfo, TaskInfo};

use super::{Plugin, SortPlugin};

pub const NAME: &str = "PrioritySort";

/// Sorts the queue by effective priority: the task's own priority value
/// plus every matching extra-priority boost. Ties go to the older task.
pub struct PrioritySort {
    cache: Arc<Cache>,
}

impl PrioritySort {
    pub fn new(cache: Arc<Cache>) -> Self {
        Self { cache }
    }
}

impl Plugin for PrioritySort {
    fn name(&self) -> &'static str {
        NAME
    }
}

impl SortPlugin for PrioritySort {
    fn less(&self, a: &TaskInfo, b: &TaskInfo) -> bool {
        let extra_priorities = self.cache.extra_priorities.list_extra_priorities();
        let value_a = effective_priority(a, &extra_priorities);
        let value_b = effective_priority(b, &extra_priorities);
        if value_a == value_b {
            return a.creation_time < b.creation_time;
        }
        value_a > value_b
    }
}

pub fn effective_priority(task: &TaskInfo, extra_priorities: &[ExtraPriorityInfo]) -> i32 {
    let mut value = task.priority_value;
    for extra_priority in extra_priorities {
        if extra_priority.matches_task(task) {
            value += extra_priority.extra_priority_value;
        }
    }
    value
}
