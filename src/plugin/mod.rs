//! Scheduling pipeline plugins.
//!
//! A concrete plugin implements any non-empty subset of the capability
//! traits; the pipeline runs each capability set in registration order.

pub mod cluster_capacity;
pub mod cluster_limit;
pub mod priority_sort;
pub mod resource_quota;

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::cache::Cache;
use crate::error::{Result, SchedulerError};
use crate::models::{ClusterInfo, TaskInfo};

pub const MAX_SCORE: i64 = 100;
pub const MIN_SCORE: i64 = 0;

/// Per-(task, scheduling attempt) scratch space shared between the Filter
/// and Score steps of the same plugin. Each plugin reads only keys it
/// writes.
#[derive(Default)]
pub struct CycleState {
    values: HashMap<&'static str, Box<dyn Any + Send>>,
}

impl CycleState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert<T: Any + Send>(&mut self, key: &'static str, value: T) {
        self.values.insert(key, Box::new(value));
    }

    pub fn get<T: Any>(&self, key: &'static str) -> Option<&T> {
        self.values.get(key).and_then(|value| value.downcast_ref())
    }

    pub fn get_mut<T: Any>(&mut self, key: &'static str) -> Option<&mut T> {
        self.values
            .get_mut(key)
            .and_then(|value| value.downcast_mut())
    }
}

pub trait Plugin: Send + Sync {
    fn name(&self) -> &'static str;
}

/// Orders the scheduling queue; exactly one is active per pipeline.
pub trait SortPlugin: Plugin {
    /// Whether `a` should be scheduled before `b`.
    fn less(&self, a: &TaskInfo, b: &TaskInfo) -> bool;
}

/// Task-level admission check, run once per task before any cluster is
/// considered.
#[async_trait]
pub trait GlobalFilterPlugin: Plugin {
    async fn global_filter(&self, task: &TaskInfo, cycle_state: &mut CycleState) -> Result<()>;
}

/// Per-cluster admission check.
#[async_trait]
pub trait FilterPlugin: Plugin {
    async fn filter(
        &self,
        task: &TaskInfo,
        cluster: &ClusterInfo,
        cycle_state: &mut CycleState,
    ) -> Result<()>;
}

/// Ranks clusters that passed every filter. Scores outside
/// [MIN_SCORE, MAX_SCORE] are clamped by the scheduler.
pub trait ScorePlugin: Plugin {
    fn score(&self, task: &TaskInfo, cluster: &ClusterInfo, cycle_state: &CycleState) -> i64;
}

/// The capability sets of the configured plugins, in registration order.
#[derive(Default)]
pub struct PluginsGroup {
    pub sort: Option<Arc<dyn SortPlugin>>,
    pub global_filters: Vec<Arc<dyn GlobalFilterPlugin>>,
    pub filters: Vec<Arc<dyn FilterPlugin>>,
    pub scores: Vec<Arc<dyn ScorePlugin>>,
}

/// Instantiate the named plugins against the shared caches. An unknown name
/// is a startup error, as is a pipeline without a sort plugin. When several
/// sort-capable plugins are named, the last one wins.
pub fn create_plugins(names: &[String], cache: &Arc<Cache>) -> Result<PluginsGroup> {
    let mut group = PluginsGroup::default();
    for name in names {
        match name.as_str() {
            priority_sort::NAME => {
                let plugin = Arc::new(priority_sort::PrioritySort::new(cache.clone()));
                group.sort = Some(plugin);
            }
            resource_quota::NAME => {
                let plugin = Arc::new(resource_quota::ResourceQuota::new(cache.clone()));
                group.global_filters.push(plugin);
            }
            cluster_limit::NAME => {
                let plugin = Arc::new(cluster_limit::ClusterLimit::new());
                group.filters.push(plugin);
            }
            cluster_capacity::NAME => {
                let plugin = Arc::new(cluster_capacity::ClusterCapacity::new(cache.clone()));
                group.filters.push(plugin.clone());
                group.scores.push(plugin);
            }
            other => {
                return Err(SchedulerError::Validation(format!(
                    "invalid plugin name: {other}"
                )));
            }
        }
    }
    if group.sort.is_none() {
        return Err(SchedulerError::Validation(
            "no sort plugin configured".to_string(),
        ));
    }
    Ok(group)
}
