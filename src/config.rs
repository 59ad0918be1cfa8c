use std::time::Duration;

use crate::error::{Result, SchedulerError};
use crate::plugin;

/// Scheduler configuration. Defaults mirror the flag defaults; `validate`
/// must pass before the scheduler is constructed.
#[derive(Debug, Clone)]
pub struct Options {
    /// Ordered list of enabled plugin names.
    pub plugins: Vec<String>,
    /// Tick interval of the scheduling loop.
    pub schedule_period: Duration,
    /// Heartbeat age beyond which a cluster is ineligible for new tasks.
    pub cluster_not_ready_timeout: Duration,
    pub cache: CacheOptions,
    pub controller: ControllerOptions,
}

#[derive(Debug, Clone)]
pub struct CacheOptions {
    /// Tick interval for cluster / extra-priority / task resync; also the
    /// TTL of quota cache entries.
    pub sync_period: Duration,
}

#[derive(Debug, Clone)]
pub struct ControllerOptions {
    /// Tick interval for both controller sweeps.
    pub period: Duration,
    /// Heartbeat age beyond which the controller reschedules all of a
    /// cluster's tasks.
    pub cluster_reschedule_timeout: Duration,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            plugins: vec![
                plugin::cluster_capacity::NAME.to_string(),
                plugin::cluster_limit::NAME.to_string(),
                plugin::priority_sort::NAME.to_string(),
                plugin::resource_quota::NAME.to_string(),
            ],
            schedule_period: Duration::from_secs(10),
            cluster_not_ready_timeout: Duration::from_secs(5 * 60),
            cache: CacheOptions::default(),
            controller: ControllerOptions::default(),
        }
    }
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            sync_period: Duration::from_secs(10),
        }
    }
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self {
            period: Duration::from_secs(10),
            cluster_reschedule_timeout: Duration::from_secs(20 * 60),
        }
    }
}

impl Options {
    /// Every violated constraint is a startup error.
    pub fn validate(&self) -> Result<()> {
        if self.controller.cluster_reschedule_timeout < self.controller.period {
            return Err(SchedulerError::Validation(
                "cluster reschedule timeout must be no less than controller period".to_string(),
            ));
        }
        if self.schedule_period < self.cache.sync_period {
            return Err(SchedulerError::Validation(
                "schedule period must be no less than cache sync period".to_string(),
            ));
        }
        if self.cluster_not_ready_timeout < self.cache.sync_period {
            return Err(SchedulerError::Validation(
                "cluster not ready timeout must be no less than cache sync period".to_string(),
            ));
        }
        if self.controller.cluster_reschedule_timeout < self.cache.sync_period {
            return Err(SchedulerError::Validation(
                "cluster reschedule timeout must be no less than cache sync period".to_string(),
            ));
        }
        Ok(())
    }
}
