//! In-memory caches kept consistent with the upstream task service by
//! periodic resynchronization and write-through updates.

pub mod cluster;
pub mod extra_priority;
pub mod quota;
pub mod task;

use std::sync::Arc;
use std::time::Duration;

use crate::client::TesClient;
use crate::error::Result;

pub use cluster::ClusterCache;
pub use extra_priority::ExtraPriorityCache;
pub use quota::QuotaCache;
pub use task::TaskCache;

pub struct Cache {
    pub clusters: ClusterCache,
    pub tasks: TaskCache,
    pub extra_priorities: ExtraPriorityCache,
    pub quotas: QuotaCache,
}

impl Cache {
    /// Boot every cache with an initial synchronous fetch; any failure is
    /// fatal to startup.
    pub async fn new(client: Arc<dyn TesClient>, sync_period: Duration) -> Result<Self> {
        let clusters = ClusterCache::new(client.clone()).await?;
        let tasks = TaskCache::new(client.clone()).await?;
        let extra_priorities = ExtraPriorityCache::new(client.clone()).await?;
        let quotas = QuotaCache::new(client, sync_period);
        Ok(Self {
            clusters,
            tasks,
            extra_priorities,
            quotas,
        })
    }
}
