use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};

use crate::client::models as wire;
use crate::client::TesClient;
use crate::error::Result;
use crate::models::{Capacity, ClusterInfo, GpuCapacity, GpuLimit, Limits};

/// Snapshot cache of known clusters, wholesale-replaced on each sync.
pub struct ClusterCache {
    client: Arc<dyn TesClient>,
    clusters: RwLock<Arc<Vec<Arc<ClusterInfo>>>>,
}

impl ClusterCache {
    /// The initial sync must succeed or startup fails.
    pub async fn new(client: Arc<dyn TesClient>) -> Result<Self> {
        let cache = Self {
            client,
            clusters: RwLock::new(Arc::new(Vec::new())),
        };
        cache.sync().await?;
        Ok(cache)
    }

    /// Current snapshot. Callers treat the returned list as immutable; a
    /// concurrent sync swaps the snapshot without disturbing it.
    pub fn list_clusters(&self) -> Arc<Vec<Arc<ClusterInfo>>> {
        self.clusters.read().unwrap().clone()
    }

    pub async fn sync(&self) -> Result<()> {
        let resp = self.client.list_clusters().await?;
        let clusters: Vec<Arc<ClusterInfo>> = resp
            .into_iter()
            .map(|cluster| Arc::new(cluster_info_from_wire(cluster)))
            .collect();

        *self.clusters.write().unwrap() = Arc::new(clusters);
        Ok(())
    }
}

fn cluster_info_from_wire(cluster: wire::Cluster) -> ClusterInfo {
    let heartbeat_timestamp = parse_heartbeat(&cluster.id, &cluster.heartbeat_timestamp);
    ClusterInfo {
        id: cluster.id,
        heartbeat_timestamp,
        capacity: cluster.capacity.map(capacity_from_wire),
        limits: cluster.limits.map(limits_from_wire),
    }
}

fn parse_heartbeat(cluster_id: &str, raw: &str) -> DateTime<Utc> {
    if raw.is_empty() {
        return DateTime::<Utc>::UNIX_EPOCH;
    }
    match DateTime::parse_from_rfc3339(raw) {
        Ok(ts) => ts.with_timezone(&Utc),
        Err(err) => {
            tracing::error!(cluster = cluster_id, error = %err, "Failed to parse cluster heartbeat timestamp");
            DateTime::<Utc>::UNIX_EPOCH
        }
    }
}

fn capacity_from_wire(capacity: wire::Capacity) -> Capacity {
    Capacity {
        count: capacity.count,
        cpu_cores: capacity.cpu_cores,
        ram_gb: capacity.ram_gb,
        disk_gb: capacity.disk_gb,
        gpu_capacity: capacity
            .gpu_capacity
            .map(|gpu_capacity| GpuCapacity { gpu: gpu_capacity.gpu }),
    }
}

fn limits_from_wire(limits: wire::Limits) -> Limits {
    Limits {
        cpu_cores: limits.cpu_cores,
        ram_gb: limits.ram_gb,
        gpu_limit: limits.gpu_limit.map(|gpu_limit| GpuLimit { gpu: gpu_limit.gpu }),
    }
}
