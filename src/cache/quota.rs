use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use lru::LruCache;

use crate::client::models as wire;
use crate::client::models::GetQuotaRequest;
use crate::client::TesClient;
use crate::error::Result;
use crate::models::{GpuQuota, ResourceQuota};

const QUOTA_CACHE_CAPACITY: usize = 128;

struct CachedQuota {
    payload: Vec<u8>,
    expires_at: Instant,
}

/// Size-capped LRU of resource quotas keyed by scope, each entry expiring
/// after the cache sync period. Entries are stored serialized; a stored
/// entry that no longer decodes is treated as a miss.
pub struct QuotaCache {
    client: Arc<dyn TesClient>,
    ttl: Duration,
    entries: Mutex<LruCache<String, CachedQuota>>,
}

impl QuotaCache {
    pub fn new(client: Arc<dyn TesClient>, ttl: Duration) -> Self {
        Self {
            client,
            ttl,
            entries: Mutex::new(LruCache::new(
                NonZeroUsize::new(QUOTA_CACHE_CAPACITY).unwrap(),
            )),
        }
    }

    pub async fn get_global_quota(&self) -> Result<Option<ResourceQuota>> {
        self.get_quota(true, "", "").await
    }

    pub async fn get_account_quota(&self, account_id: &str) -> Result<Option<ResourceQuota>> {
        self.get_quota(false, account_id, "").await
    }

    pub async fn get_user_quota(
        &self,
        account_id: &str,
        user_id: &str,
    ) -> Result<Option<ResourceQuota>> {
        self.get_quota(false, account_id, user_id).await
    }

    async fn get_quota(
        &self,
        global: bool,
        account_id: &str,
        user_id: &str,
    ) -> Result<Option<ResourceQuota>> {
        let key = quota_cache_key(global, account_id, user_id);

        {
            let mut entries = self.entries.lock().unwrap();
            if let Some(entry) = entries.get(&key) {
                if entry.expires_at > Instant::now() {
                    match serde_json::from_slice::<ResourceQuota>(&entry.payload) {
                        Ok(quota) => return Ok(Some(quota)),
                        Err(err) => {
                            tracing::error!(key = %key, error = %err, "Failed to decode cached quota");
                        }
                    }
                } else {
                    entries.pop(&key);
                }
            }
        }

        let resp = match self
            .client
            .get_quota(&GetQuotaRequest {
                global,
                account_id: account_id.to_string(),
                user_id: user_id.to_string(),
            })
            .await
        {
            Ok(resp) => resp,
            // A scope without a configured quota is a valid answer; it is
            // not cached so a quota created later is observed promptly.
            Err(err) if err.is_not_found() => return Ok(None),
            Err(err) => return Err(err),
        };

        let quota = quota_from_wire(resp);
        match serde_json::to_vec(&quota) {
            Ok(payload) => {
                self.entries.lock().unwrap().put(
                    key,
                    CachedQuota {
                        payload,
                        expires_at: Instant::now() + self.ttl,
                    },
                );
            }
            Err(err) => {
                tracing::error!(key = %key, error = %err, "Failed to encode quota for caching");
            }
        }
        Ok(Some(quota))
    }
}

fn quota_cache_key(global: bool, account_id: &str, user_id: &str) -> String {
    if global {
        "global".to_string()
    } else {
        format!("{account_id}/{user_id}")
    }
}

fn quota_from_wire(quota: wire::ResourceQuota) -> ResourceQuota {
    ResourceQuota {
        count: quota.count,
        cpu_cores: quota.cpu_cores,
        ram_gb: quota.ram_gb,
        disk_gb: quota.disk_gb,
        gpu_quota: quota.gpu_quota.map(|gpu_quota| GpuQuota { gpu: gpu_quota.gpu }),
    }
}
