use std::sync::{Arc, RwLock};

use crate::client::models as wire;
use crate::client::TesClient;
use crate::error::Result;
use crate::models::ExtraPriorityInfo;

/// Snapshot cache of priority-boost rules, wholesale-replaced on each sync.
pub struct ExtraPriorityCache {
    client: Arc<dyn TesClient>,
    extra_priorities: RwLock<Arc<Vec<ExtraPriorityInfo>>>,
}

impl ExtraPriorityCache {
    /// The initial sync must succeed or startup fails.
    pub async fn new(client: Arc<dyn TesClient>) -> Result<Self> {
        let cache = Self {
            client,
            extra_priorities: RwLock::new(Arc::new(Vec::new())),
        };
        cache.sync().await?;
        Ok(cache)
    }

    pub fn list_extra_priorities(&self) -> Arc<Vec<ExtraPriorityInfo>> {
        self.extra_priorities.read().unwrap().clone()
    }

    pub async fn sync(&self) -> Result<()> {
        let resp = self.client.list_extra_priorities().await?;
        let extra_priorities: Vec<ExtraPriorityInfo> =
            resp.into_iter().map(extra_priority_from_wire).collect();

        *self.extra_priorities.write().unwrap() = Arc::new(extra_priorities);
        Ok(())
    }
}

fn extra_priority_from_wire(extra_priority: wire::ExtraPriority) -> ExtraPriorityInfo {
    ExtraPriorityInfo {
        account_id: extra_priority.account_id,
        user_id: extra_priority.user_id,
        submission_id: extra_priority.submission_id,
        run_id: extra_priority.run_id,
        extra_priority_value: extra_priority.extra_priority_value,
    }
}
