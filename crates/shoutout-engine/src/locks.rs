//! Per-organization serialization of reward writes.

use dashmap::DashMap;
use shoutout_storage::OrganizationId;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// One async mutex per organization.
///
/// Held across "sum monthly usage -> cap -> credit or extend -> persist" so two
/// submissions of the same organization cannot both read a stale monthly total or
/// overwrite each other's earned-premium extension.
#[derive(Clone, Default)]
pub struct OrgLocks {
    locks: Arc<DashMap<OrganizationId, Arc<Mutex<()>>>>,
}

impl OrgLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, org_id: &OrganizationId) -> OwnedMutexGuard<()> {
        let mutex = self.locks.entry(org_id.clone()).or_default().clone();
        mutex.lock_owned().await
    }
}
