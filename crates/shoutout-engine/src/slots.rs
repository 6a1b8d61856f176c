//! Slot reclamation when purchased capacity shrinks.

use shoutout_storage::{AccountSlot, AccountSlotId, OrganizationId, SlotStatus, Store, StoreError};
use tracing::info;

/// Whether a reclaim disabled anything
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReclaimStatus {
    Disabled,
    Unchanged,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReclaimOutcome {
    pub status: ReclaimStatus,
    pub num_accounts_disabled: u64,
}

// Lower is disabled first.
fn disable_priority(status: SlotStatus) -> u8 {
    match status {
        SlotStatus::Registered => 0,
        SlotStatus::Connecting => 1,
        SlotStatus::Connected => 2,
        SlotStatus::Disabled => u8::MAX,
    }
}

/// Pick the slots to disable so at most `new_capacity` stay active.
///
/// `slots` must be in creation order (oldest first); within a status the oldest
/// slot goes first.
pub fn select_slots_to_disable(slots: &[AccountSlot], new_capacity: i32) -> Vec<AccountSlotId> {
    let mut active: Vec<&AccountSlot> = slots
        .iter()
        .filter(|s| s.status.is_active())
        .collect();
    let capacity = usize::try_from(new_capacity).unwrap_or(0);
    if active.len() <= capacity {
        return Vec::new();
    }
    let excess = active.len() - capacity;

    // Stable sort keeps creation order within each status.
    active.sort_by_key(|s| disable_priority(s.status));
    active
        .into_iter()
        .take(excess)
        .map(|s| s.id.clone())
        .collect()
}

/// Disable excess active slots of `org_id` down to `new_capacity`.
pub async fn reclaim_slots(
    store: &dyn Store,
    org_id: &OrganizationId,
    new_capacity: i32,
) -> Result<ReclaimOutcome, StoreError> {
    let slots = store.list_account_slots(org_id).await?;
    let victims = select_slots_to_disable(&slots, new_capacity);
    if victims.is_empty() {
        return Ok(ReclaimOutcome {
            status: ReclaimStatus::Unchanged,
            num_accounts_disabled: 0,
        });
    }

    let disabled = store.disable_account_slots(&victims).await?;
    info!(
        org_id = %org_id.0,
        new_capacity,
        disabled,
        "Disabled account slots over capacity"
    );
    Ok(ReclaimOutcome {
        status: if disabled > 0 {
            ReclaimStatus::Disabled
        } else {
            ReclaimStatus::Unchanged
        },
        num_accounts_disabled: disabled,
    })
}
