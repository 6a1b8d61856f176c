//! Account slots: resources that consume paid capacity.

use chrono::{DateTime, Utc};

use super::{AccountSlotId, OrganizationId, SlotStatus};

/// Account slot record
#[derive(Clone, Debug)]
pub struct AccountSlot {
    pub id: AccountSlotId,
    pub organization_id: OrganizationId,
    pub name: String,
    pub status: SlotStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Parameters for creating an account slot
#[derive(Clone, Debug)]
pub struct CreateAccountSlotParams {
    pub organization_id: OrganizationId,
    pub name: String,
    pub status: SlotStatus,
}
