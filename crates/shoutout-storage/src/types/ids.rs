//! Strongly-typed identifiers (avoid mixing strings/UUIDs arbitrarily).

use uuid::Uuid;

/// Organization identifier.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct OrganizationId(pub Uuid);

/// Billing-responsible account identifier.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct PayerId(pub Uuid);

/// Social submission identifier.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SubmissionId(pub Uuid);

/// Account slot (paid-capacity-consuming resource) identifier.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct AccountSlotId(pub Uuid);

/// Durable workflow task identifier; doubles as the workflow handle.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct WorkflowTaskId(pub Uuid);

impl std::fmt::Display for SubmissionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::fmt::Display for WorkflowTaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
