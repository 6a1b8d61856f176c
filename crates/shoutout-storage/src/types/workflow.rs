//! Persisted state of durable workflow tasks.

use chrono::{DateTime, Utc};

use super::{SubmissionId, TaskStatus, WorkflowTaskId};

/// Durable task record. `step` is the next step to execute (1 = initial scan).
#[derive(Clone, Debug)]
pub struct WorkflowTask {
    pub id: WorkflowTaskId,
    pub submission_id: SubmissionId,
    pub step: i32,
    pub delay_ms: i64,
    pub next_wake_at: DateTime<Utc>,
    pub status: TaskStatus,
    pub lease_expires_at: Option<DateTime<Utc>>,
    pub attempts: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Parameters for creating a workflow task
#[derive(Clone, Debug)]
pub struct CreateWorkflowTaskParams {
    pub submission_id: SubmissionId,
    pub step: i32,
    pub delay_ms: i64,
    pub next_wake_at: DateTime<Utc>,
}
