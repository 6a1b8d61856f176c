//! The Store trait that backends implement.

use chrono::{DateTime, Utc};

use crate::types::*;
use crate::StoreError;

/// The storage trait `shoutout-engine` depends on.
///
/// Conditional writes (state transitions, task claims) are evaluated atomically by the
/// backend; a failed precondition is reported as [`StoreError::Conflict`] or as a
/// `false`/empty result where noted.
#[async_trait::async_trait]
pub trait Store: Send + Sync {
    // ───────────────────────────────────── Payers ─────────────────────────────────────────

    /// Create a billing-responsible account.
    async fn create_payer(&self, params: &CreatePayerParams) -> Result<Payer, StoreError>;

    /// Get payer by ID.
    async fn get_payer(&self, payer_id: &PayerId) -> Result<Payer, StoreError>;

    // ───────────────────────────────────── Organizations ──────────────────────────────────

    /// Create an organization on the FREE tier with no purchased slots.
    async fn create_organization(
        &self,
        params: &CreateOrganizationParams,
    ) -> Result<Organization, StoreError>;

    /// Get organization by ID.
    async fn get_organization(&self, org_id: &OrganizationId) -> Result<Organization, StoreError>;

    /// Replace the paid-subscription fields of an organization.
    async fn set_organization_subscription(
        &self,
        org_id: &OrganizationId,
        params: &SetSubscriptionParams,
    ) -> Result<(), StoreError>;

    /// Clear payer and billing subscription (cancellation). Tier and expiry are kept,
    /// so the organization stays paid until the window lapses.
    async fn clear_organization_billing(&self, org_id: &OrganizationId)
        -> Result<(), StoreError>;

    /// Set the purchased capacity.
    async fn set_purchased_slots(
        &self,
        org_id: &OrganizationId,
        purchased_slots: i32,
    ) -> Result<(), StoreError>;

    /// Overwrite the earned-premium expiry.
    async fn set_earned_premium_expires_at(
        &self,
        org_id: &OrganizationId,
        expires_at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    // ───────────────────────────────────── Account Slots ──────────────────────────────────

    /// Create an account slot.
    async fn create_account_slot(
        &self,
        params: &CreateAccountSlotParams,
    ) -> Result<AccountSlot, StoreError>;

    /// List all slots of an organization, oldest first.
    async fn list_account_slots(
        &self,
        org_id: &OrganizationId,
    ) -> Result<Vec<AccountSlot>, StoreError>;

    /// Count slots whose status is not DISABLED.
    async fn count_active_account_slots(&self, org_id: &OrganizationId)
        -> Result<i64, StoreError>;

    /// Disable the given slots. Already-disabled slots are left untouched.
    /// Returns the number of slots that changed state.
    async fn disable_account_slots(&self, slot_ids: &[AccountSlotId]) -> Result<u64, StoreError>;

    // ───────────────────────────────────── Submissions ────────────────────────────────────

    /// Create a submission in VERIFYING. `AlreadyExists` if the normalized URL is taken.
    async fn create_submission(
        &self,
        params: &CreateSubmissionParams,
    ) -> Result<SocialSubmission, StoreError>;

    /// Get submission by ID.
    async fn get_submission(
        &self,
        submission_id: &SubmissionId,
    ) -> Result<SocialSubmission, StoreError>;

    /// Get submission by normalized URL (any organization).
    async fn get_submission_by_url(
        &self,
        url_normalized: &str,
    ) -> Result<SocialSubmission, StoreError>;

    /// List submissions of an organization, newest first.
    async fn list_submissions(
        &self,
        org_id: &OrganizationId,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<SocialSubmission>, StoreError>;

    /// Captions of the organization's VERIFIED posts on `platform` verified at or after
    /// `since`, excluding `exclude`.
    async fn list_verified_captions(
        &self,
        org_id: &OrganizationId,
        platform: Platform,
        since: DateTime<Utc>,
        exclude: &SubmissionId,
    ) -> Result<Vec<String>, StoreError>;

    /// SUM(days_awarded) over the organization's VERIFIED submissions verified at or
    /// after `since`.
    async fn sum_days_awarded_since(
        &self,
        org_id: &OrganizationId,
        since: DateTime<Utc>,
    ) -> Result<i64, StoreError>;

    /// FAILED -> VERIFYING for a resubmission, wiping scan results. `Conflict` otherwise.
    async fn reset_submission(
        &self,
        submission_id: &SubmissionId,
    ) -> Result<SocialSubmission, StoreError>;

    /// VERIFYING -> VERIFIED with the initial scan result. `Conflict` if not VERIFYING.
    async fn mark_submission_verified(
        &self,
        submission_id: &SubmissionId,
        params: &MarkVerifiedParams,
    ) -> Result<(), StoreError>;

    /// VERIFYING -> FAILED. `Conflict` if not VERIFYING.
    async fn mark_submission_failed(
        &self,
        submission_id: &SubmissionId,
        params: &MarkFailedParams,
    ) -> Result<(), StoreError>;

    /// Persist a rescan in one update, guarded by `status = VERIFIED AND
    /// scan_count < scan_number`. Returns false if the guard rejected the write.
    async fn record_rescan(
        &self,
        submission_id: &SubmissionId,
        params: &RecordRescanParams,
    ) -> Result<bool, StoreError>;

    /// Commit an award atomically: re-check the month's usage, write the submission
    /// and swap the earned-premium expiry. `Conflict` (with nothing written) if any
    /// guard fails.
    async fn apply_award(&self, params: &ApplyAwardParams) -> Result<(), StoreError>;

    /// Move (or clear) the next rescan time of a VERIFIED submission without
    /// recording a scan. `Conflict` if not VERIFIED.
    async fn set_next_scan_at(
        &self,
        submission_id: &SubmissionId,
        next_scan_at: Option<DateTime<Utc>>,
    ) -> Result<(), StoreError>;

    /// Store or clear the rescan workflow handle.
    async fn set_rescan_workflow_id(
        &self,
        submission_id: &SubmissionId,
        workflow_id: Option<WorkflowTaskId>,
    ) -> Result<(), StoreError>;

    /// VERIFIED -> REVOKED, clearing `next_scan_at`. `Conflict` if not VERIFIED.
    async fn revoke_submission(&self, submission_id: &SubmissionId) -> Result<(), StoreError>;

    /// Hard delete (test and cleanup utilities only).
    async fn delete_submission(&self, submission_id: &SubmissionId) -> Result<(), StoreError>;

    // ───────────────────────────────────── Workflow Tasks ─────────────────────────────────

    /// Persist a new PENDING task.
    async fn create_workflow_task(
        &self,
        params: &CreateWorkflowTaskParams,
    ) -> Result<WorkflowTask, StoreError>;

    /// Get task by ID.
    async fn get_workflow_task(&self, task_id: &WorkflowTaskId)
        -> Result<WorkflowTask, StoreError>;

    /// Get the open (not COMPLETED) task of a submission, if any.
    async fn find_open_workflow_task(
        &self,
        submission_id: &SubmissionId,
    ) -> Result<Option<WorkflowTask>, StoreError>;

    /// Claim one task for execution if it is PENDING or its RUNNING lease expired.
    async fn claim_workflow_task(
        &self,
        task_id: &WorkflowTaskId,
        now: DateTime<Utc>,
        lease_until: DateTime<Utc>,
    ) -> Result<Option<WorkflowTask>, StoreError>;

    /// Claim up to `limit` due tasks: PENDING with `next_wake_at <= now`, or RUNNING with
    /// an expired lease.
    async fn claim_due_workflow_tasks(
        &self,
        now: DateTime<Utc>,
        lease_until: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<WorkflowTask>, StoreError>;

    /// Return a claimed task to PENDING at `step`, due at `next_wake_at`.
    async fn reschedule_workflow_task(
        &self,
        task_id: &WorkflowTaskId,
        step: i32,
        next_wake_at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Mark a task COMPLETED.
    async fn complete_workflow_task(&self, task_id: &WorkflowTaskId) -> Result<(), StoreError>;
}
