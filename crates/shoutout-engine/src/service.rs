//! Operations exposed to the API layer.

use chrono::{DateTime, Utc};
use shoutout_storage::{
    AccountSlot, CreateAccountSlotParams, CreateOrganizationParams, CreatePayerParams,
    CreateSubmissionParams, CreateWorkflowTaskParams, FailureReason, MarkFailedParams,
    Organization, OrganizationId, Payer, PayerId, Platform, SetSubscriptionParams, SlotStatus,
    SocialSubmission, Store, StoreError, SubmissionId, SubmissionStatus,
};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::entitlement::{resolve, Entitlement};
use crate::error::EngineError;
use crate::slots::{reclaim_slots, ReclaimOutcome};
use crate::submission::{can_transition, normalize_post_url};
use crate::workflow::VerificationWorkflow;

pub const MAX_PAGE_SIZE: i64 = 100;

pub struct ReferralService {
    store: Arc<dyn Store>,
    workflow: Arc<VerificationWorkflow>,
}

impl ReferralService {
    pub fn new(workflow: Arc<VerificationWorkflow>) -> Self {
        Self {
            store: workflow.store().clone(),
            workflow,
        }
    }

    // ───────────────────────────── Submissions ─────────────────────────────

    /// Submit a post for verification and run the initial scan inline.
    ///
    /// Returns the submission after the initial scan, normally VERIFIED or FAILED.
    /// If the scan could not run now the record stays VERIFYING and the scheduler
    /// finishes it.
    pub async fn submit(
        &self,
        org_id: &OrganizationId,
        post_url: &str,
        platform: Platform,
    ) -> Result<SocialSubmission, EngineError> {
        self.submit_at(org_id, post_url, platform, Utc::now()).await
    }

    pub async fn submit_at(
        &self,
        org_id: &OrganizationId,
        post_url: &str,
        platform: Platform,
        now: DateTime<Utc>,
    ) -> Result<SocialSubmission, EngineError> {
        let url_normalized = normalize_post_url(post_url, platform)?;
        self.store.get_organization(org_id).await?;

        let (submission, created) = match self
            .store
            .create_submission(&CreateSubmissionParams {
                organization_id: org_id.clone(),
                platform,
                post_url: post_url.trim().to_string(),
                url_normalized: url_normalized.clone(),
            })
            .await
        {
            Ok(s) => (s, true),
            Err(StoreError::AlreadyExists) => {
                (self.resubmit(org_id, &url_normalized).await?, false)
            }
            Err(e) => return Err(e.into()),
        };

        let delay_ms = self.workflow.config().rescan_delay.num_milliseconds();
        let task = match self
            .store
            .create_workflow_task(&CreateWorkflowTaskParams {
                submission_id: submission.id.clone(),
                step: 1,
                delay_ms,
                next_wake_at: now,
            })
            .await
        {
            Ok(task) => task,
            Err(e) => {
                // Without a task nothing would ever verify the record.
                self.abandon(&submission, created, now).await;
                return Err(e.into());
            }
        };
        info!(
            submission_id = %submission.id,
            org_id = %org_id.0,
            url = %url_normalized,
            platform = %platform,
            "Submission received"
        );

        let lease_until = now + self.workflow.scheduling().lease;
        match self
            .store
            .claim_workflow_task(&task.id, now, lease_until)
            .await
        {
            Ok(Some(claimed)) => {
                if let Err(e) = self.workflow.execute(&claimed, now).await {
                    warn!(submission_id = %submission.id, error = %e, "Initial scan deferred to scheduler");
                }
            }
            Ok(None) => debug!(submission_id = %submission.id, "Initial scan already claimed"),
            Err(e) => {
                warn!(submission_id = %submission.id, error = %e, "Failed to claim initial scan")
            }
        }

        Ok(self.store.get_submission(&submission.id).await?)
    }

    /// Undo a submission whose workflow could not be started: a new record is
    /// removed, a resubmitted one goes back to FAILED so it can be retried.
    async fn abandon(&self, submission: &SocialSubmission, created: bool, now: DateTime<Utc>) {
        let result = if created {
            self.store.delete_submission(&submission.id).await
        } else {
            self.store
                .mark_submission_failed(
                    &submission.id,
                    &MarkFailedParams {
                        reason: FailureReason::VerificationError,
                        metrics: None,
                        scanned_at: now,
                    },
                )
                .await
        };
        if let Err(e) = result {
            warn!(submission_id = %submission.id, error = %e, "Failed to roll back submission");
        }
    }

    /// Reuse an existing record for the same URL: only the same organization may
    /// retry, and only after a failure.
    async fn resubmit(
        &self,
        org_id: &OrganizationId,
        url_normalized: &str,
    ) -> Result<SocialSubmission, EngineError> {
        let existing = self.store.get_submission_by_url(url_normalized).await?;
        if existing.organization_id != *org_id {
            return Err(EngineError::Conflict(
                "post already submitted by another organization".into(),
            ));
        }
        if !can_transition(existing.status, SubmissionStatus::Verifying) {
            return Err(EngineError::Conflict(format!(
                "post already submitted ({})",
                existing.status
            )));
        }
        if self
            .store
            .find_open_workflow_task(&existing.id)
            .await?
            .is_some()
        {
            return Err(EngineError::Conflict(
                "verification already in progress".into(),
            ));
        }

        match self.store.reset_submission(&existing.id).await {
            Ok(s) => {
                info!(submission_id = %s.id, "Failed submission resubmitted");
                Ok(s)
            }
            Err(StoreError::Conflict) => Err(EngineError::Conflict(
                "post already submitted".into(),
            )),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn get_status(
        &self,
        submission_id: &SubmissionId,
    ) -> Result<SocialSubmission, EngineError> {
        Ok(self.store.get_submission(submission_id).await?)
    }

    /// Submissions of an organization, newest first.
    pub async fn list(
        &self,
        org_id: &OrganizationId,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<SocialSubmission>, EngineError> {
        if !(1..=MAX_PAGE_SIZE).contains(&limit) {
            return Err(EngineError::InvalidArgument(format!(
                "limit must be between 1 and {}",
                MAX_PAGE_SIZE
            )));
        }
        if offset < 0 {
            return Err(EngineError::InvalidArgument(
                "offset must not be negative".into(),
            ));
        }
        Ok(self.store.list_submissions(org_id, limit, offset).await?)
    }

    /// Withdraw a verified submission. Awarded days are kept; pending rescans stop
    /// on their next wake-up.
    pub async fn revoke(
        &self,
        submission_id: &SubmissionId,
    ) -> Result<SocialSubmission, EngineError> {
        let submission = self.store.get_submission(submission_id).await?;
        if !can_transition(submission.status, SubmissionStatus::Revoked) {
            return Err(EngineError::Conflict(format!(
                "cannot revoke a {} submission",
                submission.status
            )));
        }
        match self.store.revoke_submission(submission_id).await {
            Ok(()) => {}
            Err(StoreError::Conflict) => {
                return Err(EngineError::Conflict("submission changed".into()))
            }
            Err(e) => return Err(e.into()),
        }
        info!(submission_id = %submission_id, "Submission revoked");
        Ok(self.store.get_submission(submission_id).await?)
    }

    // ───────────────────────────── Organizations ─────────────────────────────

    pub async fn entitlement(
        &self,
        org_id: &OrganizationId,
        now: DateTime<Utc>,
    ) -> Result<Entitlement, EngineError> {
        let org = self.store.get_organization(org_id).await?;
        let active = self.store.count_active_account_slots(org_id).await?;
        Ok(resolve(&org, active, now))
    }

    /// Shrink purchased capacity and disable the slots that no longer fit.
    pub async fn downgrade(
        &self,
        org_id: &OrganizationId,
        new_capacity: i32,
    ) -> Result<ReclaimOutcome, EngineError> {
        if new_capacity < 0 {
            return Err(EngineError::InvalidArgument(
                "capacity must not be negative".into(),
            ));
        }
        self.store.get_organization(org_id).await?;
        let outcome = reclaim_slots(self.store.as_ref(), org_id, new_capacity).await?;
        self.store.set_purchased_slots(org_id, new_capacity).await?;
        Ok(outcome)
    }

    pub async fn create_payer(
        &self,
        email: &str,
        billing_customer_id: Option<String>,
    ) -> Result<Payer, EngineError> {
        Ok(self
            .store
            .create_payer(&CreatePayerParams {
                email: email.to_string(),
                billing_customer_id,
            })
            .await?)
    }

    pub async fn create_organization(
        &self,
        name: &str,
        payer_id: Option<PayerId>,
    ) -> Result<Organization, EngineError> {
        if name.trim().is_empty() {
            return Err(EngineError::InvalidArgument(
                "organization name must not be empty".into(),
            ));
        }
        Ok(self
            .store
            .create_organization(&CreateOrganizationParams {
                name: name.trim().to_string(),
                payer_id,
            })
            .await?)
    }

    pub async fn add_slot(
        &self,
        org_id: &OrganizationId,
        name: &str,
        status: SlotStatus,
    ) -> Result<AccountSlot, EngineError> {
        self.store.get_organization(org_id).await?;
        Ok(self
            .store
            .create_account_slot(&CreateAccountSlotParams {
                organization_id: org_id.clone(),
                name: name.to_string(),
                status,
            })
            .await?)
    }

    pub async fn set_subscription(
        &self,
        org_id: &OrganizationId,
        params: &SetSubscriptionParams,
    ) -> Result<Organization, EngineError> {
        if params.purchased_slots < 0 {
            return Err(EngineError::InvalidArgument(
                "purchased slots must not be negative".into(),
            ));
        }
        self.store
            .set_organization_subscription(org_id, params)
            .await?;
        Ok(self.store.get_organization(org_id).await?)
    }

    /// Cancel billing. The paid window stays until it lapses (grace period).
    pub async fn cancel_subscription(
        &self,
        org_id: &OrganizationId,
    ) -> Result<Organization, EngineError> {
        self.store.clear_organization_billing(org_id).await?;
        info!(org_id = %org_id.0, "Billing cancelled");
        Ok(self.store.get_organization(org_id).await?)
    }
}
