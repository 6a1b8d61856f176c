//! Durable verification workflow.
//!
//! One task per submission walks through the initial scan (step 1) and the
//! delayed rescans (steps 2..=total_scans). The task row only carries the next
//! step and the per-scan delay; everything else is re-read from the submission,
//! whose `scan_count` guards each rescan so a step replayed after a crash is a
//! no-op.

use chrono::{DateTime, Duration, Utc};
use shoutout_billing::BillingService;
use shoutout_storage::{
    ApplyAwardParams, AwardWrite, FailureReason, MarkFailedParams, MarkVerifiedParams,
    PostMetrics, RecordRescanParams, SocialSubmission, Store, StoreError, SubmissionStatus,
    WorkflowTask,
};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::config::{RewardConfig, SchedulerConfig};
use crate::crediting::CreditingDispatcher;
use crate::error::EngineError;
use crate::locks::OrgLocks;
use crate::metrics;
use crate::reward::{apply_monthly_cap, calculate_days_to_award, start_of_month};
use crate::similarity::{is_near_duplicate, CaptionScorer, TokenSetScorer};
use crate::submission::{evaluate_initial_scan, next_scan_at, InitialScan};
use crate::verifier::ContentVerifier;

// Commit attempts before giving the step back to the retry schedule
const AWARD_ATTEMPTS: u32 = 3;

/// Which scan an award is committed for
#[derive(Clone, Copy, Debug)]
enum AwardScan {
    Initial,
    Rescan(i32),
}

impl AwardScan {
    /// Whether `current` already carries this scan's write.
    fn applied(&self, current: &SocialSubmission) -> bool {
        match self {
            AwardScan::Initial => current.status != SubmissionStatus::Verifying,
            AwardScan::Rescan(n) => {
                current.status != SubmissionStatus::Verified || current.scan_count >= *n
            }
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WorkflowStatus {
    Completed,
    Stopped,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopReason {
    NotVerified,
}

impl StopReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            StopReason::NotVerified => "not_verified",
        }
    }
}

/// Final report of a workflow run
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WorkflowReport {
    pub status: WorkflowStatus,
    pub reason: Option<StopReason>,
    pub completed_scans: i32,
}

impl WorkflowReport {
    fn completed(completed_scans: i32) -> Self {
        Self {
            status: WorkflowStatus::Completed,
            reason: None,
            completed_scans,
        }
    }

    fn not_verified(completed_scans: i32) -> Self {
        Self {
            status: WorkflowStatus::Stopped,
            reason: Some(StopReason::NotVerified),
            completed_scans,
        }
    }
}

/// Result of running a single step
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StepOutcome {
    /// Suspend until `wake_at`, then run `next_step`
    Continue {
        next_step: i32,
        wake_at: DateTime<Utc>,
    },
    Finished(WorkflowReport),
}

/// What happened to a task after one execution
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TaskOutcome {
    Scheduled { step: i32, wake_at: DateTime<Utc> },
    Finished(WorkflowReport),
}

pub struct VerificationWorkflow {
    store: Arc<dyn Store>,
    verifier: Arc<dyn ContentVerifier>,
    scorer: Arc<dyn CaptionScorer>,
    dispatcher: CreditingDispatcher,
    locks: OrgLocks,
    config: Arc<RewardConfig>,
    scheduling: SchedulerConfig,
}

impl VerificationWorkflow {
    pub fn new(
        store: Arc<dyn Store>,
        verifier: Arc<dyn ContentVerifier>,
        billing: Arc<dyn BillingService>,
        config: Arc<RewardConfig>,
        scheduling: SchedulerConfig,
    ) -> Self {
        Self {
            dispatcher: CreditingDispatcher::new(store.clone(), billing, config.clone()),
            store,
            verifier,
            scorer: Arc::new(TokenSetScorer),
            locks: OrgLocks::new(),
            config,
            scheduling,
        }
    }

    /// Replace the default caption scorer.
    pub fn with_scorer(mut self, scorer: Arc<dyn CaptionScorer>) -> Self {
        self.scorer = scorer;
        self
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub fn config(&self) -> &RewardConfig {
        &self.config
    }

    pub fn scheduling(&self) -> &SchedulerConfig {
        &self.scheduling
    }

    /// Run the claimed task's current step and persist where the task goes next.
    ///
    /// A failed step is rescheduled at the same step after the retry delay and the
    /// error is returned. Failing to re-arm after a successful step is only logged:
    /// the step's writes stand and the expired lease brings the task back.
    pub async fn execute(
        &self,
        task: &WorkflowTask,
        now: DateTime<Utc>,
    ) -> Result<TaskOutcome, EngineError> {
        let outcome = match self.run_step(task, now).await {
            Ok(outcome) => outcome,
            Err(e) => {
                let retry_at = now + self.scheduling.retry_delay;
                warn!(
                    task_id = %task.id,
                    submission_id = %task.submission_id,
                    step = task.step,
                    error = %e,
                    %retry_at,
                    "Workflow step failed"
                );
                if let Err(re) = self
                    .store
                    .reschedule_workflow_task(&task.id, task.step, retry_at)
                    .await
                {
                    error!(task_id = %task.id, error = %re, "Failed to reschedule workflow step");
                }
                return Err(e);
            }
        };

        match outcome {
            StepOutcome::Continue { next_step, wake_at } => {
                if task.step <= 1 {
                    if let Err(e) = self
                        .store
                        .set_rescan_workflow_id(&task.submission_id, Some(task.id.clone()))
                        .await
                    {
                        warn!(submission_id = %task.submission_id, error = %e, "Failed to store rescan handle");
                    }
                }
                if let Err(e) = self
                    .store
                    .reschedule_workflow_task(&task.id, next_step, wake_at)
                    .await
                {
                    error!(
                        task_id = %task.id,
                        submission_id = %task.submission_id,
                        next_step,
                        error = %e,
                        "Failed to schedule rescan"
                    );
                }
                debug!(task_id = %task.id, next_step, %wake_at, "Workflow suspended");
                Ok(TaskOutcome::Scheduled {
                    step: next_step,
                    wake_at,
                })
            }
            StepOutcome::Finished(report) => {
                match self
                    .store
                    .set_rescan_workflow_id(&task.submission_id, None)
                    .await
                {
                    Ok(()) | Err(StoreError::NotFound) => {}
                    Err(e) => return Err(e.into()),
                }
                self.store.complete_workflow_task(&task.id).await?;
                info!(
                    task_id = %task.id,
                    submission_id = %task.submission_id,
                    status = ?report.status,
                    reason = report.reason.map(|r| r.as_str()),
                    completed_scans = report.completed_scans,
                    "Workflow finished"
                );
                Ok(TaskOutcome::Finished(report))
            }
        }
    }

    /// Run one step without touching the task row.
    pub async fn run_step(
        &self,
        task: &WorkflowTask,
        now: DateTime<Utc>,
    ) -> Result<StepOutcome, EngineError> {
        let submission = match self.store.get_submission(&task.submission_id).await {
            Ok(s) => s,
            Err(StoreError::NotFound) => {
                warn!(submission_id = %task.submission_id, "Submission vanished; stopping workflow");
                return Ok(StepOutcome::Finished(WorkflowReport::not_verified(0)));
            }
            Err(e) => return Err(e.into()),
        };
        let delay = Duration::milliseconds(task.delay_ms);

        if task.step <= 1 {
            self.initial_scan(submission, delay, now).await
        } else if task.step > self.config.total_scans {
            Ok(StepOutcome::Finished(WorkflowReport::completed(
                submission.scan_count,
            )))
        } else {
            self.rescan(submission, task.step, delay, now).await
        }
    }

    fn advance(
        &self,
        scan_number: i32,
        completed_scans: i32,
        wake_at: Option<DateTime<Utc>>,
        delay: Duration,
        now: DateTime<Utc>,
    ) -> StepOutcome {
        if scan_number >= self.config.total_scans {
            StepOutcome::Finished(WorkflowReport::completed(completed_scans))
        } else {
            StepOutcome::Continue {
                next_step: scan_number + 1,
                wake_at: wake_at.unwrap_or(now + delay),
            }
        }
    }

    async fn initial_scan(
        &self,
        submission: SocialSubmission,
        delay: Duration,
        now: DateTime<Utc>,
    ) -> Result<StepOutcome, EngineError> {
        if AwardScan::Initial.applied(&submission) {
            return Ok(self.after_initial_scan(&submission, delay, now));
        }

        let keyword = submission.platform.required_keyword(&self.config.keyword);
        let metrics = match self
            .verifier
            .verify(&submission.post_url, &keyword, submission.platform)
            .await
        {
            Ok(m) => m,
            Err(e) => {
                warn!(
                    submission_id = %submission.id,
                    org_id = %submission.organization_id.0,
                    url = %submission.post_url,
                    error = %e,
                    "Initial verification failed"
                );
                self.fail(&submission, FailureReason::VerificationError, None, now)
                    .await?;
                metrics::record_scan(1, "error");
                return Ok(StepOutcome::Finished(WorkflowReport::not_verified(0)));
            }
        };

        let near_duplicate = metrics.contains_keyword
            && self
                .is_near_duplicate(&submission, &metrics.post_text, now)
                .await?;

        match evaluate_initial_scan(&metrics, near_duplicate) {
            InitialScan::Failed(reason) => {
                info!(
                    submission_id = %submission.id,
                    reason = reason.as_str(),
                    "Submission failed verification"
                );
                self.fail(&submission, reason, Some(metrics), now).await?;
                metrics::record_scan(1, "failed");
                Ok(StepOutcome::Finished(WorkflowReport::not_verified(0)))
            }
            InitialScan::Verified => {
                let next = next_scan_at(1, self.config.total_scans, now, delay);
                let _guard = self.locks.lock(&submission.organization_id).await;

                // Re-read under the lock: another executor may have finished this step.
                let current = self.store.get_submission(&submission.id).await?;
                if AwardScan::Initial.applied(&current) {
                    return Ok(self.after_initial_scan(&current, delay, now));
                }

                let Some(days) = self
                    .award(&current, &metrics, AwardScan::Initial, next, now)
                    .await?
                else {
                    let current = self.store.get_submission(&submission.id).await?;
                    return Ok(self.after_initial_scan(&current, delay, now));
                };
                info!(
                    submission_id = %submission.id,
                    org_id = %submission.organization_id.0,
                    days,
                    "Submission verified"
                );
                metrics::record_scan(1, "verified");
                metrics::record_days_awarded(days);
                Ok(self.advance(1, 1, next, delay, now))
            }
        }
    }

    /// Where step 1 goes when the submission already left VERIFYING.
    fn after_initial_scan(
        &self,
        current: &SocialSubmission,
        delay: Duration,
        now: DateTime<Utc>,
    ) -> StepOutcome {
        match current.status {
            // Verified earlier; only the re-arm may have been lost
            SubmissionStatus::Verified => {
                let scans = current.scan_count.max(1);
                self.advance(scans, scans, current.next_scan_at, delay, now)
            }
            _ => StepOutcome::Finished(WorkflowReport::not_verified(current.scan_count)),
        }
    }

    /// Where a rescan goes when its write is already in place or no longer allowed.
    fn after_rescan(
        &self,
        current: &SocialSubmission,
        scan_number: i32,
        delay: Duration,
        now: DateTime<Utc>,
    ) -> StepOutcome {
        if current.status != SubmissionStatus::Verified {
            return StepOutcome::Finished(WorkflowReport::not_verified(scan_number - 1));
        }
        self.advance(
            scan_number,
            current.scan_count,
            current.next_scan_at,
            delay,
            now,
        )
    }

    async fn rescan(
        &self,
        submission: SocialSubmission,
        scan_number: i32,
        delay: Duration,
        now: DateTime<Utc>,
    ) -> Result<StepOutcome, EngineError> {
        if submission.status != SubmissionStatus::Verified {
            debug!(submission_id = %submission.id, status = %submission.status, "Not verified; stopping rescans");
            return Ok(self.after_rescan(&submission, scan_number, delay, now));
        }
        if submission.scan_count >= scan_number {
            debug!(submission_id = %submission.id, scan_number, "Scan already recorded");
            metrics::record_scan(scan_number, "skipped");
            return Ok(self.after_rescan(&submission, scan_number, delay, now));
        }

        let next = next_scan_at(scan_number, self.config.total_scans, now, delay);
        let keyword = submission.platform.required_keyword(&self.config.keyword);
        let metrics = match self
            .verifier
            .verify(&submission.post_url, &keyword, submission.platform)
            .await
        {
            Ok(m) => m,
            Err(e) => {
                warn!(
                    submission_id = %submission.id,
                    scan_number,
                    error = %e,
                    "Rescan failed; skipping"
                );
                metrics::record_scan(scan_number, "error");
                match self.store.set_next_scan_at(&submission.id, next).await {
                    Ok(()) => {}
                    Err(StoreError::Conflict) => {
                        let current = self.store.get_submission(&submission.id).await?;
                        return Ok(self.after_rescan(&current, scan_number, delay, now));
                    }
                    Err(e) => return Err(e.into()),
                }
                return Ok(self.advance(scan_number, submission.scan_count, next, delay, now));
            }
        };

        let _guard = self.locks.lock(&submission.organization_id).await;

        // Re-read under the lock: a revocation or a concurrent executor may have won.
        let current = self.store.get_submission(&submission.id).await?;
        if AwardScan::Rescan(scan_number).applied(&current) {
            return Ok(self.after_rescan(&current, scan_number, delay, now));
        }

        let Some(days) = self
            .award(&current, &metrics, AwardScan::Rescan(scan_number), next, now)
            .await?
        else {
            let current = self.store.get_submission(&submission.id).await?;
            return Ok(self.after_rescan(&current, scan_number, delay, now));
        };

        info!(
            submission_id = %current.id,
            scan_number,
            days,
            "Rescan recorded"
        );
        metrics::record_scan(scan_number, "rescanned");
        metrics::record_days_awarded(days);
        Ok(self.advance(scan_number, scan_number, next, delay, now))
    }

    /// Compute the capped award for this scan, commit it with the submission write
    /// and settle any billing credit. Must run under the organization lock.
    ///
    /// Returns `None` when another executor committed this scan first; the caller
    /// re-reads the submission to decide where the step goes.
    async fn award(
        &self,
        submission: &SocialSubmission,
        metrics: &PostMetrics,
        scan: AwardScan,
        next_scan_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<Option<i32>, EngineError> {
        let month_start = start_of_month(now, self.config.month_offset);
        let mut current = submission.clone();

        for attempt in 1..=AWARD_ATTEMPTS {
            let org = self
                .store
                .get_organization(&current.organization_id)
                .await?;
            let monthly_used = self
                .store
                .sum_days_awarded_since(&org.id, month_start)
                .await?;

            let already_awarded = match scan {
                AwardScan::Initial => 0,
                AwardScan::Rescan(_) => current.days_awarded,
            };
            let additional = calculate_days_to_award(
                &self.config,
                metrics.likes,
                metrics.comments,
                already_awarded,
            );
            let days = apply_monthly_cap(&self.config, additional, monthly_used);
            if days < additional {
                info!(
                    org_id = %org.id.0,
                    submission_id = %current.id,
                    additional,
                    monthly_used,
                    days,
                    "Monthly cap reduced award"
                );
            }

            let plan = self.dispatcher.plan(&org, days, now).await?;
            let write = match scan {
                AwardScan::Initial => AwardWrite::Verified(MarkVerifiedParams {
                    metrics: metrics.clone(),
                    days_awarded: days,
                    verified_at: now,
                    next_scan_at,
                }),
                AwardScan::Rescan(scan_number) => AwardWrite::Rescan(RecordRescanParams {
                    scan_number,
                    metrics: metrics.clone(),
                    days_awarded: already_awarded + days,
                    scanned_at: now,
                    next_scan_at,
                }),
            };

            match self
                .store
                .apply_award(&ApplyAwardParams {
                    submission_id: current.id.clone(),
                    organization_id: org.id.clone(),
                    month_start,
                    expected_monthly_used: monthly_used,
                    earned_premium: plan.earned_premium(),
                    write,
                })
                .await
            {
                Ok(()) => {
                    self.dispatcher.settle(plan, &org, days, &current.id).await;
                    return Ok(Some(days));
                }
                Err(StoreError::Conflict) => {
                    current = self.store.get_submission(&current.id).await?;
                    if scan.applied(&current) {
                        debug!(submission_id = %current.id, ?scan, "Award already committed");
                        return Ok(None);
                    }
                    // Another process moved the month's usage or the expiry.
                    warn!(
                        submission_id = %current.id,
                        org_id = %org.id.0,
                        attempt,
                        "Award raced another writer; recomputing"
                    );
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(EngineError::Conflict(format!(
            "award for submission {} kept conflicting",
            submission.id
        )))
    }

    async fn is_near_duplicate(
        &self,
        submission: &SocialSubmission,
        caption: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, EngineError> {
        let recent = self
            .store
            .list_verified_captions(
                &submission.organization_id,
                submission.platform,
                now - self.config.duplicate_lookback,
                &submission.id,
            )
            .await?;
        Ok(is_near_duplicate(
            self.scorer.as_ref(),
            caption,
            &recent,
            self.config.similarity_threshold,
        ))
    }

    async fn fail(
        &self,
        submission: &SocialSubmission,
        reason: FailureReason,
        metrics: Option<PostMetrics>,
        now: DateTime<Utc>,
    ) -> Result<(), EngineError> {
        self.store
            .mark_submission_failed(
                &submission.id,
                &MarkFailedParams {
                    reason,
                    metrics,
                    scanned_at: now,
                },
            )
            .await?;
        Ok(())
    }
}
