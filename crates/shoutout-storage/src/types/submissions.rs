//! Social submission types.

use chrono::{DateTime, Utc};

use super::{
    FailureReason, OrganizationId, Platform, SubmissionId, SubmissionStatus, WorkflowTaskId,
};

/// Engagement snapshot returned by one scan of a post
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PostMetrics {
    pub contains_keyword: bool,
    pub post_text: String,
    pub likes: i64,
    pub comments: i64,
    pub shares: i64,
}

/// Social submission record
#[derive(Clone, Debug)]
pub struct SocialSubmission {
    pub id: SubmissionId,
    pub organization_id: OrganizationId,
    pub platform: Platform,
    pub post_url: String,
    pub url_normalized: String, // globally unique
    pub status: SubmissionStatus,
    pub failure_reason: Option<FailureReason>,
    pub contains_keyword: bool,
    pub post_text: Option<String>,
    pub likes: i64,
    pub comments: i64,
    pub shares: i64,
    pub days_awarded: i32, // cumulative, never decreases
    pub scan_count: i32,
    pub last_scanned_at: Option<DateTime<Utc>>,
    pub next_scan_at: Option<DateTime<Utc>>,
    pub rescan_workflow_id: Option<WorkflowTaskId>,
    pub submitted_at: DateTime<Utc>,
    pub verified_at: Option<DateTime<Utc>>,
}

/// Parameters for creating a submission in VERIFYING
#[derive(Clone, Debug)]
pub struct CreateSubmissionParams {
    pub organization_id: OrganizationId,
    pub platform: Platform,
    pub post_url: String,
    pub url_normalized: String,
}

/// VERIFYING -> VERIFIED write for the initial scan
#[derive(Clone, Debug)]
pub struct MarkVerifiedParams {
    pub metrics: PostMetrics,
    pub days_awarded: i32,
    pub verified_at: DateTime<Utc>,
    pub next_scan_at: Option<DateTime<Utc>>,
}

/// VERIFYING -> FAILED write for the initial scan
#[derive(Clone, Debug)]
pub struct MarkFailedParams {
    pub reason: FailureReason,
    pub metrics: Option<PostMetrics>,
    pub scanned_at: DateTime<Utc>,
}

/// Single-update write of a completed rescan
#[derive(Clone, Debug)]
pub struct RecordRescanParams {
    pub scan_number: i32,
    pub metrics: PostMetrics,
    pub days_awarded: i32, // new cumulative total
    pub scanned_at: DateTime<Utc>,
    pub next_scan_at: Option<DateTime<Utc>>,
}

/// Earned-premium expiry swap, applied only if the stored value is still `previous`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EarnedPremiumUpdate {
    pub previous: Option<DateTime<Utc>>,
    pub expires_at: DateTime<Utc>,
}

/// Submission write an award commits with
#[derive(Clone, Debug)]
pub enum AwardWrite {
    /// Initial scan, guarded by `status = VERIFYING`
    Verified(MarkVerifiedParams),
    /// Rescan, guarded by `status = VERIFIED AND scan_count < scan_number`
    Rescan(RecordRescanParams),
}

/// An award committed as one transaction.
///
/// The organization's usage for the month starting at `month_start` must still be
/// `expected_monthly_used`, otherwise nothing is written and the store reports
/// `Conflict` so the caller can recompute.
#[derive(Clone, Debug)]
pub struct ApplyAwardParams {
    pub submission_id: SubmissionId,
    pub organization_id: OrganizationId,
    pub month_start: DateTime<Utc>,
    pub expected_monthly_used: i64,
    pub earned_premium: Option<EarnedPremiumUpdate>,
    pub write: AwardWrite,
}
