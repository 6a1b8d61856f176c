use chrono::{DateTime, Duration, TimeZone, Utc};
use shoutout_billing::MockBillingService;
use shoutout_storage::{
    CreateOrganizationParams, CreatePayerParams, MarkVerifiedParams, OrganizationId, Platform,
    PostMetrics, SetSubscriptionParams, Store, SubscriptionTier, WorkflowTask,
};
use shoutout_store_sqlite::SqliteStore;
use std::sync::Arc;

use crate::verifier::MockContentVerifier;
use crate::{ReferralService, RewardConfig, Scheduler, SchedulerConfig, VerificationWorkflow};

pub struct Harness {
    pub store: Arc<SqliteStore>,
    pub billing: Arc<MockBillingService>,
    pub workflow: Arc<VerificationWorkflow>,
    pub service: ReferralService,
    pub scheduler: Scheduler,
}

/// Mid-month so three daily scans stay in one calendar month.
pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 10, 12, 0, 0).unwrap()
}

pub fn day(n: i64) -> DateTime<Utc> {
    t0() + Duration::hours(24 * n)
}

pub fn post(contains_keyword: bool, text: &str, likes: i64, comments: i64) -> PostMetrics {
    PostMetrics {
        contains_keyword,
        post_text: text.to_string(),
        likes,
        comments,
        shares: 0,
    }
}

pub fn build(
    store: Arc<SqliteStore>,
    verifier: MockContentVerifier,
    billing: MockBillingService,
) -> Harness {
    let billing = Arc::new(billing);
    let workflow = Arc::new(VerificationWorkflow::new(
        store.clone(),
        Arc::new(verifier),
        billing.clone(),
        Arc::new(RewardConfig::default()),
        SchedulerConfig::default(),
    ));
    Harness {
        store,
        billing,
        service: ReferralService::new(workflow.clone()),
        scheduler: Scheduler::new(workflow.clone()),
        workflow,
    }
}

pub async fn harness(verifier: MockContentVerifier) -> Harness {
    let store = Arc::new(SqliteStore::open_in_memory().await.unwrap());
    build(store, verifier, MockBillingService::new())
}

pub async fn free_org(store: &SqliteStore, name: &str) -> OrganizationId {
    store
        .create_organization(&CreateOrganizationParams {
            name: name.to_string(),
            payer_id: None,
        })
        .await
        .unwrap()
        .id
}

pub async fn paid_org(store: &SqliteStore, customer_id: &str, slots: i32) -> OrganizationId {
    let payer = store
        .create_payer(&CreatePayerParams {
            email: "billing@acme.test".into(),
            billing_customer_id: Some(customer_id.to_string()),
        })
        .await
        .unwrap();
    let org_id = free_org(store, "paid").await;
    store
        .set_organization_subscription(
            &org_id,
            &SetSubscriptionParams {
                tier: SubscriptionTier::Premium,
                expires_at: Some(day(30)),
                purchased_slots: slots,
                payer_id: Some(payer.id),
                billing_subscription_id: Some("sub_1".into()),
            },
        )
        .await
        .unwrap();
    org_id
}

/// Seed a verified submission that already used `days` of this month's allowance.
pub async fn seed_verified(store: &SqliteStore, org_id: &OrganizationId, url: &str, days: i32) {
    let sub = store
        .create_submission(&shoutout_storage::CreateSubmissionParams {
            organization_id: org_id.clone(),
            platform: Platform::Linkedin,
            post_url: format!("https://{}", url),
            url_normalized: url.to_string(),
        })
        .await
        .unwrap();
    store
        .mark_submission_verified(
            &sub.id,
            &MarkVerifiedParams {
                metrics: post(true, url, 100, 100),
                days_awarded: days,
                verified_at: t0() - Duration::days(2),
                next_scan_at: None,
            },
        )
        .await
        .unwrap();
}

pub async fn open_task(store: &SqliteStore, sub: &shoutout_storage::SocialSubmission) -> WorkflowTask {
    store
        .find_open_workflow_task(&sub.id)
        .await
        .unwrap()
        .expect("open workflow task")
}

/// A submission in VERIFYING with its step-1 task created but not yet run.
pub async fn pending_initial_scan(store: &SqliteStore, org_id: &OrganizationId, url: &str) -> WorkflowTask {
    let sub = store
        .create_submission(&shoutout_storage::CreateSubmissionParams {
            organization_id: org_id.clone(),
            platform: Platform::X,
            post_url: url.to_string(),
            url_normalized: url.trim_start_matches("https://").to_string(),
        })
        .await
        .unwrap();
    store
        .create_workflow_task(&shoutout_storage::CreateWorkflowTaskParams {
            submission_id: sub.id,
            step: 1,
            delay_ms: Duration::hours(24).num_milliseconds(),
            next_wake_at: t0(),
        })
        .await
        .unwrap()
}
