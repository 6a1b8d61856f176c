use chrono::Duration;
use shoutout_billing::MockBillingService;
use shoutout_storage::{Platform, Store, SubmissionStatus, TaskStatus};
use shoutout_store_sqlite::SqliteStore;
use std::sync::Arc;

use super::common::*;
use crate::verifier::MockContentVerifier;
use crate::workflow::StepOutcome;

fn verifier(times: usize) -> MockContentVerifier {
    let mut verifier = MockContentVerifier::new();
    verifier
        .expect_verify()
        .times(times)
        .returning(|_, _, _| Ok(post(true, "Loving @shoutout", 15, 8)));
    verifier
}

/// A submission whose task was created but never ran (crash right after intake).
async fn orphaned_submission(
    store: &SqliteStore,
    org: &shoutout_storage::OrganizationId,
) -> (shoutout_storage::SubmissionId, shoutout_storage::WorkflowTaskId) {
    let task = pending_initial_scan(store, org, "https://x.com/acme/status/1").await;
    (task.submission_id, task.id)
}

#[tokio::test]
async fn test_rescans_resume_after_restart() {
    let dir = tempfile::tempdir().unwrap();
    let url = format!(
        "sqlite://{}?mode=rwc",
        dir.path().join("shoutout.db").display()
    );

    let (org, sub_id) = {
        let store = Arc::new(SqliteStore::open(&url).await.unwrap());
        let h = build(store, verifier(1), MockBillingService::new());
        let org = free_org(&h.store, "acme").await;
        let sub = h
            .service
            .submit_at(&org, "https://x.com/acme/status/1", Platform::X, t0())
            .await
            .unwrap();
        assert_eq!(sub.scan_count, 1);
        (org, sub.id)
    };

    let store = Arc::new(SqliteStore::open(&url).await.unwrap());
    let h = build(store, verifier(1), MockBillingService::new());
    let summary = h.scheduler.tick(day(1)).await.unwrap();
    assert_eq!((summary.claimed, summary.scheduled), (1, 1));

    let sub = h.service.get_status(&sub_id).await.unwrap();
    assert_eq!(sub.scan_count, 2);
    assert_eq!(sub.days_awarded, 3);
    assert_eq!(sub.next_scan_at, Some(day(2)));
    let o = h.store.get_organization(&org).await.unwrap();
    assert_eq!(o.earned_premium_expires_at, Some(day(3)));
}

#[tokio::test]
async fn test_never_started_task_is_picked_up() {
    let h = harness(verifier(1)).await;
    let org = free_org(&h.store, "acme").await;
    let (sub_id, task_id) = orphaned_submission(&h.store, &org).await;

    let summary = h.scheduler.tick(t0()).await.unwrap();
    assert_eq!((summary.claimed, summary.scheduled), (1, 1));

    let sub = h.service.get_status(&sub_id).await.unwrap();
    assert_eq!(sub.status, SubmissionStatus::Verified);
    assert_eq!(sub.rescan_workflow_id, Some(task_id.clone()));
    let task = h.store.get_workflow_task(&task_id).await.unwrap();
    assert_eq!(task.status, TaskStatus::Pending);
    assert_eq!(task.step, 2);
    assert_eq!(task.next_wake_at, day(1));
}

#[tokio::test]
async fn test_expired_lease_is_reclaimed() {
    let h = harness(verifier(1)).await;
    let org = free_org(&h.store, "acme").await;
    let (sub_id, task_id) = orphaned_submission(&h.store, &org).await;

    let lease = h.workflow.scheduling().lease;
    // Claimed by an executor that died mid-step
    h.store
        .claim_workflow_task(&task_id, t0(), t0() + lease)
        .await
        .unwrap()
        .unwrap();

    let held = h.scheduler.tick(t0() + Duration::minutes(1)).await.unwrap();
    assert_eq!(held.claimed, 0);

    let reclaimed = h
        .scheduler
        .tick(t0() + lease + Duration::seconds(1))
        .await
        .unwrap();
    assert_eq!(reclaimed.claimed, 1);
    let sub = h.service.get_status(&sub_id).await.unwrap();
    assert_eq!(sub.status, SubmissionStatus::Verified);
    assert_eq!(h.store.get_workflow_task(&task_id).await.unwrap().attempts, 2);
}

#[tokio::test]
async fn test_lost_rearm_does_not_rescan_initial_step() {
    let h = harness(verifier(1)).await;
    let org = free_org(&h.store, "acme").await;
    let sub = h
        .service
        .submit_at(&org, "https://x.com/acme/status/1", Platform::X, t0())
        .await
        .unwrap();

    // Initial scan persisted, but the task never moved past step 1
    let task = open_task(&h.store, &sub).await;
    h.store
        .reschedule_workflow_task(&task.id, 1, t0())
        .await
        .unwrap();
    let stale = h.store.get_workflow_task(&task.id).await.unwrap();
    assert_eq!(
        h.workflow.run_step(&stale, t0()).await.unwrap(),
        StepOutcome::Continue {
            next_step: 2,
            wake_at: day(1)
        }
    );

    h.scheduler.tick(t0() + Duration::minutes(1)).await.unwrap();
    let after = h.service.get_status(&sub.id).await.unwrap();
    assert_eq!(after.scan_count, 1);
    assert_eq!(after.days_awarded, 3);
    assert_eq!(h.store.get_workflow_task(&task.id).await.unwrap().step, 2);
}

#[tokio::test]
async fn test_awards_from_two_processes_share_monthly_cap() {
    let dir = tempfile::tempdir().unwrap();
    let url = format!(
        "sqlite://{}?mode=rwc",
        dir.path().join("shoutout.db").display()
    );

    // Two stores on one file, each workflow with its own in-process locks
    let mut first = MockContentVerifier::new();
    first
        .expect_verify()
        .times(1)
        .returning(|_, _, _| Ok(post(true, "Shipping the new dashboard with @shoutout", 15, 8)));
    let mut second = MockContentVerifier::new();
    second
        .expect_verify()
        .times(1)
        .returning(|_, _, _| Ok(post(true, "Support triage got calmer thanks to @shoutout", 15, 8)));
    let a = build(
        Arc::new(SqliteStore::open(&url).await.unwrap()),
        first,
        MockBillingService::new(),
    );
    let b = build(
        Arc::new(SqliteStore::open(&url).await.unwrap()),
        second,
        MockBillingService::new(),
    );

    let org = free_org(&a.store, "acme").await;
    seed_verified(&a.store, &org, "linkedin.com/posts/earlier", 12).await;

    let (x, y) = tokio::join!(
        a.service
            .submit_at(&org, "https://x.com/acme/status/10", Platform::X, t0()),
        b.service
            .submit_at(&org, "https://x.com/acme/status/11", Platform::X, t0()),
    );
    let (x, y) = (x.unwrap(), y.unwrap());
    assert_eq!(x.status, SubmissionStatus::Verified);
    assert_eq!(y.status, SubmissionStatus::Verified);
    assert_eq!(x.days_awarded + y.days_awarded, 2);

    let month_start = crate::reward::start_of_month(t0(), a.workflow.config().month_offset);
    assert_eq!(
        b.store.sum_days_awarded_since(&org, month_start).await.unwrap(),
        14
    );
    let o = b.store.get_organization(&org).await.unwrap();
    assert_eq!(o.earned_premium_expires_at, Some(day(2)));
}
