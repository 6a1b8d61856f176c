//! Routes awarded days to a billing credit or an earned-premium extension.

use chrono::{DateTime, Duration, Utc};
use shoutout_billing::BillingService;
use shoutout_storage::{EarnedPremiumUpdate, Organization, Store, StoreError, SubmissionId};
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::RewardConfig;
use crate::metrics;

/// What the dispatcher did with an award
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CreditOutcome {
    /// Nothing to credit
    Skipped,
    /// Paid organization credited on its billing customer
    BillingCredit { amount_cents: i64 },
    /// Paid organization, provider rejected the credit (logged and swallowed)
    BillingCreditFailed { amount_cents: i64 },
    /// Earned premium extended to `expires_at`
    EarnedExtended { expires_at: DateTime<Utc> },
    /// Paid organization whose payer has no billing identity: neither credit nor extension
    NoCreditIdentity,
}

/// New earned-premium expiry: stacks on an unexpired grant, restarts from `now` otherwise.
pub fn extended_expiry(
    current: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    days: i32,
) -> DateTime<Utc> {
    let anchor = match current {
        Some(expiry) if expiry > now => expiry,
        _ => now,
    };
    anchor + Duration::days(i64::from(days))
}

/// Where an award's days will go, decided before the award is committed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CreditPlan {
    Skip,
    Billing {
        customer_id: String,
        amount_cents: i64,
    },
    NoIdentity,
    /// Committed together with the submission write
    Extend(EarnedPremiumUpdate),
}

impl CreditPlan {
    pub fn earned_premium(&self) -> Option<EarnedPremiumUpdate> {
        match self {
            CreditPlan::Extend(update) => Some(update.clone()),
            _ => None,
        }
    }
}

pub struct CreditingDispatcher {
    store: Arc<dyn Store>,
    billing: Arc<dyn BillingService>,
    config: Arc<RewardConfig>,
}

impl CreditingDispatcher {
    pub fn new(
        store: Arc<dyn Store>,
        billing: Arc<dyn BillingService>,
        config: Arc<RewardConfig>,
    ) -> Self {
        Self {
            store,
            billing,
            config,
        }
    }

    /// Decide where `days` go for a freshly read `org`. Nothing is written.
    pub async fn plan(
        &self,
        org: &Organization,
        days: i32,
        now: DateTime<Utc>,
    ) -> Result<CreditPlan, StoreError> {
        if days <= 0 {
            return Ok(CreditPlan::Skip);
        }

        if org.has_paid_subscription(now) {
            if let Some(payer_id) = &org.payer_id {
                match self.store.get_payer(payer_id).await {
                    Ok(payer) => {
                        return Ok(match payer.billing_customer_id {
                            Some(customer_id) => CreditPlan::Billing {
                                customer_id,
                                amount_cents: i64::from(days) * self.config.credit_per_day_cents,
                            },
                            None => CreditPlan::NoIdentity,
                        });
                    }
                    // A dangling payer reference is treated like no payer at all.
                    Err(StoreError::NotFound) => {}
                    Err(e) => return Err(e),
                }
            }
        }

        Ok(CreditPlan::Extend(EarnedPremiumUpdate {
            previous: org.earned_premium_expires_at,
            expires_at: extended_expiry(org.earned_premium_expires_at, now, days),
        }))
    }

    /// Carry out a committed plan. Only billing credits reach outside the store here;
    /// a rejected credit is logged and swallowed.
    pub async fn settle(
        &self,
        plan: CreditPlan,
        org: &Organization,
        days: i32,
        submission_id: &SubmissionId,
    ) -> CreditOutcome {
        match plan {
            CreditPlan::Skip => {
                metrics::record_credit("skipped");
                CreditOutcome::Skipped
            }
            CreditPlan::NoIdentity => {
                warn!(
                    org_id = %org.id.0,
                    submission_id = %submission_id,
                    days,
                    "Paid organization has no billing identity; award not credited"
                );
                metrics::record_credit("no_identity");
                CreditOutcome::NoCreditIdentity
            }
            CreditPlan::Extend(update) => {
                info!(
                    org_id = %org.id.0,
                    submission_id = %submission_id,
                    days,
                    expires_at = %update.expires_at,
                    "Earned premium extended"
                );
                metrics::record_credit("extended");
                CreditOutcome::EarnedExtended {
                    expires_at: update.expires_at,
                }
            }
            CreditPlan::Billing {
                customer_id,
                amount_cents,
            } => {
                self.issue_credit(org, &customer_id, amount_cents, days, submission_id)
                    .await
            }
        }
    }

    async fn issue_credit(
        &self,
        org: &Organization,
        customer_id: &str,
        amount_cents: i64,
        days: i32,
        submission_id: &SubmissionId,
    ) -> CreditOutcome {
        let memo = format!(
            "Referral reward: {} day(s) for submission {}",
            days, submission_id
        );
        match self
            .billing
            .issue_credit(customer_id, amount_cents, &memo)
            .await
        {
            Ok(receipt) => {
                info!(
                    org_id = %org.id.0,
                    submission_id = %submission_id,
                    amount_cents,
                    credit_id = %receipt.credit_id,
                    "Billing credit issued"
                );
                metrics::record_credit("billed");
                CreditOutcome::BillingCredit { amount_cents }
            }
            Err(e) => {
                warn!(
                    org_id = %org.id.0,
                    submission_id = %submission_id,
                    amount_cents,
                    error = %e,
                    "Billing credit failed"
                );
                metrics::record_credit("billing_failed");
                CreditOutcome::BillingCreditFailed { amount_cents }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shoutout_billing::MockBillingService;
    use shoutout_storage::{
        CreateOrganizationParams, CreatePayerParams, OrganizationId, PayerId,
        SetSubscriptionParams, SubscriptionTier,
    };
    use shoutout_store_sqlite::SqliteStore;
    use uuid::Uuid;

    struct Fixture {
        store: Arc<SqliteStore>,
        billing: Arc<MockBillingService>,
        dispatcher: CreditingDispatcher,
    }

    async fn fixture(billing: MockBillingService) -> Fixture {
        let store = Arc::new(SqliteStore::open_in_memory().await.unwrap());
        let billing = Arc::new(billing);
        let dispatcher = CreditingDispatcher::new(
            store.clone(),
            billing.clone(),
            Arc::new(RewardConfig::default()),
        );
        Fixture {
            store,
            billing,
            dispatcher,
        }
    }

    async fn free_org(store: &SqliteStore) -> Organization {
        store
            .create_organization(&CreateOrganizationParams {
                name: "acme".into(),
                payer_id: None,
            })
            .await
            .unwrap()
    }

    async fn paid_org(store: &SqliteStore, customer: Option<&str>) -> Organization {
        let payer = store
            .create_payer(&CreatePayerParams {
                email: "owner@acme.test".into(),
                billing_customer_id: customer.map(str::to_string),
            })
            .await
            .unwrap();
        let org = free_org(store).await;
        store
            .set_organization_subscription(
                &org.id,
                &SetSubscriptionParams {
                    tier: SubscriptionTier::Premium,
                    expires_at: Some(Utc::now() + Duration::days(30)),
                    purchased_slots: 2,
                    payer_id: Some(payer.id),
                    billing_subscription_id: Some("sub_1".into()),
                },
            )
            .await
            .unwrap();
        store.get_organization(&org.id).await.unwrap()
    }

    fn sid() -> SubmissionId {
        SubmissionId(Uuid::now_v7())
    }

    #[test]
    fn test_extension_anchoring() {
        let now = Utc::now();
        assert_eq!(extended_expiry(None, now, 3), now + Duration::days(3));
        assert_eq!(
            extended_expiry(Some(now - Duration::days(1)), now, 2),
            now + Duration::days(2)
        );
        let active = now + Duration::days(5);
        assert_eq!(
            extended_expiry(Some(active), now, 2),
            active + Duration::days(2)
        );
    }

    #[tokio::test]
    async fn test_zero_days_is_skipped() {
        let f = fixture(MockBillingService::new()).await;
        let org = free_org(&f.store).await;
        let plan = f.dispatcher.plan(&org, 0, Utc::now()).await.unwrap();
        assert_eq!(plan, CreditPlan::Skip);
        assert!(plan.earned_premium().is_none());
        let outcome = f.dispatcher.settle(plan, &org, 0, &sid()).await;
        assert_eq!(outcome, CreditOutcome::Skipped);
    }

    #[tokio::test]
    async fn test_free_org_plans_extension() {
        let f = fixture(MockBillingService::new()).await;
        let org = free_org(&f.store).await;
        let now = Utc::now();
        let plan = f.dispatcher.plan(&org, 3, now).await.unwrap();

        let expected = now + Duration::days(3);
        assert_eq!(
            plan.earned_premium(),
            Some(EarnedPremiumUpdate {
                previous: None,
                expires_at: expected
            })
        );
        let outcome = f.dispatcher.settle(plan, &org, 3, &sid()).await;
        assert_eq!(
            outcome,
            CreditOutcome::EarnedExtended {
                expires_at: expected
            }
        );
        // The extension itself is committed by the store, never by settle.
        let after = f.store.get_organization(&org.id).await.unwrap();
        assert!(after.earned_premium_expires_at.is_none());
        assert!(f.billing.credits().is_empty());
    }

    #[tokio::test]
    async fn test_paid_org_gets_billing_credit_on_settle() {
        let f = fixture(MockBillingService::new()).await;
        let org = paid_org(&f.store, Some("cus_42")).await;
        let submission_id = sid();
        let plan = f.dispatcher.plan(&org, 2, Utc::now()).await.unwrap();
        assert!(plan.earned_premium().is_none());
        assert!(f.billing.credits().is_empty());

        let outcome = f.dispatcher.settle(plan, &org, 2, &submission_id).await;
        assert_eq!(outcome, CreditOutcome::BillingCredit { amount_cents: 200 });
        let credits = f.billing.credits();
        assert_eq!(credits.len(), 1);
        assert_eq!(credits[0].customer_id, "cus_42");
        assert!(credits[0].memo.contains(&submission_id.to_string()));
    }

    #[tokio::test]
    async fn test_billing_failure_is_swallowed() {
        let f = fixture(MockBillingService::failing()).await;
        let org = paid_org(&f.store, Some("cus_42")).await;
        let plan = f.dispatcher.plan(&org, 1, Utc::now()).await.unwrap();
        let outcome = f.dispatcher.settle(plan, &org, 1, &sid()).await;
        assert_eq!(
            outcome,
            CreditOutcome::BillingCreditFailed { amount_cents: 100 }
        );
    }

    #[tokio::test]
    async fn test_paid_org_without_billing_identity_gets_nothing() {
        let f = fixture(MockBillingService::new()).await;
        let org = paid_org(&f.store, None).await;
        let plan = f.dispatcher.plan(&org, 3, Utc::now()).await.unwrap();
        assert_eq!(plan, CreditPlan::NoIdentity);
        let outcome = f.dispatcher.settle(plan, &org, 3, &sid()).await;
        assert_eq!(outcome, CreditOutcome::NoCreditIdentity);
        assert!(f.billing.credits().is_empty());
    }

    #[tokio::test]
    async fn test_grace_period_org_gets_extension() {
        let f = fixture(MockBillingService::new()).await;
        let org = paid_org(&f.store, Some("cus_42")).await;
        f.store.clear_organization_billing(&org.id).await.unwrap();
        let org = f.store.get_organization(&org.id).await.unwrap();

        let plan = f.dispatcher.plan(&org, 1, Utc::now()).await.unwrap();
        assert!(matches!(plan, CreditPlan::Extend(_)));
    }

    #[tokio::test]
    async fn test_extension_stacks_on_active_grant() {
        let f = fixture(MockBillingService::new()).await;
        let org = free_org(&f.store).await;
        let now = Utc::now();
        let existing = now + Duration::days(4);
        f.store
            .set_earned_premium_expires_at(&org.id, existing)
            .await
            .unwrap();
        let org = f.store.get_organization(&org.id).await.unwrap();

        let CreditPlan::Extend(update) = f.dispatcher.plan(&org, 2, now).await.unwrap() else {
            panic!("expected extension");
        };
        assert_eq!(
            update.previous.map(|t| t.timestamp_millis()),
            Some(existing.timestamp_millis())
        );
        assert_eq!(
            update.expires_at.timestamp_millis(),
            (existing + Duration::days(2)).timestamp_millis()
        );
    }

    #[tokio::test]
    async fn test_dangling_payer_is_treated_as_free() {
        let f = fixture(MockBillingService::new()).await;
        let now = Utc::now();
        let org = Organization {
            id: OrganizationId(Uuid::now_v7()),
            name: "ghost".into(),
            subscription_tier: SubscriptionTier::Premium,
            subscription_expires_at: Some(now + Duration::days(10)),
            purchased_slots: 1,
            payer_id: Some(PayerId(Uuid::now_v7())),
            billing_subscription_id: Some("sub_1".into()),
            earned_premium_expires_at: None,
            created_at: now,
            updated_at: now,
        };
        let plan = f.dispatcher.plan(&org, 1, now).await.unwrap();
        assert!(matches!(plan, CreditPlan::Extend(_)));
    }
}
