//! Organization and payer types for entitlement and billing.

use chrono::{DateTime, Utc};

use super::{OrganizationId, PayerId, SubscriptionTier};

/// Organization record (billing and entitlement unit)
#[derive(Clone, Debug)]
pub struct Organization {
    pub id: OrganizationId,
    pub name: String,
    pub subscription_tier: SubscriptionTier,
    pub subscription_expires_at: Option<DateTime<Utc>>,
    pub purchased_slots: i32,
    pub payer_id: Option<PayerId>,
    pub billing_subscription_id: Option<String>, // cleared on cancellation
    pub earned_premium_expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Organization {
    /// Paid entitlement window: PREMIUM tier with an unexpired subscription.
    pub fn has_paid_subscription(&self, now: DateTime<Utc>) -> bool {
        self.subscription_tier == SubscriptionTier::Premium
            && self.subscription_expires_at.is_some_and(|exp| exp > now)
    }
}

/// Billing-responsible account
#[derive(Clone, Debug)]
pub struct Payer {
    pub id: PayerId,
    pub email: String,
    pub billing_customer_id: Option<String>, // identity at the billing provider
    pub created_at: DateTime<Utc>,
}

/// Parameters for creating an organization
#[derive(Clone, Debug)]
pub struct CreateOrganizationParams {
    pub name: String,
    pub payer_id: Option<PayerId>,
}

/// Parameters for creating a payer
#[derive(Clone, Debug)]
pub struct CreatePayerParams {
    pub email: String,
    pub billing_customer_id: Option<String>,
}

/// Parameters for activating a paid subscription
#[derive(Clone, Debug)]
pub struct SetSubscriptionParams {
    pub tier: SubscriptionTier,
    pub expires_at: Option<DateTime<Utc>>,
    pub purchased_slots: i32,
    pub payer_id: Option<PayerId>,
    pub billing_subscription_id: Option<String>,
}
