//! Which mechanism currently grants an organization premium access.

use chrono::{DateTime, Utc};
use shoutout_storage::Organization;

/// Where premium access comes from
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PremiumSource {
    Paid,
    Earned,
    None,
}

impl PremiumSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            PremiumSource::Paid => "paid",
            PremiumSource::Earned => "earned",
            PremiumSource::None => "none",
        }
    }
}

impl std::fmt::Display for PremiumSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resolved entitlement of an organization
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Entitlement {
    pub is_active: bool,
    pub source: PremiumSource,
}

/// Resolve entitlement from organization state and its active slot count.
///
/// A live paid subscription always decides the source, even when the organization
/// is over its purchased quota; in that case access is inactive and earned premium
/// is not consulted. Earned premium only applies to organizations with at most one
/// active slot.
pub fn resolve(org: &Organization, active_resource_count: i64, now: DateTime<Utc>) -> Entitlement {
    if org.has_paid_subscription(now) {
        return Entitlement {
            is_active: active_resource_count <= i64::from(org.purchased_slots),
            source: PremiumSource::Paid,
        };
    }

    let earned_active = org
        .earned_premium_expires_at
        .is_some_and(|exp| exp > now)
        && active_resource_count <= 1;
    if earned_active {
        return Entitlement {
            is_active: true,
            source: PremiumSource::Earned,
        };
    }

    Entitlement {
        is_active: false,
        source: PremiumSource::None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use shoutout_storage::{OrganizationId, SubscriptionTier};
    use uuid::Uuid;

    fn org(now: DateTime<Utc>) -> Organization {
        Organization {
            id: OrganizationId(Uuid::now_v7()),
            name: "acme".into(),
            subscription_tier: SubscriptionTier::Free,
            subscription_expires_at: None,
            purchased_slots: 0,
            payer_id: None,
            billing_subscription_id: None,
            earned_premium_expires_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn paid(now: DateTime<Utc>, slots: i32) -> Organization {
        Organization {
            subscription_tier: SubscriptionTier::Premium,
            subscription_expires_at: Some(now + Duration::days(10)),
            purchased_slots: slots,
            ..org(now)
        }
    }

    #[test]
    fn test_no_entitlement() {
        let now = Utc::now();
        let e = resolve(&org(now), 0, now);
        assert_eq!(e.source, PremiumSource::None);
        assert!(!e.is_active);
    }

    #[test]
    fn test_paid_within_quota() {
        let now = Utc::now();
        let e = resolve(&paid(now, 3), 3, now);
        assert_eq!(
            e,
            Entitlement {
                is_active: true,
                source: PremiumSource::Paid
            }
        );
    }

    #[test]
    fn test_paid_takes_priority_over_earned() {
        let now = Utc::now();
        let o = Organization {
            earned_premium_expires_at: Some(now + Duration::days(5)),
            ..paid(now, 2)
        };
        assert_eq!(resolve(&o, 1, now).source, PremiumSource::Paid);
    }

    #[test]
    fn test_over_quota_paid_does_not_fall_back_to_earned() {
        let now = Utc::now();
        let o = Organization {
            earned_premium_expires_at: Some(now + Duration::days(5)),
            ..paid(now, 0)
        };
        let e = resolve(&o, 1, now);
        assert_eq!(e.source, PremiumSource::Paid);
        assert!(!e.is_active);
    }

    #[test]
    fn test_expired_paid_falls_through_to_earned() {
        let now = Utc::now();
        let o = Organization {
            subscription_expires_at: Some(now - Duration::seconds(1)),
            earned_premium_expires_at: Some(now + Duration::days(1)),
            ..paid(now, 5)
        };
        let e = resolve(&o, 1, now);
        assert_eq!(e.source, PremiumSource::Earned);
        assert!(e.is_active);
    }

    #[test]
    fn test_premium_tier_without_expiry_is_not_paid() {
        let now = Utc::now();
        let o = Organization {
            subscription_expires_at: None,
            ..paid(now, 5)
        };
        assert_eq!(resolve(&o, 0, now).source, PremiumSource::None);
    }

    #[test]
    fn test_earned_requires_at_most_one_active_slot() {
        let now = Utc::now();
        let o = Organization {
            earned_premium_expires_at: Some(now + Duration::days(1)),
            ..org(now)
        };
        assert_eq!(resolve(&o, 1, now).source, PremiumSource::Earned);
        assert_eq!(resolve(&o, 2, now).source, PremiumSource::None);
    }

    #[test]
    fn test_expired_earned_grant() {
        let now = Utc::now();
        let o = Organization {
            earned_premium_expires_at: Some(now),
            ..org(now)
        };
        assert_eq!(resolve(&o, 0, now).source, PremiumSource::None);
    }
}
