//! shoutout-billing - Billing-provider credits for referral rewards
//!
//! Paid organizations that earn referral days are paid out as a credit on their
//! billing customer instead of an earned-premium grant. This crate provides:
//! - The [`BillingService`] seam the crediting dispatcher calls
//! - A Stripe implementation (customer balance transactions)
//! - A recording mock for development and tests

use async_trait::async_trait;
use std::sync::Mutex;
use thiserror::Error;

mod stripe;
pub use stripe::StripeBillingService;

/// Billing service errors
#[derive(Debug, Error)]
pub enum BillingError {
    #[error("Billing provider error: {0}")]
    Provider(String),

    #[error("Customer not found: {0}")]
    CustomerNotFound(String),

    #[error("Invalid credit amount: {0}")]
    InvalidAmount(i64),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Which provider credits are issued against
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BillingProvider {
    /// Record credits in memory only
    Mock,
    /// Stripe customer balance transactions
    Stripe,
}

impl std::str::FromStr for BillingProvider {
    type Err = BillingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mock" => Ok(Self::Mock),
            "stripe" => Ok(Self::Stripe),
            other => Err(BillingError::Config(format!(
                "Unknown billing provider '{}': expected 'mock' or 'stripe'",
                other
            ))),
        }
    }
}

/// Configuration for the billing service
#[derive(Clone, Debug)]
pub struct BillingConfig {
    pub provider: BillingProvider,

    /// API secret key for the billing provider (required for Stripe)
    pub api_key: Option<String>,

    /// Base URL of the provider API
    pub api_base: String,

    /// ISO currency code credits are issued in
    pub currency: String,
}

impl BillingConfig {
    /// Create a new billing configuration from environment variables
    pub fn from_env() -> Result<Self, BillingError> {
        let provider = match std::env::var("BILLING_PROVIDER") {
            Ok(v) => v.parse()?,
            Err(_) => BillingProvider::Mock,
        };
        let api_key = std::env::var("BILLING_API_KEY")
            .or_else(|_| std::env::var("STRIPE_SECRET_KEY"))
            .ok();
        if provider == BillingProvider::Stripe && api_key.is_none() {
            return Err(BillingError::Config(
                "BILLING_API_KEY or STRIPE_SECRET_KEY not set".into(),
            ));
        }

        Ok(Self {
            provider,
            api_key,
            api_base: std::env::var("BILLING_API_BASE")
                .unwrap_or_else(|_| "https://api.stripe.com".into()),
            currency: std::env::var("BILLING_CURRENCY").unwrap_or_else(|_| "usd".into()),
        })
    }

    /// Create a test configuration (for development/testing)
    pub fn test() -> Self {
        Self {
            provider: BillingProvider::Mock,
            api_key: None,
            api_base: "http://127.0.0.1:12111".into(),
            currency: "usd".into(),
        }
    }
}

/// Provider acknowledgement of an issued credit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreditReceipt {
    pub credit_id: String,
}

/// Billing service trait for dependency injection
#[async_trait]
pub trait BillingService: Send + Sync {
    /// Credit `amount_cents` to the customer's balance, applied against future invoices.
    async fn issue_credit(
        &self,
        customer_id: &str,
        amount_cents: i64,
        memo: &str,
    ) -> Result<CreditReceipt, BillingError>;
}

/// Create a billing service from configuration
pub fn create_service(config: &BillingConfig) -> Result<Box<dyn BillingService>, BillingError> {
    match config.provider {
        BillingProvider::Mock => Ok(Box::new(MockBillingService::new())),
        BillingProvider::Stripe => Ok(Box::new(StripeBillingService::new(config)?)),
    }
}

/// A credit recorded by [`MockBillingService`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedCredit {
    pub customer_id: String,
    pub amount_cents: i64,
    pub memo: String,
}

/// Mock billing service for development and testing
#[derive(Default)]
pub struct MockBillingService {
    credits: Mutex<Vec<IssuedCredit>>,
    fail: bool,
}

impl MockBillingService {
    /// Create a mock that accepts every credit
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a mock whose provider is down
    pub fn failing() -> Self {
        Self {
            credits: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    /// Credits accepted so far, in order
    pub fn credits(&self) -> Vec<IssuedCredit> {
        self.credits
            .lock()
            .map(|credits| credits.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl BillingService for MockBillingService {
    async fn issue_credit(
        &self,
        customer_id: &str,
        amount_cents: i64,
        memo: &str,
    ) -> Result<CreditReceipt, BillingError> {
        if amount_cents <= 0 {
            return Err(BillingError::InvalidAmount(amount_cents));
        }
        if self.fail {
            return Err(BillingError::Provider("mock provider unavailable".into()));
        }

        let mut credits = self
            .credits
            .lock()
            .map_err(|_| BillingError::Provider("mock ledger poisoned".into()))?;
        credits.push(IssuedCredit {
            customer_id: customer_id.to_string(),
            amount_cents,
            memo: memo.to_string(),
        });

        tracing::info!(customer_id, amount_cents, memo, "Mock credit issued");

        Ok(CreditReceipt {
            credit_id: format!("cbtxn_mock_{}", credits.len()),
        })
    }
}
