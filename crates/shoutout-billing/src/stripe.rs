//! Stripe billing provider.
//!
//! Credits are customer balance transactions with a negative amount, which
//! Stripe applies to the customer's next invoices.

use crate::{BillingConfig, BillingError, BillingService, CreditReceipt};
use async_trait::async_trait;
use serde::Deserialize;

/// Stripe billing provider.
pub struct StripeBillingService {
    client: reqwest::Client,
    api_key: String,
    api_base: String,
    currency: String,
}

#[derive(Deserialize)]
struct BalanceTransaction {
    id: String,
}

impl StripeBillingService {
    pub fn new(config: &BillingConfig) -> Result<Self, BillingError> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| BillingError::Config("Stripe requires an API key".into()))?;
        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            currency: config.currency.clone(),
        })
    }
}

#[async_trait]
impl BillingService for StripeBillingService {
    async fn issue_credit(
        &self,
        customer_id: &str,
        amount_cents: i64,
        memo: &str,
    ) -> Result<CreditReceipt, BillingError> {
        if amount_cents <= 0 {
            return Err(BillingError::InvalidAmount(amount_cents));
        }

        let url = format!(
            "{}/v1/customers/{}/balance_transactions",
            self.api_base, customer_id
        );
        let amount = (-amount_cents).to_string();
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .form(&[
                ("amount", amount.as_str()),
                ("currency", self.currency.as_str()),
                ("description", memo),
            ])
            .send()
            .await
            .map_err(|e| BillingError::Provider(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(BillingError::CustomerNotFound(customer_id.to_string()));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BillingError::Provider(format!("{}: {}", status, body)));
        }

        let txn: BalanceTransaction = response
            .json()
            .await
            .map_err(|e| BillingError::Provider(e.to_string()))?;

        tracing::info!(customer_id, amount_cents, credit_id = %txn.id, "Stripe credit issued");

        Ok(CreditReceipt { credit_id: txn.id })
    }
}
