//! Server configuration loaded from the environment.
//!
//! ```bash
//! # Rewards
//! SHOUTOUT_KEYWORD=shoutout              # tagged as @shoutout / #shoutout
//! SHOUTOUT_RESCAN_DELAY_SECS=86400
//! SHOUTOUT_TZ_OFFSET=+00:00              # month boundary for the monthly cap
//!
//! # Content verification service
//! SHOUTOUT_VERIFIER_URL=https://verify.internal
//! SHOUTOUT_VERIFIER_API_KEY=...
//! SHOUTOUT_VERIFIER_TIMEOUT_SECS=30
//!
//! # Scheduler
//! SHOUTOUT_TICK_INTERVAL_SECS=5
//! SHOUTOUT_LEASE_SECS=300
//! SHOUTOUT_BATCH_SIZE=32
//!
//! # Billing (see shoutout-billing)
//! BILLING_PROVIDER=stripe
//! BILLING_API_KEY=sk_...
//! ```

use chrono::{Duration, FixedOffset};
use shoutout_billing::{BillingConfig, BillingError};
use shoutout_engine::{RewardConfig, RewardConfigError, SchedulerConfig};
use std::env;
use std::str::FromStr;
use thiserror::Error;

/// Where the content verification service lives
#[derive(Debug, Clone)]
pub struct VerifierConfig {
    pub endpoint: String,
    pub api_key: Option<String>,
    pub timeout: std::time::Duration,
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub reward: RewardConfig,
    pub scheduler: SchedulerConfig,
    /// Required by commands that scan posts
    pub verifier: Option<VerifierConfig>,
    pub billing: BillingConfig,
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {name}: {value}")]
    InvalidValue { name: &'static str, value: String },

    #[error("Invalid reward configuration: {0}")]
    InvalidReward(#[from] RewardConfigError),

    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(&'static str),

    #[error(transparent)]
    Billing(#[from] BillingError),
}

fn parsed<T: FromStr>(name: &'static str) -> Result<Option<T>, ConfigError> {
    match env::var(name) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue { name, value }),
        Err(_) => Ok(None),
    }
}

impl ServerConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut reward = RewardConfig::default();
        if let Ok(keyword) = env::var("SHOUTOUT_KEYWORD") {
            reward = reward.with_keyword(keyword.trim().trim_start_matches(['@', '#']));
        }
        if let Some(secs) = parsed::<i64>("SHOUTOUT_RESCAN_DELAY_SECS")? {
            reward = reward.with_rescan_delay(Duration::seconds(secs));
        }
        if let Some(offset) = parsed::<FixedOffset>("SHOUTOUT_TZ_OFFSET")? {
            reward = reward.with_month_offset(offset);
        }
        reward.validate()?;

        let mut scheduler = SchedulerConfig::default();
        if let Some(secs) = parsed::<u64>("SHOUTOUT_TICK_INTERVAL_SECS")? {
            scheduler.tick_interval = std::time::Duration::from_secs(secs.max(1));
        }
        if let Some(secs) = parsed::<i64>("SHOUTOUT_LEASE_SECS")? {
            scheduler.lease = Duration::seconds(secs);
        }
        if let Some(batch) = parsed::<i64>("SHOUTOUT_BATCH_SIZE")? {
            if batch < 1 {
                return Err(ConfigError::InvalidValue {
                    name: "SHOUTOUT_BATCH_SIZE",
                    value: batch.to_string(),
                });
            }
            scheduler.batch_size = batch;
        }

        let verifier = match env::var("SHOUTOUT_VERIFIER_URL") {
            Ok(endpoint) => Some(VerifierConfig {
                endpoint,
                api_key: env::var("SHOUTOUT_VERIFIER_API_KEY").ok(),
                timeout: std::time::Duration::from_secs(
                    parsed::<u64>("SHOUTOUT_VERIFIER_TIMEOUT_SECS")?.unwrap_or(30),
                ),
            }),
            Err(_) => None,
        };

        Ok(Self {
            reward,
            scheduler,
            verifier,
            billing: BillingConfig::from_env()?,
        })
    }

    /// Verifier settings, or an error naming the missing variable
    pub fn require_verifier(&self) -> Result<&VerifierConfig, ConfigError> {
        self.verifier
            .as_ref()
            .ok_or(ConfigError::MissingEnvVar("SHOUTOUT_VERIFIER_URL"))
    }
}
