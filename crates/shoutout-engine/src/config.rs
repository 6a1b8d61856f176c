//! Immutable tuning for rewards and the verification schedule.

use chrono::{Duration, FixedOffset, Offset, Utc};
use thiserror::Error;

/// Why a [`RewardConfig`] was rejected
#[derive(Debug, Error, PartialEq)]
pub enum RewardConfigError {
    #[error("keyword must not be empty")]
    EmptyKeyword,

    #[error("day caps must be positive (per post {per_post}, monthly {monthly})")]
    InvalidCaps { per_post: i32, monthly: i32 },

    #[error("similarity threshold {0} outside [0, 1]")]
    ThresholdOutOfRange(f64),

    #[error("at least one scan is required")]
    NoScans,

    #[error("rescan delay must not be negative")]
    NegativeRescanDelay,
}

/// Reward thresholds, caps and scan cadence.
///
/// Built once at startup and shared behind an `Arc`; nothing in the engine mutates it.
#[derive(Clone, Debug)]
pub struct RewardConfig {
    /// Likes needed for the engagement bonus day
    pub likes_threshold: i64,
    /// Comments needed for the discussion bonus day
    pub comments_threshold: i64,
    pub max_days_per_post: i32,
    pub monthly_cap_days: i32,
    pub credit_per_day_cents: i64,
    /// Captions scoring strictly above this are near-duplicates
    pub similarity_threshold: f64,
    pub duplicate_lookback: Duration,
    pub rescan_delay: Duration,
    /// Initial scan included
    pub total_scans: i32,
    /// Referral token posts must tag (without the `@`/`#` marker)
    pub keyword: String,
    /// Offset whose calendar month bounds the monthly cap
    pub month_offset: FixedOffset,
}

impl Default for RewardConfig {
    fn default() -> Self {
        Self {
            likes_threshold: 10,
            comments_threshold: 5,
            max_days_per_post: 3,
            monthly_cap_days: 14,
            credit_per_day_cents: 100,
            similarity_threshold: 0.95,
            duplicate_lookback: Duration::days(7),
            rescan_delay: Duration::hours(24),
            total_scans: 3,
            keyword: "shoutout".to_string(),
            month_offset: Utc.fix(),
        }
    }
}

impl RewardConfig {
    pub fn with_keyword(mut self, keyword: impl Into<String>) -> Self {
        self.keyword = keyword.into();
        self
    }

    pub fn with_rescan_delay(mut self, delay: Duration) -> Self {
        self.rescan_delay = delay;
        self
    }

    pub fn with_month_offset(mut self, offset: FixedOffset) -> Self {
        self.month_offset = offset;
        self
    }

    /// Reject combinations the engine cannot run with.
    pub fn validate(&self) -> Result<(), RewardConfigError> {
        if self.keyword.trim().is_empty() {
            return Err(RewardConfigError::EmptyKeyword);
        }
        if self.max_days_per_post < 1 || self.monthly_cap_days < 0 {
            return Err(RewardConfigError::InvalidCaps {
                per_post: self.max_days_per_post,
                monthly: self.monthly_cap_days,
            });
        }
        if !(0.0..=1.0).contains(&self.similarity_threshold) {
            return Err(RewardConfigError::ThresholdOutOfRange(
                self.similarity_threshold,
            ));
        }
        if self.total_scans < 1 {
            return Err(RewardConfigError::NoScans);
        }
        if self.rescan_delay < Duration::zero() {
            return Err(RewardConfigError::NegativeRescanDelay);
        }
        Ok(())
    }
}

/// Durable-execution knobs shared by the scheduler and the inline first step.
#[derive(Clone, Debug)]
pub struct SchedulerConfig {
    pub tick_interval: std::time::Duration,
    /// How long a claimed task is owned before another worker may reclaim it
    pub lease: Duration,
    /// Wake-up delay after a step failed on storage
    pub retry_delay: Duration,
    pub batch_size: i64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval: std::time::Duration::from_secs(5),
            lease: Duration::minutes(5),
            retry_delay: Duration::minutes(1),
            batch_size: 32,
        }
    }
}
