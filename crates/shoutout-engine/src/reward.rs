//! Reward arithmetic: per-post award and the monthly cap.

use chrono::{DateTime, Datelike, FixedOffset, Timelike, Utc};

use crate::config::RewardConfig;

/// Days still owed for a post given its engagement and what it already received.
///
/// One base day for any verified post, plus one for reaching the likes threshold
/// and one for reaching the comments threshold, capped per post. The result is the
/// delta against `already_awarded`, never negative.
pub fn calculate_days_to_award(
    config: &RewardConfig,
    likes: i64,
    comments: i64,
    already_awarded: i32,
) -> i32 {
    let mut total = 1;
    if likes >= config.likes_threshold {
        total += 1;
    }
    if comments >= config.comments_threshold {
        total += 1;
    }
    let total = total.min(config.max_days_per_post);
    (total - already_awarded).max(0)
}

/// Clamp an award to what is left of the organization's monthly allowance.
pub fn apply_monthly_cap(config: &RewardConfig, additional_days: i32, monthly_used: i64) -> i32 {
    let remaining = (i64::from(config.monthly_cap_days) - monthly_used).max(0);
    i64::from(additional_days.max(0))
        .min(remaining)
        .try_into()
        .unwrap_or(0)
}

/// Midnight on the first day of `now`'s calendar month in `offset`, as UTC.
pub fn start_of_month(now: DateTime<Utc>, offset: FixedOffset) -> DateTime<Utc> {
    let local = now.with_timezone(&offset);
    local
        .with_day(1)
        .and_then(|d| d.with_hour(0))
        .and_then(|d| d.with_minute(0))
        .and_then(|d| d.with_second(0))
        .and_then(|d| d.with_nanosecond(0))
        .map(|d| d.with_timezone(&Utc))
        .unwrap_or(now)
}
