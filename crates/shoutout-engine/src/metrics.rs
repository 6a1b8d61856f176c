//! Engine counters, exported by whichever recorder the host installs.

use metrics::{counter, describe_counter};

/// Register descriptions for the engine's counters.
pub fn describe() {
    describe_counter!(
        "shoutout_scans_total",
        "Post scans executed, by scan number and outcome"
    );
    describe_counter!(
        "shoutout_days_awarded_total",
        "Premium days awarded after the monthly cap"
    );
    describe_counter!(
        "shoutout_credits_total",
        "Crediting dispatcher decisions, by outcome"
    );
}

pub(crate) fn record_scan(scan: i32, outcome: &'static str) {
    counter!("shoutout_scans_total", "scan" => scan.to_string(), "outcome" => outcome)
        .increment(1);
}

pub(crate) fn record_days_awarded(days: i32) {
    if let Ok(days) = u64::try_from(days) {
        counter!("shoutout_days_awarded_total").increment(days);
    }
}

pub(crate) fn record_credit(outcome: &'static str) {
    counter!("shoutout_credits_total", "outcome" => outcome).increment(1);
}
