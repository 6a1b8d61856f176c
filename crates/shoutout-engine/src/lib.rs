//! shoutout-engine - Social-referral reward engine
//!
//! Verifies social posts that tag the product, awards time-limited premium access
//! and re-checks engagement over a multi-day schedule that survives restarts.
//!
//! - [`reward`]: days owed per post and the monthly cap
//! - [`entitlement`]: paid vs earned premium resolution
//! - [`submission`]: lifecycle rules and URL normalization
//! - [`crediting`]: billing credit vs earned-premium extension
//! - [`slots`]: slot reclamation on downgrade
//! - [`workflow`] / [`scheduler`]: the durable scan workflow and its driver
//! - [`service`]: operations exposed to the API layer

pub mod config;
pub mod crediting;
pub mod entitlement;
mod error;
pub mod locks;
pub mod metrics;
pub mod reward;
pub mod scheduler;
pub mod service;
pub mod similarity;
pub mod slots;
pub mod submission;
pub mod verifier;
pub mod workflow;

#[cfg(test)]
mod tests;

pub use config::{RewardConfig, RewardConfigError, SchedulerConfig};
pub use crediting::{CreditOutcome, CreditPlan, CreditingDispatcher};
pub use entitlement::{Entitlement, PremiumSource};
pub use error::EngineError;
pub use locks::OrgLocks;
pub use scheduler::{Scheduler, TickSummary};
pub use service::ReferralService;
pub use similarity::{CaptionScorer, TokenSetScorer};
pub use slots::{ReclaimOutcome, ReclaimStatus};
pub use verifier::{ContentVerifier, HttpContentVerifier, VerifyError};
pub use workflow::{StopReason, TaskOutcome, VerificationWorkflow, WorkflowReport, WorkflowStatus};

#[cfg(any(test, feature = "test-support"))]
pub use verifier::MockContentVerifier;
