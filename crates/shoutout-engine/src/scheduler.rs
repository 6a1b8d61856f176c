//! Polling scheduler that resumes due workflow tasks.

use chrono::{DateTime, Utc};
use futures::future::join_all;
use shoutout_storage::StoreError;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

use crate::workflow::{TaskOutcome, VerificationWorkflow};

/// Counts from one scheduler pass
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TickSummary {
    pub claimed: usize,
    pub scheduled: usize,
    pub finished: usize,
    pub failed: usize,
}

pub struct Scheduler {
    workflow: Arc<VerificationWorkflow>,
}

impl Scheduler {
    pub fn new(workflow: Arc<VerificationWorkflow>) -> Self {
        Self { workflow }
    }

    /// Claim every task due at `now` (including ones whose lease expired) and run
    /// their next step. Tasks of different submissions run concurrently.
    pub async fn tick(&self, now: DateTime<Utc>) -> Result<TickSummary, StoreError> {
        let scheduling = self.workflow.scheduling();
        let tasks = self
            .workflow
            .store()
            .claim_due_workflow_tasks(now, now + scheduling.lease, scheduling.batch_size)
            .await?;

        let mut summary = TickSummary {
            claimed: tasks.len(),
            ..TickSummary::default()
        };
        let results = join_all(tasks.iter().map(|task| self.workflow.execute(task, now))).await;
        for result in results {
            match result {
                Ok(TaskOutcome::Scheduled { .. }) => summary.scheduled += 1,
                Ok(TaskOutcome::Finished(_)) => summary.finished += 1,
                Err(_) => summary.failed += 1,
            }
        }
        Ok(summary)
    }

    /// Tick on the configured interval until `shutdown` flips to true or its sender drops.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(self.workflow.scheduling().tick_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!("Scheduler started");

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    match self.tick(Utc::now()).await {
                        Ok(summary) if summary.claimed > 0 => debug!(?summary, "Scheduler tick"),
                        Ok(_) => {}
                        Err(e) => error!(error = %e, "Failed to claim workflow tasks"),
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("Scheduler stopped");
    }
}
