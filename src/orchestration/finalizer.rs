//! Once-per-job terminal callback. The finalizer runs when the job first
//! reaches a terminal status and the `finalizer_executed` flag is still
//! unset; the flag is then persisted together with the terminal save.
//! Finalizer errors are logged and never change the terminal status.

use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info};

use crate::constants::events;
use crate::events::EventPublisher;
use crate::models::JobState;
use crate::registry::FinalizerRegistry;

/// Terminal callback contract. Receives the final job state read-only.
#[async_trait]
pub trait Finalizable: Send + Sync {
    async fn on_finish(
        &self,
        job: &JobState,
    ) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

/// Runs a job's finalizer at most once across all orchestrator invocations.
#[derive(Clone)]
pub struct FinalizerRunner {
    registry: Arc<FinalizerRegistry>,
    events: EventPublisher,
}

impl FinalizerRunner {
    pub fn new(registry: Arc<FinalizerRegistry>, events: EventPublisher) -> Self {
        Self { registry, events }
    }

    /// Invoke the job's finalizer if it has not run yet. Returns whether
    /// this call latched the guard. Jobs without a finalizer name latch the
    /// guard too so resumed terminal jobs skip the lookup.
    pub async fn run_if_needed(&self, job: &mut JobState) -> bool {
        if job.finalizer_executed || !job.status.is_terminal() {
            return false;
        }

        if let Some(name) = job.finalizer_name.clone() {
            match self.registry.resolve(&name) {
                Ok(finalizer) => {
                    let outcome = finalizer.on_finish(&*job).await;
                    match outcome {
                        Ok(()) => {
                            info!(job_id = %job.job_id, finalizer = %name, "Finalizer completed");
                        }
                        Err(err) => {
                            error!(
                                job_id = %job.job_id,
                                finalizer = %name,
                                error = %err,
                                "Finalizer failed; terminal status unchanged"
                            );
                        }
                    }
                }
                Err(err) => {
                    error!(
                        job_id = %job.job_id,
                        finalizer = %name,
                        error = %err,
                        "Finalizer could not be resolved"
                    );
                }
            }
        }

        job.finalizer_executed = true;
        self.events.publish(
            events::JOB_FINALIZED,
            json!({"job_id": job.job_id, "status": job.status.to_string()}),
        );
        true
    }
}
