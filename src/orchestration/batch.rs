//! # Limit-Aware Batch Orchestrator
//!
//! Processes a batch of jobs cooperatively inside one transaction. Jobs run
//! FIFO, one unit of work at a time, re-queued to the tail while they have
//! more work. The budget is consulted before every unit; once it says stop,
//! everything still in the queue is handed to the retry engine for a fresh
//! transaction. Buffered job/step writes flush in bulk at the end, one
//! batched write per entity kind.

use serde_json::json;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::budget::Budget;
use crate::config::SagaConfig;
use crate::constants::events;
use crate::engine::Engine;
use crate::error::{PublishingError, Result, SerializableError};
use crate::events::EventPublisher;
use crate::models::{JobState, StepState};
use crate::orchestration::single_job::{JobOrchestrator, UnitOutcome};
use crate::provider::SagaProvider;
use crate::registry::{FinalizerRegistry, StepRegistry};
use crate::state_machine::JobStatus;

/// A job the batch could not process at all.
#[derive(Debug, Clone)]
pub struct InvalidJob {
    pub job_id: Option<Uuid>,
    pub reason: String,
}

/// Accounting for one batch invocation. The union of `terminal`,
/// `progressed`, and `requeued` (plus `invalid`) covers the input batch.
#[derive(Debug, Default)]
pub struct BatchReport {
    /// Jobs that reached a terminal status this transaction.
    pub terminal: Vec<Uuid>,
    /// Jobs handed to the main engine for step-to-step progression after
    /// hitting the per-job fairness cap.
    pub progressed: Vec<Uuid>,
    /// Jobs handed to the retry engine because the budget ran out.
    pub requeued: Vec<Uuid>,
    /// Jobs skipped up front: missing id or unknown to the provider.
    pub invalid: Vec<InvalidJob>,
    /// Partial failure from the retry engine, surfaced for the caller.
    pub requeue_failure: Option<PublishingError>,
}

/// Drives many jobs cooperatively under one transaction budget.
pub struct BatchOrchestrator {
    provider: Arc<dyn SagaProvider>,
    main_engine: Arc<dyn Engine>,
    retry_engine: Arc<dyn Engine>,
    events: EventPublisher,
    orchestrator: JobOrchestrator,
    config: SagaConfig,
}

impl BatchOrchestrator {
    pub fn new(
        provider: Arc<dyn SagaProvider>,
        steps: Arc<StepRegistry>,
        finalizers: Arc<FinalizerRegistry>,
        main_engine: Arc<dyn Engine>,
        retry_engine: Arc<dyn Engine>,
        events: EventPublisher,
        config: SagaConfig,
    ) -> Self {
        let orchestrator = JobOrchestrator::new(
            Arc::clone(&provider),
            steps,
            finalizers,
            events.clone(),
            &config,
        );
        Self {
            provider,
            main_engine,
            retry_engine,
            events,
            orchestrator,
            config,
        }
    }

    /// Process one batch. Only `job_id` needs to be populated on the
    /// inputs; full state is bulk-loaded through the provider.
    #[instrument(skip(self, jobs), fields(batch_size = jobs.len()))]
    pub async fn process(&self, jobs: Vec<JobState>) -> Result<BatchReport> {
        let mut report = BatchReport::default();
        let budget = Budget::with_limits(self.config.safety_factor, self.config.limits.clone());
        self.provider.attach_usage(budget.usage());
        self.provider.invalidate_cache();
        self.events.publish(
            events::BATCH_STARTED,
            json!({"batch_size": jobs.len(), "safety_factor": budget.safety_factor()}),
        );

        // A job with no identity cannot be loaded or re-enqueued; record it
        // and keep the batch alive.
        let mut ids: Vec<Uuid> = Vec::with_capacity(jobs.len());
        let mut seen: HashSet<Uuid> = HashSet::new();
        for job in &jobs {
            if job.job_id.is_nil() {
                error!("Skipping job with no id");
                report.invalid.push(InvalidJob {
                    job_id: None,
                    reason: "Job has no id".to_string(),
                });
            } else if seen.insert(job.job_id) {
                ids.push(job.job_id);
            }
        }

        let loaded = self.provider.get_job_states(&ids).await?;
        let loaded_ids: HashSet<Uuid> = loaded.iter().map(|job| job.job_id).collect();
        for id in &ids {
            if !loaded_ids.contains(id) {
                warn!(job_id = %id, "Job not found in store");
                report.invalid.push(InvalidJob {
                    job_id: Some(*id),
                    reason: "Job not found".to_string(),
                });
            }
        }

        let mut queue: VecDeque<JobState> = loaded.into_iter().collect();
        let mut units_run: HashMap<Uuid, u32> = HashMap::new();
        let mut terminal: Vec<JobState> = Vec::new();
        let mut progressed: Vec<JobState> = Vec::new();

        while let Some(mut job) = queue.pop_front() {
            if !budget.can_continue() {
                info!(
                    remaining = queue.len() + 1,
                    "Budget exhausted; yielding the rest of the batch"
                );
                self.events.publish(
                    events::BATCH_YIELDED,
                    json!({"remaining": queue.len() + 1}),
                );
                queue.push_front(job);
                break;
            }

            match self.orchestrator.run_unit(&mut job).await {
                Ok(UnitOutcome::Terminal(status)) => {
                    info!(job_id = %job.job_id, status = %status, "Job reached terminal status");
                    terminal.push(job);
                }
                Ok(UnitOutcome::Continue) => {
                    let units = units_run.entry(job.job_id).or_insert(0);
                    *units += 1;
                    match self.config.max_units_per_job {
                        Some(cap) if *units >= cap => progressed.push(job),
                        _ => queue.push_back(job),
                    }
                }
                Err(err) => {
                    // A provider or validation failure on one job must not
                    // poison the rest of the batch.
                    error!(job_id = %job.job_id, error = %err, "Unit of work failed; marking job failed");
                    job.final_error_details = Some(SerializableError::from_saga_error(&err));
                    job.status = JobStatus::Failed;
                    job.touch();
                    terminal.push(job);
                }
            }
        }

        let requeue: Vec<JobState> = queue.into_iter().collect();

        // Flush buffered writes in bulk: one batched write per entity kind.
        let all_jobs: Vec<&JobState> = terminal
            .iter()
            .chain(progressed.iter())
            .chain(requeue.iter())
            .collect();
        let all_steps: Vec<StepState> = all_jobs
            .iter()
            .flat_map(|job| job.steps.iter().cloned())
            .collect();
        let job_rows: Vec<JobState> = all_jobs.into_iter().cloned().collect();
        self.provider.save_steps(&all_steps).await?;
        self.provider.save_jobs(&job_rows).await?;

        report.terminal = terminal.iter().map(|job| job.job_id).collect();
        report.progressed = progressed.iter().map(|job| job.job_id).collect();
        report.requeued = requeue.iter().map(|job| job.job_id).collect();

        // Step-to-step progression goes through the main engine. A failure
        // here means the orchestrator cannot guarantee the job ever runs
        // again, so the affected jobs are marked failed.
        if !progressed.is_empty() {
            if let Err(publish_err) = self.main_engine.start(progressed.clone()).await {
                self.fail_unpublished(&mut report, progressed, &publish_err).await?;
            }
        }

        // Budget overflow goes through the retry engine. Partial failures
        // are surfaced to the caller; successfully published jobs stay
        // published.
        if !requeue.is_empty() {
            if let Err(publish_err) = self.retry_engine.start(requeue).await {
                warn!(error = %publish_err, "Retry engine reported a publishing failure");
                report.requeue_failure = Some(publish_err);
            }
        }

        self.events.publish(
            events::BATCH_COMPLETED,
            json!({
                "terminal": report.terminal.len(),
                "progressed": report.progressed.len(),
                "requeued": report.requeued.len(),
                "invalid": report.invalid.len(),
            }),
        );
        Ok(report)
    }

    /// Main-engine publishing failed: the affected jobs are marked failed
    /// and saved so they never silently disappear.
    async fn fail_unpublished(
        &self,
        report: &mut BatchReport,
        progressed: Vec<JobState>,
        publish_err: &PublishingError,
    ) -> Result<()> {
        error!(error = %publish_err, "Main engine could not schedule progression");
        let failed_ids: HashSet<Uuid> = publish_err.failed_jobs.iter().copied().collect();
        let mut failed_jobs: Vec<JobState> = Vec::new();
        for mut job in progressed {
            if failed_ids.contains(&job.job_id) {
                job.status = JobStatus::Failed;
                job.final_error_details = Some(SerializableError::new(
                    "PublishingError",
                    publish_err.to_string(),
                ));
                job.touch();
                report.progressed.retain(|id| *id != job.job_id);
                report.terminal.push(job.job_id);
                failed_jobs.push(job);
            }
        }
        self.provider.save_jobs(&failed_jobs).await?;
        Ok(())
    }
}
