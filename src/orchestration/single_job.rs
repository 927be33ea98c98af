//! # Single-Job Orchestrator
//!
//! Advances one job by exactly one logical unit of work per call: one chunk
//! of the current step (with aggregation folded into the chunk that
//! completes the step), one compensation round, or one terminal transition
//! with its finalizer invocation.
//!
//! Failure dispatch while travelling down: a permanent failure terminates
//! the job immediately with no compensation; any other failure marks the
//! failing step `Failed` for audit, flips the direction up, and leaves the
//! step index in place so compensation starts at the point of failure.
//! While travelling up, both permanent and exhausted failures end the job
//! as `Compensation_Failed`.

use serde_json::json;
use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::config::SagaConfig;
use crate::constants::events;
use crate::error::{Result, SagaError, SerializableError, StepError};
use crate::events::EventPublisher;
use crate::models::{ChunkState, JobState, StepCompletionState};
use crate::orchestration::aggregation::ChunkAggregator;
use crate::orchestration::finalizer::FinalizerRunner;
use crate::orchestration::retrier::Retrier;
use crate::orchestration::step_executor::StepExecutor;
use crate::orchestration::StepContext;
use crate::provider::SagaProvider;
use crate::registry::{FinalizerRegistry, StepRegistry};
use crate::state_machine::{
    action_for, Direction, JobStatus, OrchestratorAction, StepStatus,
};
use crate::step::SagaStep;

/// What a unit of work left behind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitOutcome {
    /// The job has more work; schedule another unit.
    Continue,
    /// The job reached a terminal status.
    Terminal(JobStatus),
}

/// Drives one job through its state machine, one unit per call.
#[derive(Clone)]
pub struct JobOrchestrator {
    provider: Arc<dyn SagaProvider>,
    executor: StepExecutor,
    aggregator: ChunkAggregator,
    finalizer: FinalizerRunner,
    events: EventPublisher,
    retrier: Retrier,
    compensate_failed_step: bool,
    page_size: usize,
}

impl JobOrchestrator {
    pub fn new(
        provider: Arc<dyn SagaProvider>,
        steps: Arc<StepRegistry>,
        finalizers: Arc<FinalizerRegistry>,
        events: EventPublisher,
        config: &SagaConfig,
    ) -> Self {
        let aggregator =
            ChunkAggregator::new(Arc::clone(&provider), config.aggregation_page_size);
        Self {
            provider,
            executor: StepExecutor::new(steps),
            aggregator,
            finalizer: FinalizerRunner::new(finalizers, events.clone()),
            events,
            retrier: Retrier::new(config.max_retry_attempts),
            compensate_failed_step: config.compensate_failed_step,
            page_size: config.aggregation_page_size,
        }
    }

    /// Advance the job by one unit of work. The caller owns persistence:
    /// mutated job and step records are flushed at the transaction boundary.
    #[instrument(skip(self, job), fields(job_id = %job.job_id, direction = %job.direction, status = %job.status))]
    pub async fn run_unit(&self, job: &mut JobState) -> Result<UnitOutcome> {
        let action = action_for(job.direction, job.status).ok_or_else(|| {
            SagaError::Validation(format!(
                "No orchestrator action for state key {}_{}",
                job.direction, job.status
            ))
        })?;

        let outcome = match action {
            OrchestratorAction::PromoteAndExecute | OrchestratorAction::ExecuteChunk => {
                self.execute_forward(job).await?
            }
            OrchestratorAction::CompensateChunk => self.compensate_unit(job).await?,
            OrchestratorAction::TerminalCleanup => self.terminal_cleanup(job).await?,
            OrchestratorAction::ResolveUpTerminal => self.resolve_up_terminal(job).await?,
        };
        job.touch();
        Ok(outcome)
    }

    async fn execute_forward(&self, job: &mut JobState) -> Result<UnitOutcome> {
        if job.steps.is_empty() {
            return Err(SagaError::Validation(format!(
                "Job {} has no steps loaded",
                job.job_id
            )));
        }
        let idx = match usize::try_from(job.current_step_index) {
            Ok(idx) if idx < job.steps.len() => idx,
            Ok(_) => {
                // Index already ran off the end: every step completed but
                // the terminal status was never written. Repair and finish.
                job.status = JobStatus::Completed;
                self.finish(job).await;
                return Ok(UnitOutcome::Terminal(job.status));
            }
            Err(_) => {
                return Err(SagaError::Validation(format!(
                    "Job {} is travelling Down with step index {}",
                    job.job_id, job.current_step_index
                )))
            }
        };

        if matches!(job.status, JobStatus::New | JobStatus::Pending) {
            job.status = JobStatus::InProgress;
            self.events
                .publish(events::JOB_STARTED, json!({"job_id": job.job_id}));
        }
        {
            let step = &mut job.steps[idx];
            if step.status == StepStatus::Pending {
                step.status = StepStatus::InProgress;
                step.touch();
                self.events.publish(
                    events::STEP_STARTED,
                    json!({"job_id": job.job_id, "step_index": idx}),
                );
            }
        }

        let step_impl = match self.executor.resolve(&job.steps[idx].step_executor_name) {
            Ok(step_impl) => step_impl,
            Err(err) => return self.fail_permanently(job, idx, err).await,
        };

        let ctx = StepContext::for_step(job, &job.steps[idx], Arc::clone(&self.provider), self.page_size);
        let result = self
            .retrier
            .execute(|| self.executor.invoke(step_impl.as_ref(), &ctx))
            .await;

        match result {
            Ok(completion) => {
                self.record_forward_progress(job, idx, step_impl.as_ref(), completion)
                    .await
            }
            Err(err) if err.is_permanent() => self.fail_permanently(job, idx, err).await,
            Err(err) => self.pivot_to_compensation(job, idx, err),
        }
    }

    /// Persist the executed chunk, advance the cursor, and complete the
    /// step when its final chunk just ran.
    async fn record_forward_progress(
        &self,
        job: &mut JobState,
        idx: usize,
        step_impl: &dyn SagaStep,
        completion: StepCompletionState,
    ) -> Result<UnitOutcome> {
        let (step_id, chunk_index) = {
            let step = &job.steps[idx];
            (step.step_id, step.current_chunk_index)
        };
        let chunk = ChunkState::completed(
            step_id,
            chunk_index,
            completion.partial_result.clone(),
            completion.previous_values.clone(),
        );
        self.provider.insert_chunks(vec![chunk]).await?;
        self.events.publish(
            events::CHUNK_COMPLETED,
            json!({"job_id": job.job_id, "step_index": idx, "chunk_index": chunk_index}),
        );

        let next_cursor = completion
            .next_chunk
            .as_ref()
            .and_then(|request| request.progress_state.clone())
            .or_else(|| completion.next_progress_state.clone());
        {
            let step = &mut job.steps[idx];
            step.progress_state = next_cursor;
            step.total_chunks = step.total_chunks.max(chunk_index + 1);
            step.touch();
        }

        if !completion.is_step_completed() {
            let step = &mut job.steps[idx];
            step.current_chunk_index += 1;
            step.touch();
            return Ok(UnitOutcome::Continue);
        }

        let ctx = StepContext::for_step(job, &job.steps[idx], Arc::clone(&self.provider), self.page_size);
        match self.aggregator.aggregate(step_impl, &ctx, step_id).await {
            Ok(result) => {
                let step = &mut job.steps[idx];
                step.result = result;
                step.status = StepStatus::Completed;
                step.touch();
            }
            Err(err) if err.is_permanent() => return self.fail_permanently(job, idx, err).await,
            Err(err) => return self.pivot_to_compensation(job, idx, err),
        }
        self.events.publish(
            events::STEP_COMPLETED,
            json!({"job_id": job.job_id, "step_index": idx}),
        );

        job.current_step_index += 1;
        if job.current_step_index as u32 >= job.total_steps {
            job.status = JobStatus::Completed;
            info!(job_id = %job.job_id, "Job completed");
            self.finish(job).await;
            return Ok(UnitOutcome::Terminal(JobStatus::Completed));
        }
        Ok(UnitOutcome::Continue)
    }

    /// The pivot: a reversible failure while travelling down. The failing
    /// step keeps `Failed` for audit and, policy permitting, is the first
    /// step compensated on the way back up.
    fn pivot_to_compensation(
        &self,
        job: &mut JobState,
        idx: usize,
        err: StepError,
    ) -> Result<UnitOutcome> {
        warn!(
            job_id = %job.job_id,
            step_index = idx,
            error = %err,
            "Reversible failure; turning job around"
        );
        {
            let step = &mut job.steps[idx];
            step.status = StepStatus::Failed;
            step.touch();
        }
        job.direction = Direction::Up;
        job.status = JobStatus::AwaitingCompensation;
        job.final_error_details = Some(SerializableError::from_step_error(&err));
        if !self.compensate_failed_step {
            job.current_step_index -= 1;
        }
        self.events.publish(
            events::JOB_COMPENSATION_STARTED,
            json!({"job_id": job.job_id, "failed_step_index": idx}),
        );
        self.events.publish(
            events::STEP_FAILED,
            json!({"job_id": job.job_id, "step_index": idx}),
        );
        Ok(UnitOutcome::Continue)
    }

    /// Permanent failure while travelling down: terminal, no compensation.
    async fn fail_permanently(
        &self,
        job: &mut JobState,
        idx: usize,
        err: StepError,
    ) -> Result<UnitOutcome> {
        warn!(
            job_id = %job.job_id,
            step_index = idx,
            error = %err,
            "Permanent failure; job failed without compensation"
        );
        {
            let step = &mut job.steps[idx];
            step.status = StepStatus::Failed;
            step.touch();
        }
        job.final_error_details = Some(SerializableError::from_step_error(&err));
        job.status = JobStatus::Failed;
        self.events.publish(
            events::STEP_FAILED,
            json!({"job_id": job.job_id, "step_index": idx}),
        );
        self.finish(job).await;
        Ok(UnitOutcome::Terminal(JobStatus::Failed))
    }

    /// One compensation round: the current step's `compensate` runs until
    /// it reports the step fully rolled back, then the index walks down.
    async fn compensate_unit(&self, job: &mut JobState) -> Result<UnitOutcome> {
        if job.current_step_index < 0 {
            return self.complete_compensation(job).await;
        }
        let idx = job.current_step_index as usize;
        if idx >= job.steps.len() {
            return Err(SagaError::Validation(format!(
                "Job {} is travelling Up with step index {} beyond its {} steps",
                job.job_id,
                idx,
                job.steps.len()
            )));
        }

        match job.steps[idx].status {
            // Never executed, or already rolled back on a resumed job:
            // nothing to undo here, keep walking down.
            StepStatus::Pending | StepStatus::Compensated => {
                job.current_step_index -= 1;
                Ok(UnitOutcome::Continue)
            }
            StepStatus::Completed
            | StepStatus::Failed
            | StepStatus::InProgress
            | StepStatus::Compensating => {
                {
                    let step = &mut job.steps[idx];
                    step.status = StepStatus::Compensating;
                    step.touch();
                }
                let step_impl = match self.executor.resolve(&job.steps[idx].step_executor_name) {
                    Ok(step_impl) => step_impl,
                    Err(err) => return self.fail_compensation(job, idx, err).await,
                };
                let ctx = StepContext::for_step(
                    job,
                    &job.steps[idx],
                    Arc::clone(&self.provider),
                    self.page_size,
                );
                let result = self
                    .retrier
                    .execute(|| self.executor.invoke(step_impl.as_ref(), &ctx))
                    .await;

                match result {
                    Ok(completion) => {
                        let next_cursor = completion
                            .next_chunk
                            .as_ref()
                            .and_then(|request| request.progress_state.clone())
                            .or_else(|| completion.next_progress_state.clone());
                        let step = &mut job.steps[idx];
                        step.progress_state = next_cursor;
                        step.touch();
                        if completion.is_step_completed() {
                            step.status = StepStatus::Compensated;
                            self.events.publish(
                                events::STEP_COMPENSATED,
                                json!({"job_id": job.job_id, "step_index": idx}),
                            );
                            job.current_step_index -= 1;
                        }
                        Ok(UnitOutcome::Continue)
                    }
                    // Exhausted retries and permanent failures alike end
                    // the compensation phase here.
                    Err(err) => self.fail_compensation(job, idx, err).await,
                }
            }
        }
    }

    /// Compensation walked below step zero: pick the terminal status.
    async fn complete_compensation(&self, job: &mut JobState) -> Result<UnitOutcome> {
        let broken = job
            .steps
            .iter()
            .any(|step| step.status == StepStatus::Compensating);
        job.status = if broken {
            JobStatus::CompensationFailed
        } else {
            JobStatus::Failed
        };
        info!(job_id = %job.job_id, status = %job.status, "Compensation finished");
        self.finish(job).await;
        Ok(UnitOutcome::Terminal(job.status))
    }

    async fn fail_compensation(
        &self,
        job: &mut JobState,
        idx: usize,
        err: StepError,
    ) -> Result<UnitOutcome> {
        warn!(
            job_id = %job.job_id,
            step_index = idx,
            error = %err,
            "Compensation failed; manual intervention required"
        );
        {
            let step = &mut job.steps[idx];
            step.status = StepStatus::Failed;
            step.touch();
        }
        job.status = JobStatus::CompensationFailed;
        job.final_error_details = Some(SerializableError::from_step_error(&err));
        self.finish(job).await;
        Ok(UnitOutcome::Terminal(JobStatus::CompensationFailed))
    }

    /// A job marked `Failed` while travelling up: decide between `Failed`
    /// and `Compensation_Failed`, then finish.
    async fn resolve_up_terminal(&self, job: &mut JobState) -> Result<UnitOutcome> {
        if job
            .steps
            .iter()
            .any(|step| step.status == StepStatus::Compensating)
        {
            job.status = JobStatus::CompensationFailed;
        }
        self.finish(job).await;
        Ok(UnitOutcome::Terminal(job.status))
    }

    /// Job is already terminal: make sure the finalizer ran, nothing else.
    async fn terminal_cleanup(&self, job: &mut JobState) -> Result<UnitOutcome> {
        self.finish(job).await;
        Ok(UnitOutcome::Terminal(job.status))
    }

    /// Publish the terminal event on the first terminal transition and run
    /// the finalizer behind its at-most-once guard.
    async fn finish(&self, job: &mut JobState) {
        if !job.finalizer_executed {
            let event = match job.status {
                JobStatus::Completed => Some(events::JOB_COMPLETED),
                JobStatus::Failed => Some(events::JOB_FAILED),
                JobStatus::CompensationFailed => Some(events::JOB_COMPENSATION_FAILED),
                _ => None,
            };
            if let Some(event) = event {
                self.events
                    .publish(event, json!({"job_id": job.job_id}));
            }
        }
        self.finalizer.run_if_needed(job).await;
    }
}
