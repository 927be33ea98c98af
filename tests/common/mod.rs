//! Shared harness for integration tests: scripted step implementations, a
//! recording engine, and a factory wiring the in-memory provider to the
//! orchestrators.

#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use saga_core::{
    AggregationCapability, BatchAggregator, BatchOrchestrator, ChunkState, Engine, EventPublisher,
    Finalizable, FinalizerRegistry, InMemorySagaProvider, JobOrchestrator, JobRequest, JobState,
    PublishingError, SagaConfig, SagaProvider, SagaStep, SimpleAggregator, StepCompletionState,
    StepContext, StepError, StepExecutionResult, StepRegistry,
};

/// Chronological record of step invocations, e.g. `execute:step-a`.
#[derive(Clone, Default)]
pub struct CallLog {
    entries: Arc<Mutex<Vec<String>>>,
}

impl CallLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, kind: &str, name: &str) {
        self.entries.lock().unwrap().push(format!("{kind}:{name}"));
    }

    pub fn entries(&self) -> Vec<String> {
        self.entries.lock().unwrap().clone()
    }

    /// Entries with consecutive duplicates collapsed, so retry attempts
    /// within one unit don't obscure ordering assertions.
    pub fn collapsed(&self) -> Vec<String> {
        let mut collapsed: Vec<String> = Vec::new();
        for entry in self.entries() {
            if collapsed.last() != Some(&entry) {
                collapsed.push(entry);
            }
        }
        collapsed
    }
}

/// Completes in a single chunk and compensates cleanly.
pub struct ImmediateStep {
    pub name: String,
    pub log: CallLog,
}

#[async_trait]
impl SagaStep for ImmediateStep {
    async fn execute(&self, _ctx: &StepContext) -> StepExecutionResult {
        self.log.record("execute", &self.name);
        Ok(StepCompletionState::finished_with(json!(format!("done-{}", self.name))))
    }

    async fn compensate(&self, _ctx: &StepContext) -> StepExecutionResult {
        self.log.record("compensate", &self.name);
        Ok(StepCompletionState::finished())
    }
}

/// Always fails reversibly on execute.
pub struct FlakyStep {
    pub name: String,
    pub log: CallLog,
}

#[async_trait]
impl SagaStep for FlakyStep {
    async fn execute(&self, _ctx: &StepContext) -> StepExecutionResult {
        self.log.record("execute", &self.name);
        Err(StepError::retryable("transient outage"))
    }

    async fn compensate(&self, _ctx: &StepContext) -> StepExecutionResult {
        self.log.record("compensate", &self.name);
        Ok(StepCompletionState::finished())
    }
}

/// Always fails permanently on execute.
pub struct PermanentStep {
    pub name: String,
    pub log: CallLog,
}

#[async_trait]
impl SagaStep for PermanentStep {
    async fn execute(&self, _ctx: &StepContext) -> StepExecutionResult {
        self.log.record("execute", &self.name);
        Err(StepError::permanent("unrecoverable"))
    }

    async fn compensate(&self, _ctx: &StepContext) -> StepExecutionResult {
        self.log.record("compensate", &self.name);
        Ok(StepCompletionState::finished())
    }
}

/// Executes cleanly but fails permanently when asked to roll back.
pub struct CompensateFailsStep {
    pub name: String,
    pub log: CallLog,
}

#[async_trait]
impl SagaStep for CompensateFailsStep {
    async fn execute(&self, _ctx: &StepContext) -> StepExecutionResult {
        self.log.record("execute", &self.name);
        Ok(StepCompletionState::finished_with(json!("ok"))
            .with_previous_values(json!({"owner": "before"})))
    }

    async fn compensate(&self, _ctx: &StepContext) -> StepExecutionResult {
        self.log.record("compensate", &self.name);
        Err(StepError::permanent("rollback impossible"))
    }
}

/// Produces `total_chunks` chunks with partial results `R-0..R-n`, driving
/// its own progress cursor, and joins them with a streaming aggregator.
pub struct ChunkedStep {
    pub name: String,
    pub total_chunks: u32,
    pub log: CallLog,
}

impl ChunkedStep {
    fn chunk_number(ctx: &StepContext) -> u32 {
        ctx.progress_state()
            .and_then(|cursor| cursor.strip_prefix("after-"))
            .and_then(|n| n.parse::<u32>().ok())
            .map(|n| n + 1)
            .unwrap_or(0)
    }
}

#[async_trait]
impl SagaStep for ChunkedStep {
    async fn execute(&self, ctx: &StepContext) -> StepExecutionResult {
        self.log.record("execute", &self.name);
        let chunk = Self::chunk_number(ctx);
        let partial = json!(format!("R-{chunk}"));
        if chunk + 1 < self.total_chunks {
            Ok(StepCompletionState::more_chunks(Some(partial)).with_progress(format!("after-{chunk}")))
        } else {
            Ok(StepCompletionState::finished_with(partial))
        }
    }

    async fn compensate(&self, _ctx: &StepContext) -> StepExecutionResult {
        self.log.record("compensate", &self.name);
        Ok(StepCompletionState::finished())
    }

    fn aggregation(&self) -> AggregationCapability<'_> {
        AggregationCapability::Batched(self)
    }
}

#[async_trait]
impl BatchAggregator for ChunkedStep {
    async fn start_aggregation(&self, _ctx: &StepContext) -> Result<Value, StepError> {
        Ok(json!([]))
    }

    async fn execute_aggregation(
        &self,
        _ctx: &StepContext,
        state: Value,
        chunks: &[ChunkState],
    ) -> Result<Value, StepError> {
        let mut parts = match state {
            Value::Array(parts) => parts,
            other => return Err(StepError::permanent(format!("bad accumulator: {other}"))),
        };
        for chunk in chunks {
            if let Some(result) = &chunk.result {
                parts.push(result.clone());
            }
        }
        Ok(Value::Array(parts))
    }

    async fn finish_aggregation(&self, _ctx: &StepContext, state: Value) -> Result<Value, StepError> {
        let joined = match &state {
            Value::Array(parts) => parts
                .iter()
                .filter_map(|part| part.as_str())
                .collect::<Vec<_>>()
                .join(","),
            other => return Err(StepError::permanent(format!("bad accumulator: {other}"))),
        };
        Ok(json!(joined))
    }
}

/// Same chunk script as [`ChunkedStep`] but aggregated in one shot.
pub struct SimpleJoinStep {
    pub name: String,
    pub total_chunks: u32,
    pub log: CallLog,
}

#[async_trait]
impl SagaStep for SimpleJoinStep {
    async fn execute(&self, ctx: &StepContext) -> StepExecutionResult {
        self.log.record("execute", &self.name);
        let chunk = ChunkedStep::chunk_number(ctx);
        let partial = json!(format!("R-{chunk}"));
        if chunk + 1 < self.total_chunks {
            Ok(StepCompletionState::more_chunks(Some(partial)).with_progress(format!("after-{chunk}")))
        } else {
            Ok(StepCompletionState::finished_with(partial))
        }
    }

    async fn compensate(&self, _ctx: &StepContext) -> StepExecutionResult {
        Ok(StepCompletionState::finished())
    }

    fn aggregation(&self) -> AggregationCapability<'_> {
        AggregationCapability::Simple(self)
    }
}

#[async_trait]
impl SimpleAggregator for SimpleJoinStep {
    async fn aggregate(
        &self,
        _ctx: &StepContext,
        chunks: &[ChunkState],
    ) -> Result<Value, StepError> {
        let joined = chunks
            .iter()
            .filter_map(|chunk| chunk.result.as_ref())
            .filter_map(|result| result.as_str())
            .collect::<Vec<_>>()
            .join(",");
        Ok(json!(joined))
    }
}

/// Counts invocations so finalizer at-most-once can be asserted.
pub struct CountingFinalizer {
    pub invocations: Arc<AtomicU32>,
}

#[async_trait]
impl Finalizable for CountingFinalizer {
    async fn on_finish(
        &self,
        _job: &JobState,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Engine that records every scheduled batch; can be told to refuse a set
/// of job ids to exercise publishing-failure paths.
#[derive(Clone, Default)]
pub struct RecordingEngine {
    batches: Arc<Mutex<Vec<Vec<Uuid>>>>,
    refuse: Arc<Mutex<HashSet<Uuid>>>,
}

impl RecordingEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn refuse(&self, job_id: Uuid) {
        self.refuse.lock().unwrap().insert(job_id);
    }

    pub fn batches(&self) -> Vec<Vec<Uuid>> {
        self.batches.lock().unwrap().clone()
    }

    pub fn scheduled_ids(&self) -> Vec<Uuid> {
        self.batches().into_iter().flatten().collect()
    }

    pub fn start_count(&self) -> usize {
        self.batches().len()
    }
}

#[async_trait]
impl Engine for RecordingEngine {
    async fn start(&self, jobs: Vec<JobState>) -> Result<(), PublishingError> {
        let refuse = self.refuse.lock().unwrap().clone();
        let mut published = Vec::new();
        let mut failed = Vec::new();
        for (index, job) in jobs.iter().enumerate() {
            if refuse.contains(&job.job_id) {
                failed.push((index, job.job_id));
            } else {
                published.push(job.job_id);
            }
        }
        self.batches.lock().unwrap().push(published.clone());
        if failed.is_empty() {
            Ok(())
        } else {
            Err(PublishingError {
                successful_jobs: published,
                failed_jobs: failed.iter().map(|(_, id)| *id).collect(),
                errors_by_index: failed
                    .into_iter()
                    .map(|(index, _)| (index, "refused by test engine".to_string()))
                    .collect(),
            })
        }
    }
}

/// Everything a test needs wired together around one in-memory store.
pub struct Harness {
    pub provider: Arc<InMemorySagaProvider>,
    pub steps: Arc<StepRegistry>,
    pub finalizers: Arc<FinalizerRegistry>,
    pub events: EventPublisher,
    pub config: SagaConfig,
    pub log: CallLog,
    pub finalizer_count: Arc<AtomicU32>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(SagaConfig::for_testing())
    }

    pub fn with_config(config: SagaConfig) -> Self {
        let log = CallLog::new();
        let steps = Arc::new(StepRegistry::new());

        {
            let log = log.clone();
            steps.register("immediate", move || {
                Arc::new(ImmediateStep {
                    name: "immediate".to_string(),
                    log: log.clone(),
                })
            });
        }
        {
            let log = log.clone();
            steps.register("immediate-b", move || {
                Arc::new(ImmediateStep {
                    name: "immediate-b".to_string(),
                    log: log.clone(),
                })
            });
        }
        {
            let log = log.clone();
            steps.register("flaky", move || {
                Arc::new(FlakyStep {
                    name: "flaky".to_string(),
                    log: log.clone(),
                })
            });
        }
        {
            let log = log.clone();
            steps.register("permanent", move || {
                Arc::new(PermanentStep {
                    name: "permanent".to_string(),
                    log: log.clone(),
                })
            });
        }
        {
            let log = log.clone();
            steps.register("compensate-fails", move || {
                Arc::new(CompensateFailsStep {
                    name: "compensate-fails".to_string(),
                    log: log.clone(),
                })
            });
        }
        {
            let log = log.clone();
            steps.register("chunked-3", move || {
                Arc::new(ChunkedStep {
                    name: "chunked-3".to_string(),
                    total_chunks: 3,
                    log: log.clone(),
                })
            });
        }
        {
            let log = log.clone();
            steps.register("simple-join-3", move || {
                Arc::new(SimpleJoinStep {
                    name: "simple-join-3".to_string(),
                    total_chunks: 3,
                    log: log.clone(),
                })
            });
        }

        let finalizer_count = Arc::new(AtomicU32::new(0));
        let finalizers = Arc::new(FinalizerRegistry::new());
        {
            let invocations = Arc::clone(&finalizer_count);
            finalizers.register("counting", move || {
                Arc::new(CountingFinalizer {
                    invocations: Arc::clone(&invocations),
                })
            });
        }

        Self {
            provider: Arc::new(InMemorySagaProvider::new()),
            steps,
            finalizers,
            events: EventPublisher::default(),
            config,
            log,
            finalizer_count,
        }
    }

    pub fn orchestrator(&self) -> JobOrchestrator {
        JobOrchestrator::new(
            Arc::clone(&self.provider) as Arc<dyn saga_core::SagaProvider>,
            Arc::clone(&self.steps),
            Arc::clone(&self.finalizers),
            self.events.clone(),
            &self.config,
        )
    }

    pub fn batch(&self, main_engine: RecordingEngine, retry_engine: RecordingEngine) -> BatchOrchestrator {
        BatchOrchestrator::new(
            Arc::clone(&self.provider) as Arc<dyn saga_core::SagaProvider>,
            Arc::clone(&self.steps),
            Arc::clone(&self.finalizers),
            Arc::new(main_engine),
            Arc::new(retry_engine),
            self.events.clone(),
            self.config.clone(),
        )
    }

    /// Create one job whose steps use the given registered executor names.
    pub async fn create_job(&self, executors: &[&str]) -> JobState {
        let mut request = JobRequest::new();
        for name in executors {
            request = request.with_step(*name, json!({}));
        }
        let mut jobs = self
            .provider
            .create_jobs(vec![request.with_finalizer("counting")])
            .await
            .expect("job creation");
        jobs.remove(0)
    }

    pub fn finalizer_invocations(&self) -> u32 {
        self.finalizer_count.load(Ordering::SeqCst)
    }
}
