//! In-memory provider with the same table shape and cache semantics as the
//! durable implementations. Used for embedding and tests.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use uuid::Uuid;

use crate::budget::ResourceUsage;
use crate::constants::system::MAX_JOB_STEPS;
use crate::error::{Result, SagaError};
use crate::models::{ChunkState, JobRequest, JobState, StepState};
use crate::provider::{ChunkPage, SagaProvider};
use crate::state_machine::{Direction, JobStatus};

/// Three logical tables behind row-level locks, mirroring the persisted
/// layout: jobs ← steps ← chunks by foreign key.
#[derive(Default)]
struct Tables {
    jobs: HashMap<Uuid, JobState>,
    steps: HashMap<Uuid, StepState>,
    chunks: HashMap<Uuid, ChunkState>,
}

/// Provider over in-process tables. Clone-cheap via `Arc` internals so one
/// store can back many orchestrator transactions in tests.
#[derive(Clone, Default)]
pub struct InMemorySagaProvider {
    tables: Arc<RwLock<Tables>>,
    cache: Arc<Mutex<HashMap<Uuid, JobState>>>,
    usage: Arc<Mutex<Option<Arc<ResourceUsage>>>>,
}

impl InMemorySagaProvider {
    pub fn new() -> Self {
        Self::default()
    }

    fn record_query(&self) {
        if let Ok(guard) = self.usage.lock() {
            if let Some(usage) = guard.as_ref() {
                usage.record_query();
            }
        }
    }

    fn record_mutation(&self) {
        if let Ok(guard) = self.usage.lock() {
            if let Some(usage) = guard.as_ref() {
                usage.record_mutation();
            }
        }
    }

    fn record_heap(&self, bytes: u64) {
        if let Ok(guard) = self.usage.lock() {
            if let Some(usage) = guard.as_ref() {
                usage.record_heap_bytes(bytes);
            }
        }
    }

    fn assemble(tables: &Tables, job_id: Uuid) -> Option<JobState> {
        let mut job = tables.jobs.get(&job_id)?.clone();
        let mut steps: Vec<StepState> = tables
            .steps
            .values()
            .filter(|step| step.parent_job_id == job_id)
            .cloned()
            .collect();
        steps.sort_by_key(|step| step.step_index);
        job.steps = steps;
        Some(job)
    }

    fn cache_put(&self, job: JobState) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.insert(job.job_id, job);
        }
    }

    fn validate(requests: &[JobRequest]) -> Result<()> {
        for request in requests {
            if request.steps.is_empty() {
                return Err(SagaError::Validation(
                    "A job must declare at least one step".to_string(),
                ));
            }
            if request.steps.len() > MAX_JOB_STEPS {
                return Err(SagaError::Validation(format!(
                    "A job may declare at most {MAX_JOB_STEPS} steps"
                )));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl SagaProvider for InMemorySagaProvider {
    async fn create_jobs(&self, requests: Vec<JobRequest>) -> Result<Vec<JobState>> {
        if requests.is_empty() {
            return Ok(Vec::new());
        }
        Self::validate(&requests)?;

        let mut created = Vec::with_capacity(requests.len());
        {
            let mut tables = match self.tables.write() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            for request in requests {
                let job_id = Uuid::now_v7();
                let now = Utc::now();
                let steps: Vec<StepState> = request
                    .steps
                    .into_iter()
                    .enumerate()
                    .map(|(index, step)| {
                        StepState::new(job_id, index as u32, step.executor_name, step.payload)
                    })
                    .collect();
                let job = JobState {
                    job_id,
                    status: JobStatus::New,
                    direction: Direction::Down,
                    current_step_index: 0,
                    total_steps: steps.len() as u32,
                    finalizer_name: request.finalizer_name,
                    finalizer_executed: false,
                    final_error_details: None,
                    version: 0,
                    created_at: now,
                    updated_at: now,
                    steps,
                };

                let mut row = job.clone();
                row.steps = Vec::new();
                tables.jobs.insert(job_id, row);
                for step in &job.steps {
                    tables.steps.insert(step.step_id, step.clone());
                }
                created.push(job);
            }
        }
        // One batched write per entity kind.
        self.record_mutation();
        self.record_mutation();
        for job in &created {
            self.cache_put(job.clone());
        }
        Ok(created)
    }

    async fn get_job_states(&self, ids: &[Uuid]) -> Result<Vec<JobState>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut found: HashMap<Uuid, JobState> = HashMap::new();
        let mut missing: Vec<Uuid> = Vec::new();
        {
            let cache = match self.cache.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            for id in ids {
                match cache.get(id) {
                    Some(job) => {
                        found.insert(*id, job.clone());
                    }
                    None => missing.push(*id),
                }
            }
        }

        if !missing.is_empty() {
            // One query for job rows, one for their steps.
            self.record_query();
            self.record_query();
            let tables = match self.tables.read() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            for id in &missing {
                if let Some(job) = Self::assemble(&tables, *id) {
                    found.insert(*id, job);
                }
            }
            drop(tables);
            for id in &missing {
                if let Some(job) = found.get(id) {
                    self.cache_put(job.clone());
                }
            }
        }

        Ok(ids.iter().filter_map(|id| found.remove(id)).collect())
    }

    async fn save_jobs(&self, jobs: &[JobState]) -> Result<()> {
        if jobs.is_empty() {
            return Ok(());
        }
        {
            let mut tables = match self.tables.write() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            for job in jobs {
                let mut row = job.clone();
                row.steps = Vec::new();
                tables.jobs.insert(job.job_id, row);
            }
        }
        self.record_mutation();
        for job in jobs {
            self.cache_put(job.clone());
        }
        Ok(())
    }

    async fn save_steps(&self, steps: &[StepState]) -> Result<()> {
        if steps.is_empty() {
            return Ok(());
        }
        {
            let mut tables = match self.tables.write() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            for step in steps {
                tables.steps.insert(step.step_id, step.clone());
            }
        }
        self.record_mutation();
        // Keep cached jobs coherent with the step writes.
        if let Ok(mut cache) = self.cache.lock() {
            for step in steps {
                if let Some(job) = cache.get_mut(&step.parent_job_id) {
                    if let Some(slot) = job
                        .steps
                        .iter_mut()
                        .find(|candidate| candidate.step_id == step.step_id)
                    {
                        *slot = step.clone();
                    }
                }
            }
        }
        Ok(())
    }

    async fn save_chunks(&self, chunks: &[ChunkState]) -> Result<()> {
        if chunks.is_empty() {
            return Ok(());
        }
        {
            let mut tables = match self.tables.write() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            for chunk in chunks {
                tables.chunks.insert(chunk.chunk_id, chunk.clone());
            }
        }
        self.record_mutation();
        Ok(())
    }

    async fn insert_chunks(&self, chunks: Vec<ChunkState>) -> Result<Vec<ChunkState>> {
        if chunks.is_empty() {
            return Ok(Vec::new());
        }
        let mut heap = 0u64;
        {
            let mut tables = match self.tables.write() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            for chunk in &chunks {
                if tables.chunks.contains_key(&chunk.chunk_id) {
                    return Err(SagaError::Validation(format!(
                        "Chunk {} already exists",
                        chunk.chunk_id
                    )));
                }
                if let Some(result) = &chunk.result {
                    heap += result.to_string().len() as u64;
                }
                tables.chunks.insert(chunk.chunk_id, chunk.clone());
            }
        }
        self.record_mutation();
        self.record_heap(heap);
        Ok(chunks)
    }

    async fn chunks_for_step(
        &self,
        step_id: Uuid,
        cursor: Option<u32>,
        page_size: usize,
    ) -> Result<ChunkPage> {
        if page_size == 0 {
            return Err(SagaError::Validation("Page size must be positive".to_string()));
        }
        self.record_query();

        let start = cursor.unwrap_or(0);
        let mut matching: Vec<ChunkState> = {
            let tables = match self.tables.read() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            tables
                .chunks
                .values()
                .filter(|chunk| chunk.parent_step_id == step_id && chunk.chunk_index >= start)
                .cloned()
                .collect()
        };
        matching.sort_by_key(|chunk| chunk.chunk_index);
        let has_more = matching.len() > page_size;
        matching.truncate(page_size);
        let next_cursor = if has_more {
            matching.last().map(|chunk| chunk.chunk_index + 1)
        } else {
            None
        };
        Ok(ChunkPage {
            chunks: matching,
            next_cursor,
        })
    }

    fn invalidate_cache(&self) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.clear();
        }
    }

    fn attach_usage(&self, usage: Arc<ResourceUsage>) {
        if let Ok(mut guard) = self.usage.lock() {
            *guard = Some(usage);
        }
    }
}
