//! # Provider Contract
//!
//! Durable load/save of job/step/chunk records. Reads within one
//! transaction go through a per-transaction cache; a preloaded job bypasses
//! reload until `invalidate_cache` is called. Writes are batched: each
//! entity kind is saved with a single batched write, and the batch
//! orchestrator flushes buffered job/step writes in bulk at transaction
//! boundaries. All operations are idempotent for empty input.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use std::sync::Arc;
use uuid::Uuid;

use crate::budget::ResourceUsage;
use crate::error::Result;
use crate::models::{ChunkState, JobRequest, JobState, StepState};

/// One page of a step's chunks, ordered by `chunk_index` ascending.
#[derive(Debug, Clone)]
pub struct ChunkPage {
    pub chunks: Vec<ChunkState>,
    /// Cursor for the next page; `None` when this page is the last.
    pub next_cursor: Option<u32>,
}

impl ChunkPage {
    pub fn empty() -> Self {
        Self {
            chunks: Vec::new(),
            next_cursor: None,
        }
    }
}

/// Durable persistence for job/step/chunk records.
#[async_trait]
pub trait SagaProvider: Send + Sync {
    /// Assign identities and persist new jobs with their steps. Initial
    /// statuses: job `New`, steps `Pending`. Empty input returns empty.
    async fn create_jobs(&self, requests: Vec<JobRequest>) -> Result<Vec<JobState>>;

    /// Load jobs with their steps. Chunks are lazy-loaded per step through
    /// [`Self::chunks_for_step`]. Unknown ids are absent from the result.
    async fn get_job_states(&self, ids: &[Uuid]) -> Result<Vec<JobState>>;

    /// Batch-upsert job fields. Embedded steps are not written here; use
    /// [`Self::save_steps`].
    async fn save_jobs(&self, jobs: &[JobState]) -> Result<()>;

    /// Batch-upsert step records.
    async fn save_steps(&self, steps: &[StepState]) -> Result<()>;

    /// Batch-upsert chunk records.
    async fn save_chunks(&self, chunks: &[ChunkState]) -> Result<()>;

    /// Batch-insert fresh chunk records, returning them as persisted.
    async fn insert_chunks(&self, chunks: Vec<ChunkState>) -> Result<Vec<ChunkState>>;

    /// Paginated retrieval of a step's chunks for streaming aggregation.
    /// Ordering is stable by `chunk_index` ascending.
    async fn chunks_for_step(
        &self,
        step_id: Uuid,
        cursor: Option<u32>,
        page_size: usize,
    ) -> Result<ChunkPage>;

    /// Drop transaction-local caches.
    fn invalidate_cache(&self);

    /// Attach the current transaction's usage counters so persistence calls
    /// are metered for the budget. Providers without metering may ignore
    /// this.
    fn attach_usage(&self, _usage: Arc<ResourceUsage>) {}
}

pub use memory::InMemorySagaProvider;
pub use postgres::PostgresSagaProvider;
