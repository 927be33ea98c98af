//! Read-through accessor handed to step code. Exposes the current step's
//! payload and progress cursor plus provider-backed access to the step's
//! persisted chunks.

use serde_json::Value;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::Result;
use crate::models::{ChunkState, JobState, StepState};
use crate::provider::{ChunkPage, SagaProvider};
use crate::state_machine::Direction;

/// View of the current job/step/chunk for one step invocation. The payload
/// and progress cursor are caller-owned opaque values; the orchestrator
/// round-trips them without interpretation.
#[derive(Clone)]
pub struct StepContext {
    job_id: Uuid,
    step_id: Uuid,
    step_index: u32,
    chunk_index: u32,
    direction: Direction,
    payload: Value,
    progress_state: Option<String>,
    page_size: usize,
    provider: Arc<dyn SagaProvider>,
}

impl StepContext {
    pub(crate) fn for_step(
        job: &JobState,
        step: &StepState,
        provider: Arc<dyn SagaProvider>,
        page_size: usize,
    ) -> Self {
        Self {
            job_id: job.job_id,
            step_id: step.step_id,
            step_index: step.step_index,
            chunk_index: step.current_chunk_index,
            direction: job.direction,
            payload: step.payload.clone(),
            progress_state: step.progress_state.clone(),
            page_size,
            provider,
        }
    }

    pub fn job_id(&self) -> Uuid {
        self.job_id
    }

    pub fn step_id(&self) -> Uuid {
        self.step_id
    }

    pub fn step_index(&self) -> u32 {
        self.step_index
    }

    /// Index of the chunk this invocation works on.
    pub fn chunk_index(&self) -> u32 {
        self.chunk_index
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Caller-supplied step input.
    pub fn payload(&self) -> &Value {
        &self.payload
    }

    /// Cursor returned by the previous chunk of this step, if any.
    pub fn progress_state(&self) -> Option<&str> {
        self.progress_state.as_deref()
    }

    /// One page of this step's persisted chunks, `chunk_index` ascending.
    pub async fn chunk_page(&self, cursor: Option<u32>) -> Result<ChunkPage> {
        self.provider
            .chunks_for_step(self.step_id, cursor, self.page_size)
            .await
    }

    /// All persisted chunks of this step, loaded page by page. Prefer
    /// [`Self::chunk_page`] when the step may have many chunks.
    pub async fn chunks(&self) -> Result<Vec<ChunkState>> {
        let mut all = Vec::new();
        let mut cursor = None;
        loop {
            let page = self.chunk_page(cursor).await?;
            all.extend(page.chunks);
            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }
        Ok(all)
    }

    /// Rollback hints captured during forward execution, in chunk order.
    /// Chunks that recorded no hints are skipped.
    pub async fn previous_values(&self) -> Result<Vec<Value>> {
        Ok(self
            .chunks()
            .await?
            .into_iter()
            .filter_map(|chunk| chunk.previous_values)
            .collect())
    }
}
