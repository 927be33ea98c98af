//! Step record: one compensatable stage of a job.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::state_machine::StepStatus;

/// One compensatable stage of a job. Chunks are lazy-loaded through the
/// provider rather than embedded, so a step with thousands of chunks stays
/// cheap to carry around.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepState {
    pub step_id: Uuid,
    pub parent_job_id: Uuid,
    pub step_index: u32,
    pub status: StepStatus,
    /// Registry name resolved at run time to a step implementation.
    pub step_executor_name: String,
    /// Caller-supplied input, opaque to the orchestrator.
    pub payload: Value,
    /// Aggregated final value once the step completes.
    pub result: Option<Value>,
    /// Opaque cursor round-tripped to the step across chunks. The
    /// orchestrator never interprets it.
    pub progress_state: Option<String>,
    pub current_chunk_index: u32,
    pub total_chunks: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StepState {
    pub fn new(parent_job_id: Uuid, step_index: u32, executor_name: impl Into<String>, payload: Value) -> Self {
        Self {
            step_id: Uuid::now_v7(),
            parent_job_id,
            step_index,
            status: StepStatus::Pending,
            step_executor_name: executor_name.into(),
            payload,
            result: None,
            progress_state: None,
            current_chunk_index: 0,
            total_chunks: 0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
