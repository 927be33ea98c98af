//! Job master record and creation request.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::SerializableError;
use crate::models::StepState;
use crate::state_machine::{Direction, JobStatus};

/// Master record of one saga instance. Owns its steps; steps own their
/// chunks through the provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobState {
    pub job_id: Uuid,
    pub status: JobStatus,
    pub direction: Direction,
    /// Ranges over `[0, total_steps]` while travelling `Down` and
    /// `[-1, total_steps)` while travelling `Up`. `total_steps` means
    /// completed; `-1` means compensation reached the bottom.
    pub current_step_index: i32,
    pub total_steps: u32,
    pub finalizer_name: Option<String>,
    pub finalizer_executed: bool,
    pub final_error_details: Option<SerializableError>,
    /// Bumped on every save so a store-level optimistic lock can be layered
    /// on without touching the orchestrator.
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub steps: Vec<StepState>,
}

impl JobState {
    /// A reference carrying only the job identity, as delivered by an
    /// engine. The provider reloads the full state from storage.
    pub fn reference(job_id: Uuid) -> Self {
        Self {
            job_id,
            status: JobStatus::New,
            direction: Direction::Down,
            current_step_index: 0,
            total_steps: 0,
            finalizer_name: None,
            finalizer_executed: false,
            final_error_details: None,
            version: 0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            steps: Vec::new(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// The step the orchestrator is currently pointing at, if the index is
    /// inside the step range.
    pub fn current_step(&self) -> Option<&StepState> {
        usize::try_from(self.current_step_index)
            .ok()
            .and_then(|idx| self.steps.get(idx))
    }

    pub fn current_step_mut(&mut self) -> Option<&mut StepState> {
        usize::try_from(self.current_step_index)
            .ok()
            .and_then(|idx| self.steps.get_mut(idx))
    }

    /// Record a modification; bumps the optimistic-lock version.
    pub fn touch(&mut self) {
        self.version += 1;
        self.updated_at = Utc::now();
    }
}

/// Request to create a job. The provider assigns identities and initial
/// statuses (job `New`, steps `Pending`).
#[derive(Debug, Clone, Default)]
pub struct JobRequest {
    pub finalizer_name: Option<String>,
    pub steps: Vec<StepRequest>,
}

impl JobRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_step(mut self, executor_name: impl Into<String>, payload: Value) -> Self {
        self.steps.push(StepRequest {
            executor_name: executor_name.into(),
            payload,
        });
        self
    }

    pub fn with_finalizer(mut self, name: impl Into<String>) -> Self {
        self.finalizer_name = Some(name.into());
        self
    }
}

/// One step of a job creation request.
#[derive(Debug, Clone)]
pub struct StepRequest {
    pub executor_name: String,
    pub payload: Value,
}
