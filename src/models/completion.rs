//! The value a step returns from each `execute`/`compensate` call.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Outcome of one step invocation. A step signals "the whole step is done"
/// by returning `is_chunk_completed == true` with no `next_chunk`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StepCompletionState {
    /// Whether the current chunk's work finished in this call.
    pub is_chunk_completed: bool,
    /// Partial result of this chunk, persisted on the chunk record and fed
    /// to aggregation when the step completes.
    pub partial_result: Option<Value>,
    /// Opaque cursor handed back to the step on its next call. Typical
    /// usage is the last primary key processed.
    pub next_progress_state: Option<String>,
    /// Request for another chunk of the same step in a fresh unit of work.
    pub next_chunk: Option<ChunkRequest>,
    /// Opaque rollback hints recorded on the chunk for compensation.
    pub previous_values: Option<Value>,
}

impl StepCompletionState {
    /// Chunk finished and the step has no more work.
    pub fn finished() -> Self {
        Self {
            is_chunk_completed: true,
            ..Self::default()
        }
    }

    /// Chunk finished with a partial result and the step has no more work.
    pub fn finished_with(partial_result: Value) -> Self {
        Self {
            is_chunk_completed: true,
            partial_result: Some(partial_result),
            ..Self::default()
        }
    }

    /// Chunk finished but the step wants another chunk in a fresh unit.
    pub fn more_chunks(partial_result: Option<Value>) -> Self {
        Self {
            is_chunk_completed: true,
            partial_result,
            next_chunk: Some(ChunkRequest::default()),
            ..Self::default()
        }
    }

    pub fn with_progress(mut self, cursor: impl Into<String>) -> Self {
        self.next_progress_state = Some(cursor.into());
        self
    }

    pub fn with_previous_values(mut self, values: Value) -> Self {
        self.previous_values = Some(values);
        self
    }

    /// True when this completion closes out the whole step.
    pub fn is_step_completed(&self) -> bool {
        self.is_chunk_completed && self.next_chunk.is_none()
    }
}

/// Descriptor requesting another chunk of the same step.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChunkRequest {
    /// Optional cursor override for the next chunk; when absent the step's
    /// `next_progress_state` is used as-is.
    pub progress_state: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_finished_completes_the_step() {
        assert!(StepCompletionState::finished().is_step_completed());
        assert!(StepCompletionState::finished_with(json!(1)).is_step_completed());
    }

    #[test]
    fn test_more_chunks_keeps_the_step_open() {
        let completion = StepCompletionState::more_chunks(Some(json!("R-0"))).with_progress("pk-100");
        assert!(completion.is_chunk_completed);
        assert!(!completion.is_step_completed());
        assert_eq!(completion.next_progress_state.as_deref(), Some("pk-100"));
    }
}
