//! Chunk record: one short transaction's worth of work inside a step.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::state_machine::ChunkStatus;

/// One executed unit of a step. Chunks accumulate in `chunk_index` order and
/// are read back during aggregation and compensation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkState {
    pub chunk_id: Uuid,
    pub parent_step_id: Uuid,
    pub chunk_index: u32,
    pub status: ChunkStatus,
    /// Partial result of this chunk, aggregated when the step completes.
    pub result: Option<Value>,
    /// Opaque rollback hint captured at execute time, read during
    /// compensation.
    pub previous_values: Option<Value>,
    pub created_at: DateTime<Utc>,
}

impl ChunkState {
    /// A chunk persisted at the end of a successful forward unit.
    pub fn completed(
        parent_step_id: Uuid,
        chunk_index: u32,
        result: Option<Value>,
        previous_values: Option<Value>,
    ) -> Self {
        Self {
            chunk_id: Uuid::now_v7(),
            parent_step_id,
            chunk_index,
            status: ChunkStatus::Completed,
            result,
            previous_values,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_completed_chunk_carries_partial_result() {
        let step_id = Uuid::now_v7();
        let chunk = ChunkState::completed(step_id, 2, Some(json!("R-2")), None);
        assert_eq!(chunk.parent_step_id, step_id);
        assert_eq!(chunk.chunk_index, 2);
        assert_eq!(chunk.status, ChunkStatus::Completed);
        assert_eq!(chunk.result, Some(json!("R-2")));
    }
}
