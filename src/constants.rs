//! # System Constants
//!
//! Core constants and status groupings that define the operational
//! boundaries of the saga orchestration system. Status wire strings live on
//! the enums in [`crate::state_machine::states`]; this module holds event
//! names, grouping slices, and system-wide bounds.

pub use crate::state_machine::{ChunkStatus, Direction, JobStatus, StepStatus};

/// Lifecycle events published for observability. These names are stable and
/// consumed by external subscribers; add, never rename.
pub mod events {
    // Job lifecycle events
    pub const JOB_STARTED: &str = "job.started";
    pub const JOB_COMPLETED: &str = "job.completed";
    pub const JOB_FAILED: &str = "job.failed";
    pub const JOB_COMPENSATION_STARTED: &str = "job.compensation_started";
    pub const JOB_COMPENSATION_FAILED: &str = "job.compensation_failed";
    pub const JOB_FINALIZED: &str = "job.finalized";

    // Step lifecycle events
    pub const STEP_STARTED: &str = "step.started";
    pub const STEP_COMPLETED: &str = "step.completed";
    pub const STEP_FAILED: &str = "step.failed";
    pub const STEP_COMPENSATED: &str = "step.compensated";

    // Chunk lifecycle events
    pub const CHUNK_COMPLETED: &str = "chunk.completed";

    // Batch orchestration events
    pub const BATCH_STARTED: &str = "batch.started";
    pub const BATCH_YIELDED: &str = "batch.yielded";
    pub const BATCH_COMPLETED: &str = "batch.completed";
}

/// System-wide constants
pub mod system {
    /// Version compatibility marker
    pub const SAGA_CORE_VERSION: &str = "0.1.0";

    /// Maximum number of steps in a single job
    pub const MAX_JOB_STEPS: usize = 1000;

    /// Default page size for streaming chunk aggregation
    pub const DEFAULT_AGGREGATION_PAGE_SIZE: usize = 200;

    /// Default budget safety factor (percent of each resource ceiling)
    pub const DEFAULT_SAFETY_FACTOR: u8 = 85;

    /// Bounds the safety factor; out-of-range values clamp into this range
    pub const SAFETY_FACTOR_MIN: u8 = 50;
    pub const SAFETY_FACTOR_MAX: u8 = 95;
}

/// Status groupings for validation and orchestration logic
pub mod status_groups {
    use super::{JobStatus, StepStatus};

    /// Job statuses that indicate the saga reached its end
    pub const JOB_TERMINAL_STATES: &[JobStatus] = &[
        JobStatus::Completed,
        JobStatus::Failed,
        JobStatus::CompensationFailed,
    ];

    /// Job statuses eligible for forward execution
    pub const JOB_FORWARD_STATES: &[JobStatus] =
        &[JobStatus::New, JobStatus::Pending, JobStatus::InProgress];

    /// Step statuses that compensation must visit on the way up
    pub const STEP_COMPENSATABLE_STATES: &[StepStatus] = &[
        StepStatus::Completed,
        StepStatus::Failed,
        StepStatus::InProgress,
        StepStatus::Compensating,
    ];

    /// Step statuses that compensation skips over
    pub const STEP_SKIP_ON_COMPENSATION: &[StepStatus] =
        &[StepStatus::Pending, StepStatus::Compensated];
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_group_matches_predicate() {
        for status in status_groups::JOB_TERMINAL_STATES {
            assert!(status.is_terminal());
        }
        for status in status_groups::JOB_FORWARD_STATES {
            assert!(!status.is_terminal());
        }
    }

    #[test]
    fn test_safety_factor_bounds() {
        assert!(system::SAFETY_FACTOR_MIN < system::SAFETY_FACTOR_MAX);
        assert!(system::DEFAULT_SAFETY_FACTOR >= system::SAFETY_FACTOR_MIN);
        assert!(system::DEFAULT_SAFETY_FACTOR <= system::SAFETY_FACTOR_MAX);
    }
}
