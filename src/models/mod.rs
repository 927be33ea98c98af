//! State DTOs: jobs own steps, steps own chunks, and
//! [`StepCompletionState`] is the contract value a step hands back to the
//! orchestrator after every call.

pub mod chunk;
pub mod completion;
pub mod job;
pub mod step;

pub use chunk::ChunkState;
pub use completion::{ChunkRequest, StepCompletionState};
pub use job::{JobRequest, JobState, StepRequest};
pub use step::StepState;
