//! # saga-core
//!
//! Durable, stateful saga orchestration: a job is an ordered sequence of
//! compensatable steps, each step advances across many short transactions
//! through chunking, and a reversible failure rolls completed steps back
//! in reverse order. Progress persists through a pluggable provider after
//! every transaction; scheduling of the next transaction goes through a
//! pluggable engine; a resource budget decides when a batch must yield.

pub mod budget;
pub mod config;
pub mod constants;
pub mod engine;
pub mod error;
pub mod events;
pub mod logging;
pub mod models;
pub mod orchestration;
pub mod provider;
pub mod registry;
pub mod state_machine;
pub mod step;

pub use budget::{Budget, ResourceUsage, TransactionLimits};
pub use config::SagaConfig;
pub use engine::{ChannelEngine, Engine};
pub use error::{
    PublishingError, RecordError, Result, SagaError, SerializableError, StepError,
    StepExecutionResult,
};
pub use events::EventPublisher;
pub use models::{ChunkRequest, ChunkState, JobRequest, JobState, StepCompletionState, StepState};
pub use orchestration::{
    BatchOrchestrator, BatchReport, Finalizable, JobOrchestrator, StepContext, UnitOutcome,
};
pub use provider::{ChunkPage, InMemorySagaProvider, PostgresSagaProvider, SagaProvider};
pub use registry::{FinalizerRegistry, StepRegistry};
pub use state_machine::{ChunkStatus, Direction, JobStatus, StepStatus};
pub use step::{AggregationCapability, BatchAggregator, SagaStep, SimpleAggregator};
