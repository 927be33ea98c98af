//! # Step Contract
//!
//! A step implements forward work (`execute`) and its inverse
//! (`compensate`). Both operate on one chunk at a time and must be
//! idempotent with respect to replays: delivery is at-least-once, and a
//! compensation must undo exactly the work represented by the step's
//! persisted chunks.
//!
//! Aggregation is an optional capability a step declares by returning one
//! of the [`AggregationCapability`] variants, dispatched by match rather
//! than inheritance.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{StepError, StepExecutionResult};
use crate::models::ChunkState;
use crate::orchestration::StepContext;

/// A compensatable stage of a job, resolved from the registry by name.
#[async_trait]
pub trait SagaStep: Send + Sync {
    /// Perform one chunk of forward work.
    async fn execute(&self, ctx: &StepContext) -> StepExecutionResult;

    /// Perform one round of reverse work, reading `previous_values` from
    /// chunk records if they were captured on execute.
    async fn compensate(&self, ctx: &StepContext) -> StepExecutionResult;

    /// Declare the aggregation capability used when the step completes.
    fn aggregation(&self) -> AggregationCapability<'_> {
        AggregationCapability::None
    }
}

impl std::fmt::Debug for dyn SagaStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("dyn SagaStep")
    }
}

/// Optional aggregation capabilities a step can declare.
pub enum AggregationCapability<'a> {
    /// No aggregator: a single chunk's result passes through unchanged; a
    /// multi-chunk step's result is the array of partial results.
    None,
    /// Single-shot aggregation over all chunks at once. Intended for small
    /// step result sets.
    Simple(&'a dyn SimpleAggregator),
    /// Streaming aggregation over bounded pages of chunks; the only
    /// scalable shape for large steps.
    Batched(&'a dyn BatchAggregator),
}

/// Single-shot aggregation over the full chunk list.
#[async_trait]
pub trait SimpleAggregator: Send + Sync {
    async fn aggregate(
        &self,
        ctx: &StepContext,
        chunks: &[ChunkState],
    ) -> std::result::Result<Value, StepError>;
}

/// Streaming aggregation: `start` yields the initial accumulator, `execute`
/// folds one page of chunks into it, `finish` produces the step result.
/// Must be deterministic over any chunk partitioning.
#[async_trait]
pub trait BatchAggregator: Send + Sync {
    async fn start_aggregation(&self, ctx: &StepContext) -> std::result::Result<Value, StepError>;

    async fn execute_aggregation(
        &self,
        ctx: &StepContext,
        state: Value,
        chunks: &[ChunkState],
    ) -> std::result::Result<Value, StepError>;

    async fn finish_aggregation(
        &self,
        ctx: &StepContext,
        state: Value,
    ) -> std::result::Result<Value, StepError>;
}
