//! Aggregation of a step's chunk results, run once when the step
//! completes. Dispatches on the step's declared capability: single-shot
//! over all chunks, streaming over bounded pages, or the pass-through
//! default when no aggregator is declared.

use serde_json::Value;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use crate::error::StepError;
use crate::orchestration::StepContext;
use crate::provider::SagaProvider;
use crate::step::{AggregationCapability, SagaStep};

/// Folds a completing step's chunks into its final result.
#[derive(Clone)]
pub struct ChunkAggregator {
    provider: Arc<dyn SagaProvider>,
    page_size: usize,
}

impl ChunkAggregator {
    pub fn new(provider: Arc<dyn SagaProvider>, page_size: usize) -> Self {
        Self {
            provider,
            page_size: page_size.max(1),
        }
    }

    /// Produce the step's final result from its persisted chunks. Must be
    /// deterministic over any chunk partitioning.
    pub async fn aggregate(
        &self,
        step: &dyn SagaStep,
        ctx: &StepContext,
        step_id: Uuid,
    ) -> Result<Option<Value>, StepError> {
        match step.aggregation() {
            AggregationCapability::None => self.passthrough(step_id).await,
            AggregationCapability::Simple(aggregator) => {
                let chunks = self.load_all(step_id).await?;
                debug!(step_id = %step_id, chunk_count = chunks.len(), "Running simple aggregation");
                aggregator.aggregate(ctx, &chunks).await.map(Some)
            }
            AggregationCapability::Batched(aggregator) => {
                let mut state = aggregator.start_aggregation(ctx).await?;
                let mut cursor = None;
                let mut pages = 0usize;
                loop {
                    let page = self
                        .provider
                        .chunks_for_step(step_id, cursor, self.page_size)
                        .await
                        .map_err(StepError::from_saga)?;
                    if page.chunks.is_empty() && pages > 0 {
                        break;
                    }
                    pages += 1;
                    state = aggregator.execute_aggregation(ctx, state, &page.chunks).await?;
                    match page.next_cursor {
                        Some(next) => cursor = Some(next),
                        None => break,
                    }
                }
                debug!(step_id = %step_id, pages, "Finishing batched aggregation");
                aggregator.finish_aggregation(ctx, state).await.map(Some)
            }
        }
    }

    /// Default when no aggregator is declared: a single chunk's result
    /// passes through unchanged; multiple chunks collect into an array.
    async fn passthrough(&self, step_id: Uuid) -> Result<Option<Value>, StepError> {
        let chunks = self.load_all(step_id).await?;
        let mut results: Vec<Value> = chunks.into_iter().filter_map(|chunk| chunk.result).collect();
        Ok(match results.len() {
            0 => None,
            1 => results.pop(),
            _ => Some(Value::Array(results)),
        })
    }

    async fn load_all(&self, step_id: Uuid) -> Result<Vec<crate::models::ChunkState>, StepError> {
        let mut all = Vec::new();
        let mut cursor = None;
        loop {
            let page = self
                .provider
                .chunks_for_step(step_id, cursor, self.page_size)
                .await
                .map_err(StepError::from_saga)?;
            all.extend(page.chunks);
            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }
        Ok(all)
    }
}
