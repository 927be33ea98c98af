//! Resolves the current step's executor name to an implementation and
//! invokes `execute` or `compensate` depending on the job's direction.

use std::sync::Arc;
use tracing::debug;

use crate::error::{StepError, StepExecutionResult};
use crate::orchestration::StepContext;
use crate::registry::StepRegistry;
use crate::state_machine::Direction;
use crate::step::SagaStep;

/// Registry-backed step resolution and invocation.
#[derive(Clone)]
pub struct StepExecutor {
    registry: Arc<StepRegistry>,
}

impl StepExecutor {
    pub fn new(registry: Arc<StepRegistry>) -> Self {
        Self { registry }
    }

    /// Resolve a step implementation. Initialization failures cannot be
    /// retried, so they surface as permanent step failures with the
    /// initialization error chained as the cause.
    pub fn resolve(&self, name: &str) -> Result<Arc<dyn SagaStep>, StepError> {
        self.registry.resolve(name).map_err(|err| {
            let message = err.to_string();
            StepError::permanent_with(message, Box::new(err))
        })
    }

    /// Invoke one unit of the given step in the context's direction.
    pub async fn invoke(&self, step: &dyn SagaStep, ctx: &StepContext) -> StepExecutionResult {
        debug!(
            job_id = %ctx.job_id(),
            step_index = ctx.step_index(),
            chunk_index = ctx.chunk_index(),
            direction = %ctx.direction(),
            "Invoking step"
        );
        match ctx.direction() {
            Direction::Down => step.execute(ctx).await,
            Direction::Up => step.compensate(ctx).await,
        }
    }
}
