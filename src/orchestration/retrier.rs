//! Bounded-attempt execution of a step invocation. Permanent failures pass
//! through untouched; reversible failures are retried and, once attempts
//! run out, reported with the exhaustion message while staying reversible
//! so the orchestrator can pivot into compensation.

use std::future::Future;
use tracing::warn;

use crate::error::{StepError, StepExecutionResult};

/// Runs an action up to a bounded number of attempts. The core inserts no
/// delay between attempts; hosts that want backoff wrap the action itself.
#[derive(Debug, Clone, Copy)]
pub struct Retrier {
    max_attempts: u32,
}

impl Retrier {
    /// `max_attempts` is the total number of tries, floored at one.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Run `action` until it succeeds, fails permanently, or attempts are
    /// exhausted.
    pub async fn execute<F, Fut>(&self, mut action: F) -> StepExecutionResult
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = StepExecutionResult>,
    {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match action().await {
                Ok(completion) => return Ok(completion),
                Err(err) if err.is_permanent() => return Err(err),
                Err(err) => {
                    if attempt >= self.max_attempts {
                        return Err(StepError::exhausted(self.max_attempts, err));
                    }
                    warn!(
                        attempt,
                        max_attempts = self.max_attempts,
                        error = %err,
                        "Reversible failure; retrying"
                    );
                }
            }
        }
    }
}
