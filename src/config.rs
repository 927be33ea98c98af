use crate::budget::TransactionLimits;
use crate::constants::system;
use crate::error::{Result, SagaError};

/// Tunables for the orchestration core.
#[derive(Debug, Clone)]
pub struct SagaConfig {
    /// Total attempts the retrier gives each step invocation.
    pub max_retry_attempts: u32,
    /// Page size for streaming chunk aggregation and context chunk reads.
    pub aggregation_page_size: usize,
    /// Percent of each resource ceiling the batch may consume before
    /// yielding; clamps into [50, 95].
    pub safety_factor: u8,
    /// Whether the step that turned the job around is itself compensated
    /// before walking down to earlier steps.
    pub compensate_failed_step: bool,
    /// Fairness cap: after this many units in one transaction a job is
    /// handed to the main engine instead of cycling in the queue. `None`
    /// lets jobs run to terminal or budget exhaustion.
    pub max_units_per_job: Option<u32>,
    /// Per-transaction resource ceilings.
    pub limits: TransactionLimits,
}

impl Default for SagaConfig {
    fn default() -> Self {
        Self {
            max_retry_attempts: 3,
            aggregation_page_size: system::DEFAULT_AGGREGATION_PAGE_SIZE,
            safety_factor: system::DEFAULT_SAFETY_FACTOR,
            compensate_failed_step: true,
            max_units_per_job: None,
            limits: TransactionLimits::default(),
        }
    }
}

impl SagaConfig {
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(attempts) = std::env::var("SAGA_MAX_RETRY_ATTEMPTS") {
            config.max_retry_attempts = attempts.parse().map_err(|e| {
                SagaError::Validation(format!("Invalid SAGA_MAX_RETRY_ATTEMPTS: {e}"))
            })?;
        }

        if let Ok(page_size) = std::env::var("SAGA_AGGREGATION_PAGE_SIZE") {
            config.aggregation_page_size = page_size.parse().map_err(|e| {
                SagaError::Validation(format!("Invalid SAGA_AGGREGATION_PAGE_SIZE: {e}"))
            })?;
        }

        if let Ok(factor) = std::env::var("SAGA_SAFETY_FACTOR") {
            config.safety_factor = factor
                .parse()
                .map_err(|e| SagaError::Validation(format!("Invalid SAGA_SAFETY_FACTOR: {e}")))?;
        }

        Ok(config)
    }

    /// Small limits and page sizes so tests exercise paging and budget
    /// yields without thousands of records.
    pub fn for_testing() -> Self {
        Self {
            max_retry_attempts: 2,
            aggregation_page_size: 2,
            safety_factor: 50,
            compensate_failed_step: true,
            max_units_per_job: None,
            limits: TransactionLimits::default(),
        }
    }
}
