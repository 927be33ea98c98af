//! # Error Taxonomy and Marshalling
//!
//! Failure kinds drive the saga state machine: a reversible failure pivots a
//! job into compensation, a permanent failure terminates it outright, and a
//! compensation failure ends the job as `Compensation_Failed`. Step code
//! reports failures through the [`StepError`] sum type rather than opaque
//! panics so the retrier and orchestrator can dispatch on the variant.
//!
//! [`SerializableError`] is the wire form of an error chain. It round-trips
//! through JSON and is what lands in a job's `final_error_details`.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

pub type Result<T> = std::result::Result<T, SagaError>;

type BoxedCause = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Crate-level error type for orchestrator, provider, and registry surfaces.
#[derive(Debug, thiserror::Error)]
pub enum SagaError {
    /// Synchronously raised on malformed input (nil job ids, empty step
    /// lists, inconsistent state keys).
    #[error("Validation error: {0}")]
    Validation(String),

    /// A step implementation could not be resolved or constructed. The two
    /// cases are distinguishable through the cause chain: resolution
    /// failures carry no cause, construction failures chain the factory's
    /// error.
    #[error("{message}")]
    StepInitialization {
        message: String,
        #[source]
        source: Option<BoxedCause>,
    },

    /// Persistence failure outside the database driver itself.
    #[error("Provider error: {0}")]
    Provider(String),

    /// Scheduling through an engine partially or wholly failed.
    #[error(transparent)]
    Publishing(#[from] PublishingError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl SagaError {
    /// Resolution failure: the registry has no entry under this name.
    pub fn unknown_step(name: &str) -> Self {
        Self::StepInitialization {
            message: format!("Could not find class {name}"),
            source: None,
        }
    }

    /// Construction failure: the registry found a factory but it refused to
    /// produce an instance.
    pub fn step_construction(name: &str, cause: BoxedCause) -> Self {
        Self::StepInitialization {
            message: format!("Could not construct step {name}"),
            source: Some(cause),
        }
    }

    /// Stable type label used when marshalling to [`SerializableError`].
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Validation(_) => "ValidationError",
            Self::StepInitialization { .. } => "StepInitializationError",
            Self::Provider(_) => "ProviderError",
            Self::Publishing(_) => "PublishingError",
            Self::Serialization(_) => "SerializationError",
            Self::Database(_) => "DatabaseError",
        }
    }
}

/// Failure reported by step code (or on its behalf by the executor).
///
/// `Retryable` failures are retried by the [`crate::orchestration::Retrier`]
/// and, once attempts are exhausted during forward execution, pivot the job
/// into compensation. `Permanent` failures skip both retry and compensation.
#[derive(Debug, thiserror::Error)]
pub enum StepError {
    #[error("{message}")]
    Retryable {
        message: String,
        #[source]
        source: Option<BoxedCause>,
        record_errors: Vec<RecordError>,
    },
    #[error("{message}")]
    Permanent {
        message: String,
        #[source]
        source: Option<BoxedCause>,
        record_errors: Vec<RecordError>,
    },
}

impl StepError {
    pub fn retryable(message: impl Into<String>) -> Self {
        Self::Retryable {
            message: message.into(),
            source: None,
            record_errors: Vec::new(),
        }
    }

    pub fn retryable_with(message: impl Into<String>, cause: BoxedCause) -> Self {
        Self::Retryable {
            message: message.into(),
            source: Some(cause),
            record_errors: Vec::new(),
        }
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self::Permanent {
            message: message.into(),
            source: None,
            record_errors: Vec::new(),
        }
    }

    pub fn permanent_with(message: impl Into<String>, cause: BoxedCause) -> Self {
        Self::Permanent {
            message: message.into(),
            source: Some(cause),
            record_errors: Vec::new(),
        }
    }

    /// Failure produced by the retrier once attempts run out. The message
    /// format is part of the public contract. The exhausted failure stays
    /// retryable in kind so forward execution still pivots to compensation;
    /// compensation treats exhaustion and permanence alike.
    pub fn exhausted(attempts: u32, last: StepError) -> Self {
        Self::Retryable {
            message: format!("Action failed after {attempts} attempts."),
            source: Some(Box::new(last)),
            record_errors: Vec::new(),
        }
    }

    /// Attach per-record mutation errors to this failure.
    pub fn with_record_errors(mut self, errors: Vec<RecordError>) -> Self {
        match &mut self {
            Self::Retryable { record_errors, .. } | Self::Permanent { record_errors, .. } => {
                *record_errors = errors;
            }
        }
        self
    }

    pub fn is_permanent(&self) -> bool {
        matches!(self, Self::Permanent { .. })
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Retryable { message, .. } | Self::Permanent { message, .. } => message,
        }
    }

    pub fn record_errors(&self) -> &[RecordError] {
        match self {
            Self::Retryable { record_errors, .. } | Self::Permanent { record_errors, .. } => {
                record_errors
            }
        }
    }

    /// Stable type label used when marshalling to [`SerializableError`].
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Retryable { .. } => "RetryableFailure",
            Self::Permanent { .. } => "PermanentFailure",
        }
    }

    /// Wrap a provider or orchestrator error encountered mid-step so it
    /// re-enters the retry/compensation flow as a reversible failure.
    pub fn from_saga(error: SagaError) -> Self {
        let message = error.to_string();
        Self::retryable_with(message, Box::new(error))
    }
}

pub type StepExecutionResult = std::result::Result<crate::models::StepCompletionState, StepError>;

/// Per-record mutation error, carried inside an error chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordError {
    pub record_index: usize,
    pub status_code: String,
    pub status_message: String,
    #[serde(default)]
    pub fields: Vec<String>,
}

/// Raised by an engine when scheduling partially fails. Successful jobs
/// stay published; the failed subset is reported so the caller can react.
#[derive(Debug, Clone, Default)]
pub struct PublishingError {
    pub successful_jobs: Vec<Uuid>,
    pub failed_jobs: Vec<Uuid>,
    pub errors_by_index: HashMap<usize, String>,
}

impl PublishingError {
    /// All jobs in the batch failed to publish for the same reason.
    pub fn total(failed_jobs: Vec<Uuid>, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        let errors_by_index = failed_jobs
            .iter()
            .enumerate()
            .map(|(i, _)| (i, reason.clone()))
            .collect();
        Self {
            successful_jobs: Vec::new(),
            failed_jobs,
            errors_by_index,
        }
    }

    pub fn is_partial(&self) -> bool {
        !self.successful_jobs.is_empty() && !self.failed_jobs.is_empty()
    }
}

impl fmt::Display for PublishingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Publishing failed for {} of {} jobs",
            self.failed_jobs.len(),
            self.failed_jobs.len() + self.successful_jobs.len()
        )
    }
}

impl std::error::Error for PublishingError {}

/// Wire representation of an error chain. Round-trips through JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerializableError {
    #[serde(rename = "type")]
    pub error_type: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack_trace: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dml_errors: Option<Vec<RecordError>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cause: Option<Box<SerializableError>>,
}

impl SerializableError {
    pub fn new(error_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error_type: error_type.into(),
            message: message.into(),
            stack_trace: None,
            dml_errors: None,
            cause: None,
        }
    }

    pub fn with_cause(mut self, cause: SerializableError) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    pub fn with_dml_errors(mut self, errors: Vec<RecordError>) -> Self {
        if !errors.is_empty() {
            self.dml_errors = Some(errors);
        }
        self
    }

    /// Marshal a step failure, chasing the full cause chain.
    pub fn from_step_error(error: &StepError) -> Self {
        let mut marshalled = Self::new(error.kind_name(), error.message())
            .with_dml_errors(error.record_errors().to_vec());
        if let Some(cause) = std::error::Error::source(error) {
            marshalled.cause = Some(Box::new(Self::from_dyn(cause)));
        }
        marshalled
    }

    /// Marshal an orchestrator/provider failure, chasing the cause chain.
    pub fn from_saga_error(error: &SagaError) -> Self {
        let mut marshalled = Self::new(error.kind_name(), error.to_string());
        if let Some(cause) = std::error::Error::source(error) {
            marshalled.cause = Some(Box::new(Self::from_dyn(cause)));
        }
        marshalled
    }

    fn from_dyn(error: &(dyn std::error::Error + 'static)) -> Self {
        // Typed labels where the cause is one of ours; generic otherwise.
        if let Some(step) = error.downcast_ref::<StepError>() {
            return Self::from_step_error(step);
        }
        if let Some(saga) = error.downcast_ref::<SagaError>() {
            return Self::from_saga_error(saga);
        }
        let label = if error.downcast_ref::<PublishingError>().is_some() {
            "PublishingError"
        } else if error.downcast_ref::<serde_json::Error>().is_some() {
            "SerializationError"
        } else {
            "Error"
        };
        let mut marshalled = Self::new(label, error.to_string());
        if let Some(cause) = error.source() {
            marshalled.cause = Some(Box::new(Self::from_dyn(cause)));
        }
        marshalled
    }

    /// The chain from this error down to the root cause, outermost first.
    pub fn cause_chain(&self) -> Vec<&SerializableError> {
        let mut chain = vec![self];
        let mut current = self;
        while let Some(cause) = &current.cause {
            chain.push(cause);
            current = cause;
        }
        chain
    }
}
