//! Orchestration core: the per-job state machine, the limit-aware batch
//! driver, and the collaborators they are assembled from (context, retrier,
//! step executor, aggregation, finalizer).

pub mod aggregation;
pub mod batch;
pub mod context;
pub mod finalizer;
pub mod retrier;
pub mod single_job;
pub mod step_executor;

pub use aggregation::ChunkAggregator;
pub use batch::{BatchOrchestrator, BatchReport, InvalidJob};
pub use context::StepContext;
pub use finalizer::{Finalizable, FinalizerRunner};
pub use retrier::Retrier;
pub use single_job::{JobOrchestrator, UnitOutcome};
pub use step_executor::StepExecutor;
