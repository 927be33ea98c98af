//! # Engine Contract
//!
//! An engine durably schedules another transaction for a set of jobs. Once
//! `start` returns success, delivery is guaranteed at-least-once; the
//! transport behind it (event bus, task queue, in-process channel) is the
//! host's concern. The batch orchestrator is handed two engine slots with
//! identical contracts: the main slot for step-to-step progression and the
//! retry slot for budget-overflow re-enqueues.

pub mod channel;

use async_trait::async_trait;

use crate::error::PublishingError;
use crate::models::JobState;

/// Durable scheduling of jobs into one or more fresh transactions.
#[async_trait]
pub trait Engine: Send + Sync {
    /// Enqueue the given jobs for future processing. Partial failures
    /// surface as a [`PublishingError`] carrying which jobs succeeded and
    /// which did not; successfully published jobs stay published.
    async fn start(&self, jobs: Vec<JobState>) -> std::result::Result<(), PublishingError>;
}

pub use channel::ChannelEngine;
