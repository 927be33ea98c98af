//! In-process engine backed by an unbounded channel. The receiving half is
//! typically drained by a worker loop that feeds job ids back into a batch
//! orchestrator; tests drain it directly.

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

use crate::engine::Engine;
use crate::error::PublishingError;
use crate::models::JobState;

/// Channel-backed engine for embedding and tests. Delivery is as durable as
/// the process; production transports implement [`Engine`] over a durable
/// queue instead.
#[derive(Debug, Clone)]
pub struct ChannelEngine {
    sender: mpsc::UnboundedSender<Vec<Uuid>>,
}

impl ChannelEngine {
    /// Create the engine and the receiving half that observes scheduled
    /// job-id batches.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Vec<Uuid>>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

#[async_trait]
impl Engine for ChannelEngine {
    async fn start(&self, jobs: Vec<JobState>) -> Result<(), PublishingError> {
        if jobs.is_empty() {
            return Ok(());
        }
        let ids: Vec<Uuid> = jobs.iter().map(|job| job.job_id).collect();
        debug!(job_count = ids.len(), "Scheduling jobs through channel engine");
        self.sender
            .send(ids.clone())
            .map_err(|_| PublishingError::total(ids, "channel receiver dropped"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_start_delivers_job_ids() {
        let (engine, mut receiver) = ChannelEngine::new();
        let jobs = vec![JobState::reference(Uuid::now_v7()), JobState::reference(Uuid::now_v7())];
        let expected: Vec<Uuid> = jobs.iter().map(|j| j.job_id).collect();

        engine.start(jobs).await.unwrap();
        assert_eq!(receiver.recv().await.unwrap(), expected);
    }

    #[tokio::test]
    async fn test_empty_batch_is_a_noop() {
        let (engine, mut receiver) = ChannelEngine::new();
        engine.start(Vec::new()).await.unwrap();
        assert!(receiver.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_dropped_receiver_reports_every_job_failed() {
        let (engine, receiver) = ChannelEngine::new();
        drop(receiver);
        let jobs = vec![JobState::reference(Uuid::now_v7())];
        let err = engine.start(jobs).await.unwrap_err();
        assert_eq!(err.failed_jobs.len(), 1);
        assert!(err.successful_jobs.is_empty());
    }
}
