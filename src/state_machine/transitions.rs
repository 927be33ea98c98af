//! Keyed `(direction, status)` dispatch for the single-job orchestrator.
//!
//! Every `run_unit` call starts by mapping the job's current direction and
//! status to exactly one orchestrator action. Keeping the mapping in one
//! table makes the state machine auditable against the job lifecycle.

use super::states::{Direction, JobStatus};

/// The single unit of work the orchestrator performs for a given key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrchestratorAction {
    /// Promote the job and its current step to `InProgress`, then execute
    /// one chunk of the current step.
    PromoteAndExecute,
    /// Execute one chunk of the current step.
    ExecuteChunk,
    /// Run one compensation round for the current step.
    CompensateChunk,
    /// Job is already terminal (or compensation finished); make sure the
    /// finalizer has run and report the terminal status.
    TerminalCleanup,
    /// Job was marked `Failed` while travelling up; select the proper
    /// terminal status (`Failed` vs `Compensation_Failed`) and finish.
    ResolveUpTerminal,
}

/// Map a `(direction, status)` key to the action the orchestrator takes.
///
/// Returns `None` for keys that cannot arise from a well-formed lifecycle,
/// e.g. a job travelling `Up` while still `New`.
pub fn action_for(direction: Direction, status: JobStatus) -> Option<OrchestratorAction> {
    match (direction, status) {
        (Direction::Down, JobStatus::New) | (Direction::Down, JobStatus::Pending) => {
            Some(OrchestratorAction::PromoteAndExecute)
        }
        (Direction::Down, JobStatus::InProgress) => Some(OrchestratorAction::ExecuteChunk),
        (Direction::Down, JobStatus::Completed)
        | (Direction::Down, JobStatus::Failed)
        | (Direction::Down, JobStatus::CompensationFailed) => {
            Some(OrchestratorAction::TerminalCleanup)
        }
        // Up_InProgress is an accepted alias for a job that was flipped
        // mid-flight and resumed before its status was rewritten.
        (Direction::Up, JobStatus::AwaitingCompensation)
        | (Direction::Up, JobStatus::InProgress) => Some(OrchestratorAction::CompensateChunk),
        (Direction::Up, JobStatus::Failed) => Some(OrchestratorAction::ResolveUpTerminal),
        (Direction::Up, JobStatus::Completed) | (Direction::Up, JobStatus::CompensationFailed) => {
            Some(OrchestratorAction::TerminalCleanup)
        }
        (Direction::Down, JobStatus::AwaitingCompensation)
        | (Direction::Up, JobStatus::New)
        | (Direction::Up, JobStatus::Pending) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_down_keys() {
        assert_eq!(
            action_for(Direction::Down, JobStatus::New),
            Some(OrchestratorAction::PromoteAndExecute)
        );
        assert_eq!(
            action_for(Direction::Down, JobStatus::Pending),
            Some(OrchestratorAction::PromoteAndExecute)
        );
        assert_eq!(
            action_for(Direction::Down, JobStatus::InProgress),
            Some(OrchestratorAction::ExecuteChunk)
        );
    }

    #[test]
    fn test_up_keys() {
        assert_eq!(
            action_for(Direction::Up, JobStatus::AwaitingCompensation),
            Some(OrchestratorAction::CompensateChunk)
        );
        assert_eq!(
            action_for(Direction::Up, JobStatus::InProgress),
            Some(OrchestratorAction::CompensateChunk)
        );
        assert_eq!(
            action_for(Direction::Up, JobStatus::Failed),
            Some(OrchestratorAction::ResolveUpTerminal)
        );
        assert_eq!(
            action_for(Direction::Up, JobStatus::Completed),
            Some(OrchestratorAction::TerminalCleanup)
        );
    }

    #[test]
    fn test_terminal_keys_are_cleanup() {
        for status in [JobStatus::Completed, JobStatus::Failed, JobStatus::CompensationFailed] {
            assert_eq!(
                action_for(Direction::Down, status),
                Some(OrchestratorAction::TerminalCleanup),
                "Down_{status}"
            );
        }
    }

    #[test]
    fn test_malformed_keys_are_rejected() {
        assert_eq!(action_for(Direction::Down, JobStatus::AwaitingCompensation), None);
        assert_eq!(action_for(Direction::Up, JobStatus::New), None);
        assert_eq!(action_for(Direction::Up, JobStatus::Pending), None);
    }
}
