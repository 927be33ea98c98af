//! End-to-end saga lifecycle scenarios driven one unit of work at a time
//! through the single-job orchestrator.

mod common;

use common::Harness;
use saga_core::{Direction, JobStatus, SagaConfig, StepStatus, UnitOutcome};

#[tokio::test]
async fn two_step_happy_path_completes_in_two_units() {
    let harness = Harness::new();
    let orchestrator = harness.orchestrator();
    let mut job = harness.create_job(&["immediate", "immediate-b"]).await;

    let first = orchestrator.run_unit(&mut job).await.unwrap();
    assert_eq!(first, UnitOutcome::Continue);
    assert_eq!(job.status, JobStatus::InProgress);
    assert_eq!(job.current_step_index, 1);
    assert_eq!(job.steps[0].status, StepStatus::Completed);

    let second = orchestrator.run_unit(&mut job).await.unwrap();
    assert_eq!(second, UnitOutcome::Terminal(JobStatus::Completed));
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.current_step_index, 2);
    assert_eq!(job.steps[1].status, StepStatus::Completed);
    assert_eq!(harness.finalizer_invocations(), 1);
    assert!(job.finalizer_executed);
}

#[tokio::test]
async fn reversible_failure_compensates_in_reverse_order() {
    let harness = Harness::new();
    let orchestrator = harness.orchestrator();
    let mut job = harness.create_job(&["immediate", "flaky"]).await;

    // Step 0 completes.
    assert_eq!(orchestrator.run_unit(&mut job).await.unwrap(), UnitOutcome::Continue);

    // Step 1 exhausts its retries and turns the job around.
    assert_eq!(orchestrator.run_unit(&mut job).await.unwrap(), UnitOutcome::Continue);
    assert_eq!(job.direction, Direction::Up);
    assert_eq!(job.status, JobStatus::AwaitingCompensation);
    assert_eq!(job.current_step_index, 1);
    assert_eq!(job.steps[1].status, StepStatus::Failed);

    // The failing step compensates first.
    assert_eq!(orchestrator.run_unit(&mut job).await.unwrap(), UnitOutcome::Continue);
    assert_eq!(job.steps[1].status, StepStatus::Compensated);
    assert_eq!(job.current_step_index, 0);

    // Then the previously completed step.
    assert_eq!(orchestrator.run_unit(&mut job).await.unwrap(), UnitOutcome::Continue);
    assert_eq!(job.steps[0].status, StepStatus::Compensated);
    assert_eq!(job.current_step_index, -1);

    // Final unit selects the terminal status.
    assert_eq!(
        orchestrator.run_unit(&mut job).await.unwrap(),
        UnitOutcome::Terminal(JobStatus::Failed)
    );
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.current_step_index, -1);
    assert_eq!(harness.finalizer_invocations(), 1);

    assert_eq!(
        harness.log.collapsed(),
        vec![
            "execute:immediate",
            "execute:flaky",
            "compensate:flaky",
            "compensate:immediate",
        ]
    );
}

#[tokio::test]
async fn permanent_failure_terminates_without_compensation() {
    let harness = Harness::new();
    let orchestrator = harness.orchestrator();
    let mut job = harness.create_job(&["permanent"]).await;

    assert_eq!(
        orchestrator.run_unit(&mut job).await.unwrap(),
        UnitOutcome::Terminal(JobStatus::Failed)
    );
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.direction, Direction::Down);
    assert_eq!(job.steps[0].status, StepStatus::Failed);

    let details = job.final_error_details.as_ref().expect("error details recorded");
    assert_eq!(details.error_type, "PermanentFailure");
    assert_eq!(details.message, "unrecoverable");

    // No compensation was attempted.
    assert!(harness
        .log
        .entries()
        .iter()
        .all(|entry| !entry.starts_with("compensate:")));
}

#[tokio::test]
async fn failed_compensation_marks_the_job_compensation_failed() {
    let harness = Harness::new();
    let orchestrator = harness.orchestrator();
    let mut job = harness.create_job(&["compensate-fails", "flaky"]).await;

    // Forward: step 0 ok, step 1 pivots the job.
    orchestrator.run_unit(&mut job).await.unwrap();
    orchestrator.run_unit(&mut job).await.unwrap();
    assert_eq!(job.direction, Direction::Up);

    // Step 1 rolls back cleanly.
    orchestrator.run_unit(&mut job).await.unwrap();
    assert_eq!(job.steps[1].status, StepStatus::Compensated);

    // Step 0's compensation fails permanently.
    assert_eq!(
        orchestrator.run_unit(&mut job).await.unwrap(),
        UnitOutcome::Terminal(JobStatus::CompensationFailed)
    );
    assert_eq!(job.status, JobStatus::CompensationFailed);
    assert_eq!(job.steps[0].status, StepStatus::Failed);
    assert_eq!(harness.finalizer_invocations(), 1);
}

#[tokio::test]
async fn finalizer_runs_at_most_once_across_extra_invocations() {
    let harness = Harness::new();
    let orchestrator = harness.orchestrator();
    let mut job = harness.create_job(&["immediate"]).await;

    assert_eq!(
        orchestrator.run_unit(&mut job).await.unwrap(),
        UnitOutcome::Terminal(JobStatus::Completed)
    );
    // Terminal jobs tolerate redelivery without re-running the finalizer.
    for _ in 0..3 {
        assert_eq!(
            orchestrator.run_unit(&mut job).await.unwrap(),
            UnitOutcome::Terminal(JobStatus::Completed)
        );
    }
    assert_eq!(harness.finalizer_invocations(), 1);
}

#[tokio::test]
async fn liveness_every_configuration_reaches_a_terminal_status() {
    let harness = Harness::new();
    let orchestrator = harness.orchestrator();

    for executors in [
        vec!["immediate"],
        vec!["immediate", "immediate-b", "chunked-3"],
        vec!["immediate", "flaky"],
        vec!["compensate-fails", "flaky"],
        vec!["permanent"],
    ] {
        let mut job = harness.create_job(&executors).await;
        let mut units = 0;
        while !job.is_terminal() {
            orchestrator.run_unit(&mut job).await.unwrap();
            units += 1;
            assert!(units < 50, "job did not terminate: {executors:?}");
        }
    }
}

#[tokio::test]
async fn forward_and_compensation_visit_steps_in_index_order() {
    let harness = Harness::new();
    let orchestrator = harness.orchestrator();
    let mut job = harness
        .create_job(&["immediate", "immediate-b", "flaky"])
        .await;

    while !job.is_terminal() {
        orchestrator.run_unit(&mut job).await.unwrap();
    }

    assert_eq!(
        harness.log.collapsed(),
        vec![
            "execute:immediate",
            "execute:immediate-b",
            "execute:flaky",
            "compensate:flaky",
            "compensate:immediate-b",
            "compensate:immediate",
        ]
    );
}

#[tokio::test]
async fn pivot_policy_can_skip_the_failing_steps_compensation() {
    let mut config = SagaConfig::for_testing();
    config.compensate_failed_step = false;
    let harness = Harness::with_config(config);
    let orchestrator = harness.orchestrator();
    let mut job = harness.create_job(&["immediate", "flaky"]).await;

    while !job.is_terminal() {
        orchestrator.run_unit(&mut job).await.unwrap();
    }

    assert_eq!(job.status, JobStatus::Failed);
    // The failing step keeps its audit status and was never compensated.
    assert_eq!(job.steps[1].status, StepStatus::Failed);
    assert_eq!(job.steps[0].status, StepStatus::Compensated);
    assert!(!harness.log.entries().contains(&"compensate:flaky".to_string()));
}

#[tokio::test]
async fn up_in_progress_is_accepted_as_a_compensation_alias() {
    let harness = Harness::new();
    let orchestrator = harness.orchestrator();
    let mut job = harness.create_job(&["immediate"]).await;

    // Run the step forward, then hand-craft a job resumed mid-flip: the
    // direction flipped but the status rewrite never landed.
    orchestrator.run_unit(&mut job).await.unwrap();
    job.status = JobStatus::InProgress;
    job.direction = Direction::Up;
    job.current_step_index = 0;
    job.finalizer_executed = false;

    while !job.is_terminal() {
        orchestrator.run_unit(&mut job).await.unwrap();
    }
    assert_eq!(job.steps[0].status, StepStatus::Compensated);
}
