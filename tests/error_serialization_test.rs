//! Wire-format guarantees for marshalled error chains.

mod common;

use common::Harness;
use saga_core::{RecordError, SagaError, SerializableError, StepError};

#[tokio::test]
async fn marshalled_chain_survives_a_json_round_trip() {
    let root = StepError::permanent("row lock contention").with_record_errors(vec![
        RecordError {
            record_index: 0,
            status_code: "UNABLE_TO_LOCK_ROW".to_string(),
            status_message: "could not obtain exclusive access".to_string(),
            fields: vec![],
        },
        RecordError {
            record_index: 7,
            status_code: "FIELD_CUSTOM_VALIDATION_EXCEPTION".to_string(),
            status_message: "owner must be active".to_string(),
            fields: vec!["OwnerId".to_string()],
        },
    ]);
    let outer = StepError::exhausted(3, root);
    let marshalled = SerializableError::from_step_error(&outer);

    let json = serde_json::to_string(&marshalled).unwrap();
    let parsed: SerializableError = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, marshalled);

    // Type, message, and the full cause chain are preserved.
    let chain = parsed.cause_chain();
    assert_eq!(chain.len(), 2);
    assert_eq!(chain[0].error_type, "RetryableFailure");
    assert_eq!(chain[0].message, "Action failed after 3 attempts.");
    assert_eq!(chain[1].error_type, "PermanentFailure");
    assert_eq!(chain[1].message, "row lock contention");
    let dml = chain[1].dml_errors.as_ref().unwrap();
    assert_eq!(dml.len(), 2);
    assert_eq!(dml[1].fields, vec!["OwnerId".to_string()]);
}

#[tokio::test]
async fn initialization_failures_marshal_with_their_cause() {
    let err = SagaError::step_construction("AbstractStep", "missing collaborator".into());
    let marshalled = SerializableError::from_saga_error(&err);
    assert_eq!(marshalled.error_type, "StepInitializationError");
    let cause = marshalled.cause.as_ref().unwrap();
    assert_eq!(cause.message, "missing collaborator");
}

#[tokio::test]
async fn failed_job_carries_a_marshalled_chain_in_storage_form() {
    let harness = Harness::new();
    let orchestrator = harness.orchestrator();
    let mut job = harness.create_job(&["permanent"]).await;
    orchestrator.run_unit(&mut job).await.unwrap();

    // The details round-trip through the job's serde representation the
    // same way a provider persists them.
    let stored = serde_json::to_string(&job).unwrap();
    let reloaded: saga_core::JobState = serde_json::from_str(&stored).unwrap();
    let details = reloaded.final_error_details.unwrap();
    assert_eq!(details.error_type, "PermanentFailure");
    assert_eq!(details.message, "unrecoverable");
}

#[tokio::test]
async fn wire_field_names_are_stable() {
    let marshalled = SerializableError::new("ValidationError", "bad input")
        .with_cause(SerializableError::new("Error", "root"));
    let value = serde_json::to_value(&marshalled).unwrap();
    assert_eq!(value["type"], "ValidationError");
    assert_eq!(value["message"], "bad input");
    assert_eq!(value["cause"]["message"], "root");
    // Optional fields stay off the wire when absent.
    assert!(value.get("dml_errors").is_none());
    assert!(value.get("stack_trace").is_none());
}
