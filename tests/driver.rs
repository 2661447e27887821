//! Driver loop behavior: guards, transitions, records, and data flow.

use serde_json::json;
use stepsim::config::ExecutionConfig;
use stepsim::errors::StatesError;
use stepsim::exec::DriverError;

mod common;
use common::*;

#[tokio::test]
async fn step_guard_aborts_cycles_with_a_driver_error() {
    let err = driver(
        r#"{
            "StartAt": "A",
            "States": {
                "A": {"Type": "Pass", "Next": "B"},
                "B": {"Type": "Pass", "Next": "A"}
            }
        }"#,
        "mocks: []",
    )
    .with_config(ExecutionConfig::default().with_max_steps(10))
    .execute(json!({}))
    .await
    .unwrap_err();

    assert!(matches!(err, DriverError::MaxStepsExceeded { max_steps: 10 }));
    assert!(err.to_string().contains("maximum step count"));
}

#[tokio::test]
async fn choice_comparators_route_and_fall_through() {
    let machine = r#"{
        "StartAt": "Route",
        "States": {
            "Route": {
                "Type": "Choice",
                "Choices": [
                    {"Variable": "$.n", "NumericGreaterThan": 10, "Next": "Big"},
                    {"Variable": "$.n", "NumericGreaterThan": 5, "Next": "Medium"}
                ],
                "Default": "Small"
            },
            "Big": {"Type": "Succeed"},
            "Medium": {"Type": "Succeed"},
            "Small": {"Type": "Succeed"}
        }
    }"#;

    let result = run_plain(machine, json!({"n": 50})).await;
    assert_path(&result, &["Route", "Big"]);

    let result = run_plain(machine, json!({"n": 7})).await;
    assert_path(&result, &["Route", "Medium"]);

    let result = run_plain(machine, json!({"n": 1})).await;
    assert_path(&result, &["Route", "Small"]);

    // A missing variable matches nothing and falls to Default.
    let result = run_plain(machine, json!({})).await;
    assert_path(&result, &["Route", "Small"]);
}

#[tokio::test]
async fn choice_is_present_distinguishes_null_from_missing() {
    let machine = r#"{
        "StartAt": "Route",
        "States": {
            "Route": {
                "Type": "Choice",
                "Choices": [
                    {"Variable": "$.flag", "IsPresent": true, "Next": "Has"}
                ],
                "Default": "Lacks"
            },
            "Has": {"Type": "Succeed"},
            "Lacks": {"Type": "Succeed"}
        }
    }"#;

    let result = run_plain(machine, json!({"flag": null})).await;
    assert_path(&result, &["Route", "Has"]);

    let result = run_plain(machine, json!({})).await;
    assert_path(&result, &["Route", "Lacks"]);
}

#[tokio::test]
async fn choice_combinators_nest() {
    let machine = r#"{
        "StartAt": "Route",
        "States": {
            "Route": {
                "Type": "Choice",
                "Choices": [
                    {
                        "And": [
                            {"Variable": "$.a", "NumericGreaterThan": 0},
                            {"Not": {"Variable": "$.b", "StringEquals": "skip"}}
                        ],
                        "Next": "Yes"
                    }
                ],
                "Default": "No"
            },
            "Yes": {"Type": "Succeed"},
            "No": {"Type": "Succeed"}
        }
    }"#;

    let result = run_plain(machine, json!({"a": 1, "b": "go"})).await;
    assert_path(&result, &["Route", "Yes"]);

    let result = run_plain(machine, json!({"a": 1, "b": "skip"})).await;
    assert_path(&result, &["Route", "No"]);
}

#[tokio::test]
async fn null_input_and_output_paths_discard() {
    let result = run_plain(
        r#"{
            "StartAt": "Shred",
            "States": {
                "Shred": {"Type": "Pass", "InputPath": null, "Next": "Done"},
                "Done": {"Type": "Pass", "OutputPath": null, "End": true}
            }
        }"#,
        json!({"noise": true}),
    )
    .await;

    assert_success(&result);
    assert_eq!(result.output, json!({}));
    let shredded = record_for(&result, "Shred");
    assert_eq!(shredded.output, Some(json!({})));
}

#[tokio::test]
async fn wait_records_duration_without_sleeping() {
    let started = std::time::Instant::now();
    let result = run_plain(
        r#"{
            "StartAt": "Hold",
            "States": {
                "Hold": {"Type": "Wait", "Seconds": 3600, "End": true}
            }
        }"#,
        json!({"kept": 1}),
    )
    .await;

    assert_success(&result);
    assert_eq!(result.output, json!({"kept": 1}));
    let record = record_for(&result, "Hold");
    assert_eq!(record.wait.as_ref().unwrap().requested_ms, 3_600_000);
    assert!(started.elapsed().as_secs() < 60, "wait must be simulated");
}

#[tokio::test]
async fn fail_state_defaults_and_customs() {
    let result = run_plain(
        r#"{
            "StartAt": "Bad",
            "States": {"Bad": {"Type": "Fail"}}
        }"#,
        json!({}),
    )
    .await;
    assert_failed_with(&result, "States.Failed");
    assert_eq!(result.error.as_ref().unwrap().cause, "State failed");

    let result = run_plain(
        r#"{
            "StartAt": "Bad",
            "States": {"Bad": {"Type": "Fail", "Error": "Orders.NotFound", "Cause": "no such order"}}
        }"#,
        json!({}),
    )
    .await;
    assert_failed_with(&result, "Orders.NotFound");
    assert_eq!(result.error.as_ref().unwrap().cause, "no such order");
}

#[tokio::test]
async fn payload_limit_raises_data_limit_exceeded() {
    let result = run_with_config(
        r#"{
            "StartAt": "Grow",
            "States": {
                "Grow": {"Type": "Pass", "Result": {"blob": "0123456789012345678901234567890123456789"}, "End": true}
            }
        }"#,
        "mocks: []",
        ExecutionConfig::default().with_max_payload_bytes(16),
        json!({}),
    )
    .await;

    assert_failed_with(&result, StatesError::DATA_LIMIT_EXCEEDED);
}

#[tokio::test]
async fn parameters_evaluation_error_is_catchable() {
    let result = run(
        r#"{
            "StartAt": "Shaky",
            "States": {
                "Shaky": {
                    "Type": "Task",
                    "Resource": "arn:aws:lambda:us-east-1:1:function:f",
                    "Parameters": {"missing.$": "$.does.not.exist"},
                    "Catch": [{"ErrorEquals": ["States.Runtime"], "Next": "Saved"}],
                    "End": true
                },
                "Saved": {"Type": "Pass", "End": true}
            }
        }"#,
        r#"
mocks:
  - state: Shaky
    type: fixed
    response: {unused: true}
"#,
        json!({}),
    )
    .await;

    assert_success(&result);
    assert_path(&result, &["Shaky", "Saved"]);
    // The whole input is replaced by the fault payload (default ResultPath).
    assert_eq!(result.output["Error"], json!("States.Runtime"));
}

#[tokio::test]
async fn records_capture_inputs_outputs_and_variables() {
    let result = run_plain(
        r#"{
            "StartAt": "First",
            "States": {
                "First": {
                    "Type": "Pass",
                    "Result": {"stage": 1},
                    "Assign": {"seen": true},
                    "Next": "Second"
                },
                "Second": {"Type": "Pass", "End": true}
            }
        }"#,
        json!({"start": true}),
    )
    .await;

    assert_success(&result);
    let first = record_for(&result, "First");
    assert_eq!(first.input, json!({"start": true}));
    assert_eq!(first.output, Some(json!({"stage": 1})));
    assert_eq!(first.variables_after.get("seen"), Some(&json!(true)));

    let second = record_for(&result, "Second");
    assert_eq!(second.input, json!({"stage": 1}));
}
