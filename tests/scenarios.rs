//! End-to-end scenarios covering the documented engine guarantees.

use serde_json::json;

mod common;
use common::*;

#[tokio::test]
async fn pass_result_merges_at_result_path() {
    let result = run_plain(
        r#"{
            "StartAt": "Enrich",
            "States": {
                "Enrich": {
                    "Type": "Pass",
                    "Result": {"computed": "v"},
                    "ResultPath": "$.result",
                    "End": true
                }
            }
        }"#,
        json!({"original": "data"}),
    )
    .await;

    assert_success(&result);
    assert_eq!(
        result.output,
        json!({"original": "data", "result": {"computed": "v"}})
    );
    assert_path(&result, &["Enrich"]);
}

#[tokio::test]
async fn lambda_invoke_preserves_payload_envelope() {
    let result = run(
        r#"{
            "StartAt": "Call",
            "States": {
                "Call": {
                    "Type": "Task",
                    "Resource": "arn:aws:states:::lambda:invoke",
                    "ResultPath": "$.r",
                    "End": true
                }
            }
        }"#,
        r#"
mocks:
  - state: Call
    type: fixed
    response: {Payload: {a: 1}, StatusCode: 200}
"#,
        json!({"x": 1}),
    )
    .await;

    assert_success(&result);
    assert_eq!(
        result.output,
        json!({"x": 1, "r": {"Payload": {"a": 1}, "StatusCode": 200}})
    );
}

#[tokio::test]
async fn jsonata_output_extracts_payload_without_envelope() {
    let result = run(
        r#"{
            "QueryLanguage": "JSONata",
            "StartAt": "Call",
            "States": {
                "Call": {
                    "Type": "Task",
                    "Resource": "arn:aws:states:::lambda:invoke",
                    "Output": "{% $states.result.Payload %}",
                    "End": true
                }
            }
        }"#,
        r#"
mocks:
  - state: Call
    type: fixed
    response: {Payload: {a: 1}, StatusCode: 200}
"#,
        json!({"x": 1}),
    )
    .await;

    assert_success(&result);
    assert_eq!(result.output, json!({"a": 1}));
}

#[tokio::test]
async fn retry_succeeds_on_second_attempt() {
    let result = run(
        r#"{
            "StartAt": "Flaky",
            "States": {
                "Flaky": {
                    "Type": "Task",
                    "Resource": "arn:aws:states:::lambda:invoke",
                    "Retry": [{
                        "ErrorEquals": ["States.TaskFailed"],
                        "MaxAttempts": 2,
                        "IntervalSeconds": 1
                    }],
                    "End": true
                }
            }
        }"#,
        r#"
mocks:
  - state: Flaky
    type: stateful
    responses:
      - {error: {type: "States.TaskFailed"}}
      - {Payload: {ok: true}, StatusCode: 200}
"#,
        json!({}),
    )
    .await;

    assert_success(&result);
    assert_eq!(result.output, json!({"Payload": {"ok": true}, "StatusCode": 200}));

    let record = record_for(&result, "Flaky");
    assert_eq!(record.retries.len(), 1);
    assert_eq!(record.retries[0].error, "States.TaskFailed");
    // Pre-cap schedule is preserved even though the sleep is capped.
    assert_eq!(record.retries[0].backoff_ms, 1000);
    assert!(record.retries[0].slept_ms <= 100);
}

#[tokio::test]
async fn catch_routes_to_handler_with_error_payload() {
    let result = run(
        r#"{
            "StartAt": "Risky",
            "States": {
                "Risky": {
                    "Type": "Task",
                    "Resource": "arn:aws:states:::lambda:invoke",
                    "Catch": [{
                        "ErrorEquals": ["States.TaskFailed"],
                        "Next": "H",
                        "ResultPath": "$.error"
                    }],
                    "End": true
                },
                "H": {"Type": "Pass", "End": true}
            }
        }"#,
        r#"
mocks:
  - state: Risky
    type: error
    error: {type: "States.TaskFailed", cause: "boom"}
"#,
        json!({"d": "t"}),
    )
    .await;

    assert_success(&result);
    assert_path(&result, &["Risky", "H"]);
    assert_eq!(
        result.output,
        json!({"d": "t", "error": {"Error": "States.TaskFailed", "Cause": "boom"}})
    );
}

#[tokio::test]
async fn jsonata_choice_reads_workflow_variables() {
    let result = run_plain(
        r#"{
            "QueryLanguage": "JSONata",
            "StartAt": "Seed",
            "States": {
                "Seed": {
                    "Type": "Pass",
                    "Assign": {"orderTotal": 1300},
                    "Next": "Route"
                },
                "Route": {
                    "Type": "Choice",
                    "Choices": [
                        {"Condition": "{% $orderTotal > 1000 %}", "Next": "H"}
                    ],
                    "Default": "L"
                },
                "H": {"Type": "Succeed"},
                "L": {"Type": "Succeed"}
            }
        }"#,
        json!({}),
    )
    .await;

    assert_success(&result);
    assert_path(&result, &["Seed", "Route", "H"]);
}

#[tokio::test]
async fn assign_evaluates_against_precommit_variables() {
    let result = run_plain(
        r#"{
            "StartAt": "Seed",
            "States": {
                "Seed": {
                    "Type": "Pass",
                    "Assign": {"x": 3, "a": 6},
                    "Next": "Swap"
                },
                "Swap": {
                    "Type": "Pass",
                    "Assign": {"x.$": "$a", "nextX.$": "$x"},
                    "End": true
                }
            }
        }"#,
        json!({}),
    )
    .await;

    assert_success(&result);
    assert_eq!(variable(&result, "x"), &json!(6));
    assert_eq!(variable(&result, "nextX"), &json!(3));
    assert_eq!(variable(&result, "a"), &json!(6));
}

#[tokio::test]
async fn parallel_output_is_ordered_by_branch_declaration() {
    let result = run(
        r#"{
            "StartAt": "Fan",
            "States": {
                "Fan": {
                    "Type": "Parallel",
                    "Branches": [
                        {
                            "StartAt": "One",
                            "States": {
                                "One": {"Type": "Task", "Resource": "arn:aws:lambda:us-east-1:1:function:one", "End": true}
                            }
                        },
                        {
                            "StartAt": "Two",
                            "States": {
                                "Two": {"Type": "Task", "Resource": "arn:aws:lambda:us-east-1:1:function:two", "End": true}
                            }
                        }
                    ],
                    "End": true
                }
            }
        }"#,
        r#"
mocks:
  - state: One
    type: fixed
    response: 1
  - state: Two
    type: fixed
    response: 2
"#,
        json!({}),
    )
    .await;

    assert_success(&result);
    assert_eq!(result.output, json!([1, 2]));
    assert_path(&result, &["Fan"]);

    let branch_indexes: Vec<Option<usize>> = result
        .parallel_executions
        .iter()
        .map(|record| record.branch_index)
        .collect();
    assert_eq!(branch_indexes, vec![Some(0), Some(1)]);
}
