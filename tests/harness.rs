//! Test-suite harness behavior.

use stepsim::asl::StateMachine;
use stepsim::harness::{SuiteRunner, TestSuite};
use stepsim::mock::MockFile;

const MACHINE: &str = r#"{
    "StartAt": "Fetch",
    "States": {
        "Fetch": {
            "Type": "Task",
            "Resource": "arn:aws:states:::lambda:invoke",
            "ResultPath": "$.order",
            "Next": "Done"
        },
        "Done": {"Type": "Succeed"}
    }
}"#;

const MOCKS: &str = r#"
mocks:
  - state: Fetch
    type: fixed
    response: {Payload: {id: "o-1", total: 42}, StatusCode: 200}
"#;

fn runner() -> SuiteRunner {
    SuiteRunner::new(
        StateMachine::from_json_str(MACHINE).unwrap(),
        MockFile::from_yaml_str(MOCKS).unwrap(),
    )
}

#[tokio::test]
async fn passing_suite_reports_green() {
    let suite = TestSuite::from_yaml_str(
        r#"
name: order suite
testCases:
  - name: happy path
    input: {requestId: "r-1"}
    expectedOutput: {order: {Payload: {id: "o-1"}}}
    expectedPath: [Fetch, Done]
    stateExpectations:
      - state: Fetch
        input: {requestId: "r-1"}
        output: {order: {Payload: {total: 42}}}
"#,
    )
    .unwrap();

    let report = runner().run(&suite).await;
    assert!(report.all_passed(), "failures: {:?}", report.cases);
    assert_eq!(report.passed_count(), 1);
}

#[tokio::test]
async fn partial_matching_ignores_extra_fields_but_exact_does_not() {
    let suite = TestSuite::from_yaml_str(
        r#"
testCases:
  - name: partial
    input: {}
    expectedOutput: {order: {StatusCode: 200}}
  - name: exact
    input: {}
    outputMatching: exact
    expectedOutput: {order: {StatusCode: 200}}
"#,
    )
    .unwrap();

    let report = runner().run(&suite).await;
    assert_eq!(report.passed_count(), 1);
    assert_eq!(report.failed_count(), 1);
    let exact = &report.cases[1];
    assert!(!exact.passed);
    assert!(exact.failures[0].contains("output mismatch"));
}

#[tokio::test]
async fn wrong_path_and_missing_state_are_reported() {
    let suite = TestSuite::from_yaml_str(
        r#"
testCases:
  - name: wrong expectations
    input: {}
    expectedPath: [Fetch, Ship, Done]
    stateExpectations:
      - state: Ship
        output: {carrier: "fast"}
"#,
    )
    .unwrap();

    let report = runner().run(&suite).await;
    let case = &report.cases[0];
    assert!(!case.passed);
    assert!(case.failures.iter().any(|f| f.contains("path mismatch")));
    assert!(case.failures.iter().any(|f| f.contains("never executed")));
}

#[tokio::test]
async fn per_case_mocks_override_the_base_set() {
    let suite = TestSuite::from_yaml_str(
        r#"
testCases:
  - name: overridden
    input: {}
    expectedOutput: {order: {Payload: {id: "o-override"}}}
    mocks:
      - state: Fetch
        type: fixed
        response: {Payload: {id: "o-override"}, StatusCode: 200}
"#,
    )
    .unwrap();

    let report = runner().run(&suite).await;
    assert!(report.all_passed(), "failures: {:?}", report.cases);
}

#[tokio::test]
async fn suite_loads_referenced_files_relative_to_itself() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("machine.asl.json"), MACHINE).unwrap();
    std::fs::write(dir.path().join("mocks.yaml"), MOCKS).unwrap();
    std::fs::write(
        dir.path().join("suite.yaml"),
        r#"
version: "1.0"
name: file suite
stateMachine: machine.asl.json
baseMock: mocks.yaml
testCases:
  - name: loads and runs
    input: {}
    expectedPath: [Fetch, Done]
"#,
    )
    .unwrap();

    let (runner, suite) = SuiteRunner::from_suite_file(dir.path().join("suite.yaml")).unwrap();
    assert_eq!(suite.name.as_deref(), Some("file suite"));
    let report = runner.run(&suite).await;
    assert!(report.all_passed(), "failures: {:?}", report.cases);
}

#[tokio::test]
async fn execution_failure_fails_the_case() {
    let suite = TestSuite::from_yaml_str(
        r#"
testCases:
  - name: boom
    input: {}
    mocks:
      - state: Fetch
        type: error
        error: {type: "States.TaskFailed", cause: "down"}
"#,
    )
    .unwrap();

    let report = runner().run(&suite).await;
    let case = &report.cases[0];
    assert!(!case.passed);
    assert!(case.failures[0].contains("States.TaskFailed"));
}
