#![allow(dead_code)]

use serde_json::Value;
use stepsim::exec::ExecutionResult;

pub fn assert_success(result: &ExecutionResult) {
    assert!(
        result.success,
        "expected success, got error {:?} (path {:?})",
        result.error, result.path
    );
}

pub fn assert_path(result: &ExecutionResult, expected: &[&str]) {
    let actual: Vec<&str> = result.path.iter().map(String::as_str).collect();
    assert_eq!(actual, expected, "execution path mismatch");
}

pub fn assert_failed_with(result: &ExecutionResult, error: &str) {
    assert!(!result.success, "expected failure, got {:?}", result.output);
    let fault = result.error.as_ref().expect("failure carries a fault");
    assert_eq!(fault.error, error, "fault name mismatch: {fault:?}");
}

/// The record of a named top-level state, panicking when it never ran.
pub fn record_for<'a>(
    result: &'a ExecutionResult,
    state: &str,
) -> &'a stepsim::exec::StateExecutionRecord {
    result
        .state_executions
        .iter()
        .find(|record| record.state == state)
        .unwrap_or_else(|| panic!("state '{state}' has no execution record"))
}

pub fn variable<'a>(result: &'a ExecutionResult, name: &str) -> &'a Value {
    result
        .final_variables()
        .and_then(|variables| variables.get(name))
        .unwrap_or_else(|| panic!("variable '{name}' is not bound"))
}
