//! Lints for mock and test files.
//!
//! The validator cross-checks a mock file (and optionally a test file)
//! against the state machine they target and reports a list of issues.
//! Errors describe configurations the engine will reject or silently
//! mis-serve at run time (unknown states, duplicate mocks, non-array Map
//! responses); warnings describe configurations that work but usually mean
//! the author misunderstood a contract (missing Lambda `Payload`
//! envelopes, exact output matching, hardcoded timestamps).

use std::fmt;

use chrono::DateTime;
use serde_json::Value;

use crate::asl::{State, StateMachine};
use crate::harness::TestSuite;
use crate::harness::suite::OutputMatching;
use crate::mock::{MockDefinition, MockFile, MockStrategy};

/// Severity of one finding.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IssueLevel {
    Error,
    Warning,
    Info,
}

impl fmt::Display for IssueLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IssueLevel::Error => write!(f, "error"),
            IssueLevel::Warning => write!(f, "warning"),
            IssueLevel::Info => write!(f, "info"),
        }
    }
}

/// One finding, with an optional fix suggestion.
#[derive(Clone, Debug)]
pub struct ValidationIssue {
    pub level: IssueLevel,
    pub message: String,
    pub suggestion: Option<String>,
}

impl ValidationIssue {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: IssueLevel::Error,
            message: message.into(),
            suggestion: None,
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            level: IssueLevel::Warning,
            message: message.into(),
            suggestion: None,
        }
    }

    #[must_use]
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }
}

/// True when any issue is an error (warnings alone never block).
#[must_use]
pub fn has_errors(issues: &[ValidationIssue]) -> bool {
    issues.iter().any(|issue| issue.level == IssueLevel::Error)
}

/// Validate a mock file against the machine it targets.
pub fn validate_mock_file(machine: &StateMachine, mocks: &MockFile) -> Vec<ValidationIssue> {
    let known_states = collect_state_names(machine);
    let mut issues = Vec::new();

    let mut seen = Vec::new();
    for mock in &mocks.mocks {
        if seen.contains(&&mock.state) {
            issues.push(ValidationIssue::error(format!(
                "duplicate mock for state '{}'; only the first is used",
                mock.state
            )));
        }
        seen.push(&mock.state);

        if !known_states.iter().any(|name| *name == mock.state) {
            let mut issue = ValidationIssue::error(format!(
                "mocked state '{}' does not exist in the state machine",
                mock.state
            ));
            if let Some(closest) = closest_name(&mock.state, &known_states) {
                issue = issue.with_suggestion(format!("did you mean '{closest}'?"));
            }
            issues.push(issue);
            continue;
        }

        let state = find_state(machine, &mock.state);
        check_lambda_envelope(&mut issues, mock, state);
        check_map_responses(&mut issues, mock, state);
    }

    issues
}

/// Validate a test file against the machine it targets.
pub fn validate_test_suite(machine: &StateMachine, suite: &TestSuite) -> Vec<ValidationIssue> {
    let known_states = collect_state_names(machine);
    let mut issues = Vec::new();

    for case in &suite.test_cases {
        if case.output_matching == OutputMatching::Exact {
            issues.push(
                ValidationIssue::warning(format!(
                    "test case '{}' uses outputMatching: exact",
                    case.name
                ))
                .with_suggestion(
                    "partial matching is more robust against incidental output fields",
                ),
            );
        }

        if let Some(expected_path) = &case.expected_path {
            for step in expected_path {
                if !known_states.iter().any(|name| name == step) {
                    let mut issue = ValidationIssue::error(format!(
                        "test case '{}': expectedPath names unknown state '{step}'",
                        case.name
                    ));
                    if let Some(closest) = closest_name(step, &known_states) {
                        issue = issue.with_suggestion(format!("did you mean '{closest}'?"));
                    }
                    issues.push(issue);
                }
            }
        }

        if let Some(expected) = &case.expected_output {
            check_timestamps(&mut issues, &case.name, expected);
        }

        for expectation in &case.state_expectations {
            if !known_states.iter().any(|name| *name == expectation.state) {
                let mut issue = ValidationIssue::error(format!(
                    "test case '{}': stateExpectations names unknown state '{}'",
                    case.name, expectation.state
                ));
                if let Some(closest) = closest_name(&expectation.state, &known_states) {
                    issue = issue.with_suggestion(format!("did you mean '{closest}'?"));
                }
                issues.push(issue);
                continue;
            }
            if let Some(expected) = &expectation.output {
                check_timestamps(&mut issues, &case.name, expected);
                check_jsonata_payload_expectation(
                    &mut issues,
                    machine,
                    &case.name,
                    &expectation.state,
                    expected,
                );
            }
        }
    }

    issues
}

fn check_lambda_envelope(
    issues: &mut Vec<ValidationIssue>,
    mock: &MockDefinition,
    state: Option<&State>,
) {
    let Some(State::Task(task)) = state else {
        return;
    };
    if !task.is_lambda_invoke() {
        return;
    }

    let lacks_payload =
        |value: &Value| value.is_object() && value.get("Payload").is_none();

    if let Some(response) = &mock.response {
        if lacks_payload(response) {
            issues.push(
                ValidationIssue::warning(format!(
                    "mock for Lambda state '{}' returns a response without a Payload envelope",
                    mock.state
                ))
                .with_suggestion(
                    "wrap the response as {Payload: ..., StatusCode: 200}; the engine auto-wraps, \
                     but explicit envelopes keep expectations honest",
                ),
            );
        }
    }
    for condition in &mock.conditions {
        if let Some(when) = &condition.when {
            if lacks_payload(&when.input) {
                issues.push(
                    ValidationIssue::warning(format!(
                        "conditional mock for Lambda state '{}' matches on when.input without a \
                         Payload wrapper",
                        mock.state
                    ))
                    .with_suggestion(
                        "Lambda task inputs carry {FunctionName, Payload}; match on when.input.Payload",
                    ),
                );
            }
        }
        if let Some(response) = &condition.response {
            if lacks_payload(response) {
                issues.push(
                    ValidationIssue::warning(format!(
                        "conditional mock for Lambda state '{}' has a response without a Payload \
                         envelope",
                        mock.state
                    ))
                    .with_suggestion("wrap the response as {Payload: ..., StatusCode: 200}"),
                );
            }
        }
    }
}

fn check_map_responses(
    issues: &mut Vec<ValidationIssue>,
    mock: &MockDefinition,
    state: Option<&State>,
) {
    let has_result_writer = match state {
        Some(State::DistributedMap(map)) => map.result_writer.is_some(),
        Some(State::Map(_)) => false,
        _ => return,
    };
    if has_result_writer || mock.strategy == MockStrategy::ItemReader {
        return;
    }
    let mut offenders = Vec::new();
    if let Some(response) = &mock.response {
        if !response.is_array() {
            offenders.push(response);
        }
    }
    offenders.extend(
        mock.responses
            .iter()
            .filter(|response| !response.is_array()),
    );
    if !offenders.is_empty() {
        issues.push(
            ValidationIssue::error(format!(
                "mock for Map state '{}' must return an array of per-item results",
                mock.state
            ))
            .with_suggestion("a Map's output is ordered by input item index"),
        );
    }
}

fn check_timestamps(issues: &mut Vec<ValidationIssue>, case: &str, expected: &Value) {
    let mut found = Vec::new();
    collect_timestamp_strings(expected, &mut found);
    for stamp in found {
        issues.push(
            ValidationIssue::warning(format!(
                "test case '{case}': expectation contains hardcoded timestamp '{stamp}'"
            ))
            .with_suggestion("timestamps differ between runs; assert on stable fields instead"),
        );
    }
}

fn collect_timestamp_strings(value: &Value, found: &mut Vec<String>) {
    match value {
        Value::String(text) => {
            if DateTime::parse_from_rfc3339(text).is_ok() {
                found.push(text.clone());
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_timestamp_strings(item, found);
            }
        }
        Value::Object(map) => {
            for item in map.values() {
                collect_timestamp_strings(item, found);
            }
        }
        _ => {}
    }
}

/// A JSONata state whose `Output` extracts `$states.result.Payload`
/// produces the payload content itself; expecting a `Payload` wrapper on
/// top of that is a category error.
fn check_jsonata_payload_expectation(
    issues: &mut Vec<ValidationIssue>,
    machine: &StateMachine,
    case: &str,
    state_name: &str,
    expected_output: &Value,
) {
    let Some(state) = find_state(machine, state_name) else {
        return;
    };
    let Some(Value::String(output)) = &state.common().output else {
        return;
    };
    if output.contains("$states.result.Payload")
        && expected_output.get("Payload").is_some()
    {
        issues.push(
            ValidationIssue::warning(format!(
                "test case '{case}': state '{state_name}' extracts $states.result.Payload, so \
                 its expected output should not contain a Payload wrapper"
            ))
            .with_suggestion("assert on the payload content directly"),
        );
    }
}

/// All state names, including those nested in ItemProcessors and Branches
/// (mocks reference nested states by bare name).
fn collect_state_names(machine: &StateMachine) -> Vec<String> {
    let mut names = Vec::new();
    collect_into(machine, &mut names);
    names
}

fn collect_into(machine: &StateMachine, names: &mut Vec<String>) {
    for (name, state) in &machine.states {
        names.push(name.clone());
        match state {
            State::Map(map) => collect_into(&map.item_processor, names),
            State::DistributedMap(map) => collect_into(&map.item_processor, names),
            State::Parallel(parallel) => {
                for branch in &parallel.branches {
                    collect_into(branch, names);
                }
            }
            _ => {}
        }
    }
}

/// Depth-first lookup by bare name, nested machines included.
fn find_state<'a>(machine: &'a StateMachine, name: &str) -> Option<&'a State> {
    if let Some(state) = machine.states.get(name) {
        return Some(state);
    }
    for state in machine.states.values() {
        let found = match state {
            State::Map(map) => find_state(&map.item_processor, name),
            State::DistributedMap(map) => find_state(&map.item_processor, name),
            State::Parallel(parallel) => parallel
                .branches
                .iter()
                .find_map(|branch| find_state(branch, name)),
            _ => None,
        };
        if found.is_some() {
            return found;
        }
    }
    None
}

/// The closest known name within an edit distance that still looks like a
/// typo rather than a different state.
fn closest_name(unknown: &str, known: &[String]) -> Option<String> {
    known
        .iter()
        .map(|name| (strsim::levenshtein(unknown, name), name))
        .filter(|(distance, _)| *distance <= 3)
        .min_by_key(|(distance, _)| *distance)
        .map(|(_, name)| name.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn machine() -> StateMachine {
        StateMachine::from_json_str(
            r#"{
                "StartAt": "FetchOrder",
                "States": {
                    "FetchOrder": {
                        "Type": "Task",
                        "Resource": "arn:aws:states:::lambda:invoke",
                        "Next": "Done"
                    },
                    "Done": {"Type": "Succeed"}
                }
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn unknown_state_gets_a_suggestion() {
        let mocks = MockFile::from_yaml_str(
            r#"
mocks:
  - state: FetchOrdr
    type: fixed
    response: {Payload: {}, StatusCode: 200}
"#,
        )
        .unwrap();
        let issues = validate_mock_file(&machine(), &mocks);
        assert!(has_errors(&issues));
        let issue = &issues[0];
        assert!(issue.message.contains("FetchOrdr"));
        assert_eq!(
            issue.suggestion.as_deref(),
            Some("did you mean 'FetchOrder'?")
        );
    }

    #[test]
    fn lambda_mock_without_payload_warns() {
        let mocks = MockFile::from_yaml_str(
            r#"
mocks:
  - state: FetchOrder
    type: fixed
    response: {orderId: "o-1"}
"#,
        )
        .unwrap();
        let issues = validate_mock_file(&machine(), &mocks);
        assert!(!has_errors(&issues));
        assert!(issues.iter().any(|issue| {
            issue.level == IssueLevel::Warning && issue.message.contains("Payload envelope")
        }));
    }

    #[test]
    fn duplicate_mocks_are_errors() {
        let mocks = MockFile::from_yaml_str(
            r#"
mocks:
  - state: FetchOrder
    type: fixed
    response: {Payload: {}, StatusCode: 200}
  - state: FetchOrder
    type: fixed
    response: {Payload: {}, StatusCode: 200}
"#,
        )
        .unwrap();
        let issues = validate_mock_file(&machine(), &mocks);
        assert!(issues.iter().any(|issue| {
            issue.level == IssueLevel::Error && issue.message.contains("duplicate")
        }));
    }

    #[test]
    fn exact_matching_and_timestamps_warn() {
        let suite = TestSuite::from_yaml_str(
            r#"
testCases:
  - name: case one
    outputMatching: exact
    expectedOutput: {createdAt: "2026-01-01T10:00:00Z"}
"#,
        )
        .unwrap();
        let issues = validate_test_suite(&machine(), &suite);
        assert!(!has_errors(&issues));
        assert!(issues.iter().any(|i| i.message.contains("exact")));
        assert!(issues.iter().any(|i| i.message.contains("timestamp")));
    }
}
