//! Test-suite harness over the YAML test-file format.
//!
//! A test file names a state machine, a base mock file, and a list of
//! cases; each case runs the machine with its input and checks the
//! produced output, the execution path, and per-state expectations:
//!
//! ```yaml
//! version: "1.0"
//! name: order-flow
//! stateMachine: machine.asl.json
//! baseMock: mocks.yaml
//! testCases:
//!   - name: happy path
//!     input: {order: {id: "o-1"}}
//!     expectedOutput: {status: "shipped"}
//!     expectedPath: [FetchOrder, Ship, Done]
//!     stateExpectations:
//!       - state: Ship
//!         output: {carrier: "fast"}
//! ```
//!
//! `outputMatching: partial` (the default) uses subset semantics — every
//! expected key must be present and equal, extra keys are ignored;
//! `exact` requires deep equality.

pub mod report;
pub mod suite;

pub use report::{CaseReport, SuiteReport};
pub use suite::{OutputMatching, StateExpectation, TestCase, TestSuite};

use std::path::Path;

use miette::Diagnostic;
use thiserror::Error;
use tracing::info;

use crate::asl::{MachineError, StateMachine};
use crate::config::ExecutionConfig;
use crate::errors::LoadError;
use crate::exec::{Driver, ExecutionResult, StateExecutionRecord};
use crate::mock::engine::input_matches;
use crate::mock::{MockConfigError, MockEngine, MockFile};

/// Errors preparing a suite for execution (the suite's own checks are
/// reported per case, not as errors).
#[derive(Debug, Error, Diagnostic)]
pub enum HarnessError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Machine(#[from] MachineError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Mock(#[from] MockConfigError),

    #[error("test file '{path}' does not name a state machine")]
    #[diagnostic(code(stepsim::harness::missing_machine))]
    MissingMachine { path: String },
}

/// Runs the cases of one suite against a machine and a base mock set.
pub struct SuiteRunner {
    machine: StateMachine,
    base_mock: MockFile,
    config: ExecutionConfig,
    data_dir: Option<std::path::PathBuf>,
}

impl SuiteRunner {
    pub fn new(machine: StateMachine, base_mock: MockFile) -> Self {
        Self {
            machine,
            base_mock,
            config: ExecutionConfig::default(),
            data_dir: None,
        }
    }

    /// Resolve itemReader data files relative to `dir`.
    #[must_use]
    pub fn with_data_dir(mut self, dir: impl Into<std::path::PathBuf>) -> Self {
        self.data_dir = Some(dir.into());
        self
    }

    /// Load a suite plus the machine and mock files it names, resolved
    /// relative to the suite file's directory.
    pub fn from_suite_file(path: impl AsRef<Path>) -> Result<(Self, TestSuite), HarnessError> {
        let path = path.as_ref();
        let suite = TestSuite::from_file(path)?;
        let dir = path.parent().unwrap_or_else(|| Path::new("."));

        let machine_ref = suite
            .state_machine
            .as_ref()
            .ok_or_else(|| HarnessError::MissingMachine {
                path: path.display().to_string(),
            })?;
        let machine = StateMachine::from_file(dir.join(machine_ref))?;
        let base_mock = match &suite.base_mock {
            Some(mock_ref) => MockFile::from_file(dir.join(mock_ref))?,
            None => MockFile::default(),
        };
        Ok((Self::new(machine, base_mock).with_data_dir(dir), suite))
    }

    #[must_use]
    pub fn with_config(mut self, config: ExecutionConfig) -> Self {
        self.config = config;
        self
    }

    /// Run every case and collect a report.
    pub async fn run(&self, suite: &TestSuite) -> SuiteReport {
        let mut cases = Vec::with_capacity(suite.test_cases.len());
        for case in &suite.test_cases {
            let report = self.run_case(case).await;
            info!(
                case = %case.name,
                passed = report.passed,
                failures = report.failures.len(),
                "test case finished"
            );
            cases.push(report);
        }
        SuiteReport { cases }
    }

    async fn run_case(&self, case: &TestCase) -> CaseReport {
        let mut merged = self.base_mock.clone();
        // Per-case mocks override base mocks for the same state.
        for override_mock in &case.mocks {
            merged
                .mocks
                .retain(|existing| existing.state != override_mock.state);
            merged.mocks.push(override_mock.clone());
        }

        let engine = match MockEngine::new(merged) {
            Ok(engine) => match &self.data_dir {
                Some(dir) => engine.with_base_dir(dir.clone()),
                None => engine,
            },
            Err(err) => {
                return CaseReport::failed(&case.name, vec![format!("mock setup failed: {err}")]);
            }
        };
        let driver = Driver::new(self.machine.clone(), engine)
            .with_config(self.config.clone());
        let result = match driver.execute(case.input.clone()).await {
            Ok(result) => result,
            Err(err) => {
                return CaseReport::failed(&case.name, vec![format!("driver error: {err}")]);
            }
        };

        let mut failures = Vec::new();
        check_result(case, &result, &mut failures);
        CaseReport {
            name: case.name.clone(),
            passed: failures.is_empty(),
            failures,
        }
    }
}

fn check_result(case: &TestCase, result: &ExecutionResult, failures: &mut Vec<String>) {
    if !result.success {
        let detail = result
            .error
            .as_ref()
            .map(|fault| fault.to_string())
            .unwrap_or_else(|| "unknown error".to_string());
        failures.push(format!("execution failed: {detail}"));
        return;
    }

    if let Some(expected) = &case.expected_output {
        let matched = match case.output_matching {
            OutputMatching::Partial => input_matches(expected, &result.output),
            OutputMatching::Exact => *expected == result.output,
        };
        if !matched {
            failures.push(format!(
                "output mismatch ({:?}): expected {expected}, got {}",
                case.output_matching, result.output
            ));
        }
    }

    if let Some(expected_path) = &case.expected_path {
        if *expected_path != result.path {
            failures.push(format!(
                "path mismatch: expected {expected_path:?}, got {:?}",
                result.path
            ));
        }
    }

    for expectation in &case.state_expectations {
        check_state_expectation(expectation, result, failures);
    }
}

fn check_state_expectation(
    expectation: &StateExpectation,
    result: &ExecutionResult,
    failures: &mut Vec<String>,
) {
    let record = find_record(result, &expectation.state);
    let Some(record) = record else {
        failures.push(format!("state '{}' was never executed", expectation.state));
        return;
    };

    if let Some(expected_input) = &expectation.input {
        if !input_matches(expected_input, &record.input) {
            failures.push(format!(
                "state '{}' input mismatch: expected {expected_input}, got {}",
                expectation.state, record.input
            ));
        }
    }
    if let Some(expected_output) = &expectation.output {
        match &record.output {
            Some(actual) if input_matches(expected_output, actual) => {}
            Some(actual) => failures.push(format!(
                "state '{}' output mismatch: expected {expected_output}, got {actual}",
                expectation.state
            )),
            None => failures.push(format!(
                "state '{}' produced no output",
                expectation.state
            )),
        }
    }
    if let Some(expected_variables) = &expectation.variables {
        let actual = serde_json::to_value(&record.variables_after)
            .unwrap_or(serde_json::Value::Null);
        if !input_matches(expected_variables, &actual) {
            failures.push(format!(
                "state '{}' variables mismatch: expected {expected_variables}, got {actual}",
                expectation.state
            ));
        }
    }
}

/// Top-level records first, then Map iterations and Parallel branches
/// (nested states are referenced by bare name).
fn find_record<'a>(
    result: &'a ExecutionResult,
    state: &str,
) -> Option<&'a StateExecutionRecord> {
    result
        .state_executions
        .iter()
        .find(|record| record.state == state)
        .or_else(|| {
            result
                .map_executions
                .iter()
                .find(|record| record.state == state)
        })
        .or_else(|| {
            result
                .parallel_executions
                .iter()
                .find(|record| record.state == state)
        })
}
