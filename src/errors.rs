//! Error taxonomy shared across the interpreter.
//!
//! Two layers of failure exist side by side:
//!
//! - [`StatesError`]: an ASL fault — the `{Error, Cause}` pair that flows
//!   through Retry/Catch matching and surfaces verbatim in the result
//!   envelope. These are *workflow data*, not Rust errors in the usual
//!   sense, although they implement [`std::error::Error`] for ergonomic
//!   propagation.
//! - Engine diagnostics ([`LoadError`] here, plus per-module enums such as
//!   [`asl::MachineError`](crate::asl::MachineError) and
//!   [`exec::DriverError`](crate::exec::DriverError)): construction
//!   failures and the driver's own guards (unknown state, step guard,
//!   wall-clock guard). These carry no ASL `Error` name, never participate
//!   in Retry/Catch, and are returned as `Err` rather than inside the
//!   result envelope.

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use thiserror::Error;

/// An ASL fault: the `{Error, Cause}` pair Retry and Catch rules match on.
///
/// The `error` field holds the ASL error name (`States.TaskFailed`,
/// `States.Runtime`, or any custom name a mock raises); `cause` is the
/// human-readable description. Both are preserved exactly so tests can
/// assert on them.
///
/// # Examples
///
/// ```
/// use stepsim::errors::StatesError;
///
/// let fault = StatesError::task_failed("connection refused");
/// assert_eq!(fault.error, StatesError::TASK_FAILED);
/// assert!(fault.matches(&["States.ALL".to_string()]));
/// assert!(!fault.matches(&["States.Timeout".to_string()]));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
#[error("{error}: {cause}")]
pub struct StatesError {
    pub error: String,
    pub cause: String,
}

impl StatesError {
    /// Generic task failure.
    pub const TASK_FAILED: &'static str = "States.TaskFailed";
    /// Task or state timeout; only raised when a mock sets it explicitly.
    pub const TIMEOUT: &'static str = "States.Timeout";
    /// Evaluation failure in Parameters/ResultSelector/Arguments/Output or
    /// any JSONPath/JSONata expression.
    pub const RUNTIME: &'static str = "States.Runtime";
    /// An ItemReader could not produce items.
    pub const ITEM_READER_FAILED: &'static str = "States.ItemReaderFailed";
    /// Payload exceeded the configured maximum size.
    pub const DATA_LIMIT_EXCEEDED: &'static str = "States.DataLimitExceeded";
    /// Default error name for a Fail state that sets none.
    pub const FAILED: &'static str = "States.Failed";
    /// Missing, exhausted, or malformed mock configuration for a state.
    pub const MOCK_CONFIGURATION: &'static str = "States.MockConfiguration";
    /// Wildcard accepted in `ErrorEquals` matchers only; never raised.
    pub const ALL: &'static str = "States.ALL";

    pub fn new(error: impl Into<String>, cause: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            cause: cause.into(),
        }
    }

    pub fn task_failed(cause: impl Into<String>) -> Self {
        Self::new(Self::TASK_FAILED, cause)
    }

    pub fn runtime(cause: impl Into<String>) -> Self {
        Self::new(Self::RUNTIME, cause)
    }

    pub fn item_reader_failed(cause: impl Into<String>) -> Self {
        Self::new(Self::ITEM_READER_FAILED, cause)
    }

    pub fn data_limit_exceeded(cause: impl Into<String>) -> Self {
        Self::new(Self::DATA_LIMIT_EXCEEDED, cause)
    }

    pub fn mock_configuration(cause: impl Into<String>) -> Self {
        Self::new(Self::MOCK_CONFIGURATION, cause)
    }

    /// True when an `ErrorEquals` list matches this fault.
    ///
    /// `States.ALL` matches every fault name.
    #[must_use]
    pub fn matches(&self, error_equals: &[String]) -> bool {
        error_equals
            .iter()
            .any(|name| name == Self::ALL || *name == self.error)
    }

    /// The payload written at a Catch rule's `ResultPath`.
    #[must_use]
    pub fn to_payload(&self) -> Value {
        json!({"Error": self.error, "Cause": self.cause})
    }
}

/// Errors loading workflow, mock, or test definition files from disk.
#[derive(Debug, Error, Diagnostic)]
pub enum LoadError {
    #[error("failed to read {path}: {source}")]
    #[diagnostic(code(stepsim::load::io))]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid JSON in {path}: {source}")]
    #[diagnostic(
        code(stepsim::load::json),
        help("The state-machine definition must be valid ASL JSON.")
    )]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid YAML in {path}: {source}")]
    #[diagnostic(
        code(stepsim::load::yaml),
        help("Check indentation and field names against the documented file shape.")
    )]
    Yaml {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wildcard_matches_any_fault() {
        let fault = StatesError::new("Custom.Boom", "boom");
        assert!(fault.matches(&[StatesError::ALL.to_string()]));
        assert!(fault.matches(&["Custom.Boom".to_string()]));
        assert!(!fault.matches(&["Other".to_string()]));
        assert!(!fault.matches(&[]));
    }

    #[test]
    fn payload_shape_is_error_cause() {
        let fault = StatesError::task_failed("boom");
        assert_eq!(
            fault.to_payload(),
            json!({"Error": "States.TaskFailed", "Cause": "boom"})
        );
    }

    #[test]
    fn serializes_with_pascal_case_fields() {
        let fault = StatesError::runtime("bad path");
        let text = serde_json::to_string(&fault).unwrap();
        assert!(text.contains("\"Error\""));
        assert!(text.contains("\"Cause\""));
    }
}
