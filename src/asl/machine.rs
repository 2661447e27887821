//! State-machine container, loading, and reference validation.

use std::collections::VecDeque;
use std::path::Path;

use miette::Diagnostic;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::warn;

use super::query::QueryLanguage;
use super::state::{RawState, State};

/// Errors raised while constructing a [`StateMachine`].
///
/// All of these are fatal before execution begins; none of them carries an
/// ASL `Error` name.
#[derive(Debug, Error, Diagnostic)]
pub enum MachineError {
    #[error("failed to read {path}: {source}")]
    #[diagnostic(code(stepsim::asl::io))]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid state machine JSON: {source}")]
    #[diagnostic(
        code(stepsim::asl::json),
        help("The definition must be valid Amazon States Language JSON.")
    )]
    Json {
        #[from]
        source: serde_json::Error,
    },

    #[error("StartAt '{start_at}' is not a state in States")]
    #[diagnostic(code(stepsim::asl::missing_start))]
    MissingStartAt { start_at: String },

    #[error("state '{state}' references unknown state '{target}'")]
    #[diagnostic(
        code(stepsim::asl::unknown_target),
        help("Every Next, Default, and Catch target must name a state in the same States block.")
    )]
    UnknownTarget { state: String, target: String },

    #[error("state '{state}' has unknown type '{type_name}'")]
    #[diagnostic(code(stepsim::asl::unknown_type))]
    UnknownStateType { state: String, type_name: String },

    #[error("state '{state}': field '{field}' is not allowed in {mode} mode")]
    #[diagnostic(
        code(stepsim::asl::mode_mismatch),
        help(
            "JSONPath mode forbids Arguments/Output; JSONata mode forbids \
             InputPath/OutputPath/Parameters/ResultSelector/ResultPath."
        )
    )]
    ModeMismatch {
        state: String,
        field: &'static str,
        mode: String,
    },

    #[error("state '{state}' is missing required field '{field}'")]
    #[diagnostic(code(stepsim::asl::missing_field))]
    MissingField { state: String, field: &'static str },

    #[error("state '{state}': invalid field '{field}': {reason}")]
    #[diagnostic(code(stepsim::asl::invalid_field))]
    InvalidField {
        state: String,
        field: &'static str,
        reason: String,
    },

    #[error("state '{state}': unknown choice comparator '{name}'")]
    #[diagnostic(code(stepsim::asl::unknown_comparator))]
    UnknownComparator { state: String, name: String },
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawMachine {
    #[serde(default)]
    query_language: Option<QueryLanguage>,
    start_at: String,
    states: serde_json::Map<String, Value>,
    #[serde(default)]
    comment: Option<String>,
}

/// An immutable, validated state machine.
///
/// # Examples
///
/// ```
/// use stepsim::asl::StateMachine;
///
/// let machine = StateMachine::from_json_str(r#"{
///     "StartAt": "Check",
///     "States": {
///         "Check": {
///             "Type": "Choice",
///             "Choices": [
///                 {"Variable": "$.n", "NumericGreaterThan": 10, "Next": "Big"}
///             ],
///             "Default": "Small"
///         },
///         "Big": {"Type": "Succeed"},
///         "Small": {"Type": "Succeed"}
///     }
/// }"#).unwrap();
///
/// assert_eq!(machine.states.len(), 3);
/// ```
#[derive(Clone, Debug)]
pub struct StateMachine {
    pub query_language: QueryLanguage,
    pub start_at: String,
    pub states: FxHashMap<String, State>,
    pub comment: Option<String>,
}

impl StateMachine {
    /// Parse and validate a machine from ASL JSON text.
    pub fn from_json_str(text: &str) -> Result<Self, MachineError> {
        let value: Value = serde_json::from_str(text)?;
        Self::from_value(value)
    }

    /// Parse and validate a machine from a file on disk.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, MachineError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| MachineError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&text)
    }

    /// Parse and validate a machine from an already-parsed JSON value.
    pub fn from_value(value: Value) -> Result<Self, MachineError> {
        Self::from_value_with_default(value, QueryLanguage::default())
    }

    /// Parse a (possibly nested) machine, inheriting `parent_language` when
    /// the definition does not declare its own `QueryLanguage`. Nested
    /// `ItemProcessor` and `Branches` machines come through here.
    pub(crate) fn from_value_with_default(
        value: Value,
        parent_language: QueryLanguage,
    ) -> Result<Self, MachineError> {
        let raw: RawMachine = serde_json::from_value(value)?;
        let query_language = raw.query_language.unwrap_or(parent_language);

        let mut states = FxHashMap::default();
        for (name, state_value) in raw.states {
            let raw_state: RawState = serde_json::from_value(state_value)?;
            let state = State::from_raw(&name, raw_state, query_language)?;
            states.insert(name, state);
        }

        let machine = StateMachine {
            query_language,
            start_at: raw.start_at,
            states,
            comment: raw.comment,
        };
        machine.validate()?;
        Ok(machine)
    }

    fn validate(&self) -> Result<(), MachineError> {
        if !self.states.contains_key(&self.start_at) {
            return Err(MachineError::MissingStartAt {
                start_at: self.start_at.clone(),
            });
        }

        for (name, state) in &self.states {
            for target in transition_targets(state) {
                if !self.states.contains_key(target) {
                    return Err(MachineError::UnknownTarget {
                        state: name.clone(),
                        target: target.clone(),
                    });
                }
            }
        }

        // Unreachable states are suspicious but not fatal.
        let mut seen: FxHashSet<&str> = FxHashSet::default();
        let mut queue: VecDeque<&str> = VecDeque::new();
        queue.push_back(&self.start_at);
        seen.insert(&self.start_at);
        while let Some(current) = queue.pop_front() {
            if let Some(state) = self.states.get(current) {
                for target in transition_targets(state) {
                    if seen.insert(target) {
                        queue.push_back(target);
                    }
                }
            }
        }
        for name in self.states.keys() {
            if !seen.contains(name.as_str()) {
                warn!(state = %name, "state is unreachable from StartAt");
            }
        }

        Ok(())
    }
}

fn transition_targets(state: &State) -> Vec<&String> {
    let mut targets = Vec::new();
    if let Some(next) = &state.common().next {
        targets.push(next);
    }
    for rule in &state.common().catch {
        targets.push(&rule.next);
    }
    if let State::Choice(choice) = state {
        for rule in &choice.choices {
            if let Some(next) = &rule.next {
                targets.push(next);
            }
        }
        targets.push(&choice.default);
    }
    targets
}
