//! Dispatch of `(state name, input)` to a mocked service response.

use std::path::PathBuf;

use miette::Diagnostic;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde_json::{Map, Value, json};
use thiserror::Error;
use tracing::debug;

use super::config::{MockDefinition, MockFile, MockStrategy};
use super::item_reader;
use crate::errors::StatesError;

/// Structural problems in a mock file that make the engine unusable.
///
/// These are fatal at construction; behavioral problems (no condition
/// matched, unknown state) surface as `States.MockConfiguration` faults at
/// invocation time instead.
#[derive(Debug, Error, Diagnostic)]
pub enum MockConfigError {
    #[error("mock for state '{state}' ({strategy}) is missing required field '{field}'")]
    #[diagnostic(
        code(stepsim::mock::missing_field),
        help("fixed needs 'response', conditional 'conditions', stateful 'responses', error 'error', itemReader 'dataFile'.")
    )]
    MissingField {
        state: String,
        strategy: &'static str,
        field: &'static str,
    },
}

/// Simulates every external service call of one execution run.
///
/// Mocks are indexed by exact state name. `stateful` counters live for the
/// lifetime of the engine and are serialized behind a mutex so concurrent
/// Map iterations and Parallel branches observe a well-defined total order
/// per state name; [`MockEngine::reset`] rewinds them between runs.
#[derive(Debug, Default)]
pub struct MockEngine {
    mocks: FxHashMap<String, MockDefinition>,
    counters: Mutex<FxHashMap<String, usize>>,
    base_dir: Option<PathBuf>,
}

impl MockEngine {
    /// Build an engine from a parsed mock file.
    ///
    /// The first definition wins when a state is mocked twice; duplicates
    /// are a validator concern, not an engine one.
    pub fn new(file: MockFile) -> Result<Self, MockConfigError> {
        let mut mocks = FxHashMap::default();
        for definition in file.mocks {
            require_strategy_fields(&definition)?;
            mocks.entry(definition.state.clone()).or_insert(definition);
        }
        Ok(Self {
            mocks,
            counters: Mutex::new(FxHashMap::default()),
            base_dir: None,
        })
    }

    /// Resolve `dataFile` references relative to `dir` (usually the mock
    /// file's directory).
    #[must_use]
    pub fn with_base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = Some(dir.into());
        self
    }

    #[must_use]
    pub fn mock_for(&self, state: &str) -> Option<&MockDefinition> {
        self.mocks.get(state)
    }

    /// Rewind all stateful counters; call between runs.
    pub fn reset(&self) {
        self.counters.lock().clear();
    }

    /// Produce the simulated response for a task invocation.
    ///
    /// `resource` is the Task's `Resource`; when it contains
    /// `lambda:invoke` the response is guaranteed to carry the
    /// `{Payload, StatusCode}` envelope (auto-wrapped when the configured
    /// response lacks `Payload`). Direct Lambda ARNs pass through verbatim.
    pub fn invoke(
        &self,
        state: &str,
        input: &Value,
        resource: Option<&str>,
    ) -> Result<Value, StatesError> {
        let definition = self.mocks.get(state).ok_or_else(|| {
            StatesError::mock_configuration(format!("no mock configured for state '{state}'"))
        })?;
        debug!(state, strategy = definition.strategy.name(), "serving mock");

        let response = match definition.strategy {
            MockStrategy::Fixed => definition
                .response
                .clone()
                .expect("fixed mock checked at construction"),
            MockStrategy::Conditional => self.conditional_response(definition, input)?,
            MockStrategy::Stateful => self.stateful_response(definition),
            MockStrategy::Error => {
                let spec = definition
                    .error
                    .as_ref()
                    .expect("error mock checked at construction");
                return Err(StatesError::new(&spec.error_type, spec.cause_text()));
            }
            MockStrategy::ItemReader => {
                return Err(StatesError::mock_configuration(format!(
                    "mock for state '{state}' is an itemReader; it serves DistributedMap item sources, not task invocations"
                )));
            }
        };

        let response = realize(response)?;
        Ok(apply_lambda_envelope(response, resource))
    }

    /// Produce the item list for a DistributedMap `ItemReader`.
    pub fn read_items(&self, state: &str) -> Result<Vec<Value>, StatesError> {
        let definition = self.mocks.get(state).ok_or_else(|| {
            StatesError::item_reader_failed(format!(
                "no itemReader mock configured for state '{state}'"
            ))
        })?;
        if definition.strategy != MockStrategy::ItemReader {
            return Err(StatesError::item_reader_failed(format!(
                "mock for state '{state}' is '{}', expected itemReader",
                definition.strategy.name()
            )));
        }
        let data_file = definition
            .data_file
            .as_ref()
            .expect("itemReader mock checked at construction");
        let path = match &self.base_dir {
            Some(dir) => dir.join(data_file),
            None => PathBuf::from(data_file),
        };
        item_reader::load_items(&path, definition.data_format)
    }

    fn conditional_response(
        &self,
        definition: &MockDefinition,
        input: &Value,
    ) -> Result<Value, StatesError> {
        let mut default = None;
        for condition in &definition.conditions {
            if let Some(when) = &condition.when {
                if input_matches(&when.input, input) {
                    return condition.response.clone().ok_or_else(|| {
                        StatesError::mock_configuration(format!(
                            "conditional mock for state '{}' has a 'when' without a 'response'",
                            definition.state
                        ))
                    });
                }
            } else if condition.default.is_some() && default.is_none() {
                default = condition.default.clone();
            }
        }
        default.ok_or_else(|| {
            StatesError::mock_configuration(format!(
                "no condition matched for state '{}' and no default is configured",
                definition.state
            ))
        })
    }

    fn stateful_response(&self, definition: &MockDefinition) -> Value {
        let mut counters = self.counters.lock();
        let counter = counters.entry(definition.state.clone()).or_insert(0);
        // Clamp to the last response once the sequence is exhausted.
        let index = (*counter).min(definition.responses.len() - 1);
        *counter += 1;
        definition.responses[index].clone()
    }
}

fn require_strategy_fields(definition: &MockDefinition) -> Result<(), MockConfigError> {
    let missing = |field: &'static str| MockConfigError::MissingField {
        state: definition.state.clone(),
        strategy: definition.strategy.name(),
        field,
    };
    match definition.strategy {
        MockStrategy::Fixed if definition.response.is_none() => Err(missing("response")),
        MockStrategy::Conditional if definition.conditions.is_empty() => {
            Err(missing("conditions"))
        }
        MockStrategy::Stateful if definition.responses.is_empty() => Err(missing("responses")),
        MockStrategy::Error if definition.error.is_none() => Err(missing("error")),
        MockStrategy::ItemReader if definition.data_file.is_none() => Err(missing("dataFile")),
        _ => Ok(()),
    }
}

/// A configured response entry of the form `{"error": {"type": ..}}` is an
/// error injection rather than a value; stateful sequences use this to fail
/// early attempts and succeed later ones.
fn realize(response: Value) -> Result<Value, StatesError> {
    if let Value::Object(map) = &response {
        if let Some(Value::Object(spec)) = map.get("error") {
            if let Some(Value::String(error_type)) = spec.get("type") {
                let cause = spec
                    .get("cause")
                    .or_else(|| spec.get("message"))
                    .and_then(Value::as_str)
                    .unwrap_or("mocked error");
                return Err(StatesError::new(error_type, cause));
            }
        }
    }
    Ok(response)
}

/// Subset matching: every key of `expected` must be present and match in
/// `actual`; extra keys in `actual` are ignored. Arrays match element-wise
/// at equal length; scalars by equality (numbers numerically). The test
/// harness shares these semantics for `partial` output matching.
pub(crate) fn input_matches(expected: &Value, actual: &Value) -> bool {
    match (expected, actual) {
        (Value::Object(exp), Value::Object(act)) => exp
            .iter()
            .all(|(key, value)| act.get(key).is_some_and(|found| input_matches(value, found))),
        (Value::Array(exp), Value::Array(act)) => {
            exp.len() == act.len()
                && exp
                    .iter()
                    .zip(act.iter())
                    .all(|(e, a)| input_matches(e, a))
        }
        (Value::Number(exp), Value::Number(act)) => exp.as_f64() == act.as_f64(),
        (expected, actual) => expected == actual,
    }
}

fn apply_lambda_envelope(response: Value, resource: Option<&str>) -> Value {
    let Some(resource) = resource else {
        return response;
    };
    if !resource.contains("lambda:invoke") {
        return response;
    }
    match response {
        Value::Object(map) if map.contains_key("Payload") => Value::Object(map),
        other => {
            let mut envelope = Map::new();
            envelope.insert("Payload".to_string(), other);
            envelope.insert("StatusCode".to_string(), json!(200));
            Value::Object(envelope)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine_from(yaml: &str) -> MockEngine {
        MockEngine::new(MockFile::from_yaml_str(yaml).unwrap()).unwrap()
    }

    #[test]
    fn fixed_returns_response_verbatim() {
        let engine = engine_from(
            r#"
mocks:
  - state: A
    type: fixed
    response: {ok: true}
"#,
        );
        let out = engine.invoke("A", &json!({}), None).unwrap();
        assert_eq!(out, json!({"ok": true}));
    }

    #[test]
    fn missing_mock_is_a_configuration_fault() {
        let engine = MockEngine::default();
        let err = engine.invoke("Nope", &json!({}), None).unwrap_err();
        assert_eq!(err.error, StatesError::MOCK_CONFIGURATION);
    }

    #[test]
    fn conditional_subset_match_first_wins() {
        let engine = engine_from(
            r#"
mocks:
  - state: A
    type: conditional
    conditions:
      - when: {input: {kind: "a"}}
        response: "first"
      - when: {input: {kind: "a", extra: 1}}
        response: "second"
      - default: "fallback"
"#,
        );
        let out = engine
            .invoke("A", &json!({"kind": "a", "extra": 1, "noise": true}), None)
            .unwrap();
        assert_eq!(out, json!("first"));
        let out = engine.invoke("A", &json!({"kind": "b"}), None).unwrap();
        assert_eq!(out, json!("fallback"));
    }

    #[test]
    fn conditional_without_match_or_default_errors() {
        let engine = engine_from(
            r#"
mocks:
  - state: A
    type: conditional
    conditions:
      - when: {input: {kind: "a"}}
        response: "only"
"#,
        );
        let err = engine.invoke("A", &json!({"kind": "z"}), None).unwrap_err();
        assert_eq!(err.error, StatesError::MOCK_CONFIGURATION);
    }

    #[test]
    fn stateful_advances_and_clamps() {
        let engine = engine_from(
            r#"
mocks:
  - state: A
    type: stateful
    responses: [1, 2]
"#,
        );
        assert_eq!(engine.invoke("A", &json!({}), None).unwrap(), json!(1));
        assert_eq!(engine.invoke("A", &json!({}), None).unwrap(), json!(2));
        assert_eq!(engine.invoke("A", &json!({}), None).unwrap(), json!(2));
        engine.reset();
        assert_eq!(engine.invoke("A", &json!({}), None).unwrap(), json!(1));
    }

    #[test]
    fn stateful_error_entries_raise_faults() {
        let engine = engine_from(
            r#"
mocks:
  - state: A
    type: stateful
    responses:
      - {error: {type: "States.TaskFailed", cause: "boom"}}
      - {ok: true}
"#,
        );
        let err = engine.invoke("A", &json!({}), None).unwrap_err();
        assert_eq!(err.error, "States.TaskFailed");
        assert_eq!(err.cause, "boom");
        assert_eq!(engine.invoke("A", &json!({}), None).unwrap(), json!({"ok": true}));
    }

    #[test]
    fn error_mock_raises_typed_fault() {
        let engine = engine_from(
            r#"
mocks:
  - state: A
    type: error
    error: {type: "Custom.Oops", cause: "nope"}
"#,
        );
        let err = engine.invoke("A", &json!({}), None).unwrap_err();
        assert_eq!(err.error, "Custom.Oops");
        assert_eq!(err.cause, "nope");
    }

    #[test]
    fn lambda_invoke_wraps_bare_responses() {
        let engine = engine_from(
            r#"
mocks:
  - state: A
    type: fixed
    response: {answer: 42}
"#,
        );
        let wrapped = engine
            .invoke("A", &json!({}), Some("arn:aws:states:::lambda:invoke"))
            .unwrap();
        assert_eq!(
            wrapped,
            json!({"Payload": {"answer": 42}, "StatusCode": 200})
        );
    }

    #[test]
    fn lambda_invoke_preserves_existing_envelope() {
        let engine = engine_from(
            r#"
mocks:
  - state: A
    type: fixed
    response: {Payload: {a: 1}, StatusCode: 200, ExecutedVersion: "$LATEST"}
"#,
        );
        let out = engine
            .invoke("A", &json!({}), Some("arn:aws:states:::lambda:invoke"))
            .unwrap();
        assert_eq!(
            out,
            json!({"Payload": {"a": 1}, "StatusCode": 200, "ExecutedVersion": "$LATEST"})
        );
    }

    #[test]
    fn direct_lambda_arn_is_not_wrapped() {
        let engine = engine_from(
            r#"
mocks:
  - state: A
    type: fixed
    response: {answer: 42}
"#,
        );
        let out = engine
            .invoke(
                "A",
                &json!({}),
                Some("arn:aws:lambda:us-east-1:123456789012:function:fn"),
            )
            .unwrap();
        assert_eq!(out, json!({"answer": 42}));
    }
}
