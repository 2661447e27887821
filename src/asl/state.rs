//! State variants and construction-time validation.
//!
//! States deserialize in two phases: a permissive [`RawState`] capture of
//! every field ASL allows anywhere, then [`State::from_raw`] which checks
//! the fields against the state's type and query language and produces the
//! typed variant. The rules enforced here (fatal, with the offending field
//! and mode named in the error):
//!
//! - JSONPath mode forbids `Arguments`, `Output`, and JSONata `Condition`s.
//! - JSONata mode forbids `InputPath`, `OutputPath`, `Parameters`,
//!   `ResultSelector`, `ResultPath`, and JSONPath-form choice rules.
//! - `Pass` never accepts `Arguments`; only `Pass` accepts `Result`.
//! - `Choice` requires `Default`.
//! - Non-terminal states need exactly one of `Next` / `End: true`.

use serde::Deserialize;
use serde_json::Value;

use super::machine::{MachineError, StateMachine};
use super::query::QueryLanguage;
use super::rules::{CatchRule, ChoiceRule, RetryRule};

/// A path-valued field that distinguishes "absent" from an explicit JSON
/// `null`. `InputPath`/`OutputPath` default to `$` when unset and discard
/// the value when null; `ResultPath` defaults to `$` (replace) when unset
/// and keeps the input untouched when null.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum OptionalPath {
    #[default]
    Unset,
    Discard,
    Path(String),
}

impl<'de> Deserialize<'de> for OptionalPath {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = Option::<String>::deserialize(deserializer)?;
        Ok(match value {
            None => OptionalPath::Discard,
            Some(path) => OptionalPath::Path(path),
        })
    }
}

impl OptionalPath {
    #[must_use]
    pub fn is_unset(&self) -> bool {
        matches!(self, OptionalPath::Unset)
    }
}

/// DistributedMap `ItemReader` declaration. The resource is recorded for
/// diagnostics; items themselves come from the mock engine's `itemReader`
/// strategy at run time.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ItemReaderConfig {
    #[serde(default)]
    pub resource: Option<String>,
    #[serde(default)]
    pub reader_config: Option<Value>,
}

/// Fields shared by (most of) the nine variants.
#[derive(Clone, Debug, Default)]
pub struct StateCommon {
    pub comment: Option<String>,
    pub query_language: QueryLanguage,
    pub next: Option<String>,
    pub end: bool,
    pub input_path: OptionalPath,
    pub output_path: OptionalPath,
    pub result_path: OptionalPath,
    pub parameters: Option<Value>,
    pub arguments: Option<Value>,
    pub result_selector: Option<Value>,
    pub output: Option<Value>,
    pub assign: Option<Value>,
    pub retry: Vec<RetryRule>,
    pub catch: Vec<CatchRule>,
}

#[derive(Clone, Debug)]
pub struct TaskState {
    pub common: StateCommon,
    pub resource: String,
}

impl TaskState {
    /// True for the `states:::lambda:invoke` service integration, which
    /// wraps responses in the `{Payload, StatusCode}` envelope.
    #[must_use]
    pub fn is_lambda_invoke(&self) -> bool {
        self.resource.contains("lambda:invoke")
    }
}

#[derive(Clone, Debug)]
pub struct PassState {
    pub common: StateCommon,
    pub result: Option<Value>,
}

#[derive(Clone, Debug)]
pub struct WaitState {
    pub common: StateCommon,
    /// A number, or a `{% … %}` string in JSONata mode.
    pub seconds: Option<Value>,
    pub seconds_path: Option<String>,
    pub timestamp: Option<String>,
    pub timestamp_path: Option<String>,
}

#[derive(Clone, Debug)]
pub struct SucceedState {
    pub common: StateCommon,
}

#[derive(Clone, Debug)]
pub struct FailState {
    pub common: StateCommon,
    pub error: Option<String>,
    pub cause: Option<String>,
}

#[derive(Clone, Debug)]
pub struct ChoiceState {
    pub common: StateCommon,
    pub choices: Vec<ChoiceRule>,
    pub default: String,
}

#[derive(Clone, Debug)]
pub struct MapState {
    pub common: StateCommon,
    pub items_path: Option<String>,
    pub item_selector: Option<Value>,
    pub item_processor: StateMachine,
    /// 0 means unbounded.
    pub max_concurrency: usize,
}

#[derive(Clone, Debug)]
pub struct DistributedMapState {
    pub common: StateCommon,
    pub items_path: Option<String>,
    pub item_selector: Option<Value>,
    pub item_processor: StateMachine,
    pub max_concurrency: usize,
    pub item_reader: Option<ItemReaderConfig>,
    pub result_writer: Option<Value>,
    pub tolerated_failure_percentage: Option<f64>,
    pub tolerated_failure_count: Option<u64>,
}

#[derive(Clone, Debug)]
pub struct ParallelState {
    pub common: StateCommon,
    pub branches: Vec<StateMachine>,
}

/// One state of a machine, dispatched on the ASL `Type` tag.
#[derive(Clone, Debug)]
pub enum State {
    Task(TaskState),
    Choice(ChoiceState),
    Pass(PassState),
    Wait(WaitState),
    Succeed(SucceedState),
    Fail(FailState),
    Map(MapState),
    DistributedMap(DistributedMapState),
    Parallel(ParallelState),
}

impl State {
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            State::Task(_) => "Task",
            State::Choice(_) => "Choice",
            State::Pass(_) => "Pass",
            State::Wait(_) => "Wait",
            State::Succeed(_) => "Succeed",
            State::Fail(_) => "Fail",
            State::Map(_) => "Map",
            State::DistributedMap(_) => "DistributedMap",
            State::Parallel(_) => "Parallel",
        }
    }

    #[must_use]
    pub fn common(&self) -> &StateCommon {
        match self {
            State::Task(s) => &s.common,
            State::Choice(s) => &s.common,
            State::Pass(s) => &s.common,
            State::Wait(s) => &s.common,
            State::Succeed(s) => &s.common,
            State::Fail(s) => &s.common,
            State::Map(s) => &s.common,
            State::DistributedMap(s) => &s.common,
            State::Parallel(s) => &s.common,
        }
    }

    /// True for states that end the machine without a `Next`.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, State::Succeed(_) | State::Fail(_)) || self.common().end
    }
}

/// Permissive capture of every field any state type can carry. Shape rules
/// are applied in [`State::from_raw`], not by serde.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct RawState {
    #[serde(rename = "Type")]
    pub type_name: String,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub query_language: Option<QueryLanguage>,
    #[serde(default)]
    pub next: Option<String>,
    #[serde(default)]
    pub end: bool,
    #[serde(default)]
    pub input_path: OptionalPath,
    #[serde(default)]
    pub output_path: OptionalPath,
    #[serde(default)]
    pub result_path: OptionalPath,
    #[serde(default)]
    pub parameters: Option<Value>,
    #[serde(default)]
    pub arguments: Option<Value>,
    #[serde(default)]
    pub result_selector: Option<Value>,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub output: Option<Value>,
    #[serde(default)]
    pub assign: Option<Value>,
    #[serde(default)]
    pub retry: Option<Vec<RetryRule>>,
    #[serde(default)]
    pub catch: Option<Vec<CatchRule>>,
    #[serde(default)]
    pub resource: Option<String>,
    // Accepted but not enforced.
    #[serde(default)]
    #[allow(dead_code)]
    pub timeout_seconds: Option<Value>,
    #[serde(default)]
    #[allow(dead_code)]
    pub heartbeat_seconds: Option<Value>,
    // Wait
    #[serde(default)]
    pub seconds: Option<Value>,
    #[serde(default)]
    pub seconds_path: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub timestamp_path: Option<String>,
    // Fail
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub cause: Option<String>,
    // Choice
    #[serde(default)]
    pub choices: Option<Vec<ChoiceRule>>,
    #[serde(default)]
    pub default: Option<String>,
    // Map / DistributedMap
    #[serde(default)]
    pub items_path: Option<String>,
    #[serde(default)]
    pub item_selector: Option<Value>,
    #[serde(default)]
    pub item_processor: Option<Value>,
    /// Legacy alias for `ItemProcessor`.
    #[serde(default)]
    pub iterator: Option<Value>,
    #[serde(default)]
    pub max_concurrency: Option<usize>,
    #[serde(default)]
    pub item_reader: Option<ItemReaderConfig>,
    #[serde(default)]
    pub result_writer: Option<Value>,
    /// Accepted and ignored.
    #[serde(default)]
    #[allow(dead_code)]
    pub item_batcher: Option<Value>,
    #[serde(default)]
    pub tolerated_failure_percentage: Option<f64>,
    #[serde(default)]
    pub tolerated_failure_count: Option<u64>,
    // Parallel
    #[serde(default)]
    pub branches: Option<Vec<Value>>,
}

impl RawState {
    fn mode_mismatch(
        &self,
        name: &str,
        field: &'static str,
        mode: QueryLanguage,
    ) -> MachineError {
        MachineError::ModeMismatch {
            state: name.to_string(),
            field,
            mode: mode.to_string(),
        }
    }
}

impl State {
    /// Build and validate a state from its raw capture.
    ///
    /// `machine_language` is the machine-level `QueryLanguage` the state
    /// inherits unless it declares its own.
    pub(crate) fn from_raw(
        name: &str,
        raw: RawState,
        machine_language: QueryLanguage,
    ) -> Result<Self, MachineError> {
        let language = raw.query_language.unwrap_or(machine_language);

        match language {
            QueryLanguage::JsonPath => {
                if raw.arguments.is_some() {
                    return Err(raw.mode_mismatch(name, "Arguments", language));
                }
                if raw.output.is_some() {
                    return Err(raw.mode_mismatch(name, "Output", language));
                }
            }
            QueryLanguage::Jsonata => {
                if !raw.input_path.is_unset() {
                    return Err(raw.mode_mismatch(name, "InputPath", language));
                }
                if !raw.output_path.is_unset() {
                    return Err(raw.mode_mismatch(name, "OutputPath", language));
                }
                if !raw.result_path.is_unset() {
                    return Err(raw.mode_mismatch(name, "ResultPath", language));
                }
                if raw.parameters.is_some() {
                    return Err(raw.mode_mismatch(name, "Parameters", language));
                }
                if raw.result_selector.is_some() {
                    return Err(raw.mode_mismatch(name, "ResultSelector", language));
                }
            }
        }

        let type_name = raw.type_name.clone();
        if type_name != "Pass" && raw.result.is_some() {
            return Err(MachineError::InvalidField {
                state: name.to_string(),
                field: "Result",
                reason: format!("only Pass states accept Result, this is a {type_name}"),
            });
        }
        if type_name == "Pass" && raw.arguments.is_some() {
            return Err(MachineError::InvalidField {
                state: name.to_string(),
                field: "Arguments",
                reason: "Pass states never accept Arguments".into(),
            });
        }

        let common = StateCommon {
            comment: raw.comment.clone(),
            query_language: language,
            next: raw.next.clone(),
            end: raw.end,
            input_path: raw.input_path.clone(),
            output_path: raw.output_path.clone(),
            result_path: raw.result_path.clone(),
            parameters: raw.parameters.clone(),
            arguments: raw.arguments.clone(),
            result_selector: raw.result_selector.clone(),
            output: raw.output.clone(),
            assign: raw.assign.clone(),
            retry: raw.retry.clone().unwrap_or_default(),
            catch: raw.catch.clone().unwrap_or_default(),
        };

        let state = match type_name.as_str() {
            "Task" => {
                let resource = raw.resource.clone().ok_or(MachineError::MissingField {
                    state: name.to_string(),
                    field: "Resource",
                })?;
                require_continuation(name, &common)?;
                State::Task(TaskState { common, resource })
            }
            "Pass" => {
                require_continuation(name, &common)?;
                State::Pass(PassState {
                    common,
                    result: raw.result,
                })
            }
            "Wait" => {
                require_continuation(name, &common)?;
                State::Wait(WaitState {
                    common,
                    seconds: raw.seconds,
                    seconds_path: raw.seconds_path,
                    timestamp: raw.timestamp,
                    timestamp_path: raw.timestamp_path,
                })
            }
            "Succeed" => State::Succeed(SucceedState { common }),
            "Fail" => State::Fail(FailState {
                common,
                error: raw.error,
                cause: raw.cause,
            }),
            "Choice" => {
                let choices = raw.choices.ok_or(MachineError::MissingField {
                    state: name.to_string(),
                    field: "Choices",
                })?;
                let default = raw.default.ok_or(MachineError::MissingField {
                    state: name.to_string(),
                    field: "Default",
                })?;
                for rule in &choices {
                    validate_choice_rule(name, rule, language, true)?;
                }
                State::Choice(ChoiceState {
                    common,
                    choices,
                    default,
                })
            }
            "Map" | "DistributedMap" => {
                require_continuation(name, &common)?;
                let processor_value = raw
                    .item_processor
                    .or(raw.iterator)
                    .ok_or(MachineError::MissingField {
                        state: name.to_string(),
                        field: "ItemProcessor",
                    })?;
                let distributed_mode = processor_mode_is_distributed(&processor_value);
                let item_processor = StateMachine::from_value_with_default(
                    processor_value,
                    language,
                )?;
                let max_concurrency = raw.max_concurrency.unwrap_or(0);

                let distributed = type_name == "DistributedMap"
                    || distributed_mode
                    || raw.item_reader.is_some()
                    || raw.result_writer.is_some()
                    || raw.tolerated_failure_percentage.is_some()
                    || raw.tolerated_failure_count.is_some();

                if distributed {
                    State::DistributedMap(DistributedMapState {
                        common,
                        items_path: raw.items_path,
                        item_selector: raw.item_selector,
                        item_processor,
                        max_concurrency,
                        item_reader: raw.item_reader,
                        result_writer: raw.result_writer,
                        tolerated_failure_percentage: raw.tolerated_failure_percentage,
                        tolerated_failure_count: raw.tolerated_failure_count,
                    })
                } else {
                    State::Map(MapState {
                        common,
                        items_path: raw.items_path,
                        item_selector: raw.item_selector,
                        item_processor,
                        max_concurrency,
                    })
                }
            }
            "Parallel" => {
                require_continuation(name, &common)?;
                let branches = raw.branches.ok_or(MachineError::MissingField {
                    state: name.to_string(),
                    field: "Branches",
                })?;
                let branches = branches
                    .into_iter()
                    .map(|value| StateMachine::from_value_with_default(value, language))
                    .collect::<Result<Vec<_>, _>>()?;
                State::Parallel(ParallelState { common, branches })
            }
            other => {
                return Err(MachineError::UnknownStateType {
                    state: name.to_string(),
                    type_name: other.to_string(),
                });
            }
        };

        Ok(state)
    }
}

/// Non-terminal states need exactly one of `Next` / `End: true`.
fn require_continuation(name: &str, common: &StateCommon) -> Result<(), MachineError> {
    match (&common.next, common.end) {
        (Some(_), false) | (None, true) => Ok(()),
        (Some(_), true) => Err(MachineError::InvalidField {
            state: name.to_string(),
            field: "End",
            reason: "a state cannot set both Next and End".into(),
        }),
        (None, false) => Err(MachineError::MissingField {
            state: name.to_string(),
            field: "Next",
        }),
    }
}

fn validate_choice_rule(
    state: &str,
    rule: &ChoiceRule,
    language: QueryLanguage,
    top_level: bool,
) -> Result<(), MachineError> {
    if top_level && rule.next.is_none() {
        return Err(MachineError::MissingField {
            state: state.to_string(),
            field: "Next",
        });
    }
    if !top_level && rule.next.is_some() {
        return Err(MachineError::InvalidField {
            state: state.to_string(),
            field: "Next",
            reason: "nested choice rules cannot carry Next".into(),
        });
    }

    match language {
        QueryLanguage::Jsonata => {
            if rule.uses_jsonpath_form() {
                return Err(MachineError::ModeMismatch {
                    state: state.to_string(),
                    field: "Variable",
                    mode: language.to_string(),
                });
            }
            if rule.condition.is_none() {
                return Err(MachineError::MissingField {
                    state: state.to_string(),
                    field: "Condition",
                });
            }
        }
        QueryLanguage::JsonPath => {
            if rule.condition.is_some() {
                return Err(MachineError::ModeMismatch {
                    state: state.to_string(),
                    field: "Condition",
                    mode: language.to_string(),
                });
            }
            for name in rule.comparators.keys() {
                if !ChoiceRule::comparator_is_known(name) {
                    return Err(MachineError::UnknownComparator {
                        state: state.to_string(),
                        name: name.clone(),
                    });
                }
            }
            let combinators = [
                rule.and.is_some(),
                rule.or.is_some(),
                rule.not.is_some(),
            ]
            .iter()
            .filter(|set| **set)
            .count();
            let has_test = rule.variable.is_some() && !rule.comparators.is_empty();
            if combinators + usize::from(has_test) != 1 {
                return Err(MachineError::InvalidField {
                    state: state.to_string(),
                    field: "Choices",
                    reason: "each rule needs exactly one of Variable+comparator, And, Or, Not"
                        .into(),
                });
            }
            if let Some(nested) = &rule.and {
                for inner in nested {
                    validate_choice_rule(state, inner, language, false)?;
                }
            }
            if let Some(nested) = &rule.or {
                for inner in nested {
                    validate_choice_rule(state, inner, language, false)?;
                }
            }
            if let Some(nested) = &rule.not {
                validate_choice_rule(state, nested, language, false)?;
            }
        }
    }
    Ok(())
}

/// Detects `ProcessorConfig.Mode: DISTRIBUTED` before the processor value
/// is parsed as a nested machine.
fn processor_mode_is_distributed(processor: &Value) -> bool {
    processor
        .get("ProcessorConfig")
        .and_then(|config| config.get("Mode"))
        .and_then(Value::as_str)
        .is_some_and(|mode| mode.eq_ignore_ascii_case("DISTRIBUTED"))
}
