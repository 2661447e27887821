//! Per-state execution: the shared data-flow wrapper, retry/catch
//! protection, and the simple state variants. Map/DistributedMap and
//! Parallel fan-out live in their own modules and are invoked from the
//! protected attempt here.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::debug;

use crate::asl::{
    ChoiceState, FailState, PassState, QueryLanguage, State, StateCommon, SucceedState, WaitState,
};
use crate::errors::StatesError;
use crate::events::ExecutionEvent;
use crate::exec::choice::choose_next;
use crate::exec::context::{ExecutionContext, RetryAttempt, StateExecutionRecord, WaitRecord};
use crate::exec::driver::Driver;
use crate::exec::retry::{compute_backoff, find_retry};
use crate::exec::{map, parallel};
use crate::pipeline::{
    DataScope, apply_input_path, apply_jsonata_template, apply_output_path, apply_path_template,
    apply_result_path, evaluate_assign, resolve_jsonpath_strict,
};

/// What one state invocation hands back to the driver.
#[derive(Debug, Clone)]
pub(crate) struct StateOutcome {
    pub output: Value,
    pub next_state: Option<String>,
}

pub(crate) async fn execute_state(
    driver: &Driver,
    name: &str,
    state: &State,
    ctx: &mut ExecutionContext,
) -> Result<StateOutcome, StatesError> {
    debug!(state = name, kind = state.type_name(), "executing state");
    match state {
        State::Pass(pass) => execute_pass(name, pass, ctx),
        State::Wait(wait) => execute_wait(name, wait, ctx),
        State::Succeed(succeed) => execute_succeed(name, succeed, ctx),
        State::Fail(fail) => execute_fail(name, fail, ctx),
        State::Choice(choice) => execute_choice(name, choice, ctx),
        State::Task(_) | State::Map(_) | State::DistributedMap(_) | State::Parallel(_) => {
            execute_protected(driver, name, state, ctx).await
        }
    }
}

// ============================================================================
// Retryable / catchable states
// ============================================================================

/// Run a task-like state under its Retry and Catch rules.
///
/// The protected section spans the whole data-flow front half (InputPath,
/// Parameters/Arguments) plus the invocation and ResultSelector, so
/// evaluation faults are retriable and catchable exactly like service
/// faults.
async fn execute_protected(
    driver: &Driver,
    name: &str,
    state: &State,
    ctx: &mut ExecutionContext,
) -> Result<StateOutcome, StatesError> {
    let common = state.common();
    let mut attempts_used = vec![0u32; common.retry.len()];
    let mut retries: Vec<RetryAttempt> = Vec::new();

    loop {
        match attempt(driver, name, state, ctx).await {
            Ok((effective_input, result)) => {
                commit_assign(common, &effective_input, Some(&result), ctx)?;
                let output = finish_success(common, effective_input, result, ctx)?;
                push_record(
                    ctx,
                    name,
                    Some(output.clone()),
                    None,
                    std::mem::take(&mut retries),
                    None,
                );
                return Ok(StateOutcome {
                    output,
                    next_state: common.next.clone(),
                });
            }
            Err(fault) => {
                if let Some((index, rule)) = find_retry(&common.retry, &fault, &attempts_used) {
                    attempts_used[index] += 1;
                    let delay =
                        compute_backoff(rule, attempts_used[index], driver.config().backoff_cap_ms);
                    retries.push(RetryAttempt {
                        attempt: attempts_used[index],
                        error: fault.error.clone(),
                        backoff_ms: delay.backoff_ms,
                        slept_ms: delay.slept_ms,
                    });
                    driver.events().emit(ExecutionEvent::RetryScheduled {
                        state: name.to_string(),
                        attempt: attempts_used[index],
                        error: fault.error.clone(),
                        backoff_ms: delay.backoff_ms,
                    });
                    tokio::time::sleep(Duration::from_millis(delay.slept_ms)).await;
                    continue;
                }

                if let Some(rule) = common
                    .catch
                    .iter()
                    .find(|rule| fault.matches(&rule.error_equals))
                {
                    let payload = fault.to_payload();
                    let output = match common.query_language {
                        QueryLanguage::JsonPath => {
                            apply_result_path(ctx.input.clone(), payload, &rule.result_path)?
                        }
                        QueryLanguage::Jsonata => payload,
                    };
                    push_record(
                        ctx,
                        name,
                        Some(output.clone()),
                        Some(fault),
                        std::mem::take(&mut retries),
                        None,
                    );
                    return Ok(StateOutcome {
                        output,
                        next_state: Some(rule.next.clone()),
                    });
                }

                push_record(ctx, name, None, Some(fault.clone()), retries, None);
                return Err(fault);
            }
        }
    }
}

/// One attempt at a task-like state: front half of the pipeline, the
/// variant's work, and (JSONPath mode) ResultSelector. Returns the
/// effective input alongside the selected result.
async fn attempt(
    driver: &Driver,
    name: &str,
    state: &State,
    ctx: &mut ExecutionContext,
) -> Result<(Value, Value), StatesError> {
    let common = state.common();
    let context_object = ctx.context_object(None);
    let raw_input = ctx.input.clone();
    let scope = DataScope {
        input: &raw_input,
        result: None,
        error_output: None,
        context: &context_object,
        variables: &ctx.variables,
    };

    let effective_input = match common.query_language {
        QueryLanguage::JsonPath => apply_input_path(&raw_input, &common.input_path, &scope)?,
        QueryLanguage::Jsonata => raw_input.clone(),
    };

    let task_input = build_task_input(common, &effective_input, &context_object, ctx)?;

    let result = match state {
        State::Task(task) => {
            driver
                .mocks()
                .invoke(name, &task_input, Some(&task.resource))?
        }
        State::Map(map_state) => {
            map::run_map(driver, name, map_state, &effective_input, ctx).await?
        }
        State::DistributedMap(map_state) => {
            map::run_distributed_map(driver, name, map_state, &effective_input, ctx).await?
        }
        State::Parallel(parallel_state) => {
            parallel::run_parallel(driver, name, parallel_state, &task_input, ctx).await?
        }
        _ => unreachable!("only task-like states are protected"),
    };

    let selected = match common.query_language {
        QueryLanguage::JsonPath => match &common.result_selector {
            Some(selector) => {
                let scope = DataScope {
                    input: &effective_input,
                    result: Some(&result),
                    error_output: None,
                    context: &context_object,
                    variables: &ctx.variables,
                };
                apply_path_template(selector, &result, &scope)?
            }
            None => result,
        },
        QueryLanguage::Jsonata => result,
    };

    Ok((effective_input, selected))
}

/// Parameters (JSONPath) / Arguments (JSONata), defaulting to the
/// effective input.
fn build_task_input(
    common: &StateCommon,
    effective_input: &Value,
    context_object: &Value,
    ctx: &ExecutionContext,
) -> Result<Value, StatesError> {
    let scope = DataScope {
        input: effective_input,
        result: None,
        error_output: None,
        context: context_object,
        variables: &ctx.variables,
    };
    match common.query_language {
        QueryLanguage::JsonPath => match &common.parameters {
            Some(template) => apply_path_template(template, effective_input, &scope),
            None => Ok(effective_input.clone()),
        },
        QueryLanguage::Jsonata => match &common.arguments {
            Some(arguments) => apply_jsonata_template(arguments, &scope.jsonata()),
            None => Ok(effective_input.clone()),
        },
    }
}

/// The back half of the pipeline once the (selected) result exists:
/// ResultPath + OutputPath in JSONPath mode, `Output` in JSONata mode.
fn finish_success(
    common: &StateCommon,
    effective_input: Value,
    result: Value,
    ctx: &ExecutionContext,
) -> Result<Value, StatesError> {
    let context_object = ctx.context_object(None);
    match common.query_language {
        QueryLanguage::JsonPath => {
            let scope = DataScope {
                input: &effective_input,
                result: Some(&result),
                error_output: None,
                context: &context_object,
                variables: &ctx.variables,
            };
            let merged =
                apply_result_path(effective_input.clone(), result.clone(), &common.result_path)?;
            apply_output_path(merged, &common.output_path, &scope)
        }
        QueryLanguage::Jsonata => match &common.output {
            Some(output) => {
                let scope = DataScope {
                    input: &effective_input,
                    result: Some(&result),
                    error_output: None,
                    context: &context_object,
                    variables: &ctx.variables,
                };
                apply_jsonata_template(output, &scope.jsonata())
            }
            None => Ok(result),
        },
    }
}

/// Evaluate and commit `Assign`. All right-hand sides observe the
/// pre-commit variables; the bindings land only after every expression
/// resolved.
fn commit_assign(
    common: &StateCommon,
    effective_input: &Value,
    result: Option<&Value>,
    ctx: &mut ExecutionContext,
) -> Result<(), StatesError> {
    let Some(assign) = &common.assign else {
        return Ok(());
    };
    let context_object = ctx.context_object(None);
    let scope = DataScope {
        input: effective_input,
        result,
        error_output: None,
        context: &context_object,
        variables: &ctx.variables,
    };
    // Inside Assign, input-rooted paths read the state's result when one
    // exists, the way `$` behaves there on the service.
    let source = result.unwrap_or(effective_input);
    let bindings = evaluate_assign(assign, common.query_language, source, &scope)?;
    for (key, value) in bindings {
        ctx.variables.insert(key, value);
    }
    Ok(())
}

fn push_record(
    ctx: &mut ExecutionContext,
    name: &str,
    output: Option<Value>,
    error: Option<StatesError>,
    retries: Vec<RetryAttempt>,
    wait: Option<WaitRecord>,
) {
    ctx.state_executions.push(StateExecutionRecord {
        state: name.to_string(),
        input: ctx.input.clone(),
        output,
        iteration_index: None,
        branch_index: None,
        variables_after: ctx.variables.clone(),
        error,
        retries,
        wait,
    });
}

// ============================================================================
// Simple variants
// ============================================================================

fn execute_pass(
    name: &str,
    pass: &PassState,
    ctx: &mut ExecutionContext,
) -> Result<StateOutcome, StatesError> {
    let common = &pass.common;
    let context_object = ctx.context_object(None);
    let raw_input = ctx.input.clone();
    let scope = DataScope {
        input: &raw_input,
        result: None,
        error_output: None,
        context: &context_object,
        variables: &ctx.variables,
    };

    let effective_input = match common.query_language {
        QueryLanguage::JsonPath => apply_input_path(&raw_input, &common.input_path, &scope)?,
        QueryLanguage::Jsonata => raw_input.clone(),
    };
    let transformed = build_task_input(common, &effective_input, &context_object, ctx)?;
    let result = pass.result.clone().unwrap_or(transformed);

    commit_assign(common, &effective_input, Some(&result), ctx)?;
    let output = finish_success(common, effective_input, result, ctx)?;
    push_record(ctx, name, Some(output.clone()), None, Vec::new(), None);
    Ok(StateOutcome {
        output,
        next_state: common.next.clone(),
    })
}

fn execute_wait(
    name: &str,
    wait: &WaitState,
    ctx: &mut ExecutionContext,
) -> Result<StateOutcome, StatesError> {
    let common = &wait.common;
    let context_object = ctx.context_object(None);
    let raw_input = ctx.input.clone();
    let scope = DataScope {
        input: &raw_input,
        result: None,
        error_output: None,
        context: &context_object,
        variables: &ctx.variables,
    };

    let effective_input = match common.query_language {
        QueryLanguage::JsonPath => apply_input_path(&raw_input, &common.input_path, &scope)?,
        QueryLanguage::Jsonata => raw_input.clone(),
    };

    // Simulation only: the duration is recorded, never slept.
    let requested_ms = wait_duration_ms(wait, &effective_input, &scope)?;
    debug!(state = name, requested_ms, "wait simulated");

    commit_assign(common, &effective_input, None, ctx)?;
    let output = finish_success(common, effective_input.clone(), effective_input, ctx)?;
    push_record(
        ctx,
        name,
        Some(output.clone()),
        None,
        Vec::new(),
        Some(WaitRecord { requested_ms }),
    );
    Ok(StateOutcome {
        output,
        next_state: common.next.clone(),
    })
}

fn wait_duration_ms(
    wait: &WaitState,
    effective_input: &Value,
    scope: &DataScope,
) -> Result<u64, StatesError> {
    let seconds = if let Some(seconds) = &wait.seconds {
        match seconds {
            Value::Number(n) => n.as_f64().unwrap_or(0.0),
            Value::String(text) => {
                let scope = scope.jsonata();
                let value = crate::paths::evaluate_jsonata(text, &scope)?;
                value.as_f64().ok_or_else(|| {
                    StatesError::runtime("Wait Seconds expression must produce a number")
                })?
            }
            other => {
                return Err(StatesError::runtime(format!(
                    "Wait Seconds must be a number, found {other}"
                )));
            }
        }
    } else if let Some(path) = &wait.seconds_path {
        let value = resolve_jsonpath_strict(path, effective_input, scope)?;
        value.as_f64().ok_or_else(|| {
            StatesError::runtime(format!("SecondsPath '{path}' must select a number"))
        })?
    } else if let Some(stamp) = timestamp_target(wait, effective_input, scope)? {
        let now = Utc::now();
        (stamp.with_timezone(&Utc) - now).num_milliseconds().max(0) as f64 / 1000.0
    } else {
        0.0
    };
    Ok((seconds.max(0.0) * 1000.0) as u64)
}

fn timestamp_target(
    wait: &WaitState,
    effective_input: &Value,
    scope: &DataScope,
) -> Result<Option<DateTime<chrono::FixedOffset>>, StatesError> {
    let text = if let Some(timestamp) = &wait.timestamp {
        Some(timestamp.clone())
    } else if let Some(path) = &wait.timestamp_path {
        let value = resolve_jsonpath_strict(path, effective_input, scope)?;
        match value {
            Value::String(text) => Some(text),
            other => {
                return Err(StatesError::runtime(format!(
                    "TimestampPath '{path}' must select a string, found {other}"
                )));
            }
        }
    } else {
        None
    };
    match text {
        None => Ok(None),
        Some(text) => DateTime::parse_from_rfc3339(&text)
            .map(Some)
            .map_err(|err| {
                StatesError::runtime(format!("invalid Wait timestamp '{text}': {err}"))
            }),
    }
}

fn execute_succeed(
    name: &str,
    succeed: &SucceedState,
    ctx: &mut ExecutionContext,
) -> Result<StateOutcome, StatesError> {
    let common = &succeed.common;
    let context_object = ctx.context_object(None);
    let raw_input = ctx.input.clone();
    let scope = DataScope {
        input: &raw_input,
        result: None,
        error_output: None,
        context: &context_object,
        variables: &ctx.variables,
    };
    let effective_input = match common.query_language {
        QueryLanguage::JsonPath => apply_input_path(&raw_input, &common.input_path, &scope)?,
        QueryLanguage::Jsonata => raw_input.clone(),
    };
    let output = finish_success(common, effective_input.clone(), effective_input, ctx)?;
    push_record(ctx, name, Some(output.clone()), None, Vec::new(), None);
    Ok(StateOutcome {
        output,
        next_state: None,
    })
}

fn execute_fail(
    name: &str,
    fail: &FailState,
    ctx: &mut ExecutionContext,
) -> Result<StateOutcome, StatesError> {
    let fault = StatesError::new(
        fail.error.clone().unwrap_or_else(|| StatesError::FAILED.to_string()),
        fail.cause.clone().unwrap_or_else(|| "State failed".to_string()),
    );
    push_record(ctx, name, None, Some(fault.clone()), Vec::new(), None);
    Err(fault)
}

fn execute_choice(
    name: &str,
    choice: &ChoiceState,
    ctx: &mut ExecutionContext,
) -> Result<StateOutcome, StatesError> {
    let common = &choice.common;
    let context_object = ctx.context_object(None);
    let raw_input = ctx.input.clone();
    let scope = DataScope {
        input: &raw_input,
        result: None,
        error_output: None,
        context: &context_object,
        variables: &ctx.variables,
    };

    let effective_input = match common.query_language {
        QueryLanguage::JsonPath => apply_input_path(&raw_input, &common.input_path, &scope)?,
        QueryLanguage::Jsonata => raw_input.clone(),
    };
    let next = {
        let choice_scope = DataScope {
            input: &effective_input,
            result: None,
            error_output: None,
            context: &context_object,
            variables: &ctx.variables,
        };
        choose_next(choice, &effective_input, &choice_scope)?
    };

    commit_assign(common, &effective_input, None, ctx)?;
    let output_scope = DataScope {
        input: &effective_input,
        result: None,
        error_output: None,
        context: &context_object,
        variables: &ctx.variables,
    };
    let output = match common.query_language {
        QueryLanguage::JsonPath => {
            apply_output_path(effective_input.clone(), &common.output_path, &output_scope)?
        }
        QueryLanguage::Jsonata => match &common.output {
            Some(output) => apply_jsonata_template(output, &output_scope.jsonata())?,
            None => effective_input.clone(),
        },
    };
    push_record(ctx, name, Some(output.clone()), None, Vec::new(), None);
    Ok(StateOutcome {
        output,
        next_state: Some(next),
    })
}
