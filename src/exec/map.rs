//! Map and DistributedMap fan-out.
//!
//! Items execute through the `ItemProcessor` sub-machine with per-item
//! contexts: each iteration gets an isolated copy of the parent's
//! variables, and its records land in `map_executions` tagged with the
//! iteration index. `MaxConcurrency` bounds in-flight iterations via an
//! ordered buffered stream, so the output array is always in input-item
//! order regardless of completion order.

use futures_util::StreamExt;
use futures_util::stream;
use serde_json::{Value, json};

use crate::asl::{DistributedMapState, MapState, QueryLanguage, StateMachine};
use crate::errors::StatesError;
use crate::exec::context::ExecutionContext;
use crate::exec::driver::Driver;
use crate::pipeline::{DataScope, apply_jsonata_template, apply_path_template, resolve_jsonpath_strict};

pub(crate) async fn run_map(
    driver: &Driver,
    name: &str,
    state: &MapState,
    effective_input: &Value,
    ctx: &mut ExecutionContext,
) -> Result<Value, StatesError> {
    let items = select_items(name, state.items_path.as_deref(), effective_input, ctx)?;
    let outcomes = run_items(
        driver,
        &state.item_processor,
        state.item_selector.as_ref(),
        state.common.query_language,
        state.max_concurrency,
        items,
        effective_input,
        ctx,
    )
    .await?;

    // A failed-and-uncaught iteration fails the whole Map.
    let mut results = Vec::with_capacity(outcomes.len());
    for outcome in outcomes {
        results.push(outcome?);
    }
    Ok(Value::Array(results))
}

pub(crate) async fn run_distributed_map(
    driver: &Driver,
    name: &str,
    state: &DistributedMapState,
    effective_input: &Value,
    ctx: &mut ExecutionContext,
) -> Result<Value, StatesError> {
    let items = if state.item_reader.is_some() {
        driver.mocks().read_items(name)?
    } else {
        select_items(name, state.items_path.as_deref(), effective_input, ctx)?
    };

    let outcomes = run_items(
        driver,
        &state.item_processor,
        state.item_selector.as_ref(),
        state.common.query_language,
        state.max_concurrency,
        items,
        effective_input,
        ctx,
    )
    .await?;

    let total = outcomes.len();
    let mut results = Vec::with_capacity(total);
    let mut failures = 0usize;
    let mut first_fault = None;
    for outcome in outcomes {
        match outcome {
            Ok(value) => results.push(value),
            Err(fault) => {
                failures += 1;
                if first_fault.is_none() {
                    first_fault = Some(fault);
                }
                // Tolerated failures leave a hole at the item's position.
                results.push(Value::Null);
            }
        }
    }

    if failures > 0 && !failures_tolerated(state, failures, total) {
        return Err(first_fault.expect("at least one failure recorded"));
    }

    if state.result_writer.is_some() {
        // With a ResultWriter the map reports a summary, not the results.
        return Ok(json!({
            "ProcessedItemCount": total,
            "ResultWriterDetails": {"RecordsWritten": total - failures},
        }));
    }
    Ok(Value::Array(results))
}

fn failures_tolerated(state: &DistributedMapState, failures: usize, total: usize) -> bool {
    if let Some(count) = state.tolerated_failure_count {
        if failures as u64 <= count {
            return true;
        }
    }
    if let Some(percentage) = state.tolerated_failure_percentage {
        if total > 0 && (failures as f64 / total as f64) * 100.0 <= percentage {
            return true;
        }
    }
    false
}

fn select_items(
    name: &str,
    items_path: Option<&str>,
    effective_input: &Value,
    ctx: &ExecutionContext,
) -> Result<Vec<Value>, StatesError> {
    let value = match items_path {
        None => effective_input.clone(),
        Some(path) => {
            let context_object = ctx.context_object(None);
            let scope = DataScope {
                input: effective_input,
                result: None,
                error_output: None,
                context: &context_object,
                variables: &ctx.variables,
            };
            resolve_jsonpath_strict(path, effective_input, &scope)?
        }
    };
    match value {
        Value::Array(items) => Ok(items),
        other => Err(StatesError::runtime(format!(
            "Map state '{name}' needs an array of items, found {other}"
        ))),
    }
}

/// Run every item through the processor, bounded by `max_concurrency`
/// (0 = unbounded), and append iteration records to the parent context in
/// item order. The returned vector is indexed by item.
#[allow(clippy::too_many_arguments)]
async fn run_items(
    driver: &Driver,
    processor: &StateMachine,
    item_selector: Option<&Value>,
    language: QueryLanguage,
    max_concurrency: usize,
    items: Vec<Value>,
    effective_input: &Value,
    ctx: &mut ExecutionContext,
) -> Result<Vec<Result<Value, StatesError>>, StatesError> {
    // Item inputs are prepared sequentially so ItemSelector evaluation is
    // deterministic and sees a stable context.
    let mut children = Vec::with_capacity(items.len());
    for (index, item) in items.iter().enumerate() {
        let context_object = ctx.context_object(Some((index, item)));
        let scope = DataScope {
            input: effective_input,
            result: None,
            error_output: None,
            context: &context_object,
            variables: &ctx.variables,
        };
        let item_input = match item_selector {
            None => item.clone(),
            Some(selector) => match language {
                QueryLanguage::JsonPath => {
                    apply_path_template(selector, effective_input, &scope)?
                }
                QueryLanguage::Jsonata => apply_jsonata_template(selector, &scope.jsonata())?,
            },
        };
        children.push(ctx.child(item_input, &processor.start_at));
    }

    let limit = if max_concurrency == 0 {
        children.len().max(1)
    } else {
        max_concurrency
    };

    let joined: Vec<(Result<Value, StatesError>, ExecutionContext)> =
        stream::iter(children.into_iter().map(|mut child| async move {
            let result = driver.run_submachine(processor, &mut child).await;
            (result, child)
        }))
        .buffered(limit)
        .collect()
        .await;

    let mut outcomes = Vec::with_capacity(joined.len());
    for (index, (result, child)) in joined.into_iter().enumerate() {
        for mut record in child.state_executions {
            record.iteration_index = Some(index);
            ctx.map_executions.push(record);
        }
        ctx.map_executions.extend(child.map_executions);
        ctx.parallel_executions.extend(child.parallel_executions);
        outcomes.push(result);
    }
    Ok(outcomes)
}
