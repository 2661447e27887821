//! Parallel branch fan-out.
//!
//! Every branch receives the same input and an isolated copy of the
//! parent's variables. Outputs are collected into an array ordered by
//! branch declaration — never by completion — and branch records land in
//! `parallel_executions` tagged with the branch index.

use futures_util::future::join_all;
use serde_json::Value;

use crate::asl::ParallelState;
use crate::errors::StatesError;
use crate::exec::context::ExecutionContext;
use crate::exec::driver::Driver;

pub(crate) async fn run_parallel(
    driver: &Driver,
    _name: &str,
    state: &ParallelState,
    branch_input: &Value,
    ctx: &mut ExecutionContext,
) -> Result<Value, StatesError> {
    let mut children = Vec::with_capacity(state.branches.len());
    for branch in &state.branches {
        children.push(ctx.child(branch_input.clone(), &branch.start_at));
    }

    let joined = join_all(state.branches.iter().zip(children).map(
        |(branch, mut child)| async move {
            let result = driver.run_submachine(branch, &mut child).await;
            (result, child)
        },
    ))
    .await;

    let mut outputs = Vec::with_capacity(joined.len());
    let mut first_fault = None;
    for (index, (result, child)) in joined.into_iter().enumerate() {
        for mut record in child.state_executions {
            record.branch_index = Some(index);
            ctx.parallel_executions.push(record);
        }
        ctx.map_executions.extend(child.map_executions);
        ctx.parallel_executions.extend(child.parallel_executions);
        match result {
            Ok(output) => outputs.push(output),
            Err(fault) => {
                if first_fault.is_none() {
                    first_fault = Some(fault);
                }
            }
        }
    }

    // Branch failure policy mirrors Task: the first failing branch (in
    // declaration order) fails the state, subject to its Retry/Catch.
    if let Some(fault) = first_fault {
        return Err(fault);
    }
    Ok(Value::Array(outputs))
}
