//! Execution context, per-state records, and the result envelope.

use chrono::{DateTime, Utc};
use rustc_hash::FxHashMap;
use serde::Serialize;
use serde_json::{Value, json};
use uuid::Uuid;

use crate::errors::StatesError;

/// One retry attempt of a state, kept for tests that assert on timing
/// without sleeping through real back-off.
#[derive(Debug, Clone, Serialize)]
pub struct RetryAttempt {
    /// 1-based retry number under the matched rule.
    pub attempt: u32,
    /// The fault name that triggered the retry.
    pub error: String,
    /// The back-off the rule computed, before the simulator cap.
    pub backoff_ms: u64,
    /// What was actually slept (capped).
    pub slept_ms: u64,
}

/// Metadata for a Wait state, which never actually sleeps.
#[derive(Debug, Clone, Serialize)]
pub struct WaitRecord {
    /// The wait the definition asked for, in milliseconds.
    pub requested_ms: u64,
}

/// The record of one state invocation.
#[derive(Debug, Clone, Serialize)]
pub struct StateExecutionRecord {
    pub state: String,
    pub input: Value,
    pub output: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iteration_index: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch_index: Option<usize>,
    pub variables_after: FxHashMap<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<StatesError>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub retries: Vec<RetryAttempt>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wait: Option<WaitRecord>,
}

/// Mutable state threaded through one run.
///
/// `variables` is mutated only by `Assign` processing; the record vectors
/// are append-only. Map iterations and Parallel branches execute against
/// child contexts built from [`ExecutionContext::child`] — each child gets
/// an isolated copy of `variables`, so writes never leak between siblings
/// or back into the parent.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub input: Value,
    pub original_input: Value,
    pub current_state: String,
    pub execution_path: Vec<String>,
    pub variables: FxHashMap<String, Value>,
    pub state_executions: Vec<StateExecutionRecord>,
    pub map_executions: Vec<StateExecutionRecord>,
    pub parallel_executions: Vec<StateExecutionRecord>,
    pub execution_id: String,
    pub started_at: DateTime<Utc>,
    pub steps: u64,
}

impl ExecutionContext {
    pub fn new(input: Value, start_at: &str) -> Self {
        Self {
            original_input: input.clone(),
            input,
            current_state: start_at.to_string(),
            execution_path: Vec::new(),
            variables: FxHashMap::default(),
            state_executions: Vec::new(),
            map_executions: Vec::new(),
            parallel_executions: Vec::new(),
            execution_id: Uuid::new_v4().to_string(),
            started_at: Utc::now(),
            steps: 0,
        }
    }

    /// Build the context for a Map iteration or Parallel branch: same
    /// execution identity and original input, isolated variable copy.
    #[must_use]
    pub fn child(&self, input: Value, start_at: &str) -> Self {
        Self {
            original_input: self.original_input.clone(),
            input,
            current_state: start_at.to_string(),
            execution_path: Vec::new(),
            variables: self.variables.clone(),
            state_executions: Vec::new(),
            map_executions: Vec::new(),
            parallel_executions: Vec::new(),
            execution_id: self.execution_id.clone(),
            started_at: self.started_at,
            steps: 0,
        }
    }

    /// The `$$` context object visible to path and JSONata evaluation.
    /// `map_item` adds the `$$.Map.Item.{Index,Value}` section inside an
    /// `ItemSelector`.
    #[must_use]
    pub fn context_object(&self, map_item: Option<(usize, &Value)>) -> Value {
        let mut object = json!({
            "Execution": {
                "Id": self.execution_id,
                "Input": self.original_input,
                "StartTime": self.started_at.to_rfc3339(),
            },
            "State": {
                "Name": self.current_state,
            },
        });
        if let Some((index, value)) = map_item {
            object["Map"] = json!({"Item": {"Index": index, "Value": value}});
        }
        object
    }
}

/// The envelope for one run.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionResult {
    pub success: bool,
    pub output: Value,
    pub path: Vec<String>,
    pub state_executions: Vec<StateExecutionRecord>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub map_executions: Vec<StateExecutionRecord>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub parallel_executions: Vec<StateExecutionRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<StatesError>,
}

impl ExecutionResult {
    /// Variables after the last executed state, for harness assertions.
    #[must_use]
    pub fn final_variables(&self) -> Option<&FxHashMap<String, Value>> {
        self.state_executions
            .last()
            .map(|record| &record.variables_after)
    }
}
