//! The execution driver: top-level loop, guards, and the result envelope.

use std::sync::Arc;
use std::time::Instant;

use futures_util::future::BoxFuture;
use miette::Diagnostic;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::asl::StateMachine;
use crate::config::ExecutionConfig;
use crate::errors::StatesError;
use crate::events::{EventBus, ExecutionEvent};
use crate::exec::context::{ExecutionContext, ExecutionResult};
use crate::exec::executor;
use crate::mock::MockEngine;

/// Fatal engine errors from the driver's own guards.
///
/// These are not ASL faults: they carry no `Error` name, never participate
/// in Retry/Catch, and surface as `Err` from [`Driver::execute`] instead of
/// inside the result envelope. Workflow-level failures (uncaught
/// `{Error, Cause}` faults) stay in the envelope.
#[derive(Debug, Error, Diagnostic)]
pub enum DriverError {
    #[error("state '{state}' not found in machine")]
    #[diagnostic(
        code(stepsim::exec::state_not_found),
        help("Construction validates every transition target; this indicates a machine built outside the validated constructors.")
    )]
    StateNotFound { state: String },

    #[error("exceeded the maximum step count ({max_steps})")]
    #[diagnostic(
        code(stepsim::exec::max_steps),
        help("Raise ExecutionConfig::max_steps if the workflow legitimately needs more transitions.")
    )]
    MaxStepsExceeded { max_steps: u64 },

    #[error("exceeded the wall-clock cap ({cap_ms} ms)")]
    #[diagnostic(code(stepsim::exec::wall_clock))]
    WallClockExceeded { cap_ms: u64 },
}

/// Why a run loop stopped early: a workflow fault (envelope material) or a
/// driver guard (an `Err` to the caller).
enum RunTermination {
    Fault(StatesError),
    Driver(DriverError),
}

/// Runs one workflow input against a validated machine and a mock set.
///
/// A `Driver` is cheap to keep around: every [`execute`](Self::execute)
/// call starts a fresh context and rewinds the mock engine's stateful
/// counters, so the same driver can run many inputs in sequence.
///
/// # Examples
///
/// ```rust,no_run
/// use stepsim::asl::StateMachine;
/// use stepsim::exec::Driver;
/// use stepsim::mock::{MockEngine, MockFile};
/// use serde_json::json;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let machine = StateMachine::from_file("machine.asl.json")?;
/// let mocks = MockEngine::new(MockFile::from_file("mocks.yaml")?)?;
///
/// let driver = Driver::new(machine, mocks);
/// let result = driver.execute(json!({"order": {"id": "o-1"}})).await?;
/// assert!(result.success);
/// # Ok(())
/// # }
/// ```
pub struct Driver {
    machine: Arc<StateMachine>,
    mocks: Arc<MockEngine>,
    config: ExecutionConfig,
    events: EventBus,
}

impl Driver {
    pub fn new(machine: StateMachine, mocks: MockEngine) -> Self {
        Self {
            machine: Arc::new(machine),
            mocks: Arc::new(mocks),
            config: ExecutionConfig::default(),
            events: EventBus::new(),
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: ExecutionConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = events;
        self
    }

    #[must_use]
    pub fn machine(&self) -> &StateMachine {
        &self.machine
    }

    pub(crate) fn mocks(&self) -> &MockEngine {
        &self.mocks
    }

    pub(crate) fn config(&self) -> &ExecutionConfig {
        &self.config
    }

    pub(crate) fn events(&self) -> &EventBus {
        &self.events
    }

    /// Run one input to completion and return the result envelope.
    ///
    /// Workflow failures — uncaught faults, including the payload-size
    /// `States.DataLimitExceeded` — come back inside the envelope with
    /// `success: false` and the exact `{Error, Cause}` pair preserved.
    /// `Err` is reserved for the driver's own guards ([`DriverError`]:
    /// unknown state, step guard, wall-clock guard), which are engine
    /// diagnostics rather than workflow data.
    #[instrument(skip(self, input))]
    pub async fn execute(&self, input: Value) -> Result<ExecutionResult, DriverError> {
        self.mocks.reset();
        let mut ctx = ExecutionContext::new(input, &self.machine.start_at);
        let started = Instant::now();

        let outcome = self
            .run_machine(&self.machine, &mut ctx, Some(started))
            .await;

        let (success, output, error) = match outcome {
            Ok(output) => (true, output, None),
            Err(RunTermination::Fault(fault)) => {
                warn!(error = %fault, "execution failed");
                (false, Value::Null, Some(fault))
            }
            Err(RunTermination::Driver(err)) => {
                warn!(error = %err, "execution aborted by driver guard");
                self.events.emit(ExecutionEvent::RunCompleted {
                    success: false,
                    steps: ctx.steps,
                });
                return Err(err);
            }
        };
        self.events.emit(ExecutionEvent::RunCompleted {
            success,
            steps: ctx.steps,
        });

        Ok(ExecutionResult {
            success,
            output,
            path: ctx.execution_path,
            state_executions: ctx.state_executions,
            map_executions: ctx.map_executions,
            parallel_executions: ctx.parallel_executions,
            error,
        })
    }

    /// Boxed recursion point for Map iterations and Parallel branches.
    ///
    /// A child run that trips a driver guard fails like any other
    /// iteration fault (`States.Runtime`), so Map tolerance and the
    /// parent state's Retry/Catch apply to it.
    pub(crate) fn run_submachine<'a>(
        &'a self,
        machine: &'a StateMachine,
        ctx: &'a mut ExecutionContext,
    ) -> BoxFuture<'a, Result<Value, StatesError>> {
        Box::pin(async move {
            self.run_machine(machine, ctx, None)
                .await
                .map_err(|termination| match termination {
                    RunTermination::Fault(fault) => fault,
                    RunTermination::Driver(err) => StatesError::runtime(err.to_string()),
                })
        })
    }

    async fn run_machine(
        &self,
        machine: &StateMachine,
        ctx: &mut ExecutionContext,
        started: Option<Instant>,
    ) -> Result<Value, RunTermination> {
        loop {
            ctx.steps += 1;
            if ctx.steps > self.config.max_steps {
                return Err(RunTermination::Driver(DriverError::MaxStepsExceeded {
                    max_steps: self.config.max_steps,
                }));
            }
            if let (Some(started), Some(cap)) = (started, self.config.wall_clock_cap) {
                if started.elapsed() > cap {
                    return Err(RunTermination::Driver(DriverError::WallClockExceeded {
                        cap_ms: cap.as_millis() as u64,
                    }));
                }
            }

            let name = ctx.current_state.clone();
            // Validation guarantees every transition target exists.
            let state = machine.states.get(&name).ok_or_else(|| {
                RunTermination::Driver(DriverError::StateNotFound {
                    state: name.clone(),
                })
            })?;

            self.events.emit(ExecutionEvent::StateEntered {
                state: name.clone(),
                step: ctx.steps,
            });

            match executor::execute_state(self, &name, state, ctx).await {
                Ok(outcome) => {
                    ctx.execution_path.push(name.clone());
                    self.events.emit(ExecutionEvent::StateCompleted {
                        state: name.clone(),
                        step: ctx.steps,
                        success: true,
                    });

                    if let Some(limit) = self.config.max_payload_bytes {
                        let size = serde_json::to_vec(&outcome.output)
                            .map(|bytes| bytes.len())
                            .unwrap_or(0);
                        if size > limit {
                            return Err(RunTermination::Fault(
                                StatesError::data_limit_exceeded(format!(
                                    "state '{name}' produced {size} bytes, limit is {limit}"
                                )),
                            ));
                        }
                    }

                    ctx.input = outcome.output.clone();
                    match outcome.next_state {
                        Some(next) => {
                            debug!(from = %name, to = %next, "transition");
                            ctx.current_state = next;
                        }
                        None => return Ok(outcome.output),
                    }
                }
                Err(fault) => {
                    ctx.execution_path.push(name.clone());
                    self.events.emit(ExecutionEvent::StateCompleted {
                        state: name.clone(),
                        step: ctx.steps,
                        success: false,
                    });
                    return Err(RunTermination::Fault(fault));
                }
            }
        }
    }
}
