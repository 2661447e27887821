//! # Stepsim: Local Amazon States Language Interpreter
//!
//! Stepsim executes AWS Step Functions state machines locally, without ever
//! contacting AWS. Service integrations are replaced by a deterministic mock
//! engine, while the state-by-state outputs, variable bindings, execution
//! path, retry/catch behavior, and data-flow transformations match what the
//! real service would produce.
//!
//! ## Core Concepts
//!
//! - **States**: Nine ASL state variants (Task, Choice, Pass, Wait, Succeed,
//!   Fail, Map, DistributedMap, Parallel) dispatched on their `Type` tag
//! - **Data flow**: The full `InputPath → Parameters → ResultSelector →
//!   ResultPath → OutputPath` pipeline, with JSONata `Arguments`/`Output` as
//!   the alternative mode
//! - **Mocks**: Five strategies (fixed, conditional, stateful, error,
//!   itemReader) substituting every external service call
//! - **Driver**: A step-bounded execution loop producing a result envelope
//!   with the recorded path and per-state execution records
//!
//! ## Quick Start
//!
//! ### Parsing a state machine
//!
//! ```
//! use stepsim::asl::StateMachine;
//!
//! let machine = StateMachine::from_json_str(r#"{
//!     "StartAt": "Hello",
//!     "States": {
//!         "Hello": {
//!             "Type": "Pass",
//!             "Result": {"greeting": "hello world"},
//!             "End": true
//!         }
//!     }
//! }"#).unwrap();
//!
//! assert_eq!(machine.start_at, "Hello");
//! assert!(machine.states.contains_key("Hello"));
//! ```
//!
//! ### Running a workflow
//!
//! ```rust,no_run
//! use stepsim::asl::StateMachine;
//! use stepsim::exec::Driver;
//! use stepsim::mock::MockEngine;
//! use serde_json::json;
//!
//! # async fn example(machine: StateMachine) -> Result<(), Box<dyn std::error::Error>> {
//! let driver = Driver::new(machine, MockEngine::default());
//! let result = driver.execute(json!({"order": {"total": 1300}})).await?;
//!
//! assert!(result.success);
//! println!("path: {:?}", result.path);
//! # Ok(())
//! # }
//! ```
//!
//! ### Mocking service calls
//!
//! Task states resolve against mocks keyed by state name. Mock files are
//! YAML documents; Lambda-invoke integrations automatically receive the
//! `{Payload, StatusCode}` envelope the real service wraps responses in:
//!
//! ```
//! use stepsim::mock::MockFile;
//!
//! let mocks = MockFile::from_yaml_str(r#"
//! version: "1.0"
//! mocks:
//!   - state: FetchOrder
//!     type: fixed
//!     response:
//!       Payload: {orderId: "o-1", total: 1300}
//!       StatusCode: 200
//! "#).unwrap();
//!
//! assert_eq!(mocks.mocks.len(), 1);
//! ```
//!
//! ## Error Handling
//!
//! Failures inside a run carry ASL fault names (`States.TaskFailed`,
//! `States.Runtime`, …) as [`errors::StatesError`] values that Retry and
//! Catch rules match on. Construction problems and the driver's own guards
//! ([`exec::DriverError`]) surface as `thiserror`/`miette` diagnostics
//! instead — they are engine errors, not workflow data.
//!
//! ## Module Guide
//!
//! - [`asl`] - State-machine model, construction-time validation
//! - [`paths`] - JSONPath subset and JSONata subset evaluators
//! - [`pipeline`] - The ASL data-flow pipeline and `Assign` processing
//! - [`mock`] - Mock engine, mock-file model, item readers
//! - [`exec`] - Per-state executors, retry/catch, the execution driver
//! - [`events`] - Execution event stream with pluggable sinks
//! - [`validator`] - Lints for mock/test files
//! - [`authoring`] - Generator retry loop with validation feedback
//! - [`harness`] - Test-suite runner over the YAML test-file format

pub mod asl;
pub mod authoring;
pub mod config;
pub mod errors;
pub mod events;
pub mod exec;
pub mod harness;
pub mod mock;
pub mod paths;
pub mod pipeline;
pub mod telemetry;
pub mod validator;
