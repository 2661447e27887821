//! The Amazon States Language model: machines, states, and rules.
//!
//! Everything here is constructed from parsed JSON and validated once, up
//! front. A successfully constructed [`StateMachine`] needs no further
//! shape checks during execution: mode-mismatched fields, dangling `Next`
//! references, and malformed rules are all fatal at construction time.

pub mod machine;
pub mod query;
pub mod rules;
pub mod state;

pub use machine::{MachineError, StateMachine};
pub use query::QueryLanguage;
pub use rules::{CatchRule, ChoiceRule, JitterStrategy, RetryRule};
pub use state::{
    ChoiceState, DistributedMapState, FailState, ItemReaderConfig, MapState, OptionalPath,
    ParallelState, PassState, State, StateCommon, SucceedState, TaskState, WaitState,
};
