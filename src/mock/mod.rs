//! The mock engine: the stand-in for every external service call.
//!
//! A run carries one [`MockEngine`] built from a YAML mock file. Task
//! states address it by state name; DistributedMap states pull item sources
//! from it. Five strategies are supported — `fixed`, `conditional`,
//! `stateful`, `error`, and `itemReader` — and Lambda-invoke resources get
//! the `{Payload, StatusCode}` envelope the real service produces.

pub mod config;
pub mod engine;
pub mod item_reader;

pub use config::{
    DataFormat, MockCondition, MockDefinition, MockErrorSpec, MockFile, MockStrategy, WhenClause,
};
pub use engine::{MockConfigError, MockEngine};
