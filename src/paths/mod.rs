//! Value model and path algebra: the two expression languages ASL states
//! use to pick data apart and put it back together.
//!
//! - [`jsonpath`]: the JSONPath subset (`$`, `.field`, `[i]`, `[*]`) with an
//!   explicit "not present" sentinel distinct from `null`, plus the writer
//!   used by `ResultPath`.
//! - [`jsonata`]: the JSONata subset evaluator for `{% … %}` expressions in
//!   JSONata-mode states.
//!
//! Both operate on `serde_json::Value` and never mutate their inputs;
//! transformations produce new values.

pub mod jsonata;
pub mod jsonpath;

pub use jsonata::{JSONATA_CLOSE, JSONATA_OPEN, JsonataScope, evaluate_jsonata, is_jsonata_expression};
pub use jsonpath::{JsonPath, PathError, PathRoot, PathValue};
