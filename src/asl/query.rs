//! Query language selection.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The expression language a machine or state uses for data flow.
///
/// JSONPath is the ASL default; JSONata changes which data-flow fields are
/// legal on a state (see the construction rules in
/// [`state`](crate::asl::state)). A state inherits the machine-level
/// setting unless it declares its own.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QueryLanguage {
    #[default]
    #[serde(rename = "JSONPath")]
    JsonPath,
    #[serde(rename = "JSONata")]
    Jsonata,
}

impl fmt::Display for QueryLanguage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::JsonPath => write!(f, "JSONPath"),
            Self::Jsonata => write!(f, "JSONata"),
        }
    }
}
