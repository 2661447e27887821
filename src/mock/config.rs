//! Mock-file model (YAML).
//!
//! The file shape:
//!
//! ```yaml
//! version: "1.0"
//! mocks:
//!   - state: FetchOrder          # must match an ASL state name
//!     type: fixed|conditional|stateful|error|itemReader
//!     response: <json>           # fixed
//!     conditions:                # conditional
//!       - when: { input: {...} }
//!         response: <json>
//!       - default: <json>
//!     responses: [<json>, ...]   # stateful
//!     error: { type: ..., cause: ... }
//!     dataFile: items.csv        # itemReader
//!     dataFormat: csv
//! ```

use std::path::Path;

use serde::Deserialize;
use serde_json::Value;

use crate::errors::LoadError;

/// The dispatch kind of one mock.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MockStrategy {
    Fixed,
    Conditional,
    Stateful,
    Error,
    ItemReader,
}

impl MockStrategy {
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            MockStrategy::Fixed => "fixed",
            MockStrategy::Conditional => "conditional",
            MockStrategy::Stateful => "stateful",
            MockStrategy::Error => "error",
            MockStrategy::ItemReader => "itemReader",
        }
    }
}

/// Item-file format for `itemReader` mocks.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataFormat {
    Json,
    Jsonl,
    Csv,
    Yaml,
}

/// The `when` clause of a conditional entry: an input pattern the actual
/// task input is matched against (object keys are subset-matched).
#[derive(Clone, Debug, Deserialize)]
pub struct WhenClause {
    pub input: Value,
}

/// One entry of a `conditions` list: either a guarded response or the
/// trailing `default`.
#[derive(Clone, Debug, Deserialize)]
pub struct MockCondition {
    #[serde(default)]
    pub when: Option<WhenClause>,
    #[serde(default)]
    pub response: Option<Value>,
    #[serde(default)]
    pub default: Option<Value>,
}

/// The `error` payload of an `error` mock.
#[derive(Clone, Debug, Deserialize)]
pub struct MockErrorSpec {
    #[serde(rename = "type")]
    pub error_type: String,
    #[serde(default)]
    pub cause: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl MockErrorSpec {
    #[must_use]
    pub fn cause_text(&self) -> String {
        self.cause
            .clone()
            .or_else(|| self.message.clone())
            .unwrap_or_else(|| "mocked error".to_string())
    }
}

/// One mock, keyed by the exact state name (nested Map/Parallel states are
/// referenced by bare name).
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MockDefinition {
    pub state: String,
    #[serde(rename = "type")]
    pub strategy: MockStrategy,
    #[serde(default)]
    pub response: Option<Value>,
    #[serde(default)]
    pub conditions: Vec<MockCondition>,
    #[serde(default)]
    pub responses: Vec<Value>,
    #[serde(default)]
    pub error: Option<MockErrorSpec>,
    #[serde(default)]
    pub data_file: Option<String>,
    #[serde(default)]
    pub data_format: Option<DataFormat>,
}

/// A parsed mock file.
#[derive(Clone, Debug, Deserialize, Default)]
pub struct MockFile {
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub mocks: Vec<MockDefinition>,
}

impl MockFile {
    pub fn from_yaml_str(text: &str) -> Result<Self, LoadError> {
        serde_yaml::from_str(text).map_err(|source| LoadError::Yaml {
            path: "<inline>".to_string(),
            source,
        })
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, LoadError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| LoadError::Io {
            path: path.display().to_string(),
            source,
        })?;
        serde_yaml::from_str(&text).map_err(|source| LoadError::Yaml {
            path: path.display().to_string(),
            source,
        })
    }
}
