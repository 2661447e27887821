//! Test-file model (YAML).

use std::path::Path;

use serde::Deserialize;
use serde_json::Value;

use crate::errors::LoadError;
use crate::mock::MockDefinition;

/// How `expectedOutput` is compared against the run's output.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputMatching {
    /// Subset semantics: expected keys must be present and equal.
    #[default]
    Partial,
    /// Deep equality.
    Exact,
}

/// Per-state assertions within one case. All comparisons are partial.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateExpectation {
    pub state: String,
    #[serde(default)]
    pub input: Option<Value>,
    #[serde(default)]
    pub output: Option<Value>,
    #[serde(default)]
    pub variables: Option<Value>,
}

/// One test case.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestCase {
    pub name: String,
    #[serde(default)]
    pub input: Value,
    #[serde(default)]
    pub expected_output: Option<Value>,
    #[serde(default)]
    pub expected_path: Option<Vec<String>>,
    #[serde(default)]
    pub output_matching: OutputMatching,
    #[serde(default)]
    pub state_expectations: Vec<StateExpectation>,
    /// Per-case mock overrides; they replace base mocks for the same state.
    #[serde(default)]
    pub mocks: Vec<MockDefinition>,
}

/// A parsed test file.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestSuite {
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub state_machine: Option<String>,
    #[serde(default)]
    pub base_mock: Option<String>,
    #[serde(default)]
    pub test_cases: Vec<TestCase>,
}

impl TestSuite {
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
