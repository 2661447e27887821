#![allow(dead_code)]

use stepsim::asl::StateMachine;
use stepsim::config::ExecutionConfig;
use stepsim::exec::{Driver, ExecutionResult};
use stepsim::mock::{MockEngine, MockFile};

/// Parse a machine, panicking with the validation error on failure.
pub fn machine(json: &str) -> StateMachine {
    StateMachine::from_json_str(json).expect("valid state machine")
}

/// Build a mock engine from inline YAML.
pub fn mocks(yaml: &str) -> MockEngine {
    MockEngine::new(MockFile::from_yaml_str(yaml).expect("valid mock yaml"))
        .expect("well-formed mocks")
}

/// A driver over inline definitions with default config.
pub fn driver(machine_json: &str, mocks_yaml: &str) -> Driver {
    Driver::new(machine(machine_json), mocks(mocks_yaml))
}

/// Run a machine that needs no mocks. Driver guards are not expected to
/// trip here; tests that exercise them call `execute` directly.
pub async fn run_plain(machine_json: &str, input: serde_json::Value) -> ExecutionResult {
    Driver::new(machine(machine_json), MockEngine::default())
        .execute(input)
        .await
        .expect("no driver guard should trip")
}

/// Run with mocks and default config.
pub async fn run(machine_json: &str, mocks_yaml: &str, input: serde_json::Value) -> ExecutionResult {
    driver(machine_json, mocks_yaml)
        .execute(input)
        .await
        .expect("no driver guard should trip")
}

/// Run with a custom configuration.
pub async fn run_with_config(
    machine_json: &str,
    mocks_yaml: &str,
    config: ExecutionConfig,
    input: serde_json::Value,
) -> ExecutionResult {
    driver(machine_json, mocks_yaml)
        .with_config(config)
        .execute(input)
        .await
        .expect("no driver guard should trip")
}
