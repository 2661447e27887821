//! Execution configuration.

use std::time::Duration;

/// Knobs for one run of the driver.
///
/// Defaults come from the environment when set (`.env` files are honored
/// via `dotenvy`):
///
/// - `STEPSIM_MAX_STEPS` — step guard, default 10 000
/// - `STEPSIM_BACKOFF_CAP_MS` — retry sleep cap, default 100
/// - `STEPSIM_WALL_CLOCK_MS` — optional per-run wall-clock cap
#[derive(Clone, Debug)]
pub struct ExecutionConfig {
    /// Maximum number of state transitions before the run is aborted.
    pub max_steps: u64,
    /// Cap applied to every retry back-off sleep; the pre-cap value is
    /// still recorded for assertions.
    pub backoff_cap_ms: u64,
    /// Optional wall-clock bound for the whole run.
    pub wall_clock_cap: Option<Duration>,
    /// Optional bound on the serialized size of any state output.
    pub max_payload_bytes: Option<usize>,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        dotenvy::dotenv().ok();
        let max_steps = env_number("STEPSIM_MAX_STEPS").unwrap_or(10_000);
        let backoff_cap_ms = env_number("STEPSIM_BACKOFF_CAP_MS").unwrap_or(100);
        let wall_clock_cap = env_number("STEPSIM_WALL_CLOCK_MS").map(Duration::from_millis);
        Self {
            max_steps,
            backoff_cap_ms,
            wall_clock_cap,
            max_payload_bytes: None,
        }
    }
}

impl ExecutionConfig {
    #[must_use]
    pub fn with_max_steps(mut self, max_steps: u64) -> Self {
        self.max_steps = max_steps;
        self
    }

    #[must_use]
    pub fn with_backoff_cap_ms(mut self, cap_ms: u64) -> Self {
        self.backoff_cap_ms = cap_ms;
        self
    }

    #[must_use]
    pub fn with_wall_clock_cap(mut self, cap: Duration) -> Self {
        self.wall_clock_cap = Some(cap);
        self
    }

    #[must_use]
    pub fn with_max_payload_bytes(mut self, bytes: usize) -> Self {
        self.max_payload_bytes = Some(bytes);
        self
    }
}

fn env_number(name: &str) -> Option<u64> {
    std::env::var(name).ok()?.trim().parse().ok()
}
