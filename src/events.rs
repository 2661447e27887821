//! Execution event stream with pluggable sinks.
//!
//! The driver broadcasts one [`ExecutionEvent`] per interesting moment of a
//! run (state entered/completed, retry scheduled, run finished) to every
//! sink registered on its [`EventBus`]. Sinks decide what to do with them:
//! [`StdOutSink`] prints, [`MemorySink`] captures for test assertions,
//! [`ChannelSink`] streams to a flume channel for external consumers.

use std::any::type_name;
use std::io::{self, Result as IoResult, Write};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{Value, json};

/// One observable moment of a run.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExecutionEvent {
    StateEntered {
        state: String,
        step: u64,
    },
    StateCompleted {
        state: String,
        step: u64,
        success: bool,
    },
    RetryScheduled {
        state: String,
        attempt: u32,
        error: String,
        backoff_ms: u64,
    },
    RunCompleted {
        success: bool,
        steps: u64,
    },
    Diagnostic {
        scope: String,
        message: String,
    },
}

impl ExecutionEvent {
    pub fn diagnostic(scope: impl Into<String>, message: impl Into<String>) -> Self {
        ExecutionEvent::Diagnostic {
            scope: scope.into(),
            message: message.into(),
        }
    }

    /// Structured JSON rendering with a timestamp, for line-oriented sinks.
    #[must_use]
    pub fn to_json_value(&self) -> Value {
        let mut value = serde_json::to_value(self).unwrap_or_else(|_| json!({}));
        if let Value::Object(map) = &mut value {
            map.insert(
                "timestamp".to_string(),
                json!(Utc::now().to_rfc3339()),
            );
        }
        value
    }
}

impl std::fmt::Display for ExecutionEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutionEvent::StateEntered { state, step } => {
                write!(f, "[{step}] -> {state}")
            }
            ExecutionEvent::StateCompleted {
                state,
                step,
                success,
            } => {
                let marker = if *success { "ok" } else { "failed" };
                write!(f, "[{step}] <- {state} ({marker})")
            }
            ExecutionEvent::RetryScheduled {
                state,
                attempt,
                error,
                backoff_ms,
            } => write!(
                f,
                "retry #{attempt} of {state} after {backoff_ms}ms ({error})"
            ),
            ExecutionEvent::RunCompleted { success, steps } => {
                let marker = if *success { "succeeded" } else { "failed" };
                write!(f, "run {marker} after {steps} steps")
            }
            ExecutionEvent::Diagnostic { scope, message } => {
                write!(f, "{scope}: {message}")
            }
        }
    }
}

/// Abstraction over an output target that consumes execution events.
pub trait EventSink: Send + Sync {
    fn handle(&mut self, event: &ExecutionEvent) -> IoResult<()>;

    /// A stable, human-friendly identifier for this sink instance.
    fn name(&self) -> String {
        type_name::<Self>().to_string()
    }
}

/// Stdout sink, one line per event.
#[derive(Default)]
pub struct StdOutSink;

impl EventSink for StdOutSink {
    fn handle(&mut self, event: &ExecutionEvent) -> IoResult<()> {
        let mut handle = io::stdout();
        writeln!(handle, "{event}")?;
        handle.flush()
    }
}

/// In-memory sink for testing and snapshots.
#[derive(Clone, Default)]
pub struct MemorySink {
    entries: Arc<Mutex<Vec<ExecutionEvent>>>,
}

impl MemorySink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Clone out everything captured so far.
    #[must_use]
    pub fn snapshot(&self) -> Vec<ExecutionEvent> {
        self.entries.lock().clone()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

impl EventSink for MemorySink {
    fn handle(&mut self, event: &ExecutionEvent) -> IoResult<()> {
        self.entries.lock().push(event.clone());
        Ok(())
    }
}

/// Sink that forwards events into a flume channel, for streaming consumers.
pub struct ChannelSink {
    sender: flume::Sender<ExecutionEvent>,
}

impl ChannelSink {
    #[must_use]
    pub fn new(sender: flume::Sender<ExecutionEvent>) -> Self {
        Self { sender }
    }
}

impl EventSink for ChannelSink {
    fn handle(&mut self, event: &ExecutionEvent) -> IoResult<()> {
        self.sender
            .send(event.clone())
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "event channel closed"))
    }
}

/// Fan-out of execution events to registered sinks.
///
/// Emission is synchronous and in registration order, which keeps event
/// sequences deterministic for tests; a failing sink is reported to stderr
/// and skipped rather than failing the run.
#[derive(Clone, Default)]
pub struct EventBus {
    sinks: Arc<Mutex<Vec<Box<dyn EventSink>>>>,
}

impl EventBus {
    /// A bus with no sinks; events are dropped.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_sink<T: EventSink + 'static>(sink: T) -> Self {
        Self::with_sinks(vec![Box::new(sink)])
    }

    #[must_use]
    pub fn with_sinks(sinks: Vec<Box<dyn EventSink>>) -> Self {
        Self {
            sinks: Arc::new(Mutex::new(sinks)),
        }
    }

    pub fn add_sink<T: EventSink + 'static>(&self, sink: T) {
        self.sinks.lock().push(Box::new(sink));
    }

    pub fn emit(&self, event: ExecutionEvent) {
        let mut sinks = self.sinks.lock();
        for sink in sinks.iter_mut() {
            if let Err(err) = sink.handle(&event) {
                eprintln!("event sink {} error: {err}", sink.name());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_sink_captures_in_order() {
        let sink = MemorySink::new();
        let bus = EventBus::with_sink(sink.clone());
        bus.emit(ExecutionEvent::StateEntered {
            state: "A".into(),
            step: 1,
        });
        bus.emit(ExecutionEvent::RunCompleted {
            success: true,
            steps: 1,
        });
        let events = sink.snapshot();
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], ExecutionEvent::StateEntered { .. }));
    }

    #[test]
    fn channel_sink_streams() {
        let (tx, rx) = flume::unbounded();
        let bus = EventBus::with_sink(ChannelSink::new(tx));
        bus.emit(ExecutionEvent::diagnostic("test", "hello"));
        let event = rx.recv().unwrap();
        assert_eq!(event, ExecutionEvent::diagnostic("test", "hello"));
    }

    #[test]
    fn json_rendering_carries_type_and_timestamp() {
        let event = ExecutionEvent::StateEntered {
            state: "A".into(),
            step: 3,
        };
        let value = event.to_json_value();
        assert_eq!(value["type"], "state_entered");
        assert_eq!(value["state"], "A");
        assert!(value["timestamp"].is_string());
    }
}
