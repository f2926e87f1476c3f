//! Run events and the sinks that receive them
//!
//! Components that report progress take a `&dyn EventSink` instead of
//! writing to a process-wide channel. [`TracingSink`] forwards to `tracing`
//! filtered by a configured [`TraceLevel`]; [`NullSink`] drops everything.

use std::fmt;
use std::str::FromStr;
use std::sync::Mutex;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Something that happened during generation or a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunEvent {
    RunStarted {
        specifications: usize,
        test_cases: usize,
    },
    SpecificationStarted {
        name: String,
    },
    ScriptSkipped {
        id: String,
        reason: String,
    },
    AmbiguousPermission {
        id: String,
        candidates: Vec<String>,
    },
    TestPrepared {
        id: String,
        method: String,
        url: String,
    },
    TestExecuted {
        id: String,
        status: u16,
        elapsed: Duration,
    },
    TestPassed {
        id: String,
    },
    TestFailed {
        id: String,
        reason: String,
    },
    RunAborted {
        id: String,
        reason: String,
    },
    RunFinished {
        passed: usize,
        failed: usize,
    },
}

impl RunEvent {
    /// Lowest [`TraceLevel`] at which the event is shown
    #[must_use]
    pub const fn level(&self) -> TraceLevel {
        match self {
            Self::TestPrepared { .. } | Self::TestExecuted { .. } | Self::ScriptSkipped { .. } => {
                TraceLevel::Debug
            }
            _ => TraceLevel::Info,
        }
    }
}

impl fmt::Display for RunEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RunStarted {
                specifications,
                test_cases,
            } => write!(f, "run started: {specifications} specifications, {test_cases} test cases"),
            Self::SpecificationStarted { name } => write!(f, "specification {name}"),
            Self::ScriptSkipped { id, reason } => write!(f, "script {id} skipped: {reason}"),
            Self::AmbiguousPermission { id, candidates } => write!(
                f,
                "test case {id}: no default permission among {}",
                candidates.join(", ")
            ),
            Self::TestPrepared { id, method, url } => write!(f, "[{id}] {method} {url}"),
            Self::TestExecuted {
                id,
                status,
                elapsed,
            } => write!(f, "[{id}] status {status} in {}ms", elapsed.as_millis()),
            Self::TestPassed { id } => write!(f, "[{id}] PASS"),
            Self::TestFailed { id, reason } => write!(f, "[{id}] FAIL {reason}"),
            Self::RunAborted { id, reason } => write!(f, "[{id}] run aborted: {reason}"),
            Self::RunFinished { passed, failed } => {
                write!(f, "run finished: {passed} passed, {failed} failed")
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TraceLevel {
    Off,
    #[default]
    Info,
    Debug,
}

impl FromStr for TraceLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "off" => Ok(Self::Off),
            "info" => Ok(Self::Info),
            "debug" => Ok(Self::Debug),
            other => Err(format!("unknown trace level '{other}' (expected off, info or debug)")),
        }
    }
}

pub trait EventSink {
    fn emit(&self, event: RunEvent);
}

/// Drops every event
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: RunEvent) {}
}

/// Forwards events to `tracing` up to the configured level
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink {
    level: TraceLevel,
}

impl TracingSink {
    #[must_use]
    pub const fn new(level: TraceLevel) -> Self {
        Self { level }
    }

    #[must_use]
    pub fn enabled(&self, event: &RunEvent) -> bool {
        self.level != TraceLevel::Off && event.level() <= self.level
    }
}

impl EventSink for TracingSink {
    fn emit(&self, event: RunEvent) {
        if !self.enabled(&event) {
            return;
        }
        match &event {
            RunEvent::TestFailed { .. } | RunEvent::AmbiguousPermission { .. } => {
                tracing::warn!("{event}");
            }
            RunEvent::RunAborted { .. } => tracing::error!("{event}"),
            _ if event.level() == TraceLevel::Debug => tracing::debug!("{event}"),
            _ => tracing::info!("{event}"),
        }
    }
}

/// Keeps every event in memory, for assertions in tests
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<RunEvent>>,
}

impl RecordingSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn events(&self) -> Vec<RunEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, event: RunEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_filtering() {
        let passed = RunEvent::TestPassed { id: "t1".into() };
        let prepared = RunEvent::TestPrepared {
            id: "t1".into(),
            method: "GET".into(),
            url: "/accounts".into(),
        };
        assert!(TracingSink::new(TraceLevel::Info).enabled(&passed));
        assert!(!TracingSink::new(TraceLevel::Info).enabled(&prepared));
        assert!(TracingSink::new(TraceLevel::Debug).enabled(&prepared));
        assert!(!TracingSink::new(TraceLevel::Off).enabled(&passed));
    }

    #[test]
    fn parses_levels() {
        assert_eq!("DEBUG".parse::<TraceLevel>(), Ok(TraceLevel::Debug));
        assert_eq!("off".parse::<TraceLevel>(), Ok(TraceLevel::Off));
        assert!("verbose".parse::<TraceLevel>().is_err());
    }

    #[test]
    fn recording_sink_keeps_order() {
        let sink = RecordingSink::new();
        sink.emit(RunEvent::SpecificationStarted { name: "accounts".into() });
        sink.emit(RunEvent::RunFinished { passed: 1, failed: 0 });
        assert_eq!(sink.events().len(), 2);
        assert_eq!(sink.events()[1].to_string(), "run finished: 1 passed, 0 failed");
    }

    #[test]
    fn event_rendering() {
        let executed = RunEvent::TestExecuted {
            id: "OB-301-ACC-120382".into(),
            status: 200,
            elapsed: Duration::from_millis(42),
        };
        insta::assert_snapshot!(executed.to_string(), @"[OB-301-ACC-120382] status 200 in 42ms");
    }
}
