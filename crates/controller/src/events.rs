use serde::Serialize;
use std::collections::VecDeque;
use time::OffsetDateTime;

/// Maximum number of events retained in the ring buffer.
const MAX_EVENTS: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Pump,
    Mister,
    Sensor,
    Error,
    System,
}

#[derive(Debug, Clone, Serialize)]
pub struct SystemEvent {
    #[serde(with = "time::serde::rfc3339")]
    pub ts: OffsetDateTime,
    pub kind: EventKind,
    pub detail: String,
}

/// Bounded log of recent controller activity, newest last.
#[derive(Debug)]
pub struct EventLog {
    events: VecDeque<SystemEvent>,
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new()
    }
}

impl EventLog {
    pub fn new() -> Self {
        Self {
            events: VecDeque::with_capacity(MAX_EVENTS),
        }
    }

    pub fn push(&mut self, kind: EventKind, detail: impl Into<String>) {
        if self.events.len() >= MAX_EVENTS {
            self.events.pop_front();
        }
        self.events.push_back(SystemEvent {
            ts: OffsetDateTime::now_utc(),
            kind,
            detail: detail.into(),
        });
    }

    /// Newest first, as the status endpoint returns them.
    pub fn recent(&self) -> Vec<SystemEvent> {
        self.events.iter().rev().cloned().collect()
    }
}

// ===========================================================================
// Tests
// ===========================================================================
