//! Structured search events
//!
//! The controller reports one `attempt` event per exchange and exactly one
//! terminal event per run. Formatting and destination are up to the observer.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::{Candidate, FailureReason};
use crate::protocol::ReplyOutcome;

/// One observable step of a search run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchEvent {
    /// Wall-clock time the event was emitted
    pub timestamp: DateTime<Utc>,
    /// What happened
    #[serde(flatten)]
    pub kind: SearchEventKind,
}

impl SearchEvent {
    /// Stamp an event with the current time
    pub fn now(kind: SearchEventKind) -> Self {
        Self {
            timestamp: Utc::now(),
            kind,
        }
    }

    /// Whether this event ends the run
    pub fn is_terminal(&self) -> bool {
        !matches!(self.kind, SearchEventKind::Attempt { .. })
    }
}

/// Event payloads
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SearchEventKind {
    /// A candidate was sent and its reply classified
    Attempt {
        /// 1-based attempt number within the run
        attempt: u64,
        /// Candidate sent
        candidate: Candidate,
        /// Classification of the reply
        outcome: ReplyOutcome,
    },
    /// The head unit accepted a code
    Found {
        /// Accepted code
        code: Candidate,
        /// Attempts made, including the accepted one
        attempts: u64,
    },
    /// Every candidate was rejected
    Exhausted {
        /// Attempts made
        attempts: u64,
    },
    /// The run stopped on a fatal error
    Failed {
        /// Cause
        reason: FailureReason,
        /// Attempts made, including the failing one
        attempts: u64,
    },
    /// The run was stopped between attempts
    Cancelled {
        /// Attempts made
        attempts: u64,
        /// First candidate that was not tried
        resume_from: Candidate,
    },
}

/// Sink for search events
pub trait SearchObserver {
    /// Receive one event
    fn on_event(&mut self, event: &SearchEvent);
}

impl<F: FnMut(&SearchEvent)> SearchObserver for F {
    fn on_event(&mut self, event: &SearchEvent) {
        self(event)
    }
}

/// Observer that keeps every event in memory
#[derive(Debug, Default)]
pub struct EventLog {
    events: Vec<SearchEvent>,
}

impl EventLog {
    /// Empty log
    pub fn new() -> Self {
        Self::default()
    }

    /// Events in emission order
    pub fn events(&self) -> &[SearchEvent] {
        &self.events
    }

    /// Candidates of all attempt events, in order
    pub fn attempted(&self) -> Vec<Candidate> {
        self.events
            .iter()
            .filter_map(|e| match &e.kind {
                SearchEventKind::Attempt { candidate, .. } => Some(*candidate),
                _ => None,
            })
            .collect()
    }

    /// Terminal events (a well-behaved run has exactly one)
    pub fn terminal_events(&self) -> Vec<&SearchEvent> {
        self.events.iter().filter(|e| e.is_terminal()).collect()
    }
}

impl SearchObserver for EventLog {
    fn on_event(&mut self, event: &SearchEvent) {
        self.events.push(event.clone());
    }
}
