//! Per-run search bookkeeping

use serde::Serialize;
use std::time::{Duration, Instant};

use super::{Candidate, CodeRange};
use crate::protocol::ReplyOutcome;

/// Outcome counters for one run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SearchStats {
    /// Attempts issued (frames handed to the transport)
    pub attempts: u64,
    /// Explicit rejections
    pub rejected: u64,
    /// Empty reply windows
    pub timeouts: u64,
    /// Replies with neither marker
    pub malformed: u64,
}

/// Transient state of one search run
#[derive(Debug)]
pub struct SearchSession {
    range: CodeRange,
    current: Option<Candidate>,
    stats: SearchStats,
    malformed_streak: u32,
    started: Instant,
}

impl SearchSession {
    /// Start a session over `range`
    pub fn new(range: CodeRange) -> Self {
        Self {
            range,
            current: None,
            stats: SearchStats::default(),
            malformed_streak: 0,
            started: Instant::now(),
        }
    }

    /// Mark `candidate` as the attempt in flight
    pub fn begin(&mut self, candidate: Candidate) {
        self.current = Some(candidate);
        self.stats.attempts += 1;
    }

    /// Account for the classified reply of the attempt in flight
    pub fn record(&mut self, outcome: ReplyOutcome) {
        match outcome {
            ReplyOutcome::Accepted => self.malformed_streak = 0,
            ReplyOutcome::Rejected => {
                self.stats.rejected += 1;
                self.malformed_streak = 0;
            }
            ReplyOutcome::Timeout => {
                self.stats.timeouts += 1;
                self.malformed_streak = 0;
            }
            ReplyOutcome::MalformedReply => {
                self.stats.malformed += 1;
                self.malformed_streak += 1;
            }
        }
    }

    /// Range being searched
    pub fn range(&self) -> CodeRange {
        self.range
    }

    /// Candidate most recently attempted
    pub fn current(&self) -> Option<Candidate> {
        self.current
    }

    /// Attempts issued so far
    pub fn attempts(&self) -> u64 {
        self.stats.attempts
    }

    /// Counters so far
    pub fn stats(&self) -> SearchStats {
        self.stats
    }

    /// Consecutive malformed replies ending at the latest attempt
    pub fn malformed_streak(&self) -> u32 {
        self.malformed_streak
    }

    /// Whether every attempt so far produced a malformed reply
    pub fn all_malformed(&self) -> bool {
        self.stats.attempts > 0 && self.stats.malformed == self.stats.attempts
    }

    /// Time since the session started
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Attempts per second so far
    pub fn rate(&self) -> f64 {
        let secs = self.elapsed().as_secs_f64();
        if secs > 0.0 {
            self.stats.attempts as f64 / secs
        } else {
            0.0
        }
    }

    /// Estimated time to finish the remaining candidates at the current rate
    pub fn eta(&self) -> Option<Duration> {
        let rate = self.rate();
        if rate <= 0.0 {
            return None;
        }
        let remaining = self.range.len().saturating_sub(self.stats.attempts);
        Some(Duration::from_secs_f64(remaining as f64 / rate))
    }
}
