//! Brute-force search controller
//!
//! Drives one sequential search run: encode a candidate, exchange it over the
//! transport, classify the reply, then advance or stop. Exactly one exchange
//! is outstanding at any time and the transport is closed on every exit path.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use super::{
    CancelToken, Candidate, CodeRange, SearchEvent, SearchEventKind, SearchObserver,
    SearchSession, SearchStats,
};
use crate::protocol::{AttemptCodec, ReplyOutcome, Transport};

/// Default number of consecutive malformed replies tolerated
pub const DEFAULT_MAX_CONSECUTIVE_MALFORMED: u32 = 3;

/// Controller state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SearchState {
    /// No run started
    Idle,
    /// Exchanging candidates with the head unit
    Attempting,
    /// A code was accepted
    Found,
    /// The range ran out without acceptance
    Exhausted,
    /// A fatal error ended the run
    Failed,
    /// The run was stopped on request
    Cancelled,
}

/// Search policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Consecutive malformed replies that fail the run (0 disables the limit)
    pub max_consecutive_malformed: u32,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            max_consecutive_malformed: DEFAULT_MAX_CONSECUTIVE_MALFORMED,
        }
    }
}

/// Why a run failed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureReason {
    /// The transport reported a fault mid-run
    Transport {
        /// Error text from the transport
        message: String,
    },
    /// Too many malformed replies in a row
    MalformedStreak {
        /// Length of the streak
        count: u32,
    },
    /// Every reply of the run was malformed
    AllMalformed {
        /// Attempts made
        attempts: u64,
    },
    /// The range renders codes at a different width than the codec sends
    WidthMismatch {
        /// Digit width of the range
        range_digits: u8,
        /// Digit width of the codec's frames
        codec_digits: u8,
    },
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::Transport { message } => write!(f, "transport fault: {}", message),
            FailureReason::MalformedStreak { count } => write!(
                f,
                "{} consecutive malformed replies (check the device profile)",
                count
            ),
            FailureReason::AllMalformed { attempts } => write!(
                f,
                "all {} replies were malformed (check the device profile)",
                attempts
            ),
            FailureReason::WidthMismatch {
                range_digits,
                codec_digits,
            } => write!(
                f,
                "range has {}-digit codes but the device expects {} digits",
                range_digits, codec_digits
            ),
        }
    }
}

/// How a run ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminalState {
    /// The head unit accepted this code
    Found(Candidate),
    /// No candidate was accepted
    Exhausted,
    /// A fatal error stopped the run
    Failed(FailureReason),
    /// Stopped before trying `resume_from`
    Cancelled {
        /// First untried candidate
        resume_from: Candidate,
    },
}

impl TerminalState {
    /// Controller state matching this terminal state
    pub fn state(&self) -> SearchState {
        match self {
            TerminalState::Found(_) => SearchState::Found,
            TerminalState::Exhausted => SearchState::Exhausted,
            TerminalState::Failed(_) => SearchState::Failed,
            TerminalState::Cancelled { .. } => SearchState::Cancelled,
        }
    }
}

/// Summary of a finished run
#[derive(Debug, Clone, PartialEq)]
pub struct SearchOutcome {
    /// How the run ended
    pub terminal: TerminalState,
    /// Outcome counters
    pub stats: SearchStats,
    /// Wall time of the run
    pub elapsed: Duration,
}

impl SearchOutcome {
    /// Accepted code, if any
    pub fn found(&self) -> Option<Candidate> {
        match self.terminal {
            TerminalState::Found(code) => Some(code),
            _ => None,
        }
    }

    /// Attempts issued during the run
    pub fn attempts(&self) -> u64 {
        self.stats.attempts
    }
}

/// Sequential brute-force search over a [`CodeRange`]
pub struct SearchController<C: AttemptCodec> {
    codec: C,
    config: SearchConfig,
    state: SearchState,
}

impl<C: AttemptCodec> SearchController<C> {
    /// Create an idle controller
    pub fn new(codec: C, config: SearchConfig) -> Self {
        Self {
            codec,
            config,
            state: SearchState::Idle,
        }
    }

    /// Current state
    pub fn state(&self) -> SearchState {
        self.state
    }

    /// Codec used to build frames
    pub fn codec(&self) -> &C {
        &self.codec
    }

    /// Run a search to completion.
    ///
    /// Takes ownership of an open transport and closes it before the terminal
    /// event is reported, whatever the outcome.
    pub fn run<T, O>(
        &mut self,
        mut transport: T,
        range: CodeRange,
        cancel: &CancelToken,
        observer: &mut O,
    ) -> SearchOutcome
    where
        T: Transport,
        O: SearchObserver + ?Sized,
    {
        let mut session = SearchSession::new(range);
        self.state = SearchState::Attempting;

        tracing::info!(
            "Starting search over {} ({} candidates, frame {} bytes)",
            range,
            range.len(),
            self.codec.frame_len()
        );

        let terminal = self.drive(&mut transport, &mut session, cancel, observer);

        transport.close();
        self.state = terminal.state();

        let attempts = session.attempts();
        let kind = match &terminal {
            TerminalState::Found(code) => {
                tracing::info!("Code found: {} after {} attempts", code, attempts);
                SearchEventKind::Found {
                    code: *code,
                    attempts,
                }
            }
            TerminalState::Exhausted => {
                tracing::info!("Range {} exhausted after {} attempts", range, attempts);
                SearchEventKind::Exhausted { attempts }
            }
            TerminalState::Failed(reason) => {
                tracing::error!("Search failed after {} attempts: {}", attempts, reason);
                SearchEventKind::Failed {
                    reason: reason.clone(),
                    attempts,
                }
            }
            TerminalState::Cancelled { resume_from } => {
                tracing::info!("Search cancelled after {} attempts", attempts);
                SearchEventKind::Cancelled {
                    attempts,
                    resume_from: *resume_from,
                }
            }
        };
        observer.on_event(&SearchEvent::now(kind));

        SearchOutcome {
            terminal,
            stats: session.stats(),
            elapsed: session.elapsed(),
        }
    }

    /// Iterate the range until a terminal condition is reached
    fn drive<T, O>(
        &self,
        transport: &mut T,
        session: &mut SearchSession,
        cancel: &CancelToken,
        observer: &mut O,
    ) -> TerminalState
    where
        T: Transport,
        O: SearchObserver + ?Sized,
    {
        // Frames keep a constant length only when both widths agree
        let range_digits = session.range().digits();
        let codec_digits = self.codec.digits();
        if range_digits != codec_digits {
            return TerminalState::Failed(FailureReason::WidthMismatch {
                range_digits,
                codec_digits,
            });
        }

        for candidate in session.range().iter() {
            if cancel.is_cancelled() {
                return TerminalState::Cancelled {
                    resume_from: candidate,
                };
            }

            let frame = self.codec.encode(candidate);
            session.begin(candidate);
            tracing::debug!("Trying code {} (attempt {})", candidate, session.attempts());

            let reply = match transport.send_and_await(frame.as_bytes()) {
                Ok(reply) => reply,
                Err(e) => {
                    tracing::error!("Transport fault while trying {}: {}", candidate, e);
                    return TerminalState::Failed(FailureReason::Transport {
                        message: e.to_string(),
                    });
                }
            };

            let outcome = self.codec.classify(&reply);
            session.record(outcome);
            observer.on_event(&SearchEvent::now(SearchEventKind::Attempt {
                attempt: session.attempts(),
                candidate,
                outcome,
            }));

            match outcome {
                ReplyOutcome::Accepted => return TerminalState::Found(candidate),
                ReplyOutcome::Rejected => {
                    tracing::debug!("Code {} is invalid", candidate);
                }
                ReplyOutcome::Timeout => {
                    tracing::warn!("No response for code {}", candidate);
                }
                ReplyOutcome::MalformedReply => {
                    let streak = session.malformed_streak();
                    tracing::warn!(
                        "Malformed reply for code {} ({} in a row): {:?}",
                        candidate,
                        streak,
                        String::from_utf8_lossy(&reply)
                    );
                    let limit = self.config.max_consecutive_malformed;
                    if limit > 0 && streak >= limit {
                        return TerminalState::Failed(FailureReason::MalformedStreak {
                            count: streak,
                        });
                    }
                }
            }

            if session.attempts() % 100 == 0 {
                if let Some(eta) = session.eta() {
                    tracing::info!(
                        "Progress: {} of {} tried ({:.1}/s, ~{}s left)",
                        session.attempts(),
                        session.range().len(),
                        session.rate(),
                        eta.as_secs()
                    );
                }
            }
        }

        if session.all_malformed() {
            return TerminalState::Failed(FailureReason::AllMalformed {
                attempts: session.attempts(),
            });
        }
        TerminalState::Exhausted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{TransportError, VerifyPinCodec};
    use crate::search::EventLog;
    use pretty_assertions::assert_eq;

    /// Transport answering from a fixed list, then falling silent
    struct ListTransport {
        replies: std::collections::VecDeque<Vec<u8>>,
        open: bool,
    }

    impl ListTransport {
        fn new(replies: &[&str]) -> Self {
            Self {
                replies: replies.iter().map(|r| r.as_bytes().to_vec()).collect(),
                open: true,
            }
        }
    }

    impl Transport for ListTransport {
        fn send_and_await(&mut self, _frame: &[u8]) -> Result<Vec<u8>, TransportError> {
            if !self.open {
                return Err(TransportError::NotConnected);
            }
            Ok(self.replies.pop_front().unwrap_or_default())
        }

        fn close(&mut self) {
            self.open = false;
        }

        fn is_open(&self) -> bool {
            self.open
        }
    }

    fn controller() -> SearchController<VerifyPinCodec> {
        SearchController::new(VerifyPinCodec::default(), SearchConfig::default())
    }

    #[test]
    fn test_initial_state() {
        let c = controller();
        assert_eq!(c.state(), SearchState::Idle);
        assert_eq!(SearchConfig::default().max_consecutive_malformed, 3);
    }

    #[test]
    fn test_single_candidate_found() {
        let mut c = controller();
        let mut log = EventLog::new();
        let outcome = c.run(
            ListTransport::new(&["Hash valid"]),
            CodeRange::new(1234, 1234, 4).unwrap(),
            &CancelToken::new(),
            &mut log,
        );
        assert_eq!(outcome.found(), Some(Candidate::new(1234, 4)));
        assert_eq!(outcome.attempts(), 1);
        assert_eq!(c.state(), SearchState::Found);
        assert_eq!(log.terminal_events().len(), 1);
    }

    #[test]
    fn test_single_candidate_exhausted() {
        let mut c = controller();
        let mut log = EventLog::new();
        let outcome = c.run(
            ListTransport::new(&["Hash invalid"]),
            CodeRange::new(5, 5, 4).unwrap(),
            &CancelToken::new(),
            &mut log,
        );
        assert_eq!(outcome.terminal, TerminalState::Exhausted);
        assert_eq!(c.state(), SearchState::Exhausted);
    }

    #[test]
    fn test_timeouts_count_as_rejections() {
        let mut c = controller();
        let mut log = EventLog::new();
        let outcome = c.run(
            ListTransport::new(&[]),
            CodeRange::new(0, 9, 4).unwrap(),
            &CancelToken::new(),
            &mut log,
        );
        assert_eq!(outcome.terminal, TerminalState::Exhausted);
        assert_eq!(outcome.stats.timeouts, 10);
        assert_eq!(log.attempted().len(), 10);
    }

    #[test]
    fn test_isolated_malformed_reply_is_recoverable() {
        let mut c = controller();
        let mut log = EventLog::new();
        let outcome = c.run(
            ListTransport::new(&["Hash invalid", "?? noise", "Hash invalid", "Hash valid"]),
            CodeRange::new(0, 9, 4).unwrap(),
            &CancelToken::new(),
            &mut log,
        );
        assert_eq!(outcome.found(), Some(Candidate::new(3, 4)));
        assert_eq!(outcome.stats.malformed, 1);
    }

    #[test]
    fn test_malformed_streak_fails_fast() {
        let mut c = controller();
        let mut log = EventLog::new();
        let outcome = c.run(
            ListTransport::new(&["Hash invalid", "noise", "noise", "noise", "Hash valid"]),
            CodeRange::new(0, 9999, 4).unwrap(),
            &CancelToken::new(),
            &mut log,
        );
        assert_eq!(
            outcome.terminal,
            TerminalState::Failed(FailureReason::MalformedStreak { count: 3 })
        );
        assert_eq!(outcome.attempts(), 4);
        assert_eq!(c.state(), SearchState::Failed);
    }

    #[test]
    fn test_all_malformed_short_range_fails() {
        let mut c = controller();
        let mut log = EventLog::new();
        let outcome = c.run(
            ListTransport::new(&["noise", "noise"]),
            CodeRange::new(0, 1, 4).unwrap(),
            &CancelToken::new(),
            &mut log,
        );
        assert_eq!(
            outcome.terminal,
            TerminalState::Failed(FailureReason::AllMalformed { attempts: 2 })
        );
    }

    #[test]
    fn test_malformed_limit_can_be_disabled() {
        let mut c = SearchController::new(
            VerifyPinCodec::default(),
            SearchConfig {
                max_consecutive_malformed: 0,
            },
        );
        let mut log = EventLog::new();
        let outcome = c.run(
            ListTransport::new(&["noise"; 5]),
            CodeRange::new(0, 5, 4).unwrap(),
            &CancelToken::new(),
            &mut log,
        );
        // Sixth reply is silence, so not every attempt was malformed
        assert_eq!(outcome.terminal, TerminalState::Exhausted);
        assert_eq!(outcome.stats.malformed, 5);
    }

    #[test]
    fn test_cancelled_before_first_attempt() {
        let mut c = controller();
        let mut log = EventLog::new();
        let cancel = CancelToken::new();
        cancel.cancel();
        let outcome = c.run(
            ListTransport::new(&[]),
            CodeRange::new(100, 200, 4).unwrap(),
            &cancel,
            &mut log,
        );
        assert_eq!(
            outcome.terminal,
            TerminalState::Cancelled {
                resume_from: Candidate::new(100, 4)
            }
        );
        assert_eq!(outcome.attempts(), 0);
        assert!(log.attempted().is_empty());
    }

    #[test]
    fn test_width_mismatch_fails_before_first_attempt() {
        let mut c = controller();
        let mut log = EventLog::new();
        let mut transport = ListTransport::new(&["Hash valid"]);
        let outcome = c.run(
            &mut transport,
            CodeRange::new(0, 99_999, 5).unwrap(),
            &CancelToken::new(),
            &mut log,
        );
        assert_eq!(
            outcome.terminal,
            TerminalState::Failed(FailureReason::WidthMismatch {
                range_digits: 5,
                codec_digits: 4,
            })
        );
        assert_eq!(outcome.attempts(), 0);
        assert!(log.attempted().is_empty());
        assert!(!transport.is_open());
        // The scripted reply was never consumed
        assert_eq!(transport.replies.len(), 1);
    }

    #[test]
    fn test_failure_reason_display() {
        let reason = FailureReason::Transport {
            message: "I/O error: broken pipe".to_string(),
        };
        assert_eq!(reason.to_string(), "transport fault: I/O error: broken pipe");
    }
}
