//! PIN Search
//!
//! Sequential brute-force search over a closed range of codes, reporting every
//! attempt and the final outcome to an observer.

mod cancel;
mod controller;
mod event;
mod range;
mod session;

pub use cancel::CancelToken;
pub use controller::{
    FailureReason, SearchConfig, SearchController, SearchOutcome, SearchState, TerminalState,
    DEFAULT_MAX_CONSECUTIVE_MALFORMED,
};
pub use event::{EventLog, SearchEvent, SearchEventKind, SearchObserver};
pub use range::{Candidate, CodeRange, RangeError};
pub use session::{SearchSession, SearchStats};
