//! # Codefinder Core Library
//!
//! Core functionality for recovering the PIN of an RNS510 head unit over its
//! serial service console.

#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

//!
//! This library provides:
//! - Byte-level request/reply transport over serial ports (and TCP simulators)
//! - The `TpPvVerifyPin` attempt frame codec and reply classification
//! - A sequential, cancellable brute-force search controller
//! - Structured search events for an external observer
//!
//! ## Example
//!
//! ```rust,ignore
//! use codefinder_core::prelude::*;
//!
//! let codec = VerifyPinCodec::new(DeviceProfile::default())?;
//! let transport = SerialTransport::open(&TransportConfig::new("/dev/ttyUSB0"), codec.boundary())?;
//! let range = CodeRange::new(0, 1999, 4)?;
//!
//! let mut controller = SearchController::new(codec, SearchConfig::default());
//! let outcome = controller.run(transport, range, &CancelToken::new(), &mut |ev: &SearchEvent| {
//!     println!("{:?}", ev);
//! });
//! ```

pub mod protocol;
pub mod search;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::protocol::{
        AttemptCodec, AttemptFrame, DeviceProfile, ReplyBoundary, ReplyOutcome, SerialTransport,
        TcpTransport, Transport, TransportConfig, TransportError, VerifyPinCodec,
    };
    pub use crate::search::{
        CancelToken, Candidate, CodeRange, FailureReason, SearchConfig, SearchController,
        SearchEvent, SearchEventKind, SearchObserver, SearchOutcome, SearchState, TerminalState,
    };
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
