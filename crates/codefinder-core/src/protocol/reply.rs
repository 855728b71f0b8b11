//! Reply windows and reply classification

use serde::{Deserialize, Serialize};
use std::fmt;

/// Classification of the bytes read after one attempt frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplyOutcome {
    /// The head unit accepted the code
    Accepted,
    /// The head unit explicitly rejected the code
    Rejected,
    /// Nothing arrived within the reply window
    Timeout,
    /// Bytes arrived but carried neither marker
    MalformedReply,
}

impl ReplyOutcome {
    /// Whether the search moves on to the next candidate after this outcome
    pub fn is_rejection(&self) -> bool {
        matches!(self, ReplyOutcome::Rejected | ReplyOutcome::Timeout)
    }
}

impl fmt::Display for ReplyOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ReplyOutcome::Accepted => "accepted",
            ReplyOutcome::Rejected => "rejected",
            ReplyOutcome::Timeout => "no response",
            ReplyOutcome::MalformedReply => "malformed reply",
        };
        f.write_str(s)
    }
}

/// Condition that closes a reply window before its timeout
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyBoundary {
    /// Reply has a fixed length in bytes
    Length(usize),
    /// Reply ends with a known byte
    Terminator(u8),
    /// Reply is complete once any of these byte sequences has been read
    Markers(Vec<Vec<u8>>),
}

impl ReplyBoundary {
    /// Check whether `received` satisfies the boundary
    pub fn is_complete(&self, received: &[u8]) -> bool {
        match self {
            ReplyBoundary::Length(n) => received.len() >= *n,
            ReplyBoundary::Terminator(byte) => received.contains(byte),
            ReplyBoundary::Markers(markers) => markers
                .iter()
                .any(|m| !m.is_empty() && contains_subslice(received, m)),
        }
    }
}

/// Byte-wise substring search
pub(crate) fn contains_subslice(haystack: &[u8], needle: &[u8]) -> bool {
    if needle.is_empty() {
        return true;
    }
    haystack.windows(needle.len()).any(|w| w == needle)
}
