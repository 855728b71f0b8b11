//! Candidate codes and the range they are drawn from

use serde::{Serialize, Serializer};
use std::fmt;
use thiserror::Error;

use crate::protocol::MAX_DIGITS;

/// Errors raised when a search range cannot be represented
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RangeError {
    #[error("Start {start} is greater than stop {stop}")]
    StartAfterStop { start: u32, stop: u32 },

    #[error("Code {value} does not fit in {digits} digits")]
    OutOfWidth { value: u32, digits: u8 },

    #[error("Digit width must be between 1 and {max}, got {actual}")]
    InvalidWidth { max: u8, actual: u8 },
}

/// One PIN value, rendered as a zero-padded decimal string
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Candidate {
    value: u32,
    digits: u8,
}

impl Candidate {
    /// Create a candidate rendered with `digits` digits
    pub fn new(value: u32, digits: u8) -> Self {
        Self { value, digits }
    }

    /// Numeric value
    pub fn value(&self) -> u32 {
        self.value
    }

    /// Rendered width
    pub fn digits(&self) -> u8 {
        self.digits
    }
}

impl fmt::Display for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:0width$}", self.value, width = self.digits as usize)
    }
}

impl Serialize for Candidate {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Largest value representable in `digits` decimal digits
fn max_value(digits: u8) -> u32 {
    10u32.pow(digits as u32) - 1
}

/// Closed, ascending range of candidates `[start, stop]`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodeRange {
    start: u32,
    stop: u32,
    digits: u8,
}

impl CodeRange {
    /// Validate and build a range
    pub fn new(start: u32, stop: u32, digits: u8) -> Result<Self, RangeError> {
        if digits == 0 || digits > MAX_DIGITS {
            return Err(RangeError::InvalidWidth {
                max: MAX_DIGITS,
                actual: digits,
            });
        }
        if start > stop {
            return Err(RangeError::StartAfterStop { start, stop });
        }
        if stop > max_value(digits) {
            return Err(RangeError::OutOfWidth {
                value: stop,
                digits,
            });
        }
        Ok(Self {
            start,
            stop,
            digits,
        })
    }

    /// First candidate
    pub fn start(&self) -> Candidate {
        Candidate::new(self.start, self.digits)
    }

    /// Last candidate
    pub fn stop(&self) -> Candidate {
        Candidate::new(self.stop, self.digits)
    }

    /// Digit width of every candidate
    pub fn digits(&self) -> u8 {
        self.digits
    }

    /// Number of candidates in the range
    pub fn len(&self) -> u64 {
        (self.stop - self.start) as u64 + 1
    }

    /// A validated range is never empty
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Whether `value` lies inside the range
    pub fn contains(&self, value: u32) -> bool {
        (self.start..=self.stop).contains(&value)
    }

    /// Iterate candidates in ascending order
    pub fn iter(&self) -> impl Iterator<Item = Candidate> {
        let digits = self.digits;
        (self.start..=self.stop).map(move |v| Candidate::new(v, digits))
    }
}

impl fmt::Display for CodeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.start(), self.stop())
    }
}
