//! Device profiles
//!
//! The exact wire format of the PIN verification command is configuration data:
//! it was recorded from a console log of a real unit and may differ between
//! firmware revisions. A profile can be saved, edited and loaded as JSON.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use super::ProfileError;

/// Widest code a profile may describe (fits in `u32`)
pub const MAX_DIGITS: u8 = 9;

/// Wire format description for one family of head units
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceProfile {
    /// Human readable name
    pub name: String,
    /// Bytes sent before the digits
    pub command_prefix: String,
    /// Bytes sent after the digits
    pub command_suffix: String,
    /// Line terminator appended to every frame
    pub line_terminator: String,
    /// Reply text meaning the code was accepted
    pub accept_marker: String,
    /// Reply text meaning the code was rejected
    pub reject_marker: String,
    /// Number of decimal digits in a code
    pub digits: u8,
}

impl Default for DeviceProfile {
    fn default() -> Self {
        Self::rns510()
    }
}

impl DeviceProfile {
    /// Profile of the RNS510 service console
    pub fn rns510() -> Self {
        Self {
            name: "RNS510".to_string(),
            command_prefix: "TpPvVerifyPin(".to_string(),
            command_suffix: ")".to_string(),
            line_terminator: "\n".to_string(),
            accept_marker: "Hash valid".to_string(),
            reject_marker: "Hash invalid".to_string(),
            digits: 4,
        }
    }

    /// Load a profile from a JSON file and validate it
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ProfileError> {
        let content = fs::read_to_string(path.as_ref())?;
        let profile: DeviceProfile = serde_json::from_str(&content)?;
        profile.validate()?;
        Ok(profile)
    }

    /// Write the profile as pretty-printed JSON
    pub fn to_file(&self, path: impl AsRef<Path>) -> Result<(), ProfileError> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path.as_ref(), content)?;
        Ok(())
    }

    /// Check the profile describes an unambiguous protocol
    pub fn validate(&self) -> Result<(), ProfileError> {
        if self.command_prefix.is_empty() {
            return Err(ProfileError::EmptyField("command_prefix"));
        }
        if self.accept_marker.is_empty() {
            return Err(ProfileError::EmptyField("accept_marker"));
        }
        if self.reject_marker.is_empty() {
            return Err(ProfileError::EmptyField("reject_marker"));
        }
        if self.accept_marker == self.reject_marker {
            return Err(ProfileError::AmbiguousMarkers);
        }
        // The reply window closes on the first complete marker, so the accept
        // marker may only occur inside the reject marker as its suffix
        if occurs_before_end(&self.accept_marker, &self.reject_marker) {
            return Err(ProfileError::OverlappingMarkers {
                inner: self.accept_marker.clone(),
                outer: self.reject_marker.clone(),
            });
        }
        // Rejection is checked first, so it must not hide inside an acceptance
        if self.accept_marker.contains(self.reject_marker.as_str()) {
            return Err(ProfileError::OverlappingMarkers {
                inner: self.reject_marker.clone(),
                outer: self.accept_marker.clone(),
            });
        }
        if self.digits == 0 || self.digits > MAX_DIGITS {
            return Err(ProfileError::InvalidWidth {
                max: MAX_DIGITS,
                actual: self.digits,
            });
        }
        Ok(())
    }
}

/// Whether `inner` occurs in `outer` at a position that does not end `outer`
fn occurs_before_end(inner: &str, outer: &str) -> bool {
    let (inner, outer) = (inner.as_bytes(), outer.as_bytes());
    if inner.is_empty() || inner.len() > outer.len() {
        return false;
    }
    let last = outer.len() - inner.len();
    outer
        .windows(inner.len())
        .enumerate()
        .any(|(i, w)| w == inner && i != last)
}
