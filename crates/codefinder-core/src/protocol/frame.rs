//! Attempt frame encoding
//!
//! Frame format (RNS510 service console):
//! - N bytes: command prefix (`TpPvVerifyPin(`)
//! - D bytes: candidate, zero-padded ASCII decimal
//! - M bytes: command suffix (`)`)
//! - line terminator (`\n`)
//!
//! D is fixed per profile, so every frame of a run has the same length.

use super::reply::contains_subslice;
use super::{DeviceProfile, ProfileError, ReplyBoundary, ReplyOutcome};
use crate::search::Candidate;

/// The exact bytes transmitted for one candidate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptFrame {
    candidate: Candidate,
    bytes: Vec<u8>,
}

impl AttemptFrame {
    /// Candidate carried by this frame
    pub fn candidate(&self) -> Candidate {
        self.candidate
    }

    /// Raw bytes to write to the transport
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Encoded size in bytes
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether the frame carries no bytes (never true for a valid profile)
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Encoder/classifier pair for one device's attempt protocol
///
/// Implementations must be pure: the same candidate always encodes to the same
/// frame, and the same reply bytes always classify to the same outcome.
pub trait AttemptCodec {
    /// Number of decimal digits in a code
    fn digits(&self) -> u8;

    /// Encode one candidate into its attempt frame
    fn encode(&self, candidate: Candidate) -> AttemptFrame;

    /// Classify the bytes read in one reply window
    fn classify(&self, reply: &[u8]) -> ReplyOutcome;

    /// Condition that ends a reply window early
    fn boundary(&self) -> ReplyBoundary;

    /// Length of every frame this codec produces
    fn frame_len(&self) -> usize;
}

/// Codec for the `TpPvVerifyPin` console command
#[derive(Debug, Clone)]
pub struct VerifyPinCodec {
    profile: DeviceProfile,
}

impl VerifyPinCodec {
    /// Build a codec from a validated profile
    pub fn new(profile: DeviceProfile) -> Result<Self, ProfileError> {
        profile.validate()?;
        Ok(Self { profile })
    }

    /// Profile this codec was built from
    pub fn profile(&self) -> &DeviceProfile {
        &self.profile
    }
}

impl Default for VerifyPinCodec {
    fn default() -> Self {
        Self {
            profile: DeviceProfile::rns510(),
        }
    }
}

impl AttemptCodec for VerifyPinCodec {
    fn digits(&self) -> u8 {
        self.profile.digits
    }

    fn encode(&self, candidate: Candidate) -> AttemptFrame {
        let digits = format!(
            "{:0width$}",
            candidate.value(),
            width = self.profile.digits as usize
        );

        let mut bytes = Vec::with_capacity(self.frame_len());
        bytes.extend_from_slice(self.profile.command_prefix.as_bytes());
        bytes.extend_from_slice(digits.as_bytes());
        bytes.extend_from_slice(self.profile.command_suffix.as_bytes());
        bytes.extend_from_slice(self.profile.line_terminator.as_bytes());

        AttemptFrame { candidate, bytes }
    }

    fn classify(&self, reply: &[u8]) -> ReplyOutcome {
        if reply.is_empty() {
            return ReplyOutcome::Timeout;
        }
        // Reject first: a profile may end its reject marker with the accept marker
        if contains_subslice(reply, self.profile.reject_marker.as_bytes()) {
            ReplyOutcome::Rejected
        } else if contains_subslice(reply, self.profile.accept_marker.as_bytes()) {
            ReplyOutcome::Accepted
        } else {
            ReplyOutcome::MalformedReply
        }
    }

    fn boundary(&self) -> ReplyBoundary {
        ReplyBoundary::Markers(vec![
            self.profile.accept_marker.as_bytes().to_vec(),
            self.profile.reject_marker.as_bytes().to_vec(),
        ])
    }

    fn frame_len(&self) -> usize {
        self.profile.command_prefix.len()
            + self.profile.digits as usize
            + self.profile.command_suffix.len()
            + self.profile.line_terminator.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::CodeRange;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_encode_rns510_frame() {
        let codec = VerifyPinCodec::default();
        let frame = codec.encode(Candidate::new(42, 4));
        assert_eq!(frame.as_bytes(), b"TpPvVerifyPin(0042)\n");
        assert_eq!(frame.candidate().value(), 42);
        assert_eq!(frame.len(), 20);
    }

    #[test]
    fn test_frame_length_is_constant() {
        let codec = VerifyPinCodec::default();
        let range = CodeRange::new(0, 9999, 4).unwrap();
        assert!(range
            .iter()
            .step_by(37)
            .all(|c| codec.encode(c).len() == codec.frame_len()));
        assert_eq!(codec.encode(Candidate::new(9999, 4)).len(), codec.frame_len());
    }

    #[test]
    fn test_classify_console_replies() {
        let codec = VerifyPinCodec::default();
        assert_eq!(
            codec.classify(b"TpPvVerifyPin(1234)\r\nHash valid\r\n"),
            ReplyOutcome::Accepted
        );
        assert_eq!(
            codec.classify(b"TpPvVerifyPin(1233)\r\nHash invalid\r\n"),
            ReplyOutcome::Rejected
        );
        assert_eq!(codec.classify(b""), ReplyOutcome::Timeout);
        assert_eq!(codec.classify(b"\x00\xff garbage"), ReplyOutcome::MalformedReply);
    }

    #[test]
    fn test_classify_is_deterministic() {
        let codec = VerifyPinCodec::default();
        let replies: [&[u8]; 4] = [b"Hash valid", b"Hash invalid", b"", b"echo only"];
        for reply in replies {
            let first = codec.classify(reply);
            for _ in 0..10 {
                assert_eq!(codec.classify(reply), first);
            }
        }
    }

    #[test]
    fn test_reject_marker_wins_when_markers_overlap() {
        let mut profile = DeviceProfile::rns510();
        profile.accept_marker = "valid".to_string();
        profile.reject_marker = "invalid".to_string();
        let codec = VerifyPinCodec::new(profile).unwrap();
        assert_eq!(codec.classify(b"PIN invalid"), ReplyOutcome::Rejected);
        assert_eq!(codec.classify(b"PIN valid"), ReplyOutcome::Accepted);
    }

    #[test]
    fn test_custom_profile_width() {
        let mut profile = DeviceProfile::rns510();
        profile.digits = 5;
        profile.line_terminator = "\r\n".to_string();
        let codec = VerifyPinCodec::new(profile).unwrap();
        assert_eq!(
            codec.encode(Candidate::new(7, 5)).as_bytes(),
            b"TpPvVerifyPin(00007)\r\n"
        );
        assert_eq!(codec.frame_len(), 22);
    }

    #[test]
    fn test_invalid_profile_rejected() {
        let mut profile = DeviceProfile::rns510();
        profile.digits = 0;
        assert!(VerifyPinCodec::new(profile).is_err());
    }

    #[test]
    fn test_boundary_uses_markers() {
        let codec = VerifyPinCodec::default();
        assert_eq!(
            codec.boundary(),
            ReplyBoundary::Markers(vec![b"Hash valid".to_vec(), b"Hash invalid".to_vec()])
        );
    }
}
