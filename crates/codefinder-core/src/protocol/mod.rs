//! Serial Protocol Communication
//!
//! Implements the RNS510 service console exchange used for PIN verification.
//!
//! Every attempt is a single ASCII line (`TpPvVerifyPin(NNNN)\n`) answered by a
//! free-form console reply containing either `Hash valid` or `Hash invalid`.

pub mod channel;
mod error;
pub mod frame;
mod profile;
pub mod reply;
pub mod serial;
mod transport;

pub use channel::{CommunicationChannel, SerialChannel, TcpChannel};
pub use error::{ProfileError, TransportError};
pub use frame::{AttemptCodec, AttemptFrame, VerifyPinCodec};
pub use profile::{DeviceProfile, MAX_DIGITS};
pub use reply::{ReplyBoundary, ReplyOutcome};
pub use serial::{clear_buffers, configure_port, open_port};
pub use transport::{
    open_transport, ChannelTransport, SerialTransport, TcpTransport, Transport, TransportConfig,
    TransportCounters,
};

/// Default baud rate of the RNS510 service console
pub const DEFAULT_BAUD_RATE: u32 = 115200;

/// Default reply window in milliseconds
pub const DEFAULT_TIMEOUT_MS: u64 = 1000;

/// Interval between `bytes_to_read` polls while a reply window is open
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 2;

/// Upper bound on bytes collected for a single reply
pub const MAX_REPLY_SIZE: usize = 4096;

/// Prefix selecting a TCP simulator instead of a serial device
pub const TCP_SCHEME: &str = "tcp://";
