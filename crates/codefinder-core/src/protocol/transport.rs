//! Request/reply transport
//!
//! Owns the connection to the head unit and performs one blocking
//! write-then-read exchange per attempt.

use serde::{Deserialize, Serialize};
use std::io::{Read, Write};
use std::net::TcpStream;
use std::time::{Duration, Instant};

use super::{
    channel::{CommunicationChannel, SerialChannel, TcpChannel},
    serial::{clear_buffers, configure_port, open_port},
    ReplyBoundary, TransportError, DEFAULT_BAUD_RATE, DEFAULT_POLL_INTERVAL_MS,
    DEFAULT_TIMEOUT_MS, MAX_REPLY_SIZE, TCP_SCHEME,
};

/// A byte-level request/reply link to the head unit
pub trait Transport {
    /// Write `frame` in full, then collect the reply until the boundary is
    /// met or the reply window closes. An empty result means "no response".
    fn send_and_await(&mut self, frame: &[u8]) -> Result<Vec<u8>, TransportError>;

    /// Release the underlying handle. Safe to call more than once.
    fn close(&mut self);

    /// Whether the handle is still held
    fn is_open(&self) -> bool;
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn send_and_await(&mut self, frame: &[u8]) -> Result<Vec<u8>, TransportError> {
        (**self).send_and_await(frame)
    }

    fn close(&mut self) {
        (**self).close()
    }

    fn is_open(&self) -> bool {
        (**self).is_open()
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn send_and_await(&mut self, frame: &[u8]) -> Result<Vec<u8>, TransportError> {
        (**self).send_and_await(frame)
    }

    fn close(&mut self) {
        (**self).close()
    }

    fn is_open(&self) -> bool {
        (**self).is_open()
    }
}

/// Connection configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Serial port name, or `tcp://host:port` for a simulator
    pub port_name: String,
    /// Baud rate
    pub baud_rate: u32,
    /// Reply window per attempt
    pub timeout: Duration,
    /// Poll interval while waiting for reply bytes
    pub poll_interval: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            port_name: String::new(),
            baud_rate: DEFAULT_BAUD_RATE,
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
        }
    }
}

impl TransportConfig {
    /// Default configuration for the given port
    pub fn new(port_name: impl Into<String>) -> Self {
        Self {
            port_name: port_name.into(),
            ..Self::default()
        }
    }

    /// TCP address if the port name selects a simulator
    pub fn tcp_address(&self) -> Option<&str> {
        self.port_name.strip_prefix(TCP_SCHEME)
    }
}

/// Cumulative traffic counters for one connection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TransportCounters {
    /// Bytes written
    pub tx_bytes: u64,
    /// Bytes read
    pub rx_bytes: u64,
    /// Completed send/await exchanges
    pub exchanges: u64,
    /// Exchanges whose reply window closed empty
    pub silent_replies: u64,
}

/// Transport over any [`CommunicationChannel`]
pub struct ChannelTransport<C: CommunicationChannel> {
    channel: Option<C>,
    label: String,
    timeout: Duration,
    poll_interval: Duration,
    boundary: ReplyBoundary,
    counters: TransportCounters,
}

/// Transport over a serial port
pub type SerialTransport = ChannelTransport<SerialChannel>;

/// Transport over a TCP connection to a head unit simulator
pub type TcpTransport = ChannelTransport<TcpChannel>;

impl<C: CommunicationChannel> ChannelTransport<C> {
    /// Wrap an already connected channel
    pub fn new(
        mut channel: C,
        label: impl Into<String>,
        config: &TransportConfig,
        boundary: ReplyBoundary,
    ) -> Result<Self, TransportError> {
        channel.set_timeout(config.timeout)?;
        Ok(Self {
            channel: Some(channel),
            label: label.into(),
            timeout: config.timeout,
            poll_interval: config.poll_interval.max(Duration::from_millis(1)),
            boundary,
            counters: TransportCounters::default(),
        })
    }

    /// Name of the connected device
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Traffic counters since the connection opened
    pub fn counters(&self) -> TransportCounters {
        self.counters
    }

    /// Reply window per attempt
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Poll the channel until the boundary is met or the deadline passes
    fn read_reply(
        channel: &mut C,
        boundary: &ReplyBoundary,
        timeout: Duration,
        poll_interval: Duration,
    ) -> Result<Vec<u8>, TransportError> {
        let mut response = Vec::new();
        let mut buffer = [0u8; 512];
        let deadline = Instant::now() + timeout;

        loop {
            if boundary.is_complete(&response) {
                tracing::trace!("read_reply: boundary met after {} bytes", response.len());
                break;
            }
            if response.len() >= MAX_REPLY_SIZE {
                tracing::warn!("read_reply: reply exceeds {} bytes, truncating", MAX_REPLY_SIZE);
                break;
            }

            let now = Instant::now();
            if now >= deadline {
                break;
            }

            let available = channel.bytes_to_read()?;
            if available == 0 {
                std::thread::sleep(poll_interval.min(deadline - now));
                continue;
            }

            let to_read = (available as usize)
                .min(buffer.len())
                .min(MAX_REPLY_SIZE - response.len());
            match channel.read(&mut buffer[..to_read]) {
                Ok(0) => {
                    tracing::debug!("read_reply: read returned 0 (EOF)");
                    break;
                }
                Ok(n) => response.extend_from_slice(&buffer[..n]),
                Err(ref e)
                    if e.kind() == std::io::ErrorKind::TimedOut
                        || e.kind() == std::io::ErrorKind::WouldBlock
                        || e.kind() == std::io::ErrorKind::Interrupted => {}
                Err(e) => return Err(TransportError::IoError(e)),
            }
        }

        Ok(response)
    }
}

impl<C: CommunicationChannel> Transport for ChannelTransport<C> {
    fn send_and_await(&mut self, frame: &[u8]) -> Result<Vec<u8>, TransportError> {
        let channel = self.channel.as_mut().ok_or(TransportError::NotConnected)?;

        // Every exchange starts from an empty input buffer
        if let Err(e) = channel.clear_input_buffer() {
            tracing::warn!("send_and_await: failed to clear input buffer: {}", e);
        }

        tracing::debug!(
            "send_and_await: sending {} bytes: {:?}",
            frame.len(),
            String::from_utf8_lossy(frame)
        );

        let start = Instant::now();
        channel.write_all(frame)?;
        channel.flush()?;
        self.counters.tx_bytes = self.counters.tx_bytes.saturating_add(frame.len() as u64);

        let response = Self::read_reply(channel, &self.boundary, self.timeout, self.poll_interval)?;

        self.counters.exchanges = self.counters.exchanges.saturating_add(1);
        self.counters.rx_bytes = self.counters.rx_bytes.saturating_add(response.len() as u64);
        if response.is_empty() {
            self.counters.silent_replies = self.counters.silent_replies.saturating_add(1);
        }

        tracing::debug!(
            "send_and_await: received {} bytes in {}ms: {:?}",
            response.len(),
            start.elapsed().as_millis(),
            String::from_utf8_lossy(&response)
        );

        Ok(response)
    }

    fn close(&mut self) {
        if let Some(channel) = self.channel.take() {
            drop(channel);
            tracing::info!(
                "Closed {} (tx={}B rx={}B exchanges={} silent={})",
                self.label,
                self.counters.tx_bytes,
                self.counters.rx_bytes,
                self.counters.exchanges,
                self.counters.silent_replies
            );
        }
    }

    fn is_open(&self) -> bool {
        self.channel.is_some()
    }
}

impl<C: CommunicationChannel> Drop for ChannelTransport<C> {
    fn drop(&mut self) {
        self.close();
    }
}

impl SerialTransport {
    /// Open and configure a serial port
    pub fn open(config: &TransportConfig, boundary: ReplyBoundary) -> Result<Self, TransportError> {
        let mut port = open_port(&config.port_name, Some(config.baud_rate), config.timeout)?;
        configure_port(port.as_mut())?;
        clear_buffers(port.as_mut())?;

        tracing::info!(
            "Opened serial port {} at {} baud (reply window {}ms)",
            config.port_name,
            config.baud_rate,
            config.timeout.as_millis()
        );

        Self::new(SerialChannel::new(port), config.port_name.clone(), config, boundary)
    }
}

impl TcpTransport {
    /// Connect to a simulator listening on `tcp://host:port`
    pub fn connect(config: &TransportConfig, boundary: ReplyBoundary) -> Result<Self, TransportError> {
        let address = config
            .tcp_address()
            .ok_or_else(|| TransportError::ConnectionFailed(format!("{} is not a tcp:// address", config.port_name)))?;

        let stream = TcpStream::connect(address).map_err(|e| match e.kind() {
            std::io::ErrorKind::ConnectionRefused | std::io::ErrorKind::NotFound => {
                TransportError::PortNotFound(config.port_name.clone())
            }
            _ => TransportError::ConnectionFailed(format!("{}: {}", config.port_name, e)),
        })?;
        stream.set_nodelay(true)?;

        tracing::info!("Connected to simulator at {}", address);

        Self::new(TcpChannel::new(stream), config.port_name.clone(), config, boundary)
    }
}

/// Open whichever transport the port name selects
pub fn open_transport(
    config: &TransportConfig,
    boundary: ReplyBoundary,
) -> Result<Box<dyn Transport + Send>, TransportError> {
    if config.tcp_address().is_some() {
        Ok(Box::new(TcpTransport::connect(config, boundary)?))
    } else {
        Ok(Box::new(SerialTransport::open(config, boundary)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::VecDeque;
    use std::io;
    use std::sync::{Arc, Mutex};

    /// In-memory channel that answers each flushed frame with a scripted reply
    struct ScriptedChannel {
        replies: VecDeque<Vec<u8>>,
        pending: VecDeque<u8>,
        current_frame: Vec<u8>,
        written: Arc<Mutex<Vec<Vec<u8>>>>,
        fail_bytes_to_read: bool,
    }

    impl ScriptedChannel {
        fn new(replies: Vec<&[u8]>) -> (Self, Arc<Mutex<Vec<Vec<u8>>>>) {
            let written = Arc::new(Mutex::new(Vec::new()));
            let channel = Self {
                replies: replies.into_iter().map(|r| r.to_vec()).collect(),
                pending: VecDeque::new(),
                current_frame: Vec::new(),
                written: written.clone(),
                fail_bytes_to_read: false,
            };
            (channel, written)
        }
    }

    impl Read for ScriptedChannel {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let n = buf.len().min(self.pending.len());
            for slot in buf.iter_mut().take(n) {
                *slot = self.pending.pop_front().unwrap();
            }
            Ok(n)
        }
    }

    impl Write for ScriptedChannel {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.current_frame.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            let frame = std::mem::take(&mut self.current_frame);
            self.written.lock().unwrap().push(frame);
            if let Some(reply) = self.replies.pop_front() {
                self.pending.extend(reply);
            }
            Ok(())
        }
    }

    impl CommunicationChannel for ScriptedChannel {
        fn set_timeout(&mut self, _timeout: Duration) -> io::Result<()> {
            Ok(())
        }

        fn clear_input_buffer(&mut self) -> io::Result<()> {
            self.pending.clear();
            Ok(())
        }

        fn bytes_to_read(&mut self) -> io::Result<u32> {
            if self.fail_bytes_to_read {
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "adapter unplugged"));
            }
            Ok(self.pending.len() as u32)
        }
    }

    fn config(timeout_ms: u64) -> TransportConfig {
        TransportConfig {
            timeout: Duration::from_millis(timeout_ms),
            ..TransportConfig::new("scripted")
        }
    }

    fn markers() -> ReplyBoundary {
        ReplyBoundary::Markers(vec![b"Hash valid".to_vec(), b"Hash invalid".to_vec()])
    }

    #[test]
    fn test_transport_config_default() {
        let config = TransportConfig::default();
        assert_eq!(config.baud_rate, DEFAULT_BAUD_RATE);
        assert_eq!(config.timeout, Duration::from_millis(DEFAULT_TIMEOUT_MS));
        assert!(config.tcp_address().is_none());
        assert_eq!(TransportConfig::new("tcp://127.0.0.1:5510").tcp_address(), Some("127.0.0.1:5510"));
    }

    #[test]
    fn test_send_and_await_returns_reply() {
        let (channel, written) = ScriptedChannel::new(vec![b"TpPvVerifyPin(0001)\r\nHash invalid\r\n"]);
        let mut transport = ChannelTransport::new(channel, "scripted", &config(200), markers()).unwrap();

        let reply = transport.send_and_await(b"TpPvVerifyPin(0001)\n").unwrap();
        assert_eq!(reply, b"TpPvVerifyPin(0001)\r\nHash invalid\r\n".to_vec());
        assert_eq!(written.lock().unwrap()[0], b"TpPvVerifyPin(0001)\n".to_vec());

        let counters = transport.counters();
        assert_eq!(counters.tx_bytes, 20);
        assert_eq!(counters.exchanges, 1);
        assert_eq!(counters.silent_replies, 0);
    }

    #[test]
    fn test_silent_device_returns_empty_within_timeout() {
        let (channel, _) = ScriptedChannel::new(vec![]);
        let mut transport = ChannelTransport::new(channel, "scripted", &config(150), markers()).unwrap();

        let start = Instant::now();
        let reply = transport.send_and_await(b"TpPvVerifyPin(0002)\n").unwrap();
        let elapsed = start.elapsed();

        assert!(reply.is_empty());
        assert!(elapsed >= Duration::from_millis(150));
        assert!(elapsed < Duration::from_millis(150 + 100), "took {:?}", elapsed);
        assert_eq!(transport.counters().silent_replies, 1);
    }

    #[test]
    fn test_stale_input_is_discarded() {
        let (mut channel, _) = ScriptedChannel::new(vec![b"Hash invalid"]);
        channel.pending.extend(b"Hash valid (stale)".iter().copied());
        let mut transport = ChannelTransport::new(channel, "scripted", &config(100), markers()).unwrap();

        let reply = transport.send_and_await(b"TpPvVerifyPin(0003)\n").unwrap();
        assert_eq!(reply, b"Hash invalid".to_vec());
    }

    #[test]
    fn test_length_boundary_stops_early() {
        let (channel, _) = ScriptedChannel::new(vec![b"OK"]);
        let mut transport =
            ChannelTransport::new(channel, "scripted", &config(5_000), ReplyBoundary::Length(2)).unwrap();

        let start = Instant::now();
        let reply = transport.send_and_await(b"x").unwrap();
        assert_eq!(reply, b"OK".to_vec());
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_channel_fault_is_io_error() {
        let (mut channel, _) = ScriptedChannel::new(vec![]);
        channel.fail_bytes_to_read = true;
        let mut transport = ChannelTransport::new(channel, "scripted", &config(100), markers()).unwrap();

        let err = transport.send_and_await(b"TpPvVerifyPin(0004)\n").unwrap_err();
        assert!(matches!(err, TransportError::IoError(_)));
        assert!(!err.is_connection_error());
    }

    #[test]
    fn test_close_is_idempotent() {
        let (channel, _) = ScriptedChannel::new(vec![]);
        let mut transport = ChannelTransport::new(channel, "scripted", &config(100), markers()).unwrap();

        assert!(transport.is_open());
        transport.close();
        transport.close();
        assert!(!transport.is_open());
        assert!(matches!(
            transport.send_and_await(b"x"),
            Err(TransportError::NotConnected)
        ));
    }

    #[test]
    fn test_open_transport_refused_tcp() {
        // Bind then drop to get a port nobody listens on
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let config = TransportConfig::new(format!("tcp://127.0.0.1:{}", port));
        let err = open_transport(&config, markers()).err().expect("nothing listens there");
        assert!(err.is_connection_error());
    }
}
