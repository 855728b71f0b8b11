//! Byte-stream channels the transport can run over
//!
//! The head unit is normally reached through a USB-serial adapter, but bench
//! simulators expose the same console over TCP.
//!
//! Serial driver errors keep their I/O kind. `TcpChannel::bytes_to_read`
//! peeks without blocking and reports a closed peer as `UnexpectedEof`, so a
//! simulator hang-up fails the exchange instead of looking like a silent
//! device.

use serialport::SerialPort;
use std::io::{self, Read, Write};
use std::net::TcpStream;
use std::time::Duration;

/// Abstraction for communication channels (Serial or TCP)
pub trait CommunicationChannel: Read + Write + Send {
    /// Set timeout for read/write operations
    fn set_timeout(&mut self, timeout: Duration) -> io::Result<()>;

    /// Discard any bytes already received but not yet read
    fn clear_input_buffer(&mut self) -> io::Result<()>;

    /// Get number of bytes available to read
    fn bytes_to_read(&mut self) -> io::Result<u32>;
}

/// Serial port wrapper implementing CommunicationChannel
pub struct SerialChannel {
    port: Box<dyn SerialPort>,
}

impl SerialChannel {
    /// Wrap an already opened and configured port
    pub fn new(port: Box<dyn SerialPort>) -> Self {
        Self { port }
    }

    /// Name of the underlying device, if the driver reports one
    pub fn name(&self) -> Option<String> {
        self.port.name()
    }
}

impl Read for SerialChannel {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.port.read(buf)
    }
}

impl Write for SerialChannel {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.port.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.port.flush()
    }
}

impl CommunicationChannel for SerialChannel {
    fn set_timeout(&mut self, timeout: Duration) -> io::Result<()> {
        self.port.set_timeout(timeout).map_err(serial_io_error)
    }

    fn clear_input_buffer(&mut self) -> io::Result<()> {
        self.port
            .clear(serialport::ClearBuffer::Input)
            .map_err(serial_io_error)
    }

    fn bytes_to_read(&mut self) -> io::Result<u32> {
        self.port.bytes_to_read().map_err(serial_io_error)
    }
}

/// Keep the driver's I/O kind so the transport can tell timeouts from faults
fn serial_io_error(err: serialport::Error) -> io::Error {
    match err.kind {
        serialport::ErrorKind::Io(kind) => io::Error::new(kind, err.description),
        _ => io::Error::new(io::ErrorKind::Other, err),
    }
}

/// TCP stream wrapper implementing CommunicationChannel
pub struct TcpChannel {
    stream: TcpStream,
}

impl TcpChannel {
    /// Wrap a connected stream
    pub fn new(stream: TcpStream) -> Self {
        Self { stream }
    }
}

impl Read for TcpChannel {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stream.read(buf)
    }
}

impl Write for TcpChannel {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.stream.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.stream.flush()
    }
}

impl CommunicationChannel for TcpChannel {
    fn set_timeout(&mut self, timeout: Duration) -> io::Result<()> {
        self.stream.set_read_timeout(Some(timeout))?;
        self.stream.set_write_timeout(Some(timeout))?;
        Ok(())
    }

    fn clear_input_buffer(&mut self) -> io::Result<()> {
        // No kernel-level purge for sockets: drain until the stream would block.
        self.stream.set_nonblocking(true)?;
        let mut buf = [0u8; 1024];
        let result = loop {
            match self.stream.read(&mut buf) {
                Ok(0) => break Ok(()),
                Ok(_) => continue,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break Ok(()),
                Err(e) => break Err(e),
            }
        };
        self.stream.set_nonblocking(false)?;
        result
    }

    fn bytes_to_read(&mut self) -> io::Result<u32> {
        self.stream.set_nonblocking(true)?;
        let mut buf = [0u8; 1024];
        let result = self.stream.peek(&mut buf);
        self.stream.set_nonblocking(false)?;

        match result {
            // A readable socket with nothing to peek is a closed peer
            Ok(0) => Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "peer closed the connection",
            )),
            Ok(n) => Ok(n as u32),
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => Ok(0),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    fn tcp_pair() -> (TcpChannel, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let addr = listener.local_addr().expect("addr");
        let client = TcpStream::connect(addr).expect("connect");
        let (server, _) = listener.accept().expect("accept");
        (TcpChannel::new(client), server)
    }

    #[test]
    fn test_serial_error_keeps_io_kind() {
        let err = serialport::Error::new(
            serialport::ErrorKind::Io(io::ErrorKind::TimedOut),
            "Operation timed out",
        );
        assert_eq!(serial_io_error(err).kind(), io::ErrorKind::TimedOut);

        let err = serialport::Error::new(serialport::ErrorKind::NoDevice, "unplugged");
        assert_eq!(serial_io_error(err).kind(), io::ErrorKind::Other);
    }

    #[test]
    fn test_tcp_bytes_to_read_empty() {
        let (mut channel, _server) = tcp_pair();
        assert_eq!(channel.bytes_to_read().unwrap(), 0);
    }

    #[test]
    fn test_tcp_bytes_to_read_after_write() {
        let (mut channel, mut server) = tcp_pair();
        server.write_all(b"Hash invalid\n").unwrap();
        server.flush().unwrap();

        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        let mut available = 0;
        while available == 0 && std::time::Instant::now() < deadline {
            available = channel.bytes_to_read().unwrap();
        }
        assert_eq!(available, 13);
    }

    #[test]
    fn test_tcp_clear_input_buffer() {
        let (mut channel, mut server) = tcp_pair();
        server.write_all(b"stale boot log").unwrap();
        server.flush().unwrap();
        std::thread::sleep(Duration::from_millis(50));

        channel.clear_input_buffer().unwrap();
        assert_eq!(channel.bytes_to_read().unwrap(), 0);
    }

    #[test]
    fn test_tcp_peer_close_is_an_error() {
        let (mut channel, server) = tcp_pair();
        drop(server);
        std::thread::sleep(Duration::from_millis(50));

        let err = channel.bytes_to_read().unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }
}
