//! Serial port handling
//!
//! Provides low-level serial port access for the head unit's service console.

use serialport::SerialPort;
use std::time::Duration;

use super::{TransportError, DEFAULT_BAUD_RATE};

/// Map a serialport open failure onto the connection error taxonomy
fn classify_open_error(name: &str, err: &serialport::Error) -> TransportError {
    let description = err.description.to_lowercase();
    match err.kind {
        serialport::ErrorKind::NoDevice
        | serialport::ErrorKind::Io(std::io::ErrorKind::NotFound) => {
            TransportError::PortNotFound(name.to_string())
        }
        _ if description.contains("busy") || description.contains("access is denied") => {
            TransportError::PortBusy(name.to_string())
        }
        _ => TransportError::ConnectionFailed(format!("{}: {}", name, err)),
    }
}

/// Open a serial port with the given baud rate and initial read timeout
pub fn open_port(
    name: &str,
    baud_rate: Option<u32>,
    timeout: Duration,
) -> Result<Box<dyn SerialPort>, TransportError> {
    let baud = baud_rate.unwrap_or(DEFAULT_BAUD_RATE);

    serialport::new(name, baud)
        .timeout(timeout)
        .open()
        .map_err(|e| classify_open_error(name, &e))
}

/// Configure a serial port for the service console
pub fn configure_port(port: &mut dyn SerialPort) -> Result<(), TransportError> {
    // Standard 8N1 configuration
    port.set_data_bits(serialport::DataBits::Eight)
        .map_err(|e| TransportError::SerialError(e.to_string()))?;
    port.set_parity(serialport::Parity::None)
        .map_err(|e| TransportError::SerialError(e.to_string()))?;
    port.set_stop_bits(serialport::StopBits::One)
        .map_err(|e| TransportError::SerialError(e.to_string()))?;
    port.set_flow_control(serialport::FlowControl::None)
        .map_err(|e| TransportError::SerialError(e.to_string()))?;

    // Some USB-serial adapters only power their level shifter with DTR/RTS asserted
    if let Err(e) = port.write_data_terminal_ready(true) {
        tracing::warn!("configure_port: failed to set DTR high: {} (continuing)", e);
    } else {
        tracing::debug!("configure_port: DTR set high");
    }

    if let Err(e) = port.write_request_to_send(true) {
        tracing::warn!("configure_port: failed to set RTS high: {} (continuing)", e);
    } else {
        tracing::debug!("configure_port: RTS set high");
    }

    Ok(())
}

/// Clear the serial port buffers
pub fn clear_buffers(port: &mut dyn SerialPort) -> Result<(), TransportError> {
    port.clear(serialport::ClearBuffer::All)
        .map_err(|e| TransportError::SerialError(e.to_string()))
}
