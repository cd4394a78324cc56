//! Serial port channel

use super::{Channel, ChannelError};
use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};
use std::collections::VecDeque;
use std::io::{Read, Write};
use std::time::{Duration, Instant};

/// Read timeout used while blocking without a deadline
const IDLE_POLL: Duration = Duration::from_millis(100);
/// Smallest timeout handed to the driver
const MIN_POLL: Duration = Duration::from_millis(1);
const READ_CHUNK: usize = 256;

/// Serial port channel, 8N1 without flow control
pub struct SerialChannel {
    name: String,
    baud_rate: u32,
    port: Box<dyn SerialPort>,
    pending: VecDeque<u8>,
}

impl SerialChannel {
    /// Open `port` at `baud_rate`
    pub fn open(port: &str, baud_rate: u32) -> Result<Self, ChannelError> {
        let handle = serialport::new(port, baud_rate)
            .data_bits(DataBits::Eight)
            .stop_bits(StopBits::One)
            .parity(Parity::None)
            .flow_control(FlowControl::None)
            .timeout(IDLE_POLL)
            .open()
            .map_err(|e| match e.kind() {
                serialport::ErrorKind::NoDevice => ChannelError::PortNotFound(port.to_string()),
                serialport::ErrorKind::Io(std::io::ErrorKind::NotFound) => {
                    ChannelError::PortNotFound(port.to_string())
                }
                serialport::ErrorKind::Io(std::io::ErrorKind::PermissionDenied) => {
                    ChannelError::PermissionDenied(port.to_string())
                }
                _ => ChannelError::Open(e.to_string()),
            })?;

        // Stale bytes from a previous session would only confuse the recognizers
        handle
            .clear(serialport::ClearBuffer::All)
            .map_err(|e| ChannelError::Open(e.to_string()))?;

        tracing::debug!("Opened serial port {} @ {} baud", port, baud_rate);

        Ok(Self {
            name: port.to_string(),
            baud_rate,
            port: handle,
            pending: VecDeque::with_capacity(READ_CHUNK),
        })
    }

    /// Buffer whatever arrives within `timeout`
    fn fill(&mut self, timeout: Duration) -> Result<(), ChannelError> {
        self.port
            .set_timeout(timeout.max(MIN_POLL))
            .map_err(|e| ChannelError::Io(e.into()))?;

        let mut buffer = [0u8; READ_CHUNK];
        match self.port.read(&mut buffer) {
            Ok(0) => Err(ChannelError::Disconnected),
            Ok(n) => {
                self.pending.extend(&buffer[..n]);
                Ok(())
            }
            Err(ref e) if e.kind() == std::io::ErrorKind::TimedOut => Ok(()),
            Err(ref e) if e.kind() == std::io::ErrorKind::Interrupted => Ok(()),
            Err(e) => Err(ChannelError::Io(e)),
        }
    }
}

impl Channel for SerialChannel {
    fn write_all(&mut self, data: &[u8]) -> Result<(), ChannelError> {
        self.port.write_all(data)?;
        self.port.flush()?;
        Ok(())
    }

    fn read_byte(&mut self, deadline: Option<Instant>) -> Result<Option<u8>, ChannelError> {
        loop {
            if let Some(byte) = self.pending.pop_front() {
                return Ok(Some(byte));
            }
            let timeout = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Ok(None);
                    }
                    deadline - now
                }
                None => IDLE_POLL,
            };
            self.fill(timeout)?;
        }
    }

    fn describe(&self) -> String {
        format!("{} @ {} baud (8N1)", self.name, self.baud_rate)
    }
}

/// List available serial ports
pub fn list_ports() -> Result<Vec<serialport::SerialPortInfo>, ChannelError> {
    serialport::available_ports().map_err(|e| ChannelError::Io(e.into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_port_fails_to_open() {
        let result = SerialChannel::open("/dev/seriallink-no-such-port", 9600);
        assert!(matches!(
            result,
            Err(ChannelError::PortNotFound(_)) | Err(ChannelError::Open(_))
        ));
    }
}
