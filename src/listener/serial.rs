//! Serial link to the button controller.
//!
//! The link runs at a fixed 9600 baud, 8 data bits, no parity, 1 stop bit,
//! with no flow control.

use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};

use super::ByteSource;
use crate::constants::SERIAL_BAUD_RATE;
use crate::error::ListenerError;

/// A configured serial port used as a [`ByteSource`].
pub struct SerialSource {
    device: PathBuf,
    port: Box<dyn SerialPort>,
}

impl std::fmt::Debug for SerialSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialSource")
            .field("device", &self.device)
            .finish_non_exhaustive()
    }
}

impl SerialSource {
    /// Opens `device` with the fixed link parameters.
    pub fn open(device: &Path, read_timeout: Duration) -> Result<Self, ListenerError> {
        let port = serialport::new(device.to_string_lossy(), SERIAL_BAUD_RATE)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(read_timeout)
            .open()
            .map_err(|source| ListenerError::Open {
                device: device.to_path_buf(),
                source,
            })?;

        log::info!(
            "Opened {} at {} baud 8N1 (timeout {:?})",
            device.display(),
            SERIAL_BAUD_RATE,
            read_timeout
        );

        Ok(Self {
            device: device.to_path_buf(),
            port,
        })
    }
}

impl ByteSource for SerialSource {
    fn read_chunk(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.port.read(buf) {
            Ok(n) => Ok(n),
            Err(e) if is_idle(&e) => Ok(0),
            Err(e) => Err(e),
        }
    }

    fn set_read_timeout(&mut self, timeout: Duration) -> io::Result<()> {
        self.port.set_timeout(timeout).map_err(io::Error::from)
    }
}

/// Errors that only mean "nothing arrived within the timeout".
fn is_idle(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeouts_are_idle() {
        assert!(is_idle(&io::Error::from(io::ErrorKind::TimedOut)));
        assert!(is_idle(&io::Error::from(io::ErrorKind::WouldBlock)));
        assert!(!is_idle(&io::Error::from(io::ErrorKind::BrokenPipe)));
    }

    #[test]
    fn test_open_missing_device_fails() {
        let err = SerialSource::open(
            Path::new("/dev/scanbutton-does-not-exist"),
            Duration::from_millis(10),
        )
        .unwrap_err();
        assert!(matches!(err, ListenerError::Open { .. }));
    }
}
