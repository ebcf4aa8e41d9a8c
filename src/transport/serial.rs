//! Serial TTY backend, grounded in the `serialport` crate usage shown in
//! `FactbirdHQ-ublox-cellular-rs`'s example binaries and `Aehmlo-insteon-serial`.
use std::io::{self, Read, Write};
use std::time::Duration;

use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};

use crate::errors::{GatewayError, GatewayResult};
use super::Transport;

/// The enumerated bit rates spec §4.D allows, `300..115200`.
pub const ALLOWED_BAUDS: &[u32] = &[300, 1200, 2400, 4800, 9600, 19200, 38400, 57600, 115200];

pub struct SerialTransport {
    port: Box<dyn SerialPort>,
}

impl SerialTransport {
    /// Opens `dev` raw 8N1, canonical processing disabled, local-only,
    /// at `baud` (which must be one of [`ALLOWED_BAUDS`]).
    pub fn open(dev: &str, baud: u32) -> GatewayResult<SerialTransport> {
        if !ALLOWED_BAUDS.contains(&baud) {
            return Err(GatewayError::DeviceOpenFatal(
                dev.to_owned(),
                io::Error::new(io::ErrorKind::InvalidInput, format!("unsupported baud rate {}", baud)),
            ));
        }
        let builder = serialport::new(dev, baud)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(Duration::from_millis(50));
        let port = builder.open().map_err(|e| {
            let io_err = io::Error::new(io::ErrorKind::Other, e.to_string());
            match e.kind {
                serialport::ErrorKind::NoDevice | serialport::ErrorKind::InvalidInput => {
                    GatewayError::DeviceOpenFatal(dev.to_owned(), io_err)
                }
                _ => GatewayError::DeviceOpenTransient(dev.to_owned(), io_err),
            }
        })?;
        Ok(SerialTransport { port })
    }
}

impl Read for SerialTransport {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        // A per-call read timeout surfaces as `TimedOut`, not an `Ok(0)` -
        // `read_until` treats that as "no byte yet, keep polling" rather
        // than end-of-stream, which only a real closed port means here.
        self.port.read(buf)
    }
}

impl Write for SerialTransport {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.port.write(buf)
    }
    fn flush(&mut self) -> io::Result<()> {
        self.port.flush()
    }
}

impl Transport for SerialTransport {
    fn close(&mut self) -> GatewayResult<()> {
        Ok(())
    }
}
