//! TCP backend for a modem reachable as `host:port` (e.g. a terminal server
//! multiplexing a serial modem), grounded in the same `device.c` dispatch
//! as the serial backend: same framing, different socket.
use std::io::{self, Read, Write};
use std::net::TcpStream;
use std::time::Duration;

use crate::errors::{GatewayError, GatewayResult};
use super::Transport;

pub struct TcpTransport {
    stream: TcpStream,
}

impl TcpTransport {
    pub fn connect(host: &str, port: u16) -> GatewayResult<TcpTransport> {
        let addr = format!("{}:{}", host, port);
        let stream = TcpStream::connect(&addr).map_err(|e| {
            if e.kind() == io::ErrorKind::ConnectionRefused {
                GatewayError::DeviceOpenTransient(addr.clone(), e)
            } else {
                GatewayError::DeviceOpenFatal(addr.clone(), e)
            }
        })?;
        stream.set_read_timeout(Some(Duration::from_millis(50)))?;
        stream.set_nodelay(true)?;
        Ok(TcpTransport { stream })
    }
}

impl Read for TcpTransport {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stream.read(buf)
    }
}

impl Write for TcpTransport {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.stream.write(buf)
    }
    fn flush(&mut self) -> io::Result<()> {
        self.stream.flush()
    }
}

impl Transport for TcpTransport {
    fn close(&mut self) -> GatewayResult<()> {
        self.stream.shutdown(std::net::Shutdown::Both).ok();
        Ok(())
    }
}
