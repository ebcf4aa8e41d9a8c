//! Byte-stream transport to the modem: serial TTY or TCP (spec component D).
//!
//! Grounded in `device.c`'s `open_device`/`read_until`/`empty_read_buffer`
//! and, for the serial backend, the `serialport` crate usage in
//! `FactbirdHQ-ublox-cellular-rs`'s example binaries — the teacher's own
//! transport (`tokio-file-unix`/`tokio-core`) is async and shared-ownership,
//! which this daemon's single-executor model (spec §5) has no use for.
mod serial;
mod tcp;

pub use serial::SerialTransport;
pub use tcp::TcpTransport;

use std::io::{Read, Write};
use std::time::{Duration, Instant};

use crate::errors::{GatewayError, GatewayResult};

/// Outcome of a bounded read, mirroring `read_until`'s three-way return in
/// spec §4.D (positive count / `0` timeout / transport failure as `Err`).
#[derive(Debug, PartialEq, Eq)]
pub enum ReadOutcome {
    /// One of `ok_set` matched; holds its index into `ok_set`.
    Ok(usize),
    /// One of `err_set` matched; holds its index into `err_set`.
    Err(usize),
    /// The buffer reached its capacity with no match.
    BufferFull,
    /// No data arrived before the deadline.
    Timeout,
}

/// A byte-oriented connection to the modem. Implemented by [`SerialTransport`]
/// (a raw 8N1 TTY) and [`TcpTransport`] (`host:port`), selected by
/// [`open`] based on the device string's shape.
pub trait Transport: Read + Write {
    /// Best-effort close; further I/O may still be attempted and should
    /// surface as an error rather than panic.
    fn close(&mut self) -> GatewayResult<()>;
}

/// Opens `dev` as a serial device path or, if it contains `:` with a port
/// in `1..=65535`, as a `host:port` TCP connection (spec §4.D). When `trace`
/// is set (the `-r` flag, spec §6), every byte read from or written to the
/// device is additionally teed to stdout via [`TracingTransport`].
pub fn open(dev: &str, baud: u32, trace: bool) -> GatewayResult<Box<dyn Transport>> {
    let inner = if let Some((host, port)) = dev.rsplit_once(':') {
        if let Ok(port) = port.parse::<u16>() {
            if port >= 1 {
                Some(TcpTransport::connect(host, port).map(|t| Box::new(t) as Box<dyn Transport>))
            } else {
                None
            }
        } else {
            None
        }
    } else {
        None
    };
    let inner = match inner {
        Some(r) => r?,
        None => Box::new(SerialTransport::open(dev, baud)?) as Box<dyn Transport>,
    };
    if trace {
        Ok(Box::new(TracingTransport::new(inner)))
    } else {
        Ok(inner)
    }
}

/// Wraps another [`Transport`] and tees every byte read or written to
/// stdout, prefixed `<-`/`->` the way a modem trace line conventionally
/// reads. Enabled by `-r` (spec §6); every dialogue is indifferent to
/// whether it's talking to the inner transport directly or through this.
pub struct TracingTransport {
    inner: Box<dyn Transport>,
}

impl TracingTransport {
    pub fn new(inner: Box<dyn Transport>) -> Self {
        TracingTransport { inner }
    }
}

impl Read for TracingTransport {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = self.inner.read(buf)?;
        if n > 0 {
            print!("<- {}", String::from_utf8_lossy(&buf[..n]));
            let _ = std::io::stdout().flush();
        }
        Ok(n)
    }
}

impl Write for TracingTransport {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let n = self.inner.write(buf)?;
        print!("-> {}", String::from_utf8_lossy(&buf[..n]));
        let _ = std::io::stdout().flush();
        Ok(n)
    }
    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}

impl Transport for TracingTransport {
    fn close(&mut self) -> GatewayResult<()> {
        self.inner.close()
    }
}

/// Writes `cmd` followed by `\r\n`, the framing every AT command uses.
pub fn write_line(transport: &mut dyn Transport, cmd: &str) -> GatewayResult<()> {
    transport.write_all(cmd.as_bytes())?;
    transport.write_all(b"\r\n")?;
    transport.flush()?;
    Ok(())
}

/// Reads one byte at a time into `buf` (stripping `\r`) until any literal
/// substring in `ok_set` or `err_set` appears in the accumulated buffer, the
/// buffer reaches `max_len`, or `timeout` elapses with no further data.
/// The substring search is intentionally naive, per spec §4.D.
pub fn read_until(
    transport: &mut dyn Transport,
    buf: &mut Vec<u8>,
    ok_set: &[&str],
    err_set: &[&str],
    max_len: usize,
    timeout: Duration,
) -> GatewayResult<ReadOutcome> {
    let deadline = Instant::now() + timeout;
    let mut byte = [0u8; 1];
    loop {
        if let Some(idx) = find_any(buf, ok_set) {
            return Ok(ReadOutcome::Ok(idx));
        }
        if let Some(idx) = find_any(buf, err_set) {
            return Ok(ReadOutcome::Err(idx));
        }
        if buf.len() >= max_len {
            return Ok(ReadOutcome::BufferFull);
        }
        if Instant::now() >= deadline {
            return Ok(ReadOutcome::Timeout);
        }
        match transport.read(&mut byte) {
            Ok(0) => return Err(GatewayError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "modem transport EOF",
            ))),
            Ok(_) => {
                if byte[0] != b'\r' {
                    buf.push(byte[0]);
                }
            }
            Err(ref e)
                if e.kind() == std::io::ErrorKind::WouldBlock
                    || e.kind() == std::io::ErrorKind::TimedOut => continue,
            Err(e) => return Err(GatewayError::Io(e)),
        }
    }
}

fn find_any(buf: &[u8], needles: &[&str]) -> Option<usize> {
    for (idx, needle) in needles.iter().enumerate() {
        if contains(buf, needle.as_bytes()) {
            return Some(idx);
        }
    }
    None
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    if needle.is_empty() || needle.len() > haystack.len() {
        return needle.is_empty();
    }
    haystack.windows(needle.len()).any(|w| w == needle)
}

/// Drains any pending bytes until a quiet period of `quiet` passes with no
/// new data, discarding stale modem output before a command sequence.
pub fn empty_read_buffer(transport: &mut dyn Transport, quiet: Duration) {
    let mut byte = [0u8; 1];
    loop {
        let deadline = Instant::now() + quiet;
        let mut saw_data = false;
        while Instant::now() < deadline {
            match transport.read(&mut byte) {
                Ok(0) | Err(_) => break,
                Ok(_) => saw_data = true,
            }
        }
        if !saw_data {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contains_finds_substring() {
        assert!(contains(b"foo+CMT: bar", b"+CMT:"));
        assert!(!contains(b"foobar", b"+CMT:"));
    }

    #[test]
    fn find_any_returns_first_match_index() {
        assert_eq!(find_any(b"blah ERROR", &["OK", "ERROR"]), Some(1));
        assert_eq!(find_any(b"blah OK", &["OK", "ERROR"]), Some(0));
        assert_eq!(find_any(b"blah", &["OK", "ERROR"]), None);
    }
}
