//! Logging backend (spec component M / §6's `-e`/`-o` flags).
//!
//! Grounded in `log.c`'s `hlog`: priority-filtered, fanning out to stderr
//! and/or syslog depending on destination bitmask. The Rust version wires
//! the `log` facade (as the teacher does) to an `env_logger`-style stderr
//! writer for the stderr destination and `syslog_fmt` (RFC 5424 formatting)
//! over a raw `UnixDatagram` to `/dev/log` for the syslog destination —
//! `syslog_fmt` is a formatter, not a client, so the datagram socket is
//! this crate's own responsibility.
use std::io::Write;
use std::os::unix::net::UnixDatagram;
use std::sync::Mutex;

use log::{Level, LevelFilter, Log, Metadata, Record};

use crate::config::{LogDestination, LogLevel};

impl LogLevel {
    fn as_level_filter(self) -> LevelFilter {
        match self {
            LogLevel::Emerg | LogLevel::Alert | LogLevel::Crit => LevelFilter::Error,
            LogLevel::Err => LevelFilter::Error,
            LogLevel::Warning => LevelFilter::Warn,
            LogLevel::Notice | LogLevel::Info => LevelFilter::Info,
            LogLevel::Debug => LevelFilter::Debug,
        }
    }

}

fn level_to_severity(level: Level) -> syslog_fmt::Severity {
    use syslog_fmt::Severity;
    match level {
        Level::Error => Severity::Error,
        Level::Warn => Severity::Warning,
        Level::Info => Severity::Informational,
        Level::Debug => Severity::Debug,
        Level::Trace => Severity::Debug,
    }
}

/// The `log::Log` implementation installed by [`init`]. Fans each record
/// out to stderr and/or syslog depending on the configured destination.
struct GatewayLogger {
    process_name: String,
    to_stderr: bool,
    to_syslog: bool,
    syslog_socket: Option<Mutex<UnixDatagram>>,
}

impl Log for GatewayLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        if self.to_stderr {
            let _ = writeln!(
                std::io::stderr(),
                "{} {} [{}] {}",
                chrono::Utc::now().format("%Y-%m-%d %H:%M:%S%.3f"),
                record.level(),
                record.target(),
                record.args(),
            );
        }
        if self.to_syslog {
            if let Some(socket) = &self.syslog_socket {
                let msg = syslog_fmt::v5424::Message {
                    severity: level_to_severity(record.level()),
                    facility: syslog_fmt::Facility::Daemon,
                    timestamp: Some(chrono::Utc::now()),
                    hostname: None,
                    app_name: Some(&self.process_name),
                    proc_id: Some(std::process::id().to_string().as_str()),
                    msg_id: None,
                    structured_data: &[],
                    msg: Some(&record.args().to_string()),
                };
                let formatted = syslog_fmt::v5424::to_string(&msg);
                if let Ok(sock) = socket.lock() {
                    let _ = sock.send(formatted.as_bytes());
                }
            }
        }
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

/// Installs the global logger per `-e level -o destination`.
pub fn init(process_name: &str, level: LogLevel, destination: LogDestination) {
    let to_stderr = matches!(destination, LogDestination::Stderr);
    let to_syslog = matches!(destination, LogDestination::Syslog);

    let syslog_socket = if to_syslog {
        UnixDatagram::unbound()
            .and_then(|sock| sock.connect("/dev/log").map(|_| sock))
            .map(Mutex::new)
            .ok()
    } else {
        None
    };

    let logger = GatewayLogger {
        process_name: process_name.to_owned(),
        to_stderr,
        to_syslog,
        syslog_socket,
    };
    log::set_max_level(level.as_level_filter());
    // A second, unused install attempt (e.g. in tests) is not an error.
    let _ = log::set_boxed_logger(Box::new(logger));
}
