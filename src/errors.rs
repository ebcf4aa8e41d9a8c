//! The crate-wide error taxonomy (spec §7).
use std::io;
use crate::error_codes::{CmeError, CmsError};
use failure::Fail;

/// Every failure class the gateway can hit, tagged with its propagation policy
/// in the doc comment rather than in code: callers match on this to decide
/// whether to log-and-continue, drop to `DOWN/RETRYSLEEP`, or exit the process.
#[derive(Fail, Debug)]
pub enum GatewayError {
    /// Device open failed in a way that will never succeed (bad path, permission
    /// denied, bad baud rate). Transport-fatal: the caller exits the process.
    #[fail(display = "Could not open device {}: {}", _0, _1)]
    DeviceOpenFatal(String, #[cause] io::Error),
    /// Device open failed but may succeed on a later attempt (e.g. `ECONNREFUSED`
    /// on a TCP `host:port`). Transport-transient.
    #[fail(display = "Could not open device {} (will retry): {}", _0, _1)]
    DeviceOpenTransient(String, #[cause] io::Error),
    /// An I/O error on an already-open transport. Transport-transient.
    #[fail(display = "I/O error on modem transport: {}", _0)]
    Io(#[cause] io::Error),
    /// `read_until` hit its timeout with no terminator seen.
    #[fail(display = "Timed out waiting for modem response")]
    Timeout,
    /// The modem replied `ERROR` (or an unparseable line) to a command.
    #[fail(display = "Modem replied ERROR to {}", _0)]
    CommandFailed(String),
    /// The modem replied `+CME ERROR: <n>` to a command.
    #[fail(display = "CME error: {}", _0)]
    CmeError(#[cause] CmeError),
    /// The modem replied `+CMS ERROR: <n>` to a command.
    #[fail(display = "CMS error: {}", _0)]
    CmsError(#[cause] CmsError),
    /// A `+CME`/`+CMS ERROR` with a numeric code this build's tables don't name.
    #[fail(display = "Unknown {} error code {}", _0, _1)]
    UnknownErrorCode(&'static str, u32),
    /// The SIM PIN supplied on the command line was rejected.
    #[fail(display = "SIM rejected the supplied PIN")]
    WrongPin,
    /// `AT+CPIN?` reported the SIM needs a PUK, or some other unrecoverable PIN state.
    #[fail(display = "SIM requires a PUK or is otherwise unusable: {}", _0)]
    PinFatal(String),
    /// Network registration never succeeded inside `register_timeout`.
    #[fail(display = "Network registration failed or timed out")]
    RegistrationFailed,
    /// A PDU failed to decode or encode. Used for both directions; for MT,
    /// the caller increments `mt_fail_parse` and drops the single message
    /// rather than propagating further.
    #[fail(display = "Invalid PDU: {}", _0)]
    InvalidPdu(&'static str),
    /// `gettimeofday`-equivalent clock access failed. Fatal per spec §7 since
    /// message-ID generation depends on it.
    #[fail(display = "Could not read the system clock: {}", _0)]
    ClockFailure(#[cause] std::time::SystemTimeError),
    /// Spool file open/stat/parse error. Logged and the file unlinked; never
    /// propagated past the spool-handling call site.
    #[fail(display = "Spool file error ({}): {}", _0, _1)]
    SpoolFile(String, String),
    /// Forking or exec'ing the external MT handler failed.
    #[fail(display = "Could not run handler: {}", _0)]
    HandlerFailed(#[cause] nix::Error),
    /// A modem response didn't have the shape a particular query expected.
    #[fail(display = "Unexpected response shape for {}", _0)]
    UnexpectedResponse(&'static str),
}

impl From<io::Error> for GatewayError {
    fn from(e: io::Error) -> GatewayError {
        GatewayError::Io(e)
    }
}
impl From<nix::Error> for GatewayError {
    fn from(e: nix::Error) -> GatewayError {
        GatewayError::HandlerFailed(e)
    }
}
impl From<std::time::SystemTimeError> for GatewayError {
    fn from(e: std::time::SystemTimeError) -> GatewayError {
        GatewayError::ClockFailure(e)
    }
}

/// Bog-standard result type alias, following the teacher's naming.
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Turns a failed command's captured reply text into the most specific
/// error it supports: a decoded `+CME ERROR: <n>` / `+CMS ERROR: <n>` when
/// `AT+CMEE=1` is in effect and the modem sent one, else a plain
/// `CommandFailed` naming the command that was rejected.
pub fn classify_error(cmd: &str, reply: &str) -> GatewayError {
    use crate::util::FromErrorCode;
    for line in reply.lines() {
        let line = line.trim();
        if let Some(code) = line.strip_prefix("+CME ERROR:") {
            if let Ok(n) = code.trim().parse::<u32>() {
                return match CmeError::from_code(n, "CME") {
                    Ok(e) => GatewayError::CmeError(e),
                    Err(e) => e,
                };
            }
        }
        if let Some(code) = line.strip_prefix("+CMS ERROR:") {
            if let Ok(n) = code.trim().parse::<u32>() {
                return match CmsError::from_code(n, "CMS") {
                    Ok(e) => GatewayError::CmsError(e),
                    Err(e) => e,
                };
            }
        }
    }
    GatewayError::CommandFailed(cmd.to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_known_cms_error_code() {
        let err = classify_error("AT+CMGS", "+CMS ERROR: 38");
        assert!(matches!(err, GatewayError::CmsError(CmsError::NetworkOutOfOrder)));
    }

    #[test]
    fn unknown_code_falls_back_to_unknown_error_code() {
        let err = classify_error("AT+CMGS", "+CMS ERROR: 9999");
        assert!(matches!(err, GatewayError::UnknownErrorCode("CMS", 9999)));
    }

    #[test]
    fn no_error_line_falls_back_to_command_failed() {
        let err = classify_error("AT+CMGS", "garbled reply");
        assert!(matches!(err, GatewayError::CommandFailed(ref c) if c == "AT+CMGS"));
    }
}
