//! MT spool file write and external-handler fork/exec (spec component H /
//! §4.H).
//!
//! Grounded in `m20d.c`'s `handle_message`/`fork_handler`. The atomic
//! temp-file-then-rename idiom is the same one [`crate::stats`] uses for the
//! state file; the fork/exec dance is plain `nix::unistd`, the way
//! `nix`-based daemons in the pack (e.g. `tokio-pid1`) detach children.
use std::ffi::CString;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use log::error;
use nix::unistd::{self, ForkResult};

use crate::errors::{GatewayError, GatewayResult};
use crate::message::Message;
use crate::pdu;

/// Writes `<spool>/<msgid>.mt` atomically, then forks the external handler
/// with it.
pub fn spool_and_dispatch(spool_dir: &Path, handler: &Path, msg: &Message) -> GatewayResult<()> {
    let final_path = spool_dir.join(format!("{}.mt", msg.msgid));
    write_spool_file(&final_path, msg)?;

    let src = msg.src.clone().unwrap_or_default();
    match fork_handler(handler, &msg.msgid, &src, &final_path) {
        Ok(()) => Ok(()),
        Err(e) => {
            error!("mt {}: handler fork/exec failed, unlinking spool file: {}", msg.msgid, e);
            let _ = fs::remove_file(&final_path);
            Err(e)
        }
    }
}

fn write_spool_file(final_path: &Path, msg: &Message) -> GatewayResult<()> {
    let tmp_path = {
        let mut p = final_path.as_os_str().to_owned();
        p.push(".tmp");
        PathBuf::from(p)
    };

    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .mode(0o640)
        .open(&tmp_path)
        .map_err(|e| GatewayError::SpoolFile(tmp_path.display().to_string(), e.to_string()))?;

    let received: DateTime<Utc> = msg.received.into();
    writeln!(file, "From: {}", msg.src.as_deref().unwrap_or(""))?;
    writeln!(file, "Message-id: {}", msg.msgid)?;
    writeln!(file, "Sent: {} {}", msg.date.as_deref().unwrap_or("?"), msg.time.as_deref().unwrap_or("?"))?;
    writeln!(file, "Received: {} UTC", received.format("%y/%m/%d %H:%M:%S"))?;
    writeln!(file, "TP-PID: {}", msg.pid)?;
    writeln!(file, "TP-DCS: {}", msg.dcs)?;
    if msg.has_udh {
        writeln!(file, "Has-UDH: 1")?;
    }
    if msg.is_binary {
        writeln!(file, "Is-binary: 1")?;
        writeln!(file, "Length: {}", msg.len)?;
    }
    writeln!(file)?;
    if msg.is_binary {
        write!(file, "{}", pdu::bin2hexstring(&msg.content))?;
    } else {
        file.write_all(&msg.content)?;
    }
    file.flush()?;
    drop(file);

    fs::rename(&tmp_path, final_path).map_err(|e| GatewayError::SpoolFile(final_path.display().to_string(), e.to_string()))?;
    Ok(())
}

/// Forks and execs `handler msgid from_address spool_path`. The child
/// closes stdin and any descriptor above 2 before exec so it cannot keep
/// the modem transport's fd alive; the parent does not wait (`SIGCHLD` is
/// ignored, see [`crate::signals`]).
fn fork_handler(handler: &Path, msgid: &str, from: &str, spool_path: &Path) -> GatewayResult<()> {
    let handler_c = path_to_cstring(handler)?;
    let argv: Vec<CString> = vec![
        handler_c.clone(),
        str_to_cstring(msgid)?,
        str_to_cstring(from)?,
        path_to_cstring(spool_path)?,
    ];

    match unsafe { unistd::fork() }? {
        ForkResult::Parent { .. } => Ok(()),
        ForkResult::Child => {
            let max_fd = 256;
            for fd in 0..max_fd {
                let _ = unistd::close(fd);
            }
            if unistd::execv(&handler_c, &argv).is_err() {
                std::process::exit(127);
            }
            unreachable!("execv only returns on failure, handled above");
        }
    }
}

fn path_to_cstring(p: &Path) -> GatewayResult<CString> {
    CString::new(p.as_os_str().to_string_lossy().into_owned())
        .map_err(|_| GatewayError::SpoolFile(p.display().to_string(), "path contains an interior NUL".into()))
}

fn str_to_cstring(s: &str) -> GatewayResult<CString> {
    CString::new(s).map_err(|_| GatewayError::SpoolFile(s.to_owned(), "argument contains an interior NUL".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::SystemTime;
    use tempfile::tempdir;

    fn sample_msg() -> Message {
        Message {
            msgid: "mt01X00".into(),
            received: SystemTime::now(),
            pdu_type: 0,
            pid: 0,
            dcs: 0,
            is_binary: false,
            has_udh: false,
            is_flash: false,
            request_report: false,
            dst: None,
            src: Some("+15551234".into()),
            date: Some("26/07/28".into()),
            time: Some("12:00:00".into()),
            smsc: None,
            content: b"hi".to_vec(),
            len: 2,
            spoolfile: None,
            tries: 0,
            retry_time: 0,
            next_try: SystemTime::now(),
        }
    }

    #[test]
    fn writes_headers_and_body_then_renames() {
        let dir = tempdir().unwrap();
        let msg = sample_msg();
        let final_path = dir.path().join(format!("{}.mt", msg.msgid));
        write_spool_file(&final_path, &msg).unwrap();
        let contents = fs::read_to_string(&final_path).unwrap();
        assert!(contents.starts_with("From: +15551234\n"));
        assert!(contents.contains("Message-id: mt01X00\n"));
        assert!(contents.ends_with("hi"));
        assert!(!dir.path().join(format!("{}.mt.tmp", msg.msgid)).exists());
    }
}
