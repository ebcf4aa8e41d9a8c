//! Observable state: counters and the atomically-rewritten state file
//! (spec component J).
//!
//! Grounded in `log.c`'s atomic-rewrite idiom (temp file + `O_CREAT|O_EXCL`
//! + `rename`), reused here for the state file the same way spec §4.H reuses
//! it for the MT spool file.
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Utc};
use log::info;

use crate::errors::GatewayResult;

/// Monotonic counters plus the one gauge (`mo_queue_len`), per spec §4.J.
#[derive(Debug, Default, Clone, Copy)]
pub struct Stats {
    pub mt: u64,
    pub mt_ok: u64,
    pub mt_fail: u64,
    pub mt_fail_parse: u64,
    pub mt_fail_handle: u64,
    pub mo: u64,
    pub mo_ok: u64,
    pub mo_tries: u64,
    pub mo_try_fail: u64,
    pub mo_dropped: u64,
    pub mo_queued: u64,
    pub mo_queue_len: u64,
}

impl Stats {
    /// Logs a one-line snapshot, the `SIGUSR1` handler's only job (spec §4.J).
    pub fn log_snapshot(&self) {
        info!(
            "stats: mt={} mt_ok={} mt_fail={} mt_fail_parse={} mt_fail_handle={} \
             mo={} mo_ok={} mo_tries={} mo_try_fail={} mo_dropped={} mo_queued={} mo_queue_len={}",
            self.mt, self.mt_ok, self.mt_fail, self.mt_fail_parse, self.mt_fail_handle,
            self.mo, self.mo_ok, self.mo_tries, self.mo_try_fail, self.mo_dropped,
            self.mo_queued, self.mo_queue_len,
        );
    }
}

/// Rewrites the state file atomically: `State:`, `Message:`, optional
/// `Network:`, and `Updated:` lines (spec §4.J / §6).
pub fn write_state_file(path: &Path, state: &str, message: &str, network: Option<&str>) -> GatewayResult<()> {
    let tmp_path = tmp_path_for(path);
    let now = SystemTime::now();
    let unix_secs = now.duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0);
    let formatted: DateTime<Utc> = now.into();

    {
        let mut file = OpenOptions::new().write(true).create_new(true).open(&tmp_path)?;
        writeln!(file, "State: {}", state)?;
        writeln!(file, "Message: {}", message)?;
        if let Some(net) = network {
            writeln!(file, "Network: {}", net)?;
        }
        writeln!(
            file,
            "Updated: {} UTC {}",
            formatted.format("%y/%m/%d %H:%M:%S"),
            unix_secs
        )?;
        file.flush()?;
    }
    fs::rename(&tmp_path, path)?;
    Ok(())
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    PathBuf::from(tmp)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn state_file_contains_required_lines() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state");
        write_state_file(&path, "UP/SLEEPING", "registered", Some("rssi:-70")).unwrap();
        let contents = fs::read_to_string(&path).unwrap();
        assert!(contents.starts_with("State: UP/SLEEPING\n"));
        assert!(contents.contains("Message: registered\n"));
        assert!(contents.contains("Network: rssi:-70\n"));
        assert!(contents.contains("Updated: "));
        assert!(!dir.path().join("state.tmp").exists());
    }
}
