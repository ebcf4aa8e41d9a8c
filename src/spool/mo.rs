//! MO spool directory scan and envelope parsing (spec component G / §4.G).
//!
//! Grounded in `m20d.c`'s `check_spool`/`handle_spoolfile`. Spec §9 flags a
//! latent bug in the source: the open-failure check tests the wrong
//! variable (`f` instead of the real descriptor result) so the error branch
//! never fires. `scan_one` below tests the actual `File::open` result.
use std::fs;
use std::path::{Path, PathBuf};

use log::warn;

use crate::errors::{GatewayError, GatewayResult};
use crate::pdu;

/// One parsed `.sms` spool file, ready for a first delivery attempt.
pub struct SpoolEntry {
    pub to: String,
    pub pid: u8,
    pub dcs: u8,
    pub is_binary: bool,
    pub has_udh: bool,
    pub content: Vec<u8>,
    pub path: PathBuf,
    pub msgid_override: Option<String>,
}

/// Scans `spool_dir` for `.sms` files and processes **one** per call (spec
/// §4.G: "process one file per scan pass... to interleave with retry and MT
/// work"). Returns `Ok(None)` when there is nothing to do, or when the one
/// file picked failed to parse (it is unlinked and logged, not retried).
pub fn scan_one(spool_dir: &Path) -> GatewayResult<Option<SpoolEntry>> {
    let mut names: Vec<PathBuf> = match fs::read_dir(spool_dir) {
        Ok(entries) => entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().map(|ext| ext == "sms").unwrap_or(false))
            .collect(),
        Err(e) => return Err(GatewayError::SpoolFile("readdir".into(), e.to_string())),
    };
    names.sort();
    let Some(path) = names.into_iter().next() else {
        return Ok(None);
    };

    match parse_spool_file(&path) {
        Ok(entry) => Ok(Some(entry)),
        Err(e) => {
            warn!("spool file {} failed to parse, dropping: {}", path.display(), e);
            let _ = fs::remove_file(&path);
            Ok(None)
        }
    }
}

fn parse_spool_file(path: &Path) -> GatewayResult<SpoolEntry> {
    let raw = fs::read(path).map_err(|e| GatewayError::SpoolFile(path.display().to_string(), e.to_string()))?;

    let header_end = find_blank_line(&raw).ok_or(GatewayError::InvalidPdu("spool file missing header/body separator"))?;
    let header_text = String::from_utf8_lossy(&raw[..header_end]);
    let body = &raw[(header_end + blank_line_len(&raw, header_end))..];

    let mut to: Option<String> = None;
    let mut is_binary = false;
    let mut has_udh = false;
    let mut pid = 0u8;
    let mut dcs = 0u8;
    let mut msgid_override = None;

    for line in header_text.lines() {
        let Some((key, value)) = line.split_once(':') else {
            if !line.trim().is_empty() {
                warn!("spool file {}: ignoring malformed header line {:?}", path.display(), line);
            }
            continue;
        };
        let key = key.trim();
        let value = value.trim();
        match key.to_ascii_lowercase().as_str() {
            "to" => to = Some(value.to_owned()),
            "is-binary" => is_binary = value == "1",
            "has-udh" => has_udh = value == "1",
            "tp-pid" => pid = value.parse().unwrap_or(0),
            "tp-dcs" => dcs = value.parse().unwrap_or(0),
            "message-id" => msgid_override = Some(value.to_owned()),
            other => warn!("spool file {}: unrecognized header key {:?}", path.display(), other),
        }
    }

    let to = to.ok_or(GatewayError::InvalidPdu("spool file missing required To: header"))?;

    let content = if is_binary {
        let text = String::from_utf8_lossy(body).trim().to_owned();
        let text = if text.len() % 2 != 0 {
            warn!("spool file {}: odd-length hex body, dropping last nibble", path.display());
            &text[..text.len() - 1]
        } else {
            &text[..]
        };
        pdu::hex_to_bytes(text.as_bytes())?
    } else {
        body.to_vec()
    };

    Ok(SpoolEntry { to, pid, dcs, is_binary, has_udh, content, path: path.to_owned(), msgid_override })
}

/// Finds the offset of a blank line (`\n\n` or `\r\n\r\n`) terminating the
/// header block.
fn find_blank_line(raw: &[u8]) -> Option<usize> {
    for i in 0..raw.len() {
        if raw[i..].starts_with(b"\n\n") || raw[i..].starts_with(b"\r\n\r\n") {
            return Some(i);
        }
    }
    None
}

fn blank_line_len(raw: &[u8], at: usize) -> usize {
    if raw[at..].starts_with(b"\r\n\r\n") {
        4
    } else {
        2
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn parses_minimal_text_envelope() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("one.sms");
        fs::write(&path, b"To: +15551234\n\nHi there").unwrap();
        let entry = parse_spool_file(&path).unwrap();
        assert_eq!(entry.to, "+15551234");
        assert!(!entry.is_binary);
        assert_eq!(entry.content, b"Hi there");
    }

    #[test]
    fn scan_one_picks_a_single_file_and_unlinks_on_parse_failure() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("bad.sms"), b"no header separator here").unwrap();
        let result = scan_one(dir.path()).unwrap();
        assert!(result.is_none());
        assert!(!dir.path().join("bad.sms").exists());
    }

    #[test]
    fn unknown_headers_warn_but_do_not_fail_parse() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("two.sms");
        fs::write(&path, b"To: +15551234\nX-Bogus: whatever\n\nHi").unwrap();
        let entry = parse_spool_file(&path).unwrap();
        assert_eq!(entry.to, "+15551234");
    }
}
