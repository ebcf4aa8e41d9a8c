//! Modem dialogue: issue a command, wait for its terminator, and drain any
//! unsolicited MT indications interleaved in the reply stream (spec §4.E).
//!
//! Spec §9 REDESIGN FLAGS calls this out as the single most important
//! correctness property: "await token" and "drain MT events" must be one
//! operation that cannot be forgotten, not a pattern every call site has to
//! remember. `Dialogue::wait_for` is that single operation; `issue_cmd` and
//! `issue_cmd_nomt` are both thin callers of it.
use std::time::Duration;

use log::{trace, warn};

use crate::errors::{GatewayError, GatewayResult};
use crate::transport::{self, ReadOutcome, Transport};

/// MT indication prefixes that can interleave with any solicited reply
/// (spec §4.E / §5's ordering guarantee).
const MT_INDICATION_PREFIXES: &[&str] = &["+CMT:", "+CBM:", "+CDS:"];

const MAX_LINE_LEN: usize = 4096;

/// Outcome of a command dialogue.
#[derive(Debug, PartialEq, Eq)]
pub enum CmdOutcome {
    Ok,
    /// The modem replied literal `ERROR`.
    Error,
    /// No reply before `cmd_timeout`.
    Timeout,
}

/// Drives the request/response protocol over one [`Transport`], owning the
/// accumulation buffer `read_until` needs between calls.
pub struct Dialogue<'t> {
    transport: &'t mut dyn Transport,
    cmd_timeout: Duration,
}

impl<'t> Dialogue<'t> {
    pub fn new(transport: &'t mut dyn Transport, cmd_timeout: Duration) -> Self {
        Dialogue { transport, cmd_timeout }
    }

    /// Issues `cmd`, waits for `OK`/`ERROR`/timeout, transparently dispatching
    /// any interleaved MT indication to `on_mt` before resuming the wait for
    /// the original command's terminator (spec §4.E).
    pub fn issue_cmd(
        &mut self,
        cmd: &str,
        on_mt: &mut dyn FnMut(&str) -> GatewayResult<()>,
    ) -> GatewayResult<CmdOutcome> {
        transport::write_line(self.transport, cmd)?;
        self.wait_for(&["OK"], &["ERROR"], Some(on_mt), None)
    }

    /// Like [`issue_cmd`](Self::issue_cmd), but an interleaved MT indication
    /// is a protocol violation rather than something to dispatch — used
    /// right after an MT acknowledgement, when none should still be pending.
    pub fn issue_cmd_nomt(&mut self, cmd: &str) -> GatewayResult<CmdOutcome> {
        transport::write_line(self.transport, cmd)?;
        self.wait_for(&["OK"], &["ERROR"], None, None)
    }

    /// Like [`issue_cmd`](Self::issue_cmd), but also returns the full reply
    /// text up to the terminator — used by queries whose *content*, not
    /// just success/failure, drives the next state (`AT+CPIN?`, `AT+CREG?`,
    /// `AT^MONI`, `AT+COPS?`).
    pub fn issue_cmd_capture(
        &mut self,
        cmd: &str,
        on_mt: &mut dyn FnMut(&str) -> GatewayResult<()>,
    ) -> GatewayResult<(CmdOutcome, String)> {
        transport::write_line(self.transport, cmd)?;
        let mut captured = String::new();
        let outcome = self.wait_for(&["OK"], &["ERROR"], Some(on_mt), Some(&mut captured))?;
        Ok((outcome, captured))
    }

    /// Waits for `OK`/`ERROR` without writing anything first, draining any
    /// interleaved MT indication along the way. Used after a command whose
    /// bytes were already written outside this type (e.g. a raw PDU body
    /// followed by Ctrl-Z in the MO transmit path).
    pub fn await_reply(&mut self, on_mt: &mut dyn FnMut(&str) -> GatewayResult<()>) -> GatewayResult<CmdOutcome> {
        self.wait_for(&["OK"], &["ERROR"], Some(on_mt), None)
    }

    /// Like [`await_reply`](Self::await_reply), but also returns the reply
    /// text — used by the MO transmit path so a `+CMS ERROR: <n>` can be
    /// decoded into its typed error instead of a bare `CommandFailed`.
    pub fn await_reply_capture(
        &mut self,
        on_mt: &mut dyn FnMut(&str) -> GatewayResult<()>,
    ) -> GatewayResult<(CmdOutcome, String)> {
        let mut captured = String::new();
        let outcome = self.wait_for(&["OK"], &["ERROR"], Some(on_mt), Some(&mut captured))?;
        Ok((outcome, captured))
    }

    /// The single operation spec §9 asks for: wait for any of `ok_set` /
    /// `err_set`, transparently looping back after dispatching every
    /// interleaved MT indication found along the way. When `on_mt` is
    /// `None`, a detected MT indication is itself a protocol error. When
    /// `capture` is given, every non-MT byte read along the way is appended
    /// to it, so a caller can inspect the reply body once the terminator
    /// is reached.
    fn wait_for(
        &mut self,
        ok_set: &[&str],
        err_set: &[&str],
        mut on_mt: Option<&mut dyn FnMut(&str) -> GatewayResult<()>>,
        mut capture: Option<&mut String>,
    ) -> GatewayResult<CmdOutcome> {
        loop {
            let mut buf = Vec::new();
            let mut all_terminators: Vec<&str> = Vec::with_capacity(
                ok_set.len() + err_set.len() + MT_INDICATION_PREFIXES.len(),
            );
            all_terminators.extend_from_slice(ok_set);
            all_terminators.extend_from_slice(err_set);
            all_terminators.extend_from_slice(MT_INDICATION_PREFIXES);

            let result = transport::read_until(
                self.transport,
                &mut buf,
                &all_terminators,
                &[],
                MAX_LINE_LEN,
                self.cmd_timeout,
            )?;

            let matched_idx = match result {
                ReadOutcome::Ok(idx) => idx,
                ReadOutcome::BufferFull => {
                    warn!("modem reply buffer filled without a recognized terminator");
                    return Ok(CmdOutcome::Timeout);
                }
                ReadOutcome::Timeout => return Ok(CmdOutcome::Timeout),
                ReadOutcome::Err(_) => unreachable!("err_set is always empty here"),
            };

            if matched_idx < ok_set.len() || matched_idx < ok_set.len() + err_set.len() {
                if let Some(out) = capture.as_deref_mut() {
                    out.push_str(&String::from_utf8_lossy(&buf));
                }
                return Ok(if matched_idx < ok_set.len() { CmdOutcome::Ok } else { CmdOutcome::Error });
            }

            // An MT indication prefix matched. There is no bound on how many
            // may arrive before the original terminator, so every
            // occurrence in this buffer is dispatched before resuming.
            match on_mt.as_deref_mut() {
                None => {
                    return Err(GatewayError::UnexpectedResponse(
                        "unexpected MT indication during issue_cmd_nomt",
                    ));
                }
                Some(handler) => {
                    self.drain_mt_events(&mut buf, handler)?;
                    // Resume waiting for the original terminator.
                }
            }
        }
    }

    /// Reads the two continuation lines one MT indication needs (the rest
    /// of its header line, then the PDU line), then dispatches the combined
    /// header+PDU text as a single block (spec §4.E) — `on_mt`'s one caller,
    /// `session::dispatch_mt`, expects both lines together so it can find
    /// the bare-hex PDU line inside the block.
    fn drain_mt_events(
        &mut self,
        buf: &mut Vec<u8>,
        on_mt: &mut dyn FnMut(&str) -> GatewayResult<()>,
    ) -> GatewayResult<()> {
        // Each continuation read must start from an empty buffer: `buf`
        // already holds the bytes that matched the indication prefix
        // (typically including the `\r\n` that preceded it), so searching
        // for `"\n"` directly in `buf` would match instantly without
        // reading a single new byte, and the header/PDU lines that follow
        // would never be captured.
        for _ in 0..2 {
            let mut line_buf = Vec::new();
            transport::read_until(self.transport, &mut line_buf, &["\n"], &[], MAX_LINE_LEN, self.cmd_timeout)?;
            buf.extend_from_slice(&line_buf);
        }
        let text = String::from_utf8_lossy(buf).into_owned();
        if let Some(start) = MT_INDICATION_PREFIXES.iter().filter_map(|p| text.find(p)).min() {
            let block = text[start..].trim();
            if !block.is_empty() {
                trace!("dispatching interleaved MT indication: {}", block);
                on_mt(block)?;
            }
        }
        buf.clear();
        Ok(())
    }
}
