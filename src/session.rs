//! Session state machine (spec component F / §4.F): connect, handshake,
//! unlock the SIM, wait for registration, then run the operational loop
//! until shutdown or an unrecoverable error.
//!
//! Grounded in `m20d.c`'s `main()`, which is one large state-driven loop
//! over the same substates this module names explicitly as a `SessionState`
//! enum rather than a C `goto`/`switch` — the teacher's style of modeling
//! protocol phases as enum variants (`modem.rs`'s connection states) is
//! followed here instead.
use std::time::{Duration, SystemTime};

use log::{debug, error, info, warn};

use crate::config::Config;
use crate::dialogue::{CmdOutcome, Dialogue};
use crate::errors::{GatewayError, GatewayResult};
use crate::message::{Message, MoQueue};
use crate::signals::SignalFlags;
use crate::stats::Stats;
use crate::transport::{self, Transport};
use crate::{pdu, spool};

/// Process exit codes, per spec §6.
pub mod exit_code {
    pub const NORMAL: i32 = 0;
    pub const OPTION_ERROR: i32 = 1;
    pub const DEVICE_FATAL: i32 = 2;
    pub const HANDSHAKE_FATAL: i32 = 3;
    pub const PIN_FATAL: i32 = 4;
    pub const REGISTRATION_FATAL: i32 = 5;
    pub const CLOCK_FAILURE: i32 = 10;
}

/// The down/up substates spec §4.F names. `Down` states precede an
/// operational transport; `Up` states run against one.
#[derive(Debug, Clone, PartialEq, Eq)]
enum SessionState {
    Init,
    Connecting,
    Handshaking,
    Pin,
    NoNetwork,
    Sleeping,
    Shutdown,
}

impl SessionState {
    fn label(&self) -> &'static str {
        match self {
            SessionState::Init => "DOWN/INIT",
            SessionState::Connecting => "DOWN/CONNECTING",
            SessionState::Handshaking => "DOWN/HANDSHAKING",
            SessionState::Pin => "DOWN/PIN",
            SessionState::NoNetwork => "DOWN/NONETWORK",
            SessionState::Sleeping => "UP/SLEEPING",
            SessionState::Shutdown => "DOWN/SHUTDOWN",
        }
    }
}

/// Everything the operational loop needs across reconnects: the config, the
/// signal flags, counters, the retry queue, and a running message-id counter.
pub struct Runner {
    config: Config,
    signals: SignalFlags,
    stats: Stats,
    queue: MoQueue,
    msgid_counter: u8,
    last_poll: Option<SystemTime>,
}

impl Runner {
    pub fn new(config: Config, signals: SignalFlags) -> Runner {
        Runner {
            config,
            signals,
            stats: Stats::default(),
            queue: MoQueue::new(),
            msgid_counter: 0,
            last_poll: None,
        }
    }

    fn next_msgid(&mut self, prefix: &str) -> GatewayResult<String> {
        let millis = SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)?
            .as_millis() as u64;
        let counter = self.msgid_counter;
        self.msgid_counter = self.msgid_counter.wrapping_add(1) % 100;
        Ok(pdu::gen_msgid(prefix, millis, counter))
    }

    fn write_state(&self, state: &SessionState, message: &str, network: Option<&str>) {
        let state_path = state_file_path(&self.config.spool_dir, &self.config.log_name);
        if let Err(e) = crate::stats::write_state_file(&state_path, state.label(), message, network) {
            warn!("could not update state file: {}", e);
        }
    }

    /// Runs the full session lifecycle: connect, handshake, register, serve
    /// until shutdown. Returns the process exit code per spec §6.
    pub fn run(mut self) -> i32 {
        let mut state = SessionState::Init;
        loop {
            state = match state {
                SessionState::Init => SessionState::Connecting,
                SessionState::Connecting => match self.connect() {
                    Ok(transport) => return self.run_connected(transport),
                    Err((fatal, e)) => {
                        error!("connect failed: {}", e);
                        self.write_state(&SessionState::Connecting, &e.to_string(), None);
                        if fatal {
                            return exit_code::DEVICE_FATAL;
                        }
                        std::thread::sleep(Duration::from_secs(self.config.reconnect_delay_s));
                        SessionState::Connecting
                    }
                },
                _ => unreachable!("run_connected owns every post-connect transition"),
            };
        }
    }

    /// Opens the transport; distinguishes a fatal open failure (bad path,
    /// permission denied) from a transient one worth retrying (spec §4.F).
    fn connect(&self) -> Result<Box<dyn Transport>, (bool, GatewayError)> {
        transport::open(&self.config.device, self.config.baud, self.config.trace).map_err(|e| {
            let fatal = matches!(e, GatewayError::DeviceOpenFatal(_, _));
            (fatal, e)
        })
    }

    /// Drives handshake → PIN → registration → the operational loop, all
    /// against one open transport. Reconnection re-enters `run` by falling
    /// through to its caller's retry path via the return value.
    fn run_connected(&mut self, mut transport: Box<dyn Transport>) -> i32 {
        loop {
            match self.bring_up(transport.as_mut()) {
                Ok(()) => {}
                Err(UpError::Fatal(code, e)) => {
                    error!("fatal during bring-up: {}", e);
                    let _ = transport.close();
                    return code;
                }
                Err(UpError::Transient(e)) => {
                    warn!("session drop, will reconnect: {}", e);
                    let _ = transport.close();
                    self.write_state(&SessionState::Connecting, &e.to_string(), None);
                    std::thread::sleep(Duration::from_secs(self.config.reconnect_delay_s));
                    match self.connect() {
                        Ok(t) => {
                            transport = t;
                            continue;
                        }
                        Err((true, e)) => {
                            error!("reconnect failed fatally: {}", e);
                            return exit_code::DEVICE_FATAL;
                        }
                        Err((false, e)) => {
                            warn!("reconnect attempt failed, will retry: {}", e);
                            std::thread::sleep(Duration::from_secs(self.config.reconnect_delay_s));
                            continue;
                        }
                    }
                }
            }

            if self.signals.shutdown_requested() {
                self.shutdown(transport.as_mut());
                return exit_code::NORMAL;
            }
        }
    }

    /// Handshake, PIN unlock, and registration wait; then the operational
    /// loop runs until a transient/fatal error or shutdown request.
    fn bring_up(&mut self, transport: &mut dyn Transport) -> Result<(), UpError> {
        self.handshake(transport)?;
        self.unlock_pin(transport)?;
        self.wait_for_network(transport)?;

        loop {
            if self.signals.shutdown_requested() {
                return Ok(());
            }
            if self.signals.take_dump_stats_requested() {
                self.stats.log_snapshot();
            }
            self.sleeping_iteration(transport)?;
        }
    }

    fn handshake(&mut self, transport: &mut dyn Transport) -> Result<(), UpError> {
        self.write_state(&SessionState::Handshaking, "pinging modem", None);
        transport::empty_read_buffer(transport, Duration::from_millis(200));
        let mut dialogue = self.dialogue(transport);
        match dialogue.issue_cmd_nomt("ATE0").map_err(UpError::Transient)? {
            CmdOutcome::Ok => Ok(()),
            CmdOutcome::Error | CmdOutcome::Timeout => {
                // Serial handshake failure is fatal (a wrong device or a
                // modem that never echoes); TCP backs off instead, since a
                // remote endpoint may simply not be ready yet.
                if self.config.device.contains(':') {
                    Err(UpError::Transient(GatewayError::CommandFailed("ATE0".into())))
                } else {
                    Err(UpError::Fatal(
                        exit_code::HANDSHAKE_FATAL,
                        GatewayError::CommandFailed("ATE0 (serial handshake)".into()),
                    ))
                }
            }
        }
    }

    fn unlock_pin(&mut self, transport: &mut dyn Transport) -> Result<(), UpError> {
        self.write_state(&SessionState::Pin, "checking SIM", None);
        loop {
            let mut dialogue = self.dialogue(transport);
            let (outcome, reply) = dialogue
                .issue_cmd_capture("AT+CPIN?", &mut |mt| self.dispatch_mt(mt))
                .map_err(UpError::Transient)?;
            if !matches!(outcome, CmdOutcome::Ok) {
                return Err(UpError::Fatal(
                    exit_code::PIN_FATAL,
                    GatewayError::PinFatal("no reply to AT+CPIN?".into()),
                ));
            }

            if reply.contains("SIM PIN") {
                let pin = self.config.pin.clone().ok_or_else(|| {
                    UpError::Fatal(exit_code::PIN_FATAL, GatewayError::PinFatal("PIN required, none configured".into()))
                })?;
                let mut dialogue = self.dialogue(transport);
                match dialogue
                    .issue_cmd(&format!("AT+CPIN=\"{}\"", pin), &mut |mt| self.dispatch_mt(mt))
                    .map_err(UpError::Transient)?
                {
                    CmdOutcome::Ok => continue,
                    CmdOutcome::Error | CmdOutcome::Timeout => {
                        return Err(UpError::Fatal(exit_code::PIN_FATAL, GatewayError::WrongPin));
                    }
                }
            } else if reply.contains("READY") {
                return Ok(());
            } else {
                return Err(UpError::Fatal(
                    exit_code::PIN_FATAL,
                    GatewayError::PinFatal(format!("unrecoverable SIM state: {}", reply.trim())),
                ));
            }
        }
    }

    fn wait_for_network(&mut self, transport: &mut dyn Transport) -> Result<(), UpError> {
        self.write_state(&SessionState::NoNetwork, "waiting for network registration", None);
        let mut dialogue = self.dialogue(transport);
        dialogue
            .issue_cmd_nomt("AT+CMEE=1")
            .map_err(UpError::Transient)?;
        let mut dialogue = self.dialogue(transport);
        dialogue
            .issue_cmd_nomt("AT+CNMI=1,2,0,0")
            .map_err(UpError::Transient)?;

        loop {
            if self.signals.shutdown_requested() {
                return Ok(());
            }
            let mut dialogue = self.dialogue(transport);
            let (_, reply) = dialogue
                .issue_cmd_capture("AT+CREG?", &mut |mt| self.dispatch_mt(mt))
                .map_err(UpError::Transient)?;

            match creg_status(&reply) {
                Some(1) | Some(5) => {
                    self.write_state(&SessionState::Sleeping, "registered", None);
                    return Ok(());
                }
                Some(0) => return self.unlock_pin(transport),
                _ => {}
            }
            std::thread::sleep(Duration::from_secs(5));
        }
    }

    /// One iteration of `UP/SLEEPING`: due retries, a spool scan, a
    /// poll-interval-gated `AT+CMGL=4`, or a brief bounded read for
    /// unsolicited MT (spec §4.F).
    fn sleeping_iteration(&mut self, transport: &mut dyn Transport) -> Result<(), UpError> {
        let now = SystemTime::now();

        let due = self.queue.take_due(now);
        if !due.is_empty() {
            for msg in due {
                self.attempt_mo(transport, msg)?;
            }
            return Ok(());
        }

        if let Some(entry) = spool::mo::scan_one(&self.config.spool_dir).map_err(UpError::Transient)? {
            self.handle_spool_entry(transport, entry)?;
            return Ok(());
        }

        let poll_due = self
            .last_poll
            .map(|last| now.duration_since(last).unwrap_or_default() >= Duration::from_secs(self.config.poll_interval_s))
            .unwrap_or(true);
        if poll_due {
            self.poll_stored_messages(transport)?;
            self.poll_signal_strength(transport)?;
            self.last_poll = Some(now);
            return Ok(());
        }

        let mut buf = Vec::new();
        let outcome = transport::read_until(
            transport,
            &mut buf,
            &["+CMT:", "+CBM:", "+CDS:"],
            &[],
            4096,
            Duration::from_secs(1),
        )
        .map_err(UpError::Transient)?;
        if let transport::ReadOutcome::Ok(_) = outcome {
            let text = String::from_utf8_lossy(&buf).into_owned();
            self.dispatch_mt(&text).map_err(UpError::Transient)?;
        }
        Ok(())
    }

    fn attempt_mo(&mut self, transport: &mut dyn Transport, mut msg: Message) -> Result<(), UpError> {
        self.stats.mo_tries += 1;
        match self.transmit(transport, &msg) {
            Ok(()) => {
                self.stats.mo_ok += 1;
                if let Some(path) = msg.spoolfile.take() {
                    let _ = std::fs::remove_file(path);
                }
            }
            Err(e) => {
                self.stats.mo_try_fail += 1;
                warn!("mo {} delivery attempt failed: {}", msg.msgid, e);
                if should_drop_after_failure(msg.tries, self.config.max_retries) {
                    self.stats.mo_dropped += 1;
                    if let Some(path) = msg.spoolfile.take() {
                        let _ = std::fs::remove_file(path);
                    }
                } else {
                    self.queue.reschedule(msg, self.config.retry_multiplier, self.retry_max(), SystemTime::now());
                }
            }
        }
        self.stats.mo_queue_len = self.queue.len() as u64;
        Ok(())
    }

    fn retry_max(&self) -> u64 {
        // `max_retries` (spec §6 `-3`) bounds attempt count, not backoff
        // seconds; the backoff ceiling itself is generous (a day).
        86_400
    }

    fn handle_spool_entry(&mut self, transport: &mut dyn Transport, entry: spool::mo::SpoolEntry) -> Result<(), UpError> {
        self.stats.mo += 1;
        let msgid = match &entry.msgid_override {
            Some(id) => id.clone(),
            None => self.next_msgid("mo").map_err(|e| UpError::Fatal(exit_code::CLOCK_FAILURE, e))?,
        };
        let msg = Message::from_spool(
            msgid,
            SystemTime::now(),
            entry.to,
            entry.pid,
            entry.dcs,
            entry.is_binary,
            entry.has_udh,
            entry.content,
            entry.path.clone(),
        );
        match self.transmit(transport, &msg) {
            Ok(()) => {
                self.stats.mo_ok += 1;
                let _ = std::fs::remove_file(&entry.path);
            }
            Err(e) => {
                warn!("mo {} first attempt failed, queueing: {}", msg.msgid, e);
                self.stats.mo_queued += 1;
                self.queue.enqueue_first_failure(msg, self.config.initial_retry_s, SystemTime::now());
            }
        }
        self.stats.mo_queue_len = self.queue.len() as u64;
        Ok(())
    }

    /// Encodes and sends one SMS-SUBMIT, awaiting the final `OK`/`ERROR`
    /// with [`Dialogue::issue_cmd`]'s `transmit_timeout` wait for the
    /// post-PDU reply (spec §5).
    fn transmit(&mut self, transport: &mut dyn Transport, msg: &Message) -> GatewayResult<()> {
        let dst = msg.dst.as_deref().ok_or(GatewayError::InvalidPdu("MO message missing destination"))?;
        let fields = pdu::SubmitFields {
            dst,
            pid: msg.pid,
            dcs: msg.dcs,
            is_binary: msg.is_binary,
            has_udh: msg.has_udh,
            request_report: msg.request_report,
            content: &msg.content,
        };
        let pdu_hex = pdu::encode_submit(&fields);
        let octet_count = (pdu_hex.len() / 2).saturating_sub(1); // exclude the leading SMSC octet
        transport::write_line(transport, &format!("AT+CMGS={}", octet_count))?;

        let mut prompt_buf = Vec::new();
        transport::read_until(transport, &mut prompt_buf, &[">"], &["ERROR"], 4096, Duration::from_secs(self.config.cmd_timeout_ms / 1000))?;

        transport.write_all(pdu_hex.as_bytes())?;
        transport.write_all(&[0x1A])?; // Ctrl-Z submits the PDU
        transport.flush()?;

        let mut pending_mt = Vec::new();
        let mut dialogue = self.dialogue(transport);
        let (outcome, reply) = dialogue.await_reply_capture(&mut |mt| {
            pending_mt.push(mt.to_owned());
            Ok(())
        })?;
        for block in pending_mt {
            self.dispatch_mt(&block)?;
        }
        match outcome {
            CmdOutcome::Ok => Ok(()),
            CmdOutcome::Error => Err(crate::errors::classify_error("AT+CMGS", &reply)),
            CmdOutcome::Timeout => Err(GatewayError::Timeout),
        }
    }

    fn poll_stored_messages(&mut self, transport: &mut dyn Transport) -> Result<(), UpError> {
        let mut dialogue = self.dialogue(transport);
        let (_, reply) = dialogue
            .issue_cmd_capture("AT+CMGL=4", &mut |mt| self.dispatch_mt(mt))
            .map_err(UpError::Transient)?;
        let mut saw_any = false;
        for line in reply.lines() {
            if line.starts_with("+CMGL:") {
                saw_any = true;
            } else if !line.trim().is_empty() && !line.starts_with("+CMGL") && line.trim().chars().all(|c| c.is_ascii_hexdigit()) {
                self.dispatch_deliver_pdu(line.trim());
            }
        }
        if saw_any {
            let mut dialogue = self.dialogue(transport);
            dialogue.issue_cmd_nomt("AT+CNMA=1").map_err(UpError::Transient)?;
        }
        Ok(())
    }

    /// `AT^MONI` + `AT+COPS?`: spec §4.F's signal-strength poll, stored in
    /// the state file as a `Network:` line.
    fn poll_signal_strength(&mut self, transport: &mut dyn Transport) -> Result<(), UpError> {
        let mut dialogue = self.dialogue(transport);
        let (_, moni) = dialogue
            .issue_cmd_capture("AT^MONI", &mut |mt| self.dispatch_mt(mt))
            .map_err(UpError::Transient)?;

        let mut dialogue = self.dialogue(transport);
        let (_, cops) = dialogue
            .issue_cmd_capture("AT+COPS?", &mut |mt| self.dispatch_mt(mt))
            .map_err(UpError::Transient)?;

        let network = format!("{} {}", moni.trim().replace('\n', " "), cops.trim().replace('\n', " "));
        self.write_state(&SessionState::Sleeping, "polled signal strength", Some(&network));
        Ok(())
    }

    fn dispatch_deliver_pdu(&mut self, hex: &str) {
        self.stats.mt += 1;
        match pdu::decode_deliver(hex) {
            Ok(deliver) => {
                let msgid = match self.next_msgid("mt") {
                    Ok(id) => id,
                    Err(e) => {
                        error!("clock failure generating MT msgid: {}", e);
                        self.stats.mt_fail += 1;
                        return;
                    }
                };
                let msg = Message::from_deliver(msgid, SystemTime::now(), &deliver);
                match spool::mt::spool_and_dispatch(&self.config.spool_dir, &self.config.handler_path, &msg) {
                    Ok(()) => self.stats.mt_ok += 1,
                    Err(e) => {
                        error!("mt {} spool/handler failure: {}", msg.msgid, e);
                        self.stats.mt_fail += 1;
                        self.stats.mt_fail_handle += 1;
                    }
                }
            }
            Err(e) => {
                debug!("dropping unparseable MT PDU: {}", e);
                self.stats.mt_fail += 1;
                self.stats.mt_fail_parse += 1;
            }
        }
    }

    /// `on_mt` callback handed to [`Dialogue::issue_cmd`]: pulls every PDU
    /// line out of an interleaved `+CMT:`/`+CBM:`/`+CDS:` block.
    fn dispatch_mt(&mut self, block: &str) -> GatewayResult<()> {
        for line in block.lines() {
            let line = line.trim();
            if !line.is_empty() && !line.starts_with('+') && line.chars().all(|c| c.is_ascii_hexdigit()) {
                self.dispatch_deliver_pdu(line);
            }
        }
        Ok(())
    }

    fn dialogue<'t>(&self, transport: &'t mut dyn Transport) -> Dialogue<'t> {
        Dialogue::new(transport, Duration::from_millis(self.config.cmd_timeout_ms))
    }

    /// `SIGINT`/`SIGTERM` path: disable unsolicited MT best-effort, log any
    /// queued MO lost (spec §9 notes queue persistence is absent), and exit.
    fn shutdown(&mut self, transport: &mut dyn Transport) {
        info!("shutdown requested, disabling unsolicited MT and exiting");
        let mut dialogue = self.dialogue(transport);
        let _ = dialogue.issue_cmd_nomt("AT+CNMI=0,0,0,0");
        let lost = self.queue.drain();
        if !lost.is_empty() {
            warn!("{} queued MO message(s) lost on shutdown (no queue persistence)", lost.len());
            for msg in &lost {
                warn!("lost mo {} to {:?}", msg.msgid, msg.dst);
            }
        }
        self.write_state(&SessionState::Shutdown, "shut down", None);
        let _ = transport.close();
    }
}

enum UpError {
    Fatal(i32, GatewayError),
    Transient(GatewayError),
}

/// Extracts the registration status from a `+CREG: <n>,<stat>` (or bare
/// `+CREG: <stat>`) line using the typed value grammar, rather than
/// substring-matching the digit pair directly — `AT+CREG?` is the one query
/// in this dialogue whose content drives a three-way branch, so it earns
/// the parser the rest of the dialogue's literal matching doesn't need.
fn creg_status(reply: &str) -> Option<u32> {
    let line = reply.lines().find(|l| l.trim_start().starts_with("+CREG"))?;
    let (_, value) = crate::parse::parse_information_response(line.trim().as_bytes()).ok()?;
    let stat = value.nth(1).or_else(|_| value.nth(0)).ok()?;
    stat.clone().as_integer().ok()
}

/// `<spool_dir>/state.<log_name>`, unconditionally — the state file isn't
/// gated on `-x pidfile` being configured (`original_source/m20d.c:421-424`
/// derives it the same way, independent of the pidfile option).
fn state_file_path(spool_dir: &std::path::Path, log_name: &str) -> std::path::PathBuf {
    spool_dir.join(format!("state.{}", log_name))
}

/// Whether a message should be dropped after the delivery attempt that just
/// failed, rather than rescheduled. `msg.tries` is the pre-attempt count
/// `reschedule` is about to increment, so the decision has to anticipate
/// that increment (`tries + 1`) instead of comparing against the stale
/// count — otherwise the message survives one attempt past `max_retries`
/// (`original_source/m20d.c:1320-1321` increments before the equivalent
/// check at `m20d.c:1471`, so it never sees the stale count either).
fn should_drop_after_failure(tries: u32, max_retries: u32) -> bool {
    tries + 1 >= max_retries
}

#[cfg(test)]
mod retry_drop_tests {
    use super::*;

    /// Spec §8 testable property #6: after exactly `max_retries` consecutive
    /// delivery failures, a message is dropped rather than rescheduled again.
    #[test]
    fn drops_after_exactly_max_retries_failures() {
        let max_retries = 4;
        let mut tries = 0u32;
        let mut attempts = 0u32;
        loop {
            attempts += 1;
            if should_drop_after_failure(tries, max_retries) {
                break;
            }
            tries += 1;
        }
        assert_eq!(attempts, max_retries);
    }

    #[test]
    fn does_not_drop_before_max_retries_reached() {
        let max_retries = 4;
        for tries in 0..max_retries - 1 {
            assert!(!should_drop_after_failure(tries, max_retries));
        }
    }

    #[test]
    fn drops_on_the_final_permitted_attempt() {
        let max_retries = 4;
        assert!(should_drop_after_failure(max_retries - 1, max_retries));
    }
}
