//! The `Message` record and the MO retry queue (spec component C, §3).
//!
//! Grounded in `message.c`'s `struct message` and `m20d.c`'s `mo_queue`
//! handling, with the intrusive `**prevp` doubly-linked list the original
//! used (spec §9 REDESIGN FLAG) replaced by a plain `VecDeque` owned by the
//! session runner — queue membership no longer needs to live on the
//! `Message` itself, since nothing outside the queue ever needs to unlink
//! an entry from the middle.
use std::collections::VecDeque;
use std::path::PathBuf;
use std::time::SystemTime;

/// One SMS, in either direction. Most fields are populated for one
/// direction only; see the per-field docs.
#[derive(Debug, Clone)]
pub struct Message {
    /// Short unique ID: `<mo|mt><base62 ms><counter>`. Present in every log
    /// line about this message.
    pub msgid: String,
    /// Wallclock instant the daemon first saw this message (PDU arrival for
    /// MT, spool-read time for MO).
    pub received: SystemTime,
    /// TP-Message-Type-Indicator of the source PDU (MT only; always 0 for
    /// an accepted SMS-DELIVER).
    pub pdu_type: u8,
    pub pid: u8,
    pub dcs: u8,
    pub is_binary: bool,
    pub has_udh: bool,
    /// MO-only: `AT+CMGS` class-0 flash-message request.
    pub is_flash: bool,
    /// MO-only: TP-SRR status-report request.
    pub request_report: bool,
    /// MO only: destination number, `+CC…` or raw digits.
    pub dst: Option<String>,
    /// MT only: originator address, `+CC…`, raw digits, or decoded
    /// alphanumeric sender name.
    pub src: Option<String>,
    /// MT only: `YY/MM/DD`.
    pub date: Option<String>,
    /// MT only: `HH:MM:SS`.
    pub time: Option<String>,
    /// MT only: service-center address, when present in the PDU.
    pub smsc: Option<String>,
    /// Decoded text (ISO-8859-1) or raw octets when `is_binary`.
    pub content: Vec<u8>,
    /// Byte length of `content`; kept as a separate field to mirror the
    /// invariant spec §3 states explicitly (`len == content.len()`).
    pub len: usize,
    /// MO only: originating spool path, unlinked once the message leaves
    /// the daemon's hands (first-attempt success or final drop).
    pub spoolfile: Option<PathBuf>,
    /// MO queue only: attempts made so far, `1..=mo_queue_max_tries`.
    pub tries: u32,
    /// MO queue only: current backoff, in seconds.
    pub retry_time: u64,
    /// MO queue only: absolute time of the next attempt.
    pub next_try: SystemTime,
}

impl Message {
    /// Builds a `Message` from a decoded SMS-DELIVER PDU.
    pub fn from_deliver(msgid: String, received: SystemTime, pdu: &crate::pdu::DeliverPdu) -> Message {
        Message {
            msgid,
            received,
            pdu_type: 0,
            pid: pdu.pid,
            dcs: pdu.dcs,
            is_binary: pdu.is_binary,
            has_udh: pdu.has_udh,
            is_flash: false,
            request_report: false,
            dst: None,
            src: Some(pdu.src.clone()),
            date: Some(pdu.date.clone()),
            time: Some(pdu.time.clone()),
            smsc: pdu.smsc.clone(),
            len: pdu.content.len(),
            content: pdu.content.clone(),
            spoolfile: None,
            tries: 0,
            retry_time: 0,
            next_try: received,
        }
    }

    /// Builds a freshly-read MO `Message` from a parsed spool envelope,
    /// prior to its first delivery attempt.
    #[allow(clippy::too_many_arguments)]
    pub fn from_spool(
        msgid: String,
        received: SystemTime,
        dst: String,
        pid: u8,
        dcs: u8,
        is_binary: bool,
        has_udh: bool,
        content: Vec<u8>,
        spoolfile: PathBuf,
    ) -> Message {
        Message {
            msgid,
            received,
            pdu_type: 1,
            pid,
            dcs,
            is_binary,
            has_udh,
            is_flash: false,
            request_report: false,
            dst: Some(dst),
            src: None,
            date: None,
            time: None,
            smsc: None,
            len: content.len(),
            content,
            spoolfile: Some(spoolfile),
            tries: 0,
            retry_time: 0,
            next_try: received,
        }
    }
}

/// Advances the exponential backoff: `min(current * mult, max)`, truncating
/// toward zero like the original's float-to-int cast (spec §4.I / §8 #7).
pub fn next_retry_time(current: u64, mult: f64, max: u64) -> u64 {
    let scaled = (current as f64) * mult;
    (scaled as u64).min(max)
}

/// The process-wide MO retry queue (spec §3's "Global state"). A plain
/// `VecDeque` in place of the original's intrusive linked list — see the
/// module doc comment.
#[derive(Debug, Default)]
pub struct MoQueue {
    inner: VecDeque<Message>,
}

impl MoQueue {
    pub fn new() -> MoQueue {
        MoQueue { inner: VecDeque::new() }
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Enqueues a message that has just failed its first delivery attempt,
    /// per spec §4.G: `tries=1`, `retry_time=mo_queue_init_retryt`.
    pub fn enqueue_first_failure(&mut self, mut msg: Message, init_retryt: u64, now: SystemTime) {
        msg.tries = 1;
        msg.retry_time = init_retryt;
        msg.next_try = now + std::time::Duration::from_secs(init_retryt);
        self.inner.push_back(msg);
    }

    /// Re-enqueues a message after a subsequent retry failure, advancing
    /// its backoff (spec §4.I).
    pub fn reschedule(&mut self, mut msg: Message, mult: f64, max_retryt: u64, now: SystemTime) {
        msg.tries += 1;
        msg.retry_time = next_retry_time(msg.retry_time, mult, max_retryt);
        msg.next_try = now + std::time::Duration::from_secs(msg.retry_time);
        self.inner.push_back(msg);
    }

    /// Removes and returns every message whose `next_try` has arrived,
    /// walking the queue head-to-tail (spec §4.I). The remaining queue
    /// keeps its relative order.
    pub fn take_due(&mut self, now: SystemTime) -> Vec<Message> {
        let mut due = Vec::new();
        let mut remaining = VecDeque::with_capacity(self.inner.len());
        for msg in self.inner.drain(..) {
            if msg.next_try <= now {
                due.push(msg);
            } else {
                remaining.push_back(msg);
            }
        }
        self.inner = remaining;
        due
    }

    /// Drains the whole queue, e.g. to log lost messages at shutdown
    /// (spec §4.F's `DOWN/SHUTDOWN` transition).
    pub fn drain(&mut self) -> Vec<Message> {
        self.inner.drain(..).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn msg_at(next_try: SystemTime) -> Message {
        Message {
            msgid: "mo0".into(),
            received: next_try,
            pdu_type: 1,
            pid: 0,
            dcs: 0,
            is_binary: false,
            has_udh: false,
            is_flash: false,
            request_report: false,
            dst: Some("+15551234".into()),
            src: None,
            date: None,
            time: None,
            smsc: None,
            content: b"hi".to_vec(),
            len: 2,
            spoolfile: None,
            tries: 1,
            retry_time: 10,
            next_try,
        }
    }

    #[test]
    fn backoff_matches_spec_sequence() {
        // init=10, mult=3.0, max=300 -> 10, 30, 90, 270, 300, 300, ...
        let mut rt = 10u64;
        let expect = [10, 30, 90, 270, 300, 300];
        let mut got = vec![rt];
        for _ in 1..expect.len() {
            rt = next_retry_time(rt, 3.0, 300);
            got.push(rt);
        }
        assert_eq!(got, expect);
    }

    #[test]
    fn queue_length_tracks_enqueue_and_take() {
        let mut q = MoQueue::new();
        let now = SystemTime::now();
        q.enqueue_first_failure(msg_at(now), 10, now - Duration::from_secs(20));
        assert_eq!(q.len(), 1);
        let due = q.take_due(now);
        assert_eq!(due.len(), 1);
        assert_eq!(q.len(), 0);
    }

    #[test]
    fn not_yet_due_messages_stay_queued() {
        let mut q = MoQueue::new();
        let now = SystemTime::now();
        let mut msg = msg_at(now);
        msg.next_try = now + Duration::from_secs(100);
        q.enqueue_first_failure(msg, 10, now);
        let due = q.take_due(now);
        assert!(due.is_empty());
        assert_eq!(q.len(), 1);
    }
}
