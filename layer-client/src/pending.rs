//! The pending-message table: in-flight RPCs keyed by `msg_id`.
//!
//! One [`PendingTable`] lives for the whole [`crate::Client`] instance, not
//! per-connection — entries survive a reconnect so that RPCs in flight when
//! the socket drops get replayed rather than lost.

use std::collections::HashMap;
use std::sync::Mutex;

use tokio::sync::mpsc;
use tokio::sync::oneshot;

/// A request waiting on a response, or a fire-and-forget message waiting on
/// its ack.
pub struct PendingPacket {
    pub msg_id: i64,
    pub seq_no: i32,
    /// The plaintext TL body, kept so it can be re-encrypted with the same
    /// `msg_id`/`seq_no` on replay after a reconnect.
    pub body: Vec<u8>,
    /// `None` for fire-and-forget sends (pings, acks, synthesized replies).
    pub response_sink: Option<oneshot::Sender<Vec<u8>>>,
    pub needs_ack: bool,
}

impl PendingPacket {
    pub fn new(
        msg_id: i64,
        seq_no: i32,
        body: Vec<u8>,
        response_sink: Option<oneshot::Sender<Vec<u8>>>,
        needs_ack: bool,
    ) -> Self {
        Self { msg_id, seq_no, body, response_sink, needs_ack }
    }
}

/// Table of in-flight messages, guarded by a single mutex shared with the
/// session fields it is often mutated alongside (see the connection
/// manager).
#[derive(Default)]
pub struct PendingTable {
    table: Mutex<HashMap<i64, PendingPacket>>,
}

impl PendingTable {
    pub fn new() -> Self {
        Self { table: Mutex::new(HashMap::new()) }
    }

    /// Register a packet under its `msg_id`. Caller already holds whatever
    /// invariant ensures `msg_id` is unique (msg_ids are strictly
    /// increasing per session).
    pub fn insert(&self, packet: PendingPacket) {
        self.table.lock().unwrap().insert(packet.msg_id, packet);
    }

    /// Deliver `response` to the waiter for `msg_id`, if any, and remove the
    /// entry. Delivering twice to the same entry cannot happen because the
    /// entry is removed on first delivery; a second inbound message naming
    /// the same `msg_id` after that finds nothing and is a warned no-op.
    pub fn respond_and_clear(&self, msg_id: i64, response: Vec<u8>) {
        let entry = self.table.lock().unwrap().remove(&msg_id);
        match entry {
            Some(packet) => {
                if let Some(sink) = packet.response_sink {
                    let _ = sink.send(response);
                } else {
                    log::warn!("pending: #{msg_id} resolved but had no response sink (fire-and-forget?)");
                }
            }
            None => log::warn!("pending: second response to message #{msg_id}, ignoring"),
        }
    }

    /// Drop the entry for `msg_id` without delivering a response (closes
    /// the sink by dropping it).
    pub fn clear(&self, msg_id: i64) {
        self.table.lock().unwrap().remove(&msg_id);
    }

    /// Remove and return every pending entry. Used at the start of a
    /// reconnect to snapshot in-flight work before the connection is torn
    /// down.
    pub fn pop_all(&self) -> Vec<PendingPacket> {
        let mut table = self.table.lock().unwrap();
        let drained: Vec<PendingPacket> = table.drain().map(|(_, v)| v).collect();
        log::debug!("pending: popped {} packet(s)", drained.len());
        drained
    }

    /// Re-insert each packet (preserving its `msg_id` as the key) and push
    /// it onto the internal send queue so it is retransmitted with its
    /// original `msg_id`/`seq_no`.
    pub fn push_all(&self, packets: Vec<PendingPacket>, internal_queue: &mpsc::UnboundedSender<SendItem>) {
        let mut table = self.table.lock().unwrap();
        let n = packets.len();
        for packet in packets {
            let resend = SendItem::Resend { msg_id: packet.msg_id, seq_no: packet.seq_no, body: packet.body.clone() };
            table.insert(packet.msg_id, packet);
            let _ = internal_queue.send(resend);
        }
        log::debug!("pending: pushed {n} packet(s) for resend");
    }

    /// Clear `needs_ack` for each acked id; drop entries that have neither
    /// an outstanding ack requirement nor a response sink.
    pub fn acknowledge(&self, msg_ids: &[i64]) {
        let mut table = self.table.lock().unwrap();
        for id in msg_ids {
            if let Some(packet) = table.get_mut(id) {
                packet.needs_ack = false;
                if packet.response_sink.is_none() {
                    table.remove(id);
                }
            }
        }
    }

    /// Snapshot every currently pending `msg_id`, for the diagnostic
    /// watchdog and for the reconnect sequence's pre-teardown snapshot.
    pub fn ids(&self) -> Vec<i64> {
        self.table.lock().unwrap().keys().copied().collect()
    }

    /// Look up the age (seconds since the `msg_id`'s embedded timestamp) of
    /// every pending entry, for the watchdog.
    pub fn ages_secs(&self, now_unix: i64) -> Vec<(i64, i64)> {
        self.table
            .lock()
            .unwrap()
            .keys()
            .map(|&id| (id, now_unix - (id >> 32)))
            .collect()
    }
}

/// An item traveling through the external/internal send queues.
///
/// `Fresh` has not yet been assigned a `msg_id`/`seq_no` — the send task
/// assigns both from the encrypted session's counters as it drains the
/// queue, then inserts a [`PendingPacket`] if `response_sink.is_some()` or
/// `needs_ack`. `Resend` already has its ids fixed (pushed back by
/// [`PendingTable::push_all`] after a reconnect, or a container child
/// re-expanded with an id to ack) and must not be reassigned.
pub enum SendItem {
    Fresh { body: Vec<u8>, response_sink: Option<oneshot::Sender<Vec<u8>>>, needs_ack: bool },
    Resend { msg_id: i64, seq_no: i32, body: Vec<u8> },
}
