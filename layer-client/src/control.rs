//! Control-message handler — the reaction rules for every protocol-internal
//! message the server can send alongside (or instead of) an RPC response.
//!
//! A recursive dispatch over a decoded frame's body, driven by the leading
//! constructor id rather than a typed enum, since the handful of message
//! kinds handled here are fixed and the rest are passed through opaque to
//! the event sink.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::pending::{PendingTable, SendItem};
use crate::session::SessionInfo;
use crate::session_backend::SessionStore;

// MTProto envelope constructor IDs this handler reacts to.
const ID_RPC_RESULT: u32 = 0xf35c6d01;
const ID_RPC_ERROR: u32 = 0x2144ca19;
const ID_MSG_CONTAINER: u32 = 0x73f1f8dc;
const ID_GZIP_PACKED: u32 = 0x3072cfa1;
const ID_PONG: u32 = 0x347773c5;
const ID_MSGS_ACK: u32 = 0x62d6b459;
const ID_BAD_SERVER_SALT: u32 = 0xedab447b;
const ID_NEW_SESSION_CREATED: u32 = 0x9ec20908;
const ID_BAD_MSG_NOTIFICATION: u32 = 0xa7eff811;
const ID_MSGS_STATE_INFO: u32 = 0x04deb57d;
const ID_PING: u32 = 0x7abe77ec;

pub type EventSink = Arc<dyn Fn(u32, Vec<u8>) + Send + Sync>;

/// Shared state the control handler needs across every recursive call.
pub struct ControlHandler {
    pub pending: Arc<PendingTable>,
    pub session: Arc<tokio::sync::Mutex<SessionInfo>>,
    pub session_store: Arc<dyn SessionStore>,
    pub internal_tx: mpsc::UnboundedSender<SendItem>,
    pub event_sink: tokio::sync::RwLock<Option<EventSink>>,
}

impl ControlHandler {
    /// Process one decoded message. `msg_id`/`seq_no` belong to the
    /// envelope this `body` arrived in (a container child has its own, used
    /// recursively). `may_pass_to_handler` gates whether an unrecognized
    /// message is handed to the registered event sink — `false` is used for
    /// the inner object of an `rpc_result` and for direct-send/read
    /// exchanges during `initConnection`.
    pub async fn process(&self, msg_id: i64, seq_no: i32, body: Vec<u8>, may_pass_to_handler: bool) {
        if body.len() < 4 {
            log::warn!("control: message #{msg_id} body too short to carry a constructor id");
            return;
        }
        let cid = u32::from_le_bytes(body[..4].try_into().unwrap());

        match cid {
            ID_MSG_CONTAINER => self.handle_container(&body).await,

            ID_BAD_SERVER_SALT => self.handle_bad_server_salt(&body).await,

            ID_BAD_MSG_NOTIFICATION => {
                if let Some(bad_msg_id) = read_i64(&body, 4) {
                    self.pending.respond_and_clear(bad_msg_id, body);
                }
            }

            ID_MSGS_STATE_INFO => {
                if let Some(req_msg_id) = read_i64(&body, 4) {
                    self.pending.respond_and_clear(req_msg_id, body);
                }
            }

            ID_NEW_SESSION_CREATED => self.handle_new_session_created(&body).await,

            ID_PING => {
                if let Some(ping_id) = read_i64(&body, 4) {
                    let pong = build_pong(msg_id, ping_id);
                    let _ = self.internal_tx.send(SendItem::Fresh { body: pong, response_sink: None, needs_ack: false });
                }
            }

            ID_PONG => {
                // Nothing to do — keepalive round-trip acknowledged.
            }

            ID_MSGS_ACK => {
                if let Some(ids) = read_long_vector(&body, 4) {
                    self.pending.acknowledge(&ids);
                }
            }

            ID_RPC_RESULT => self.handle_rpc_result(msg_id, &body).await,

            ID_GZIP_PACKED => {
                if let Some(inflated) = inflate_gzip_packed(&body) {
                    Box::pin(self.process(msg_id, seq_no, inflated, may_pass_to_handler)).await;
                    return; // the inner call already ran the trailing-ack check
                }
            }

            _ => {
                if may_pass_to_handler {
                    if let Some(sink) = self.event_sink.read().await.clone() {
                        tokio::spawn(async move { sink(cid, body) });
                    }
                }
            }
        }

        if seq_no & 1 == 1 {
            let ack = build_msgs_ack(&[msg_id]);
            let _ = self.internal_tx.send(SendItem::Fresh { body: ack, response_sink: None, needs_ack: false });
        }
    }

    async fn handle_container(&self, body: &[u8]) {
        if body.len() < 8 {
            log::warn!("control: msg_container too short");
            return;
        }
        let count = u32::from_le_bytes(body[4..8].try_into().unwrap()) as usize;
        let mut pos = 8usize;
        for _ in 0..count {
            if pos + 16 > body.len() {
                log::warn!("control: msg_container truncated before item header");
                break;
            }
            let item_msg_id = i64::from_le_bytes(body[pos..pos + 8].try_into().unwrap());
            let item_seq_no = i32::from_le_bytes(body[pos + 8..pos + 12].try_into().unwrap());
            let item_len = u32::from_le_bytes(body[pos + 12..pos + 16].try_into().unwrap()) as usize;
            pos += 16;
            if pos + item_len > body.len() {
                log::warn!("control: msg_container item length overruns body");
                break;
            }
            let item_body = body[pos..pos + item_len].to_vec();
            pos += item_len;
            Box::pin(self.process(item_msg_id, item_seq_no, item_body, true)).await;
        }
    }

    async fn handle_bad_server_salt(&self, body: &[u8]) {
        // bad_server_salt#edab447b bad_msg_id:long bad_msg_seqno:int error_code:int new_server_salt:long
        if body.len() < 4 + 8 + 4 + 4 + 8 {
            log::warn!("control: bad_server_salt too short");
            return;
        }
        let new_salt = i64::from_le_bytes(body[20..28].try_into().unwrap());
        {
            let mut session = self.session.lock().await;
            session.server_salt = new_salt;
        }
        self.save_session_logged().await;
        self.resend_all_pending().await;
    }

    async fn handle_new_session_created(&self, body: &[u8]) {
        // new_session_created#9ec20908 first_msg_id:long unique_id:long server_salt:long
        if body.len() < 4 + 8 + 8 + 8 {
            log::warn!("control: new_session_created too short");
            return;
        }
        let new_salt = i64::from_le_bytes(body[20..28].try_into().unwrap());
        {
            let mut session = self.session.lock().await;
            session.server_salt = new_salt;
        }
        self.save_session_logged().await;
    }

    async fn handle_rpc_result(&self, _container_msg_id: i64, body: &[u8]) {
        // rpc_result#f35c6d01 req_msg_id:long result:Object
        if body.len() < 12 {
            log::warn!("control: rpc_result too short");
            return;
        }
        let req_msg_id = i64::from_le_bytes(body[4..12].try_into().unwrap());
        let inner = body[12..].to_vec();
        // Recurse into the wrapped object first (mayPassToHandler=false) —
        // it can itself be a bad_server_salt or similar that must be acted
        // on before the original request's sink is resolved.
        Box::pin(self.process(req_msg_id, 0, inner.clone(), false)).await;
        self.pending.respond_and_clear(req_msg_id, inner);
    }

    async fn resend_all_pending(&self) {
        let packets = self.pending.pop_all();
        self.pending.push_all(packets, &self.internal_tx);
    }

    async fn save_session_logged(&self) {
        let session = self.session.lock().await.clone();
        if let Err(e) = self.session_store.save(&session) {
            log::error!("failed to save session data: {e}");
        }
    }
}

fn read_i64(body: &[u8], at: usize) -> Option<i64> {
    body.get(at..at + 8).map(|s| i64::from_le_bytes(s.try_into().unwrap()))
}

/// Read a bare `Vector<long>` (no TL constructor id prefix, matching how
/// `msgs_ack`/`bad_msg_notification` embed the vector: count:u32 then
/// count × i64) starting at `at`.
fn read_long_vector(body: &[u8], at: usize) -> Option<Vec<i64>> {
    let count = u32::from_le_bytes(body.get(at..at + 4)?.try_into().ok()?) as usize;
    let mut out = Vec::with_capacity(count);
    let mut pos = at + 4;
    for _ in 0..count {
        out.push(i64::from_le_bytes(body.get(pos..pos + 8)?.try_into().ok()?));
        pos += 8;
    }
    Some(out)
}

fn inflate_gzip_packed(body: &[u8]) -> Option<Vec<u8>> {
    use std::io::Read;
    let packed = tl_read_bytes(&body[4..])?;
    let mut out = Vec::new();
    if flate2::read::GzDecoder::new(packed.as_slice()).read_to_end(&mut out).is_ok() && !out.is_empty() {
        return Some(out);
    }
    out.clear();
    flate2::read::ZlibDecoder::new(packed.as_slice()).read_to_end(&mut out).ok()?;
    Some(out)
}

fn tl_read_bytes(data: &[u8]) -> Option<Vec<u8>> {
    if data.is_empty() {
        return Some(vec![]);
    }
    let (len, start) = if data[0] < 254 {
        (data[0] as usize, 1)
    } else if data.len() >= 4 {
        (data[1] as usize | (data[2] as usize) << 8 | (data[3] as usize) << 16, 4)
    } else {
        return None;
    };
    if data.len() < start + len {
        return None;
    }
    Some(data[start..start + len].to_vec())
}

/// Build a bare `pong#347773c5 msg_id:long ping_id:long = Pong` body.
pub fn build_pong(msg_id: i64, ping_id: i64) -> Vec<u8> {
    let mut buf = Vec::with_capacity(20);
    buf.extend(ID_PONG.to_le_bytes());
    buf.extend(msg_id.to_le_bytes());
    buf.extend(ping_id.to_le_bytes());
    buf
}

/// Build a bare `ping#7abe77ec ping_id:long = Pong` body.
pub fn build_ping(ping_id: i64) -> Vec<u8> {
    let mut buf = Vec::with_capacity(12);
    buf.extend(ID_PING.to_le_bytes());
    buf.extend(ping_id.to_le_bytes());
    buf
}

/// Build a bare `msgs_ack#62d6b459 msg_ids:Vector<long> = MsgsAck` body.
pub fn build_msgs_ack(msg_ids: &[i64]) -> Vec<u8> {
    const VECTOR_CID: u32 = 0x1cb5c415;
    let mut buf = Vec::with_capacity(8 + 8 + msg_ids.len() * 8);
    buf.extend(ID_MSGS_ACK.to_le_bytes());
    buf.extend(VECTOR_CID.to_le_bytes());
    buf.extend((msg_ids.len() as u32).to_le_bytes());
    for id in msg_ids {
        buf.extend(id.to_le_bytes());
    }
    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ping_pong_round_trip_layout() {
        let pong = build_pong(111, 0xCADACADA_u32 as i64);
        assert_eq!(u32::from_le_bytes(pong[0..4].try_into().unwrap()), ID_PONG);
        assert_eq!(i64::from_le_bytes(pong[4..12].try_into().unwrap()), 111);
    }

    #[test]
    fn msgs_ack_layout_round_trips_through_reader() {
        let ack = build_msgs_ack(&[1, 2, 3]);
        let ids = read_long_vector(&ack, 8).unwrap();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn container_item_offsets_match_the_wire_layout() {
        // one item: msg_id=7, seq_no=1, body=[ID_PONG, 0,0,0,0,0,0,0,0, 0,0,0,0,0,0,0,0]
        let mut body = Vec::new();
        body.extend(ID_MSG_CONTAINER.to_le_bytes());
        body.extend(1u32.to_le_bytes());
        body.extend(7i64.to_le_bytes());
        body.extend(1i32.to_le_bytes());
        let inner = build_pong(1, 2);
        body.extend((inner.len() as u32).to_le_bytes());
        body.extend(&inner);

        let count = u32::from_le_bytes(body[4..8].try_into().unwrap());
        assert_eq!(count, 1);
        let item_msg_id = i64::from_le_bytes(body[8..16].try_into().unwrap());
        assert_eq!(item_msg_id, 7);
    }

    fn test_handler() -> (ControlHandler, mpsc::UnboundedReceiver<SendItem>) {
        let (internal_tx, internal_rx) = mpsc::unbounded_channel();
        let handler = ControlHandler {
            pending: Arc::new(PendingTable::new()),
            session: Arc::new(tokio::sync::Mutex::new(SessionInfo::bootstrap())),
            session_store: Arc::new(crate::session_backend::NoopSessionStore),
            internal_tx,
            event_sink: tokio::sync::RwLock::new(None),
        };
        (handler, internal_rx)
    }

    fn rpc_result_body(req_msg_id: i64, result: &[u8]) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend(ID_RPC_RESULT.to_le_bytes());
        body.extend(req_msg_id.to_le_bytes());
        body.extend(result);
        body
    }

    #[tokio::test]
    async fn rpc_result_resolves_the_matching_pending_sink() {
        let (handler, _internal_rx) = test_handler();
        let (tx, rx) = tokio::sync::oneshot::channel();
        handler.pending.insert(crate::pending::PendingPacket::new(42, 1, vec![9], Some(tx), true));

        let body = rpc_result_body(42, &[1, 2, 3, 4]);
        handler.process(100, 0, body, true).await;

        assert_eq!(rx.await.unwrap(), vec![1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn bad_server_salt_updates_session_and_resends_all_pending() {
        let (handler, mut internal_rx) = test_handler();
        let (tx, _rx) = tokio::sync::oneshot::channel();
        handler.pending.insert(crate::pending::PendingPacket::new(7, 1, vec![1, 2, 3], Some(tx), true));

        let mut body = Vec::new();
        body.extend(ID_BAD_SERVER_SALT.to_le_bytes());
        body.extend(7i64.to_le_bytes()); // bad_msg_id
        body.extend(1i32.to_le_bytes()); // bad_msg_seqno
        body.extend(48i32.to_le_bytes()); // error_code
        body.extend(999i64.to_le_bytes()); // new_server_salt

        handler.process(200, 0, body, true).await;

        assert_eq!(handler.session.lock().await.server_salt, 999);
        let resent = internal_rx.recv().await.expect("resent packet");
        match resent {
            SendItem::Resend { msg_id, seq_no, body } => {
                assert_eq!(msg_id, 7);
                assert_eq!(seq_no, 1);
                assert_eq!(body, vec![1, 2, 3]);
            }
            _ => panic!("expected a Resend item"),
        }
    }

    #[tokio::test]
    async fn odd_seq_no_synthesizes_a_trailing_ack() {
        let (handler, mut internal_rx) = test_handler();
        handler.process(55, 1, build_pong(55, 1), true).await;

        let ack = internal_rx.recv().await.expect("trailing ack");
        match ack {
            SendItem::Fresh { body, needs_ack, .. } => {
                assert!(!needs_ack);
                assert_eq!(u32::from_le_bytes(body[0..4].try_into().unwrap()), ID_MSGS_ACK);
            }
            _ => panic!("expected a Fresh ack item"),
        }
    }

    #[tokio::test]
    async fn even_seq_no_sends_no_trailing_ack() {
        let (handler, mut internal_rx) = test_handler();
        handler.process(56, 0, build_pong(56, 1), true).await;

        assert!(internal_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn container_recursion_dispatches_each_child() {
        let (handler, _internal_rx) = test_handler();
        let (tx, rx) = tokio::sync::oneshot::channel();
        handler.pending.insert(crate::pending::PendingPacket::new(7, 0, vec![9], Some(tx), true));

        let child = rpc_result_body(7, &[5, 6]);
        let mut body = Vec::new();
        body.extend(ID_MSG_CONTAINER.to_le_bytes());
        body.extend(1u32.to_le_bytes());
        body.extend(7i64.to_le_bytes());
        body.extend(0i32.to_le_bytes());
        body.extend((child.len() as u32).to_le_bytes());
        body.extend(&child);

        handler.process(8, 0, body, true).await;

        assert_eq!(rx.await.unwrap(), vec![5, 6]);
    }
}
