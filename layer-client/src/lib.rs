//! An MTProto client transport.
//!
//! Establishes an encrypted session with a Telegram data center, multiplexes
//! request/response RPCs over one persistent connection, reconnects
//! transparently after network failures with message replay, and migrates
//! between data centers on demand.
//!
//! Out of scope, by design: TL code generation (see `layer-tl-types`), the
//! Diffie-Hellman/SRP primitives (`layer-mtproto::authentication`), and any
//! higher-level surface (update routing, contacts, media) — build that on
//! top of [`Client::send`]/[`Client::send_sync`]/[`Client::set_events_handler`].

#![deny(unsafe_code)]

mod control;
mod dialer;
mod errors;
mod pending;
mod session;
pub mod session_backend;
pub mod socks5;
mod transport;

pub use control::EventSink;
pub use dialer::{AsyncReadWrite, Dialer};
pub use errors::{InvocationError, RpcError, TransportError};
pub use pending::{PendingPacket, PendingTable, SendItem};
pub use session::{AppConfig, BOOTSTRAP_ADDR, DcOption, SessionInfo, dc_addr};
pub use session_backend::{BinaryFileBackend, LoadError, NoSessionData, NoopSessionStore, SessionStore};
pub use socks5::Socks5Config;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use layer_mtproto::{EncryptedSession, Session as PlainSession, authentication as auth};
use layer_tl_types as tl;
use layer_tl_types::{Cursor, Deserializable, RemoteCall, Serializable};
use tokio::io::{AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::{Mutex as AsyncMutex, RwLock, Semaphore, mpsc, oneshot};
use tokio::time::sleep;

use crate::control::ControlHandler;
use crate::transport::AsyncAbridged;

/// Number of long-lived pipeline tasks spawned per connection (send,
/// receive, transfer, ping) — the size of the stop-signal fan-out.
const ROUTINES_COUNT: usize = 4;
const CONNECT_ATTEMPTS: u32 = 5;
const CONNECT_BACKOFF_BASE: Duration = Duration::from_millis(250);
const CONNECT_BACKOFF_MAX: Duration = Duration::from_secs(10);
const EXTERNAL_QUEUE_CAPACITY: usize = 64;
const TRANSFER_POLL_INTERVAL: Duration = Duration::from_millis(10);
const PING_INTERVAL: Duration = Duration::from_secs(60);
const PING_ID_MARKER: i64 = 0xCADACADA_u32 as i64;
const WATCHDOG_INTERVAL: Duration = Duration::from_secs(5);
const WATCHDOG_STALE_SECS: i64 = 5;
const RECONNECT_FAILURE_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Callback invoked after a reconnection completes, with the (possibly
/// unchanged) DC id the client is now connected to.
pub type ReconnectHandler = Arc<dyn Fn(i32) + Send + Sync>;

/// Everything needed to construct a [`Client`].
pub struct Config {
    pub app: AppConfig,
    pub dialer: Dialer,
    pub session_store: Arc<dyn SessionStore>,
    /// A session to start from instead of loading/bootstrapping. Used by
    /// [`Client::new_connection`] to seed a sibling instance.
    pub seed_session: Option<SessionInfo>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            app: AppConfig::default(),
            dialer: Dialer::Tcp,
            session_store: Arc::new(NoopSessionStore),
            seed_session: None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ConnectState {
    Idle,
    Dialing,
    Handshaking,
    Configuring,
    Running,
    Reconnecting,
}

struct PipelineHandles {
    send: tokio::task::JoinHandle<()>,
    receive: tokio::task::JoinHandle<()>,
    transfer: tokio::task::JoinHandle<()>,
    ping: tokio::task::JoinHandle<()>,
}

type BoxedHalf = Box<dyn AsyncReadWrite>;

struct Inner {
    app: AppConfig,
    dialer: Dialer,
    session_store: Arc<dyn SessionStore>,

    session: Arc<AsyncMutex<SessionInfo>>,
    encryption_ready: AtomicBool,
    enc: AsyncMutex<Option<EncryptedSession>>,
    dc_options: AsyncMutex<Vec<DcOption>>,

    pending: Arc<PendingTable>,
    control: ControlHandler,

    external_tx: mpsc::Sender<SendItem>,
    external_rx: AsyncMutex<Option<mpsc::Receiver<SendItem>>>,
    internal_tx: mpsc::UnboundedSender<SendItem>,
    internal_rx: AsyncMutex<Option<mpsc::UnboundedReceiver<SendItem>>>,
    /// Items moved from the external queue and not yet drained by a consumer.
    /// Unbounded channels expose no `len()`; this tracks only the transfer
    /// task's own pushes, decremented on every pop regardless of source.
    internal_backlog: AtomicUsize,

    write_half: AsyncMutex<Option<WriteHalf<BoxedHalf>>>,

    state: AsyncMutex<ConnectState>,
    connect_guard: Semaphore,
    reconnect_guard: Semaphore,
    pipelines: AsyncMutex<Option<PipelineHandles>>,
    stop_tx: AsyncMutex<Option<mpsc::Sender<()>>>,
    stop_rx: AsyncMutex<Option<Arc<AsyncMutex<mpsc::Receiver<()>>>>>,

    reconnect_handler: RwLock<Option<ReconnectHandler>>,
}

/// An MTProto client transport connected to one data center.
#[derive(Clone)]
pub struct Client {
    inner: Arc<Inner>,
}

impl Client {
    /// Load (or bootstrap) the session, but do not connect yet.
    pub async fn new(config: Config) -> Result<Self, TransportError> {
        let session = match config.seed_session {
            Some(s) => s,
            None => match config.session_store.load() {
                Ok(s) => s,
                Err(LoadError::NoSessionData) => SessionInfo::bootstrap(),
                Err(LoadError::Io(e)) => return Err(TransportError::Io(e)),
            },
        };
        let encryption_ready = session.has_auth_key();

        let (external_tx, external_rx) = mpsc::channel(EXTERNAL_QUEUE_CAPACITY);
        let (internal_tx, internal_rx) = mpsc::unbounded_channel();
        let pending = Arc::new(PendingTable::new());

        let session = Arc::new(AsyncMutex::new(session));

        let control = ControlHandler {
            pending: pending.clone(),
            session: session.clone(),
            session_store: config.session_store.clone(),
            internal_tx: internal_tx.clone(),
            event_sink: tokio::sync::RwLock::new(None),
        };

        let inner = Arc::new(Inner {
            app: config.app,
            dialer: config.dialer,
            session_store: config.session_store,
            session,
            encryption_ready: AtomicBool::new(encryption_ready),
            enc: AsyncMutex::new(None),
            dc_options: AsyncMutex::new(Vec::new()),
            pending,
            control,
            external_tx,
            external_rx: AsyncMutex::new(Some(external_rx)),
            internal_tx,
            internal_rx: AsyncMutex::new(Some(internal_rx)),
            internal_backlog: AtomicUsize::new(0),
            write_half: AsyncMutex::new(None),
            state: AsyncMutex::new(ConnectState::Idle),
            connect_guard: Semaphore::new(1),
            reconnect_guard: Semaphore::new(1),
            pipelines: AsyncMutex::new(None),
            stop_tx: AsyncMutex::new(None),
            stop_rx: AsyncMutex::new(None),
            reconnect_handler: RwLock::new(None),
        });

        Ok(Self { inner })
    }

    /// Load the session and connect in one step.
    pub async fn init_sess_and_connect(config: Config) -> Result<Self, TransportError> {
        let client = Self::new(config).await?;
        client.connect().await?;
        Ok(client)
    }

    // ── Connect / reconnect ────────────────────────────────────────────────

    /// Acquire the connect guard, bring up a connection, and start the four
    /// pipeline tasks. A concurrent `connect` in progress makes this a no-op
    /// that returns immediately without error.
    pub async fn connect(&self) -> Result<(), TransportError> {
        let Ok(_permit) = self.inner.connect_guard.try_acquire() else {
            log::debug!("connect: already in progress, skipping");
            return Ok(());
        };
        self.do_connect().await
    }

    async fn do_connect(&self) -> Result<(), TransportError> {
        *self.inner.state.lock().await = ConnectState::Dialing;

        let mut attempt = 0u32;
        let mut backoff = CONNECT_BACKOFF_BASE;
        let abridged = loop {
            match self.init_connection().await {
                Ok(stream) => break stream,
                Err(e) => {
                    attempt += 1;
                    if attempt >= CONNECT_ATTEMPTS {
                        return Err(e);
                    }
                    log::warn!("connect: attempt {attempt}/{CONNECT_ATTEMPTS} failed: {e}, retrying in {backoff:?}");
                    sleep(backoff).await;
                    backoff = (backoff * 2).min(CONNECT_BACKOFF_MAX);
                }
            }
        };

        *self.inner.state.lock().await = ConnectState::Running;
        self.spawn_pipelines(abridged).await;
        Ok(())
    }

    /// `Reconnect()` as a public, single-attempt operation: surfaces its
    /// error rather than retrying forever (that retry-forever behavior is
    /// reserved for the pipelines' internal failure path, see
    /// [`Self::spawn_reconnect_forever`]).
    pub async fn reconnect(&self) -> Result<(), TransportError> {
        self.reconnect_to(0, true).await
    }

    async fn reconnect_to(&self, new_dc_id: i32, may_pass_to_handler: bool) -> Result<(), TransportError> {
        let Ok(_permit) = self.inner.reconnect_guard.try_acquire() else {
            log::debug!("reconnect: already in progress, skipping");
            return Ok(());
        };

        *self.inner.state.lock().await = ConnectState::Reconnecting;
        self.teardown_pipelines().await;

        let snapshot = self.inner.pending.ids();

        if new_dc_id != 0 {
            let current_dc = self.inner.session.lock().await.dc_id;
            if new_dc_id != current_dc {
                self.inner.encryption_ready.store(false, Ordering::SeqCst);
                let addr = {
                    let opts = self.inner.dc_options.lock().await;
                    dc_addr(&opts, new_dc_id, false)
                };
                let mut session = self.inner.session.lock().await;
                session.dc_id = new_dc_id;
                if let Some(addr) = addr {
                    session.address = addr;
                }
            }
        }

        let connect_result = {
            self.do_connect().await
        };
        connect_result?;

        let popped = self.inner.pending.pop_all();
        let still_pending: Vec<_> = popped.into_iter().filter(|p| snapshot.contains(&p.msg_id)).collect();
        self.inner.pending.push_all(still_pending, &self.inner.internal_tx);

        if may_pass_to_handler {
            if let Some(handler) = self.inner.reconnect_handler.read().await.clone() {
                let dc_id = self.inner.session.lock().await.dc_id;
                tokio::spawn(async move { handler(dc_id) });
            }
        }

        Ok(())
    }

    /// The retry-forever wrapper the send/receive pipelines fall back to on
    /// I/O failure: log and retry with a fixed delay until it succeeds.
    async fn spawn_reconnect_forever(&self) {
        let client = self.clone();
        tokio::spawn(async move {
            loop {
                match client.reconnect_to(0, true).await {
                    Ok(()) => return,
                    Err(e) => {
                        log::warn!("reconnect: failed ({e}), retrying in {RECONNECT_FAILURE_RETRY_DELAY:?}");
                        sleep(RECONNECT_FAILURE_RETRY_DELAY).await;
                    }
                }
            }
        });
    }

    /// Open a sibling connection to another DC, sharing only [`AppConfig`]
    /// and the dialer. Uses a no-op session store and copies the current
    /// session as a seed; if the target DC differs, transfers authorization
    /// via `auth.exportAuthorization`/`auth.importAuthorization`.
    pub async fn new_connection(&self, dc_id: i32) -> Result<Client, TransportError> {
        let current = self.copy_session().await;
        let same_dc = current.dc_id == dc_id;

        let seed = if same_dc {
            current
        } else {
            // A different DC means a different auth key: point the seed at
            // the target address and force `init_connection` through its own
            // DH handshake instead of reusing the home DC's key.
            let addr = {
                let opts = self.inner.dc_options.lock().await;
                dc_addr(&opts, dc_id, false)
            }
            .ok_or(TransportError::UnknownDc(dc_id))?;
            SessionInfo { dc_id, address: addr, ..SessionInfo::bootstrap() }
        };

        let sibling_config = Config {
            app: self.inner.app.clone(),
            dialer: self.inner.dialer.clone(),
            session_store: Arc::new(NoopSessionStore),
            seed_session: Some(seed),
        };
        let sibling = Client::new(sibling_config).await?;
        sibling.connect().await?;

        if !same_dc {
            let export: tl::enums::auth::ExportedAuthorization = self
                .invoke(&tl::functions::auth::ExportAuthorization { dc_id })
                .await
                .map_err(|e| TransportError::UnexpectedResponse(e.to_string()))?;
            let exported = match export {
                tl::enums::auth::ExportedAuthorization::ExportedAuthorization(x) => x,
            };
            let _imported: tl::enums::auth::Authorization = sibling
                .invoke(&tl::functions::auth::ImportAuthorization {
                    id: exported.id,
                    bytes: exported.bytes,
                })
                .await
                .map_err(|e| TransportError::UnexpectedResponse(e.to_string()))?;
        }

        Ok(sibling)
    }

    // ── initConnection ──────────────────────────────────────────────────────

    /// Dial, run key agreement if needed, and fetch `help.getConfig` via a
    /// direct (pre-pipeline) exchange. Returns the still-unsplit stream,
    /// ready for [`Self::spawn_pipelines`].
    async fn init_connection(&self) -> Result<AsyncAbridged<BoxedHalf>, TransportError> {
        let addr = self.inner.session.lock().await.address.clone();
        log::info!("init_connection: dialing {addr}");
        let raw = self.inner.dialer.connect(&addr).await?;
        let mut abridged = AsyncAbridged::from_stream(raw);

        *self.inner.state.lock().await = ConnectState::Handshaking;

        if !self.inner.encryption_ready.load(Ordering::SeqCst) {
            let finished = Self::make_auth_key(&mut abridged).await?;
            {
                let mut session = self.inner.session.lock().await;
                session.auth_key = finished.auth_key;
                session.auth_key_hash = auth_key_hash(&finished.auth_key);
            }
            *self.inner.enc.lock().await =
                Some(EncryptedSession::new(finished.auth_key, finished.first_salt, finished.time_offset));
            self.save_session_logged().await;
            self.inner.encryption_ready.store(true, Ordering::SeqCst);
        } else {
            let session = self.inner.session.lock().await;
            *self.inner.enc.lock().await = Some(EncryptedSession::new(
                session.auth_key,
                session.server_salt,
                0,
            ));
        }

        *self.inner.state.lock().await = ConnectState::Configuring;

        let req = tl::functions::InvokeWithLayer {
            layer: tl::LAYER,
            query: tl::functions::InitConnection {
                api_id: self.inner.app.api_id,
                device_model: self.inner.app.device_model.clone(),
                system_version: self.inner.app.system_version.clone(),
                app_version: self.inner.app.app_version.clone(),
                system_lang_code: self.inner.app.system_lang_code.clone(),
                lang_pack: self.inner.app.lang_pack.clone(),
                lang_code: self.inner.app.lang_code.clone(),
                proxy: None,
                params: None,
                query: tl::functions::help::GetConfig {},
            },
        };

        let body = self.direct_send_read(&mut abridged, &req).await?;
        let mut cur = Cursor::from_slice(&body);
        if let Ok(tl::enums::Config::Config(cfg)) = tl::enums::Config::deserialize(&mut cur) {
            let mut opts = self.inner.dc_options.lock().await;
            opts.clear();
            for entry in &cfg.dc_options {
                let o = match entry {
                    tl::enums::DcOption::DcOption(o) => o,
                };
                if o.media_only || o.tcpo_only {
                    continue;
                }
                opts.push(DcOption {
                    id: o.id,
                    ipv6: o.ipv6,
                    cdn: o.cdn,
                    ip_address: o.ip_address.clone(),
                    port: o.port,
                });
            }
            let mut session = self.inner.session.lock().await;
            session.dc_id = cfg.this_dc;
            log::info!("init_connection: configured, dc_id={} ({} dc_options)", cfg.this_dc, opts.len());
        }
        self.save_session_logged().await;

        Ok(abridged)
    }

    async fn make_auth_key(abridged: &mut AsyncAbridged<BoxedHalf>) -> Result<auth::Finished, TransportError> {
        let mut plain = PlainSession::new();

        let (req1, s1) = auth::step1().map_err(|e| TransportError::UnexpectedResponse(e.to_string()))?;
        abridged.send(&plain.pack(&req1).to_plaintext_bytes()).await?;
        let res_pq: tl::enums::ResPq = Self::recv_plain(abridged).await?;

        let (req2, s2) = auth::step2(s1, res_pq).map_err(|e| TransportError::UnexpectedResponse(e.to_string()))?;
        abridged.send(&plain.pack(&req2).to_plaintext_bytes()).await?;
        let dh: tl::enums::ServerDhParams = Self::recv_plain(abridged).await?;

        let (req3, s3) = auth::step3(s2, dh).map_err(|e| TransportError::UnexpectedResponse(e.to_string()))?;
        abridged.send(&plain.pack(&req3).to_plaintext_bytes()).await?;
        let ans: tl::enums::SetClientDhParamsAnswer = Self::recv_plain(abridged).await?;

        auth::finish(s3, ans).map_err(|e| TransportError::UnexpectedResponse(e.to_string()))
    }

    async fn recv_plain<T: Deserializable>(abridged: &mut AsyncAbridged<BoxedHalf>) -> Result<T, TransportError> {
        let raw = abridged.recv().await?;
        if raw.len() < 20 {
            return Err(TransportError::UnexpectedResponse("plaintext frame too short".into()));
        }
        if u64::from_le_bytes(raw[..8].try_into().unwrap()) != 0 {
            return Err(TransportError::UnexpectedResponse("expected auth_key_id=0 in plaintext frame".into()));
        }
        let body_len = u32::from_le_bytes(raw[16..20].try_into().unwrap()) as usize;
        let mut cur = Cursor::from_slice(&raw[20..20 + body_len]);
        T::deserialize(&mut cur).map_err(|e| TransportError::UnexpectedResponse(e.to_string()))
    }

    /// The constrained send/read exchange used only during `initConnection`,
    /// before the pipelines exist: write one packet, then loop reading
    /// frames — each routed through the control handler with
    /// `may_pass_to_handler = false` — until the response sink resolves. A
    /// single `select!` also drains the internal queue so synthesized acks
    /// (e.g. for an odd-seq_no `config` response) still flow out.
    ///
    /// Takes a `Serializable` rather than a `RemoteCall`: `InvokeWithLayer`
    /// wraps an inner query whose return type, not the wrapper's, determines
    /// what comes back, so the response is decoded by the caller instead.
    async fn direct_send_read<S: layer_tl_types::Serializable>(
        &self,
        abridged: &mut AsyncAbridged<BoxedHalf>,
        req: &S,
    ) -> Result<Vec<u8>, TransportError> {
        let (tx, mut rx) = oneshot::channel();
        let body = req.to_bytes();
        let (wire, msg_id, seq_no) = {
            let mut enc_guard = self.inner.enc.lock().await;
            let enc = enc_guard.as_mut().expect("encrypted session missing during direct exchange");
            enc.pack_body(&body, true)
        };
        abridged.send(&wire).await?;
        self.inner.pending.insert(PendingPacket::new(msg_id, seq_no, body, Some(tx), true));

        let mut internal_rx_guard = self.inner.internal_rx.lock().await;
        let internal_rx = internal_rx_guard
            .as_mut()
            .expect("internal queue taken out from under a direct exchange");

        loop {
            tokio::select! {
                biased;
                result = &mut rx => {
                    return result.map_err(|_| TransportError::ClosedConnection);
                }
                item = internal_rx.recv() => {
                    if let Some(item) = item {
                        let _ = self.inner.internal_backlog.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |v| {
                            Some(v.saturating_sub(1))
                        });
                        let wire = self.encode_send_item(item).await;
                        abridged.send(&wire).await?;
                    }
                }
                frame = abridged.recv() => {
                    let mut raw = frame?;
                    let decrypted = {
                        let mut enc_guard = self.inner.enc.lock().await;
                        let enc = enc_guard.as_mut().unwrap();
                        enc.unpack(&mut raw)?
                    };
                    if decrypted.salt != 0 {
                        let mut enc_guard = self.inner.enc.lock().await;
                        enc_guard.as_mut().unwrap().salt = decrypted.salt;
                    }
                    self.inner.control
                        .process(decrypted.msg_id, decrypted.seq_no, decrypted.body, false)
                        .await;
                }
            }
        }
    }

    async fn encode_send_item(&self, item: SendItem) -> Vec<u8> {
        let mut enc_guard = self.inner.enc.lock().await;
        let enc = enc_guard.as_mut().expect("encrypted session required to encode outbound messages");
        match item {
            SendItem::Fresh { body, response_sink, needs_ack } => {
                let (wire, msg_id, seq_no) = enc.pack_body(&body, needs_ack);
                if response_sink.is_some() || needs_ack {
                    self.inner.pending.insert(PendingPacket::new(msg_id, seq_no, body, response_sink, needs_ack));
                }
                wire
            }
            SendItem::Resend { msg_id, seq_no, body } => enc.pack_body_with_ids(&body, msg_id, seq_no),
        }
    }

    // ── Pipelines ────────────────────────────────────────────────────────────

    async fn spawn_pipelines(&self, abridged: AsyncAbridged<BoxedHalf>) {
        let (read_half, write_half) = abridged.into_split();
        *self.inner.write_half.lock().await = Some(write_half);

        let (stop_tx, stop_rx) = mpsc::channel(ROUTINES_COUNT);
        let stop_rx = Arc::new(AsyncMutex::new(stop_rx));
        *self.inner.stop_tx.lock().await = Some(stop_tx);
        *self.inner.stop_rx.lock().await = Some(stop_rx.clone());

        let external_rx = self.inner.external_rx.lock().await.take()
            .expect("external queue taken by a still-running transfer task");

        let send = tokio::spawn(self.clone().send_task(stop_rx.clone()));
        let receive = tokio::spawn(self.clone().receive_task(read_half, stop_rx.clone()));
        let transfer = tokio::spawn(self.clone().transfer_task(external_rx, stop_rx.clone()));
        let ping = tokio::spawn(self.clone().ping_task(stop_rx));

        *self.inner.pipelines.lock().await = Some(PipelineHandles { send, receive, transfer, ping });

        self.spawn_watchdog_once();
    }

    async fn teardown_pipelines(&self) {
        if let Some(stop_tx) = self.inner.stop_tx.lock().await.as_ref() {
            for _ in 0..ROUTINES_COUNT {
                let _ = stop_tx.send(()).await;
            }
        }
        if let Some(write_half) = self.inner.write_half.lock().await.as_mut() {
            let _ = write_half.shutdown().await;
        }

        if let Some(handles) = self.inner.pipelines.lock().await.take() {
            let _ = handles.send.await;
            let _ = handles.receive.await;
            let _ = handles.transfer.await;
            let _ = handles.ping.await;
        }

        // Drain any stop signal a task exited without consuming (it unblocked
        // via socket closure instead).
        if let Some(stop_rx) = self.inner.stop_rx.lock().await.as_ref() {
            let mut rx = stop_rx.lock().await;
            while rx.try_recv().is_ok() {}
        }

        self.inner.write_half.lock().await.take();
        // Hand the external queue back to the next connect's transfer task.
        // (internal queue is left as-is — resends/acks enqueued during
        // teardown are replayed once pipelines restart.)
    }

    async fn send_task(self, stop_rx: Arc<AsyncMutex<mpsc::Receiver<()>>>) {
        log::debug!("send: started");
        loop {
            let item = {
                let mut rx = stop_rx.lock().await;
                let mut internal_rx_guard = self.inner.internal_rx.lock().await;
                let internal_rx = match internal_rx_guard.as_mut() {
                    Some(rx) => rx,
                    None => return,
                };
                tokio::select! {
                    biased;
                    _ = rx.recv() => { log::debug!("send: stop signal received"); return; }
                    item = internal_rx.recv() => item,
                }
            };
            let Some(item) = item else { return };
            let _ = self.inner.internal_backlog.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |v| {
                Some(v.saturating_sub(1))
            });
            let wire = self.encode_send_item(item).await;
            let write_result = {
                let mut guard = self.inner.write_half.lock().await;
                match guard.as_mut() {
                    Some(w) => crate::transport::write_frame(w, &wire).await,
                    None => return,
                }
            };
            if let Err(e) = write_result {
                if errors::is_closed_connection(&e) {
                    log::debug!("send: connection closed, stopping");
                } else {
                    log::error!("send: write failed: {e}");
                    self.spawn_reconnect_forever().await;
                }
                return;
            }
        }
    }

    async fn receive_task(self, mut read_half: ReadHalf<BoxedHalf>, stop_rx: Arc<AsyncMutex<mpsc::Receiver<()>>>) {
        log::debug!("receive: started");
        loop {
            let frame = {
                let mut rx = stop_rx.lock().await;
                tokio::select! {
                    biased;
                    _ = rx.recv() => { log::debug!("receive: stop signal received"); return; }
                    frame = crate::transport::read_frame(&mut read_half) => frame,
                }
            };
            let mut raw = match frame {
                Ok(raw) => raw,
                Err(e) => {
                    if errors::is_closed_connection(&e) {
                        log::debug!("receive: connection closed, stopping");
                    } else {
                        log::error!("receive: read failed: {e}");
                        self.spawn_reconnect_forever().await;
                    }
                    return;
                }
            };
            let decrypted = {
                let mut enc_guard = self.inner.enc.lock().await;
                let enc = match enc_guard.as_mut() {
                    Some(enc) => enc,
                    None => return,
                };
                match enc.unpack(&mut raw) {
                    Ok(d) => d,
                    Err(e) => {
                        log::error!("receive: decrypt failed: {e}");
                        self.spawn_reconnect_forever().await;
                        return;
                    }
                }
            };
            if decrypted.salt != 0 {
                let mut enc_guard = self.inner.enc.lock().await;
                if let Some(enc) = enc_guard.as_mut() {
                    enc.salt = decrypted.salt;
                }
            }
            self.inner.control.process(decrypted.msg_id, decrypted.seq_no, decrypted.body, true).await;
        }
    }

    async fn transfer_task(self, mut external_rx: mpsc::Receiver<SendItem>, stop_rx: Arc<AsyncMutex<mpsc::Receiver<()>>>) {
        log::debug!("transfer: started");
        loop {
            let backlog = self.inner.internal_backlog.load(Ordering::SeqCst);
            if backlog < EXTERNAL_QUEUE_CAPACITY {
                let mut rx = stop_rx.lock().await;
                tokio::select! {
                    biased;
                    _ = rx.recv() => { log::debug!("transfer: stop signal received"); break; }
                    item = external_rx.recv() => {
                        match item {
                            Some(item) => {
                                if self.inner.internal_tx.send(item).is_ok() {
                                    self.inner.internal_backlog.fetch_add(1, Ordering::SeqCst);
                                }
                            }
                            None => break,
                        }
                    }
                }
            } else {
                let mut rx = stop_rx.lock().await;
                tokio::select! {
                    biased;
                    _ = rx.recv() => { log::debug!("transfer: stop signal received"); break; }
                    _ = sleep(TRANSFER_POLL_INTERVAL) => {}
                }
            }
        }
        *self.inner.external_rx.lock().await = Some(external_rx);
    }

    async fn ping_task(self, stop_rx: Arc<AsyncMutex<mpsc::Receiver<()>>>) {
        log::debug!("ping: started");
        loop {
            let mut rx = stop_rx.lock().await;
            tokio::select! {
                biased;
                _ = rx.recv() => { log::debug!("ping: stop signal received"); return; }
                _ = sleep(PING_INTERVAL) => {}
            }
            drop(rx);
            let ping = control::build_ping(PING_ID_MARKER);
            let _ = self.inner.external_tx.send(SendItem::Fresh { body: ping, response_sink: None, needs_ack: false }).await;
        }
    }

    fn spawn_watchdog_once(&self) {
        // Spawned once per instance (not per connect) — guarded by the
        // single `Client` being constructed exactly once per process.
        let client = self.clone();
        tokio::spawn(async move {
            loop {
                sleep(WATCHDOG_INTERVAL).await;
                let now = now_unix();
                for (msg_id, age) in client.inner.pending.ages_secs(now) {
                    if age > WATCHDOG_STALE_SECS {
                        log::warn!("watchdog: message #{msg_id} has been pending for {age}s");
                    }
                }
            }
        });
    }

    // ── Public send API ─────────────────────────────────────────────────────

    /// Enqueue `body` (already TL-serialized) and return a sink that
    /// resolves with the raw response body.
    pub async fn send(&self, body: Vec<u8>) -> Result<oneshot::Receiver<Vec<u8>>, TransportError> {
        let (tx, rx) = oneshot::channel();
        self.inner
            .external_tx
            .send(SendItem::Fresh { body, response_sink: Some(tx), needs_ack: true })
            .await
            .map_err(|_| TransportError::ClosedConnection)?;
        Ok(rx)
    }

    /// Like [`Self::send`] but blocks until the response arrives.
    pub async fn send_sync(&self, body: Vec<u8>) -> Result<Vec<u8>, TransportError> {
        let rx = self.send(body).await?;
        rx.await.map_err(|_| TransportError::ClosedConnection)
    }

    /// [`Self::send_sync`] with flood-wait and `RPC_CALL_FAIL` retry
    /// semantics: retries after `fail_retry_interval` on `RPC_CALL_FAIL`,
    /// and on `FLOOD_WAIT_n` sleeps `n` seconds (shortened to 1s for the
    /// first `flood_short_retries` attempts), giving up once the required
    /// wait exceeds `flood_max_wait`.
    pub async fn send_sync_retry(
        &self,
        body: Vec<u8>,
        fail_retry_interval: Duration,
        flood_short_retries: u32,
        flood_max_wait: Duration,
    ) -> Result<Vec<u8>, RpcError> {
        let mut attempt = 0u32;
        loop {
            let response = self.send_sync(body.clone()).await;
            match response {
                Ok(body) => return Ok(body),
                Err(TransportError::Protocol(e)) if e.is("RPC_CALL_FAIL") => {
                    sleep(fail_retry_interval).await;
                }
                Err(TransportError::Protocol(e)) => {
                    if let Some(wait_secs) = e.flood_wait_seconds() {
                        let wait = Duration::from_secs(wait_secs);
                        if wait > flood_max_wait {
                            return Err(e);
                        }
                        let actual = if attempt < flood_short_retries { Duration::from_secs(1) } else { wait };
                        sleep(actual).await;
                        attempt += 1;
                    } else {
                        return Err(e);
                    }
                }
                Err(_) => return Err(RpcError { code: 0, name: "TRANSPORT_ERROR".into(), value: None }),
            }
        }
    }

    /// Invoke a typed RPC and decode its typed return value.
    pub async fn invoke<R: RemoteCall>(&self, req: &R) -> Result<R::Return, TransportError> {
        let body = self.send_sync(req.to_bytes()).await?;
        let mut cur = Cursor::from_slice(&body);
        R::Return::deserialize(&mut cur).map_err(|e| TransportError::UnexpectedResponse(e.to_string()))
    }

    // ── Handlers ─────────────────────────────────────────────────────────────

    pub async fn set_events_handler(&self, handler: EventSink) {
        *self.inner.control.event_sink.write().await = Some(handler);
    }

    pub async fn set_reconnection_handler(&self, handler: ReconnectHandler) {
        *self.inner.reconnect_handler.write().await = Some(handler);
    }

    // ── Misc public operations ──────────────────────────────────────────────

    /// Resolve an address for `dc_id`, honoring `ipv6`; `None` if not found
    /// (CDN-only options are never returned).
    pub async fn dc_addr(&self, dc_id: i32, ipv6: bool) -> Option<String> {
        let opts = self.inner.dc_options.lock().await;
        dc_addr(&opts, dc_id, ipv6)
    }

    pub async fn copy_session(&self) -> SessionInfo {
        self.inner.session.lock().await.clone()
    }

    pub async fn save_session_logged(&self) {
        let session = self.inner.session.lock().await.clone();
        if let Err(e) = self.inner.session_store.save(&session) {
            log::error!("save_session: failed: {e}");
        }
    }
}

fn auth_key_hash(auth_key: &[u8; 256]) -> [u8; 8] {
    use sha1::{Digest, Sha1};
    let digest = Sha1::digest(auth_key);
    let mut hash = [0u8; 8];
    hash.copy_from_slice(&digest[12..20]);
    hash
}

fn now_unix() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_client() -> Client {
        Client::new(Config::default()).await.unwrap()
    }

    #[test]
    fn auth_key_hash_is_eight_bytes() {
        let key = [3u8; 256];
        assert_eq!(auth_key_hash(&key).len(), 8);
    }

    #[test]
    fn default_config_dials_plain_tcp_with_no_persisted_session() {
        let config = Config::default();
        assert!(matches!(config.dialer, Dialer::Tcp));
        assert!(config.seed_session.is_none());
    }

    #[tokio::test]
    async fn new_with_no_store_bootstraps_a_fresh_session() {
        let client = test_client().await;
        let session = client.copy_session().await;
        assert_eq!(session.address, BOOTSTRAP_ADDR);
        assert!(!session.has_auth_key());
        assert!(!client.inner.encryption_ready.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn encode_fresh_item_registers_pending_when_needs_ack() {
        let client = test_client().await;
        *client.inner.enc.lock().await = Some(EncryptedSession::new([7u8; 256], 42, 0));

        let item = SendItem::Fresh { body: vec![1, 2, 3, 4], response_sink: None, needs_ack: true };
        let wire = client.encode_send_item(item).await;

        assert!(!wire.is_empty());
        assert_eq!(client.inner.pending.ids().len(), 1);
    }

    #[tokio::test]
    async fn encode_fresh_item_skips_pending_when_no_ack_and_no_sink() {
        let client = test_client().await;
        *client.inner.enc.lock().await = Some(EncryptedSession::new([7u8; 256], 42, 0));

        let item = SendItem::Fresh { body: vec![1, 2, 3, 4], response_sink: None, needs_ack: false };
        client.encode_send_item(item).await;

        assert!(client.inner.pending.ids().is_empty());
    }

    #[tokio::test]
    async fn encode_resend_item_does_not_touch_pending_table() {
        let client = test_client().await;
        *client.inner.enc.lock().await = Some(EncryptedSession::new([9u8; 256], 7, 0));

        let item = SendItem::Resend { msg_id: 123_456_789, seq_no: 3, body: vec![5, 6, 7, 8] };
        let wire = client.encode_send_item(item).await;

        assert!(!wire.is_empty());
        assert!(client.inner.pending.ids().is_empty());
    }

    #[tokio::test]
    async fn dc_addr_skips_cdn_only_options() {
        let client = test_client().await;
        {
            let mut opts = client.inner.dc_options.lock().await;
            opts.push(DcOption { id: 2, ipv6: false, cdn: true, ip_address: "1.2.3.4".into(), port: 443 });
            opts.push(DcOption { id: 2, ipv6: false, cdn: false, ip_address: "5.6.7.8".into(), port: 443 });
        }
        assert_eq!(client.dc_addr(2, false).await, Some("5.6.7.8:443".into()));
    }
}
