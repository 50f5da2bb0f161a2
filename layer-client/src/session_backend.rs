//! Pluggable session storage.
//!
//! [`SessionStore::load`] distinguishes "no session on disk yet" from an
//! actual I/O failure: the former bootstraps a fresh [`SessionInfo`] against
//! [`crate::session::BOOTSTRAP_ADDR`], the latter propagates.
//!
//! Two implementations are provided:
//! * [`BinaryFileBackend`] — durable, atomic-rename file storage (default).
//! * [`NoopSessionStore`] — discards everything; used for the sibling
//!   connection a [`crate::Client::new_connection`] opens to a second DC,
//!   which must never clobber the primary session file.

use std::io;
use std::path::PathBuf;

use crate::session::SessionInfo;

/// Returned by [`SessionStore::load`] when no session data exists yet.
/// Distinct from an I/O error: callers bootstrap instead of failing.
#[derive(Debug)]
pub struct NoSessionData;

impl std::fmt::Display for NoSessionData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "no session data")
    }
}
impl std::error::Error for NoSessionData {}

/// Error returned by [`SessionStore::load`].
#[derive(Debug)]
pub enum LoadError {
    /// Nothing has been persisted yet — caller should bootstrap.
    NoSessionData,
    /// The store exists but could not be read.
    Io(io::Error),
}

impl From<io::Error> for LoadError {
    fn from(e: io::Error) -> Self { Self::Io(e) }
}

/// An abstraction over where and how [`SessionInfo`] is persisted.
pub trait SessionStore: Send + Sync {
    /// Load the persisted session. Returns [`LoadError::NoSessionData`] if
    /// nothing has ever been saved (not an I/O error).
    fn load(&self) -> Result<SessionInfo, LoadError>;

    /// Persist the given session. Implementations should make this durable
    /// (e.g. write-then-rename) so a crash mid-write cannot corrupt the
    /// previous generation.
    fn save(&self, session: &SessionInfo) -> io::Result<()>;

    /// Human-readable name of this backend (for log messages).
    fn name(&self) -> &str;
}

// ─── BinaryFileBackend ────────────────────────────────────────────────────────

/// Stores the session in a compact binary file at a configurable path.
pub struct BinaryFileBackend {
    path: PathBuf,
}

impl BinaryFileBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl SessionStore for BinaryFileBackend {
    fn load(&self) -> Result<SessionInfo, LoadError> {
        let buf = match std::fs::read(&self.path) {
            Ok(b) if !b.is_empty() => b,
            Ok(_) => return Err(LoadError::NoSessionData),
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Err(LoadError::NoSessionData),
            Err(e) => return Err(LoadError::Io(e)),
        };
        SessionInfo::from_bytes(&buf).map_err(LoadError::Io)
    }

    fn save(&self, session: &SessionInfo) -> io::Result<()> {
        crate::session::atomic_write(&self.path, &session.to_bytes())
    }

    fn name(&self) -> &str { "binary-file" }
}

// ─── NoopSessionStore ─────────────────────────────────────────────────────────

/// Discards every save and always reports [`LoadError::NoSessionData`].
///
/// Used for secondary connections opened purely to talk to a different DC
/// (see [`crate::Client::new_connection`]): those share the home session's
/// auth via export/import, not the home session's persisted file.
#[derive(Default)]
pub struct NoopSessionStore;

impl SessionStore for NoopSessionStore {
    fn load(&self) -> Result<SessionInfo, LoadError> {
        Err(LoadError::NoSessionData)
    }

    fn save(&self, _session: &SessionInfo) -> io::Result<()> {
        Ok(())
    }

    fn name(&self) -> &str { "no-op" }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("layer-client-test-{}-{name}", std::process::id()))
    }

    #[test]
    fn missing_file_reports_no_session_data() {
        let path = scratch_path("missing");
        let _ = std::fs::remove_file(&path);
        let backend = BinaryFileBackend::new(path.clone());
        assert!(matches!(backend.load(), Err(LoadError::NoSessionData)));
    }

    #[test]
    fn empty_file_reports_no_session_data() {
        let path = scratch_path("empty");
        std::fs::write(&path, []).unwrap();
        let backend = BinaryFileBackend::new(path.clone());
        assert!(matches!(backend.load(), Err(LoadError::NoSessionData)));
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn truncated_file_reports_io_error() {
        let path = scratch_path("truncated");
        std::fs::write(&path, [1, 2, 3]).unwrap();
        let backend = BinaryFileBackend::new(path.clone());
        assert!(matches!(backend.load(), Err(LoadError::Io(_))));
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn save_then_load_round_trips_a_session() {
        let path = scratch_path("roundtrip");
        let backend = BinaryFileBackend::new(path.clone());
        let mut session = SessionInfo::bootstrap();
        session.dc_id = 2;
        session.server_salt = 12345;
        session.address = "1.2.3.4:443".to_string();

        backend.save(&session).unwrap();
        let loaded = backend.load().unwrap();

        assert_eq!(loaded.dc_id, 2);
        assert_eq!(loaded.server_salt, 12345);
        assert_eq!(loaded.address, "1.2.3.4:443");
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn noop_store_always_reports_no_session_data_and_discards_saves() {
        let store = NoopSessionStore;
        assert!(matches!(store.load(), Err(LoadError::NoSessionData)));
        store.save(&SessionInfo::bootstrap()).unwrap();
    }
}
