//! Session data model — the durable state bound to one DC connection.
//!
//! Mirrors exactly one live connection's worth of state: the auth key
//! negotiated with a single data center, the current server salt, and the
//! address to dial. The `dc_options` table returned by `help.getConfig`
//! travels alongside a [`SessionInfo`] but is not itself persisted — it is
//! re-fetched on every `initConnection`.

use std::io;
use std::path::Path;

/// The bootstrap data center, used the first time a client starts with no
/// saved session.
pub const BOOTSTRAP_ADDR: &str = "149.154.167.50:443";

/// Draw a fresh `session_id`. Called once per `SessionInfo` construction —
/// never reused, never persisted.
fn random_session_id() -> i64 {
    let mut buf = [0u8; 8];
    getrandom::getrandom(&mut buf).expect("getrandom");
    i64::from_le_bytes(buf)
}

/// Durable per-DC session state.
///
/// Everything except `session_id` is written back through the
/// [`crate::session_backend::SessionStore`] after any mutation (key
/// agreement, config fetch, `bad_server_salt`, `new_session_created`, DC
/// migration). `session_id` is transient: regenerated every time a session
/// is loaded or created, never written to disk.
#[derive(Clone)]
pub struct SessionInfo {
    pub dc_id: i32,
    pub auth_key: [u8; 256],
    pub auth_key_hash: [u8; 8],
    pub server_salt: i64,
    pub address: String,
    pub session_id: i64,
}

impl SessionInfo {
    /// A blank session pointed at the bootstrap DC, as used on first run.
    pub fn bootstrap() -> Self {
        Self {
            dc_id: 0,
            auth_key: [0u8; 256],
            auth_key_hash: [0u8; 8],
            server_salt: 0,
            address: BOOTSTRAP_ADDR.to_string(),
            session_id: random_session_id(),
        }
    }

    pub fn has_auth_key(&self) -> bool {
        self.auth_key_hash != [0u8; 8]
    }

    /// Layout: dc_id:i32, auth_key:[u8;256], auth_key_hash:[u8;8],
    /// server_salt:i64, addr_len:u8, addr:[u8]. `session_id` is deliberately
    /// excluded — it must never survive a reload.
    pub fn to_bytes(&self) -> Vec<u8> {
        let addr = self.address.as_bytes();
        let mut buf = Vec::with_capacity(4 + 256 + 8 + 8 + 1 + addr.len());
        buf.extend(self.dc_id.to_le_bytes());
        buf.extend(self.auth_key);
        buf.extend(self.auth_key_hash);
        buf.extend(self.server_salt.to_le_bytes());
        buf.push(addr.len() as u8);
        buf.extend(addr);
        buf
    }

    pub fn from_bytes(buf: &[u8]) -> io::Result<Self> {
        macro_rules! take {
            ($pos:expr, $n:expr) => {{
                if $pos + $n > buf.len() {
                    return Err(io::Error::new(io::ErrorKind::InvalidData, "truncated session"));
                }
                &buf[$pos..$pos + $n]
            }};
        }
        let dc_id = i32::from_le_bytes(take!(0, 4).try_into().unwrap());
        let mut auth_key = [0u8; 256];
        auth_key.copy_from_slice(take!(4, 256));
        let mut auth_key_hash = [0u8; 8];
        auth_key_hash.copy_from_slice(take!(260, 8));
        let server_salt = i64::from_le_bytes(take!(268, 8).try_into().unwrap());
        let addr_len = take!(276, 1)[0] as usize;
        let address = String::from_utf8_lossy(take!(277, addr_len)).into_owned();
        Ok(Self { dc_id, auth_key, auth_key_hash, server_salt, address, session_id: random_session_id() })
    }
}

/// A single entry from `help.getConfig`'s `dc_options` vector.
#[derive(Clone, Debug)]
pub struct DcOption {
    pub id: i32,
    pub ipv6: bool,
    pub cdn: bool,
    pub ip_address: String,
    pub port: i32,
}

/// Immutable application identity sent in `initConnection`.
#[derive(Clone)]
pub struct AppConfig {
    pub api_id: i32,
    pub api_hash: String,
    pub app_version: String,
    pub device_model: String,
    pub system_version: String,
    pub system_lang_code: String,
    pub lang_pack: String,
    pub lang_code: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_id: 0,
            api_hash: String::new(),
            app_version: "0.1.0".to_string(),
            device_model: "Unknown".to_string(),
            system_version: format!("{}/{}", std::env::consts::OS, std::env::consts::ARCH),
            system_lang_code: "en".to_string(),
            lang_pack: String::new(),
            lang_code: "en".to_string(),
        }
    }
}

/// Resolve an address for `dc_id`, honoring the `ipv6` flag. CDN-only
/// options are never returned.
pub fn dc_addr(options: &[DcOption], dc_id: i32, ipv6: bool) -> Option<String> {
    options
        .iter()
        .find(|o| o.id == dc_id && o.ipv6 == ipv6 && !o.cdn)
        .map(|o| format!("{}:{}", o.ip_address, o.port))
}

pub(crate) fn atomic_write(path: &Path, data: &[u8]) -> io::Result<()> {
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, data)?;
    std::fs::rename(&tmp, path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bootstrap_sessions_each_get_a_distinct_session_id() {
        let a = SessionInfo::bootstrap();
        let b = SessionInfo::bootstrap();
        assert_ne!(a.session_id, 0);
        assert_ne!(b.session_id, 0);
        assert_ne!(a.session_id, b.session_id);
    }

    #[test]
    fn from_bytes_reseeds_session_id_rather_than_zeroing_it() {
        let original = SessionInfo::bootstrap();
        let loaded_once = SessionInfo::from_bytes(&original.to_bytes()).unwrap();
        let loaded_twice = SessionInfo::from_bytes(&original.to_bytes()).unwrap();

        assert_ne!(loaded_once.session_id, 0);
        assert_ne!(loaded_once.session_id, loaded_twice.session_id);
        assert_eq!(loaded_once.dc_id, original.dc_id);
        assert_eq!(loaded_once.address, original.address);
    }
}
