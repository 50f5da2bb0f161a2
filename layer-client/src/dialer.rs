//! Connection dialer — the "factory from address to stream" the connection
//! manager dials through, direct or via a SOCKS5 proxy.

use std::io;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

use crate::errors::TransportError;
use crate::socks5::Socks5Config;

/// Anything the abridged transport can read from and write to, boxed so
/// [`Dialer`] doesn't need to be generic over the concrete stream type.
pub trait AsyncReadWrite: AsyncRead + AsyncWrite + Unpin + Send {}
impl<T: AsyncRead + AsyncWrite + Unpin + Send> AsyncReadWrite for T {}

/// How the connection manager opens a socket to a DC address.
#[derive(Clone)]
pub enum Dialer {
    /// Plain TCP, no proxy.
    Tcp,
    /// Tunnel every connection through a SOCKS5 proxy.
    Socks5(Socks5Config),
}

impl Default for Dialer {
    fn default() -> Self {
        Self::Tcp
    }
}

impl Dialer {
    pub async fn connect(&self, addr: &str) -> Result<Box<dyn AsyncReadWrite>, TransportError> {
        match self {
            Dialer::Tcp => {
                let stream = TcpStream::connect(addr).await?;
                Ok(Box::new(stream))
            }
            Dialer::Socks5(proxy) => {
                let stream = proxy
                    .connect(addr)
                    .await
                    .map_err(|e| TransportError::Io(io::Error::other(e.to_string())))?;
                Ok(Box::new(stream))
            }
        }
    }
}
