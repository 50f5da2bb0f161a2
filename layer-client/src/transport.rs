//! Async TCP transport for MTProto (abridged framing).
//!
//! Generic over the underlying byte stream so tests can substitute
//! `tokio::io::duplex` for a real `TcpStream`.

use std::io;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::net::TcpStream;

/// Anything the abridged transport can read from and write to.
pub trait AsyncStream: AsyncRead + AsyncWrite + Unpin + Send {}
impl<T: AsyncRead + AsyncWrite + Unpin + Send> AsyncStream for T {}

/// Async abridged MTProto transport, generic over the underlying stream.
pub struct AsyncAbridged<S> {
    stream: S,
    init_sent: bool,
}

impl AsyncAbridged<TcpStream> {
    pub async fn connect(addr: &str) -> io::Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        Ok(Self { stream, init_sent: false })
    }
}

impl<S: AsyncStream> AsyncAbridged<S> {
    /// Wrap an already-connected stream (a dialed `TcpStream`, a SOCKS5
    /// tunnel, or — in tests — one half of `tokio::io::duplex`).
    pub fn from_stream(stream: S) -> Self {
        Self { stream, init_sent: false }
    }

    pub async fn send(&mut self, data: &[u8]) -> io::Result<()> {
        if !self.init_sent {
            self.stream.write_all(&[0xef]).await?;
            self.init_sent = true;
        }
        write_frame(&mut self.stream, data).await
    }

    pub async fn recv(&mut self) -> io::Result<Vec<u8>> {
        read_frame(&mut self.stream).await
    }

    /// Split into independent read/write halves for the send/receive
    /// pipeline tasks. Only valid once the 0xEF init byte has already gone
    /// out — callers split after `initConnection`'s direct exchange, never
    /// before.
    pub fn into_split(self) -> (ReadHalf<S>, WriteHalf<S>) {
        tokio::io::split(self.stream)
    }
}

/// Write one abridged-framed packet with no init byte — used by the send
/// pipeline task against its own half of an already-initialized stream.
pub async fn write_frame<W: AsyncWrite + Unpin>(writer: &mut W, data: &[u8]) -> io::Result<()> {
    let words = data.len() / 4;
    if words < 0x7f {
        writer.write_all(&[words as u8]).await?;
    } else {
        let b0 = 0x7f_u8;
        let b1 = (words & 0xff) as u8;
        let b2 = ((words >> 8) & 0xff) as u8;
        let b3 = ((words >> 16) & 0xff) as u8;
        writer.write_all(&[b0, b1, b2, b3]).await?;
    }
    writer.write_all(data).await
}

/// Read one abridged-framed packet — used by the receive pipeline task
/// against its own half of the stream.
pub async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> io::Result<Vec<u8>> {
    let mut h = [0u8; 1];
    reader.read_exact(&mut h).await?;
    let words = if h[0] < 0x7f {
        h[0] as usize
    } else {
        let mut b = [0u8; 3];
        reader.read_exact(&mut b).await?;
        b[0] as usize | (b[1] as usize) << 8 | (b[2] as usize) << 16
    };
    let mut buf = vec![0u8; words * 4];
    reader.read_exact(&mut buf).await?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn short_frame_round_trips_over_duplex() {
        let (a, b) = tokio::io::duplex(4096);
        let mut client = AsyncAbridged::from_stream(a);
        let mut server = AsyncAbridged::from_stream(b);

        let payload = vec![1u8, 2, 3, 4, 5, 6, 7, 8];
        client.send(&payload).await.unwrap();
        let received = server.recv().await.unwrap();
        assert_eq!(received, payload);
    }

    #[tokio::test]
    async fn long_frame_uses_four_byte_length_prefix() {
        let (a, b) = tokio::io::duplex(1 << 20);
        let mut client = AsyncAbridged::from_stream(a);
        let mut server = AsyncAbridged::from_stream(b);

        let payload = vec![0xabu8; 0x7f * 4 + 400];
        client.send(&payload).await.unwrap();
        let received = server.recv().await.unwrap();
        assert_eq!(received, payload);
    }
}
