//! Newline-delimited JSON framing of [`SospfPacket`]s over a byte stream.

use log::debug;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::time::timeout;

use super::messages::SospfPacket;
use crate::error::{Result, RouterError};

/// Longest line accepted from a peer, newline included.
pub const MAX_PACKET_LEN: usize = 1 << 20;

pub struct PacketStream<S> {
    inner: BufReader<S>,
    io_timeout: Duration,
    max_packet_len: usize,
}

impl PacketStream<TcpStream> {
    /// Open a fresh connection to a router's process address.
    pub async fn connect(addr: &str, io_timeout: Duration) -> Result<Self> {
        let stream = timeout(io_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| RouterError::Timeout("connecting"))??;
        stream.set_nodelay(true)?;
        debug!("Connected to {}", addr);
        Ok(Self::new(stream, io_timeout))
    }
}

impl<S> PacketStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S, io_timeout: Duration) -> Self {
        Self {
            inner: BufReader::new(stream),
            io_timeout,
            max_packet_len: MAX_PACKET_LEN,
        }
    }

    pub fn with_max_packet_len(mut self, max_packet_len: usize) -> Self {
        self.max_packet_len = max_packet_len;
        self
    }

    pub async fn send(&mut self, packet: &SospfPacket) -> Result<()> {
        let mut line = serde_json::to_vec(packet)?;
        line.push(b'\n');

        let io_timeout = self.io_timeout;
        let inner = &mut self.inner;
        let write = async move {
            inner.write_all(&line).await?;
            inner.flush().await
        };
        timeout(io_timeout, write)
            .await
            .map_err(|_| RouterError::Timeout("writing a packet"))??;
        Ok(())
    }

    pub async fn recv(&mut self) -> Result<SospfPacket> {
        let mut line = String::new();
        let io_timeout = self.io_timeout;
        let limit = self.max_packet_len;
        let mut bounded = (&mut self.inner).take(limit as u64 + 1);
        let read = timeout(io_timeout, bounded.read_line(&mut line))
            .await
            .map_err(|_| RouterError::Timeout("waiting for a packet"))??;
        if read == 0 {
            return Err(RouterError::ConnectionClosed);
        }
        if line.len() > limit {
            return Err(RouterError::PacketTooLarge { limit });
        }
        Ok(serde_json::from_str(line.trim_end())?)
    }

    pub async fn shutdown(&mut self) {
        let _ = self.inner.get_mut().shutdown().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{Metric, PacketType, RouterDescription};

    fn hello() -> SospfPacket {
        let me = RouterDescription::new("127.0.0.1", 20000, "10.0.0.1", Metric::SelfLoop).unwrap();
        SospfPacket::from_description(&me, "10.0.0.2", PacketType::Hello, None, Some(3)).unwrap()
    }

    #[tokio::test]
    async fn packets_cross_a_duplex_pipe() {
        let (left, right) = tokio::io::duplex(4096);
        let mut client = PacketStream::new(left, Duration::from_secs(1));
        let mut server = PacketStream::new(right, Duration::from_secs(1));

        client.send(&hello()).await.unwrap();
        client.send(&hello()).await.unwrap();

        assert_eq!(server.recv().await.unwrap(), hello());
        assert_eq!(server.recv().await.unwrap().weight, Some(3));
    }

    #[tokio::test]
    async fn closed_peer_is_reported() {
        let (left, right) = tokio::io::duplex(64);
        drop(left);
        let mut server = PacketStream::new(right, Duration::from_secs(1));
        assert!(matches!(server.recv().await, Err(RouterError::ConnectionClosed)));
    }

    #[tokio::test]
    async fn silent_peer_times_out() {
        let (_left, right) = tokio::io::duplex(64);
        let mut server = PacketStream::new(right, Duration::from_millis(50));
        assert!(matches!(server.recv().await, Err(RouterError::Timeout(_))));
    }

    #[tokio::test]
    async fn garbage_is_a_decode_error() {
        let (mut left, right) = tokio::io::duplex(256);
        left.write_all(b"{\"packet_type\":7}\n").await.unwrap();
        let mut server = PacketStream::new(right, Duration::from_secs(1));
        assert!(matches!(server.recv().await, Err(RouterError::Serialization(_))));
    }

    #[tokio::test]
    async fn oversized_line_is_rejected() {
        let (mut left, right) = tokio::io::duplex(4096);
        let mut server = PacketStream::new(right, Duration::from_secs(1)).with_max_packet_len(64);

        let mut flood = vec![b'a'; 1000];
        flood.push(b'\n');
        left.write_all(&flood).await.unwrap();
        assert!(matches!(
            server.recv().await,
            Err(RouterError::PacketTooLarge { limit: 64 })
        ));
    }

    #[tokio::test]
    async fn packet_at_the_limit_is_accepted() {
        let mut line = serde_json::to_vec(&hello()).unwrap();
        line.push(b'\n');
        let (mut left, right) = tokio::io::duplex(4096);
        let mut server =
            PacketStream::new(right, Duration::from_secs(1)).with_max_packet_len(line.len());

        left.write_all(&line).await.unwrap();
        assert_eq!(server.recv().await.unwrap(), hello());
    }
}
