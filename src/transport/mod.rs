//! Transport Layer
//!
//! The client talks to the server through a [`ByteChannel`] produced by a
//! [`Dialer`]. [`TcpDialer`] is the production implementation; tests plug in
//! in-memory streams through [`StreamChannel`].

use std::fmt;
use std::io;
use std::net::SocketAddr;

use async_trait::async_trait;
use bytes::BytesMut;
use serde::Deserialize;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{lookup_host, TcpSocket, TcpStream};
use tracing::debug;

/// Transport protocol used to reach the server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Plain MQTT over TCP
    #[default]
    Tcp,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportKind::Tcp => write!(f, "tcp"),
        }
    }
}

/// Where and how to reach the server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionParams {
    pub host: String,
    pub port: u16,
    pub transport: TransportKind,
    /// Keep alive interval in seconds, sent in CONNECT
    pub keep_alive: u16,
    /// Local address to bind before connecting
    pub bind_address: Option<String>,
}

impl ConnectionParams {
    pub const DEFAULT_PORT: u16 = 1883;
    pub const DEFAULT_KEEP_ALIVE: u16 = 60;

    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: Self::DEFAULT_PORT,
            transport: TransportKind::Tcp,
            keep_alive: Self::DEFAULT_KEEP_ALIVE,
            bind_address: None,
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_keep_alive(mut self, keep_alive: u16) -> Self {
        self.keep_alive = keep_alive;
        self
    }

    pub fn with_bind_address(mut self, bind_address: impl Into<String>) -> Self {
        self.bind_address = Some(bind_address.into());
        self
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Bidirectional byte stream to the server
#[async_trait]
pub trait ByteChannel: Send {
    /// Read whatever is available into `buf`. `Ok(0)` means end of stream.
    async fn read(&mut self, buf: &mut BytesMut) -> io::Result<usize>;

    async fn write_all(&mut self, data: &[u8]) -> io::Result<()>;

    async fn close(&mut self) -> io::Result<()>;

    /// Printable description of the remote end
    fn peer(&self) -> String;
}

/// Opens byte channels
#[async_trait]
pub trait Dialer: Send + Sync {
    async fn dial(&self, params: &ConnectionParams) -> io::Result<Box<dyn ByteChannel>>;
}

/// [`ByteChannel`] over any tokio stream
pub struct StreamChannel<S> {
    stream: S,
    peer: String,
}

impl<S> StreamChannel<S> {
    pub fn new(stream: S, peer: impl Into<String>) -> Self {
        Self {
            stream,
            peer: peer.into(),
        }
    }
}

#[async_trait]
impl<S> ByteChannel for StreamChannel<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn read(&mut self, buf: &mut BytesMut) -> io::Result<usize> {
        buf.reserve(1024);
        self.stream.read_buf(buf).await
    }

    async fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        self.stream.write_all(data).await?;
        self.stream.flush().await
    }

    async fn close(&mut self) -> io::Result<()> {
        self.stream.shutdown().await
    }

    fn peer(&self) -> String {
        self.peer.clone()
    }
}

/// Dials TCP, optionally from a fixed local address
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpDialer;

impl TcpDialer {
    async fn connect(params: &ConnectionParams) -> io::Result<TcpStream> {
        let remote = lookup_host(params.address())
            .await?
            .next()
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::AddrNotAvailable,
                    format!("no address for {}", params.address()),
                )
            })?;

        let stream = match params.bind_address {
            Some(ref bind) => {
                let local: SocketAddr = bind.parse().map_err(|e| {
                    io::Error::new(
                        io::ErrorKind::InvalidInput,
                        format!("invalid bind address {}: {}", bind, e),
                    )
                })?;
                let socket = if remote.is_ipv4() {
                    TcpSocket::new_v4()?
                } else {
                    TcpSocket::new_v6()?
                };
                socket.bind(local)?;
                socket.connect(remote).await?
            }
            None => TcpStream::connect(remote).await?,
        };
        stream.set_nodelay(true)?;
        Ok(stream)
    }
}

#[async_trait]
impl Dialer for TcpDialer {
    async fn dial(&self, params: &ConnectionParams) -> io::Result<Box<dyn ByteChannel>> {
        match params.transport {
            TransportKind::Tcp => {
                let stream = Self::connect(params).await?;
                let peer = stream
                    .peer_addr()
                    .map(|a| a.to_string())
                    .unwrap_or_else(|_| params.address());
                debug!("TCP connected to {}", peer);
                Ok(Box::new(StreamChannel::new(stream, peer)))
            }
        }
    }
}
