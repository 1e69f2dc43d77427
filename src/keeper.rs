//! # Connection Keeper
//!
//! Keeps one TCP session to the controller's bridge alive, rate-limiting
//! reconnect attempts so a dead peer is not hammered.
//!
//! [`ConnectionKeeper::ensure`] is meant to be called at the top of every
//! poll cycle. It returns immediately when a socket is held and the peer has
//! not hung up; otherwise it tries a reconnect at most once per interval.
//! The interval is measured from the start of the previous attempt, whether
//! that attempt succeeded, failed, or was skipped because the network was
//! down.
//!
//! Apart from a peer hang-up seen by [`Connector::is_alive`], the keeper does
//! not tear a socket down on its own. Whoever runs an exchange calls
//! [`ConnectionKeeper::disconnect`] after an error that leaves the stream
//! unusable (see [`LinkError::needs_reconnect`]).

use std::future::{poll_fn, Future};
use std::net::SocketAddr;
use std::task::Poll;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio::time::{timeout, Instant};
use tracing::{debug, info, warn};

use crate::config::LinkConfig;
use crate::error::{LinkError, LinkResult};

/// Opens byte streams to an endpoint.
pub trait Connector: Send {
    /// Stream type produced on success
    type Stream: AsyncRead + AsyncWrite + Unpin + Send;

    /// Whether the local network is up. A down network skips the attempt.
    fn network_available(&self) -> bool {
        true
    }

    /// Open a new stream to `endpoint`.
    fn connect(
        &mut self,
        endpoint: SocketAddr,
    ) -> impl Future<Output = LinkResult<Self::Stream>> + Send;

    /// Non-blocking check that the peer has not closed `stream`.
    fn is_alive(&self, _stream: &mut Self::Stream) -> impl Future<Output = bool> + Send {
        std::future::ready(true)
    }
}

/// Plain TCP connector with a connect deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TcpConnector {
    connect_timeout: Duration,
    nodelay: bool,
}

impl TcpConnector {
    pub fn new(connect_timeout: Duration, nodelay: bool) -> Self {
        Self {
            connect_timeout,
            nodelay,
        }
    }
}

impl Default for TcpConnector {
    fn default() -> Self {
        let config = LinkConfig::default();
        Self::new(config.connect_timeout, config.nodelay)
    }
}

impl Connector for TcpConnector {
    type Stream = TcpStream;

    async fn connect(&mut self, endpoint: SocketAddr) -> LinkResult<TcpStream> {
        debug!("TCP connecting: {}", endpoint);

        match timeout(self.connect_timeout, TcpStream::connect(endpoint)).await {
            Ok(Ok(stream)) => {
                if self.nodelay {
                    if let Err(e) = stream.set_nodelay(true) {
                        debug!("TCP_NODELAY: {}", e);
                    }
                }
                Ok(stream)
            }
            Ok(Err(e)) => Err(LinkError::io(format!(
                "Failed to connect to {}: {}",
                endpoint, e
            ))),
            Err(_) => Err(LinkError::timeout(
                format!("connect to {}", endpoint),
                self.connect_timeout.as_millis() as u64,
            )),
        }
    }

    async fn is_alive(&self, stream: &mut TcpStream) -> bool {
        let mut probe = [0u8; 1];
        // Peeking leaves pending input for the next exchange
        poll_fn(|cx| {
            let mut buf = ReadBuf::new(&mut probe);
            match stream.poll_peek(cx, &mut buf) {
                Poll::Ready(Ok(0)) | Poll::Ready(Err(_)) => Poll::Ready(false),
                Poll::Ready(Ok(_)) | Poll::Pending => Poll::Ready(true),
            }
        })
        .await
    }
}

/// Rate-limited owner of a single stream.
pub struct ConnectionKeeper<C: Connector> {
    connector: C,
    endpoint: SocketAddr,
    reconnect_interval: Duration,
    stream: Option<C::Stream>,
    last_attempt: Option<Instant>,
    attempts: u64,
}

impl ConnectionKeeper<TcpConnector> {
    /// TCP keeper for the endpoint and timings of `config`.
    pub fn tcp(config: &LinkConfig) -> Self {
        Self::new(
            TcpConnector::new(config.connect_timeout, config.nodelay),
            config.endpoint,
        )
        .with_reconnect_interval(config.reconnect_interval)
    }
}

impl<C: Connector> ConnectionKeeper<C> {
    /// Create a disconnected keeper. The first `ensure` connects immediately.
    pub fn new(connector: C, endpoint: SocketAddr) -> Self {
        Self {
            connector,
            endpoint,
            reconnect_interval: LinkConfig::default().reconnect_interval,
            stream: None,
            last_attempt: None,
            attempts: 0,
        }
    }

    /// Set the interval used by [`maintain`](Self::maintain).
    pub fn with_reconnect_interval(mut self, interval: Duration) -> Self {
        self.reconnect_interval = interval;
        self
    }

    /// Endpoint this keeper connects to
    pub fn endpoint(&self) -> SocketAddr {
        self.endpoint
    }

    /// Connect attempts made so far, including failed ones
    pub fn attempts(&self) -> u64 {
        self.attempts
    }

    /// The connector
    pub fn connector(&self) -> &C {
        &self.connector
    }

    /// The connector, mutable
    pub fn connector_mut(&mut self) -> &mut C {
        &mut self.connector
    }

    /// True while a socket is held
    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    /// Make sure a socket is held, trying at most one reconnect per `min_interval`.
    ///
    /// A held socket whose peer has hung up is dropped first. Returns true if
    /// a socket is held on return.
    pub async fn ensure(&mut self, min_interval: Duration) -> bool {
        if let Some(stream) = self.stream.as_mut() {
            if self.connector.is_alive(stream).await {
                return true;
            }
            warn!("Peer {} closed the connection", self.endpoint);
            self.stream = None;
        }

        let now = Instant::now();
        if let Some(last) = self.last_attempt {
            let elapsed = now.duration_since(last);
            if elapsed < min_interval {
                debug!("Reconnect in {:?}", min_interval - elapsed);
                return false;
            }
        }
        self.last_attempt = Some(now);

        if !self.connector.network_available() {
            debug!("Network down, skipping connect to {}", self.endpoint);
            return false;
        }

        self.attempts += 1;
        match self.connector.connect(self.endpoint).await {
            Ok(stream) => {
                info!("Connected to {} (attempt #{})", self.endpoint, self.attempts);
                self.stream = Some(stream);
                true
            }
            Err(e) => {
                warn!("Connect to {} failed: {}", self.endpoint, e);
                false
            }
        }
    }

    /// [`ensure`](Self::ensure) with the configured reconnect interval.
    pub async fn maintain(&mut self) -> bool {
        let interval = self.reconnect_interval;
        self.ensure(interval).await
    }

    /// Drop the socket. The next `ensure` honours the interval since the last attempt.
    pub fn disconnect(&mut self) {
        if self.stream.take().is_some() {
            info!("Disconnected from {}", self.endpoint);
        }
    }

    /// The held stream, or `ConnectionUnavailable`.
    pub fn stream_mut(&mut self) -> LinkResult<&mut C::Stream> {
        self.stream.as_mut().ok_or(LinkError::ConnectionUnavailable)
    }
}
