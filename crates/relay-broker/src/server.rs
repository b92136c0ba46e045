//! Broker: WebSocket server that owns the router.
//!
//! A [`Broker`] binds a TCP listener and upgrades every accepted socket to a
//! WebSocket. Each connection runs in its own task: it reads frames one at a
//! time and hands them to the [`Router`], writes whatever other connections
//! queued on its handle, and sends keepalive pings. A slow or failing
//! connection only ever stalls its own task.

use crate::connection::{Connection, ConnectionHandle, Outbound};
use crate::registry::Registry;
use crate::router::Router;

use futures::{SinkExt, StreamExt};
use relay_types::config::BrokerConfig;
use relay_wire::Notice;
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

/// Errors from the broker layer.
#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Cannot bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        source: std::io::Error,
    },
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
}

/// Why a connection task ended.
#[derive(Debug)]
enum CloseReason {
    /// Remote side closed the socket.
    Remote,
    /// Closed through its handle (admin disconnect).
    Explicit,
    /// No traffic within the keepalive window.
    TimedOut,
    /// Broker shutting down.
    Shutdown,
    /// Transport error.
    Error(String),
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Remote => write!(f, "closed by peer"),
            Self::Explicit => write!(f, "closed by broker"),
            Self::TimedOut => write!(f, "keepalive timeout"),
            Self::Shutdown => write!(f, "broker shutdown"),
            Self::Error(e) => write!(f, "transport error: {e}"),
        }
    }
}

/// The running broker.
pub struct Broker {
    config: BrokerConfig,
    router: Router,
    /// Actual bound address (useful when binding to port 0).
    local_addr: SocketAddr,
    shutdown_tx: watch::Sender<bool>,
}

impl Broker {
    /// Bind the listener and start accepting connections.
    ///
    /// Failing to bind is the only error surfaced here; everything after
    /// that is handled per connection.
    pub async fn start(
        config: BrokerConfig,
    ) -> Result<(Arc<Self>, tokio::task::JoinHandle<()>), BrokerError> {
        let listener = TcpListener::bind(config.listen_addr)
            .await
            .map_err(|source| BrokerError::Bind {
                addr: config.listen_addr,
                source,
            })?;
        let local_addr = listener.local_addr()?;

        info!("Broker listening on ws://{}", local_addr);

        let (shutdown_tx, _) = watch::channel(false);
        let broker = Arc::new(Self {
            config,
            router: Router::new(Registry::new()),
            local_addr,
            shutdown_tx,
        });

        let broker_clone = Arc::clone(&broker);
        let accept_handle = tokio::spawn(async move {
            Self::accept_loop(listener, broker_clone).await;
        });

        Ok((broker, accept_handle))
    }

    /// Get the actual bound address.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// WebSocket URL clients should connect to.
    pub fn url(&self) -> String {
        format!("ws://{}", self.local_addr)
    }

    pub fn registry(&self) -> &Registry {
        self.router.registry()
    }

    /// Close the connection currently registered under `name`.
    pub fn disconnect(&self, name: &str) -> bool {
        match self.registry().lookup(name) {
            Some(handle) => {
                info!(agent = %name, "Disconnecting agent");
                handle.close()
            }
            None => false,
        }
    }

    /// Stop accepting, close every connection, and let the accept task end.
    pub fn shutdown(&self) {
        info!("Broker shutting down");
        self.shutdown_tx.send_replace(true);
    }

    fn websocket_config(&self) -> WebSocketConfig {
        let mut ws_config = WebSocketConfig::default();
        ws_config.max_message_size = Some(self.config.max_frame_bytes);
        ws_config.max_frame_size = Some(self.config.max_frame_bytes);
        ws_config
    }

    /// Internal accept loop: runs in a spawned task.
    async fn accept_loop(listener: TcpListener, broker: Arc<Broker>) {
        let mut shutdown_rx = broker.shutdown_tx.subscribe();
        let mut connections = JoinSet::new();

        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, addr)) => {
                        debug!("Accepted connection from {}", addr);
                        let broker = Arc::clone(&broker);
                        connections.spawn(async move {
                            if let Err(e) = broker.handle_inbound(stream, addr).await {
                                debug!("Connection from {} ended: {}", addr, e);
                            }
                        });
                    }
                    Err(e) => {
                        error!("Accept error: {}", e);
                        tokio::time::sleep(std::time::Duration::from_secs(1)).await;
                    }
                },
                Some(_) = connections.join_next(), if !connections.is_empty() => {}
                _ = shutdown_requested(&mut shutdown_rx) => break,
            }
        }

        drop(listener);
        while connections.join_next().await.is_some() {}
        info!("Broker stopped");
    }

    /// Upgrade one socket and run its connection loop to completion.
    async fn handle_inbound(&self, stream: TcpStream, addr: SocketAddr) -> Result<(), BrokerError> {
        let ws = tokio_tungstenite::accept_async_with_config(stream, Some(self.websocket_config()))
            .await?;
        let (handle, outbound_rx) = ConnectionHandle::new(Some(addr));
        let mut conn = Connection::new(handle);
        debug!(connection = %conn.id(), "WebSocket session open from {}", addr);

        let reason = self.connection_loop(ws, &mut conn, outbound_rx).await;
        match &reason {
            CloseReason::TimedOut => warn!(
                agent = conn.display_name(),
                "Connection from {} closed: {}", addr, reason
            ),
            _ => info!(
                agent = conn.display_name(),
                "Connection from {} closed: {}", addr, reason
            ),
        }
        self.router.close(&mut conn);
        Ok(())
    }

    /// Read/write loop for an established connection.
    async fn connection_loop(
        &self,
        ws: tokio_tungstenite::WebSocketStream<TcpStream>,
        conn: &mut Connection,
        mut outbound_rx: tokio::sync::mpsc::UnboundedReceiver<Outbound>,
    ) -> CloseReason {
        let (mut sink, mut stream) = ws.split();
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        if *shutdown_rx.borrow() {
            return CloseReason::Shutdown;
        }

        let ping_interval = self.config.ping_interval();
        let ping_timeout = self.config.ping_timeout();
        let mut keepalive =
            tokio::time::interval_at(tokio::time::Instant::now() + ping_interval, ping_interval);
        keepalive.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut last_seen = Instant::now();

        let reason = loop {
            tokio::select! {
                inbound = stream.next() => {
                    let msg = match inbound {
                        Some(Ok(m)) => m,
                        Some(Err(e)) => break CloseReason::Error(e.to_string()),
                        None => break CloseReason::Remote,
                    };
                    last_seen = Instant::now();

                    let text = match msg {
                        Message::Text(t) => t,
                        Message::Binary(b) => match String::from_utf8(b) {
                            Ok(t) => t,
                            Err(_) => {
                                warn!(agent = conn.display_name(), "Non-UTF-8 binary frame");
                                if let Err(e) = sink.send(Message::Text(Notice::Malformed.to_string())).await {
                                    break CloseReason::Error(e.to_string());
                                }
                                continue;
                            }
                        },
                        Message::Close(_) => break CloseReason::Remote,
                        _ => continue,
                    };

                    let outcome = self.router.dispatch(conn, &text);
                    if let Some(notice) = outcome.notice() {
                        if let Err(e) = sink.send(Message::Text(notice.to_string())).await {
                            break CloseReason::Error(e.to_string());
                        }
                    }
                }
                outbound = outbound_rx.recv() => match outbound {
                    Some(Outbound::Text(text)) => {
                        if let Err(e) = sink.send(Message::Text(text)).await {
                            break CloseReason::Error(e.to_string());
                        }
                    }
                    Some(Outbound::Close) | None => break CloseReason::Explicit,
                },
                _ = keepalive.tick() => {
                    if last_seen.elapsed() > ping_timeout {
                        break CloseReason::TimedOut;
                    }
                    if let Err(e) = sink.send(Message::Ping(Vec::new())).await {
                        break CloseReason::Error(e.to_string());
                    }
                }
                _ = shutdown_requested(&mut shutdown_rx) => break CloseReason::Shutdown,
            }
        };

        // Stop accepting queued writes before the handshake-level close.
        outbound_rx.close();
        if !matches!(reason, CloseReason::Remote | CloseReason::Error(_)) {
            let _ = sink.send(Message::Close(None)).await;
        }
        let _ = sink.close().await;
        reason
    }
}

/// Resolves once shutdown has been requested, including before the call.
async fn shutdown_requested(shutdown_rx: &mut watch::Receiver<bool>) {
    let requested = shutdown_rx.wait_for(|stop| *stop).await.is_ok();
    if !requested {
        std::future::pending::<()>().await;
    }
}
