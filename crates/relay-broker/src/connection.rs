//! Broker-side view of one participant connection.
//!
//! A [`ConnectionHandle`] is the cheap, cloneable write side: the registry
//! stores it and the router forwards payloads through it. The socket itself
//! is owned by the connection task, which drains the handle's queue in order.
//! A [`Connection`] wraps the handle together with the per-connection routing
//! state (lifecycle and bound name) and is owned by that same task.

use std::fmt;
use std::net::SocketAddr;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Unique identity of one transport session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Instruction queued for the connection task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// Write one text frame.
    Text(String),
    /// Close the transport.
    Close,
}

/// Write handle for a connection.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: ConnectionId,
    peer_addr: Option<SocketAddr>,
    tx: mpsc::UnboundedSender<Outbound>,
}

impl ConnectionHandle {
    /// Create a handle and the queue its connection task must drain.
    pub fn new(peer_addr: Option<SocketAddr>) -> (Self, mpsc::UnboundedReceiver<Outbound>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = Self {
            id: ConnectionId::new(),
            peer_addr,
            tx,
        };
        (handle, rx)
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer_addr
    }

    /// Whether the connection task is still draining the queue.
    pub fn is_open(&self) -> bool {
        !self.tx.is_closed()
    }

    /// Queue a text frame. Returns `false` if the connection is gone.
    pub fn send_text(&self, text: impl Into<String>) -> bool {
        self.tx.send(Outbound::Text(text.into())).is_ok()
    }

    /// Ask the connection task to close the transport.
    pub fn close(&self) -> bool {
        self.tx.send(Outbound::Close).is_ok()
    }
}

impl PartialEq for ConnectionHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ConnectionHandle {}

/// Lifecycle of a connection as the router sees it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Receiving frames; may or may not be bound to a name.
    Open,
    /// Terminal. No further frames are processed.
    Closed,
}

/// Result of [`Connection::mark_closed`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum CloseTransition {
    /// A previous call already closed the connection.
    AlreadyClosed,
    /// Open -> Closed happened on this call.
    Closed { bound_name: Option<String> },
}

/// Routing state for one connection, owned by its connection task.
#[derive(Debug)]
pub struct Connection {
    handle: ConnectionHandle,
    bound_name: Option<String>,
    state: ConnectionState,
}

impl Connection {
    pub fn new(handle: ConnectionHandle) -> Self {
        Self {
            handle,
            bound_name: None,
            state: ConnectionState::Open,
        }
    }

    pub fn handle(&self) -> &ConnectionHandle {
        &self.handle
    }

    pub fn id(&self) -> ConnectionId {
        self.handle.id
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        self.state == ConnectionState::Open
    }

    /// Name this connection is currently registered under, if any.
    pub fn bound_name(&self) -> Option<&str> {
        self.bound_name.as_deref()
    }

    /// Name used in log lines.
    pub fn display_name(&self) -> &str {
        self.bound_name.as_deref().unwrap_or("<unregistered>")
    }

    pub(crate) fn bind(&mut self, name: String) -> Option<String> {
        self.bound_name.replace(name)
    }

    /// Transition to `Closed`, handing back the name that was bound.
    pub(crate) fn mark_closed(&mut self) -> CloseTransition {
        if self.state == ConnectionState::Closed {
            return CloseTransition::AlreadyClosed;
        }
        self.state = ConnectionState::Closed;
        CloseTransition::Closed {
            bound_name: self.bound_name.take(),
        }
    }
}
