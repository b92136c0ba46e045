//! Agent relay broker: addressed point-to-point message forwarding.
//!
//! Participants open one WebSocket each, announce a name with
//! `register:<name>`, and address each other with `send:<target>:<payload>`.
//! The broker forwards payloads verbatim to whoever currently holds the
//! target name.
//!
//! ## Architecture
//!
//! - **Connection**: per-participant routing state plus a cloneable write handle
//! - **Registry**: name → connection table, last writer wins
//! - **Router**: turns each frame into a [`DispatchOutcome`]
//! - **Broker**: TCP/WebSocket server, one task per connection, keepalive

pub mod connection;
pub mod registry;
pub mod router;
pub mod server;

pub use connection::{Connection, ConnectionHandle, ConnectionId, ConnectionState, Outbound};
pub use registry::{Registry, RegistryEntry};
pub use router::{DispatchOutcome, Router};
pub use server::{Broker, BrokerError};
