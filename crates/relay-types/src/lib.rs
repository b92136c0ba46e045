//! Core types shared by every crate of the agent relay.
//!
//! This crate holds no I/O. It defines the configuration tree loaded by the
//! `relay` binary and the top-level error enum.

pub mod config;
pub mod error;

pub use config::{
    AgentConfig, BackoffConfig, BrokerConfig, RelayConfig, RoleConfig, WorkerConfig,
};
pub use error::{RelayError, RelayResult};
