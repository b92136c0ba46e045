//! Configuration tree for the broker and for agent sessions.
//!
//! Every struct is `#[serde(default)]` so a partial `config.toml` only has to
//! name the values it changes.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;

/// Default broker listen address.
pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:8765";

/// Default broker URL used by agents.
pub const DEFAULT_BROKER_URL: &str = "ws://127.0.0.1:8765";

/// Maximum single frame size (16 MB).
pub const DEFAULT_MAX_FRAME_BYTES: usize = 16 * 1024 * 1024;

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Broker process settings.
    pub broker: BrokerConfig,
    /// Agent (client session) settings.
    pub agent: AgentConfig,
}

/// Settings for the broker process.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    /// Address to bind the listener on.
    pub listen_addr: SocketAddr,
    /// Interval between keepalive pings sent on every connection.
    pub ping_interval_secs: u64,
    /// A connection silent for longer than this is closed at the next ping tick.
    pub ping_timeout_secs: u64,
    /// Largest accepted frame, in bytes.
    pub max_frame_bytes: usize,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 8765)),
            ping_interval_secs: 20,
            ping_timeout_secs: 60,
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
        }
    }
}

impl BrokerConfig {
    /// Keepalive ping interval. Never zero.
    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_secs.max(1))
    }

    /// Silence window after which a connection is considered dead.
    pub fn ping_timeout(&self) -> Duration {
        Duration::from_secs(self.ping_timeout_secs)
    }
}

/// Settings for one agent session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// WebSocket URL of the broker.
    pub broker_url: String,
    /// Name to register under.
    pub name: Option<String>,
    /// Role of this participant. Assigned here, never inferred from traffic.
    pub role: Option<RoleConfig>,
    /// Delay policy between reconnect attempts.
    pub backoff: BackoffConfig,
    /// Work source used by the responder role.
    pub worker: WorkerConfig,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            broker_url: DEFAULT_BROKER_URL.to_string(),
            name: None,
            role: None,
            backoff: BackoffConfig::default(),
            worker: WorkerConfig::default(),
        }
    }
}

/// Participant role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RoleConfig {
    /// Drives work: sends one request to `target`, waits for one reply.
    Initiator {
        /// Agent that receives every request.
        target: String,
    },
    /// Reacts to work: processes each inbound payload and forwards the result.
    Responder {
        /// Agent that receives successful results.
        downstream: String,
        /// Agent that receives error descriptions when work fails.
        fallback: String,
    },
}

/// Reconnect backoff policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackoffConfig {
    /// Reconnect immediately.
    None,
    /// Same delay before every attempt.
    Constant {
        /// Delay in milliseconds.
        delay_ms: u64,
    },
    /// Doubling delay, capped.
    Exponential {
        /// First delay in milliseconds.
        min_delay_ms: u64,
        /// Upper bound in milliseconds.
        max_delay_ms: u64,
    },
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self::Constant { delay_ms: 5_000 }
    }
}

/// Responder work source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WorkerConfig {
    /// Reply with the payload, optionally prefixed.
    Echo {
        #[serde(default)]
        prefix: String,
    },
    /// Pipe the payload into an external program; its stdout is the result.
    Command {
        program: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default = "default_command_timeout_secs")]
        timeout_secs: u64,
    },
}

fn default_command_timeout_secs() -> u64 {
    120
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self::Echo {
            prefix: String::new(),
        }
    }
}
