//! Clap CLI definitions for the relay.

use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;

pub const AFTER_HELP: &str = "\
\x1b[1;36mExamples:\x1b[0m
  relay serve                                   Start the broker on 127.0.0.1:8765
  relay agent --name planner --downstream reviewer --fallback user --exec python3 planner.py
  relay agent --name reviewer --downstream user --fallback user --echo-prefix 'REVIEW: '
  relay chat --name user --target planner       Send requests typed on stdin";

/// Relay: addressed message broker for cooperating agents.
#[derive(Parser)]
#[command(
    name = "relay",
    version,
    about = "Addressed message relay for cooperating agents",
    after_help = AFTER_HELP,
)]
pub struct Cli {
    /// Path to config file.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the broker until Ctrl+C.
    Serve {
        /// Address to listen on (overrides `broker.listen_addr`).
        #[arg(long)]
        listen: Option<SocketAddr>,
    },
    /// Run a responder agent: process each inbound payload and forward the result.
    Agent {
        /// Name to register under (overrides `agent.name`).
        #[arg(long)]
        name: Option<String>,
        /// Broker URL (overrides `agent.broker_url`).
        #[arg(long)]
        url: Option<String>,
        /// Agent that receives results.
        #[arg(long)]
        downstream: Option<String>,
        /// Agent that receives error descriptions for failed work.
        #[arg(long)]
        fallback: Option<String>,
        /// Echo each payload back with this prefix instead of running a program.
        #[arg(long, conflicts_with = "exec")]
        echo_prefix: Option<String>,
        /// Program to run per request; the payload is written to its stdin.
        #[arg(long, num_args = 1.., value_name = "COMMAND", allow_hyphen_values = true)]
        exec: Option<Vec<String>>,
    },
    /// Interactive initiator: send each stdin line to a target and print the reply.
    Chat {
        /// Name to register under.
        #[arg(long, default_value = "user")]
        name: String,
        /// Agent that receives every request.
        #[arg(long)]
        target: Option<String>,
        /// Broker URL (overrides `agent.broker_url`).
        #[arg(long)]
        url: Option<String>,
    },
}
