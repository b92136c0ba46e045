//! Relay CLI: run the broker or a participant session.
//!
//! `relay serve` hosts the broker. `relay agent` runs a responder that turns
//! each inbound payload into a result for its downstream agent. `relay chat`
//! is an interactive initiator reading requests from stdin.

mod cli;
mod cmd;
mod config;

use crate::cli::{Cli, Commands};
use clap::Parser;

fn init_tracing_stderr() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_tracing_stderr();

    match cli.command {
        Commands::Serve { listen } => cmd::serve::cmd_serve(cli.config, listen),
        Commands::Agent {
            name,
            url,
            downstream,
            fallback,
            echo_prefix,
            exec,
        } => cmd::agent::cmd_agent(
            cli.config,
            cmd::agent::AgentOverrides {
                name,
                url,
                downstream,
                fallback,
                echo_prefix,
                exec,
            },
        ),
        Commands::Chat { name, target, url } => cmd::chat::cmd_chat(cli.config, name, target, url),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_agent_exec() {
        let cli = Cli::parse_from([
            "relay",
            "--config",
            "/tmp/relay.toml",
            "agent",
            "--name",
            "planner",
            "--downstream",
            "reviewer",
            "--exec",
            "python3",
            "planner.py",
        ]);
        assert_eq!(
            cli.config.as_deref(),
            Some(std::path::Path::new("/tmp/relay.toml"))
        );
        match cli.command {
            Commands::Agent { name, exec, .. } => {
                assert_eq!(name.as_deref(), Some("planner"));
                assert_eq!(
                    exec,
                    Some(vec!["python3".to_string(), "planner.py".to_string()])
                );
            }
            _ => panic!("Expected agent command"),
        }
    }

    #[test]
    fn test_parse_chat_defaults() {
        let cli = Cli::parse_from(["relay", "chat", "--target", "planner"]);
        match cli.command {
            Commands::Chat { name, target, url } => {
                assert_eq!(name, "user");
                assert_eq!(target.as_deref(), Some("planner"));
                assert!(url.is_none());
            }
            _ => panic!("Expected chat command"),
        }
    }

    #[test]
    fn test_echo_and_exec_conflict() {
        let result = Cli::try_parse_from([
            "relay",
            "agent",
            "--echo-prefix",
            "x",
            "--exec",
            "cat",
        ]);
        assert!(result.is_err());
    }
}
