//! `relay agent`: run a responder session.

use crate::config::load_config;
use relay_client::{backoff, validate_url, worker, Role, Session};
use relay_types::config::{AgentConfig, RoleConfig, WorkerConfig};
use relay_types::{RelayError, RelayResult};
use std::path::PathBuf;
use tracing::info;

/// Command-line values that override `[agent]` in the config file.
#[derive(Debug, Default)]
pub struct AgentOverrides {
    pub name: Option<String>,
    pub url: Option<String>,
    pub downstream: Option<String>,
    pub fallback: Option<String>,
    pub echo_prefix: Option<String>,
    pub exec: Option<Vec<String>>,
}

pub fn cmd_agent(config: Option<PathBuf>, overrides: AgentOverrides) {
    let agent = load_config(config.as_deref()).agent;
    super::run_or_exit(async move {
        let session = build_session(agent, overrides)?;
        run_agent(session).await
    });
}

/// Resolve the responder session from config plus overrides.
pub fn build_session(agent: AgentConfig, overrides: AgentOverrides) -> RelayResult<Session> {
    let name = overrides
        .name
        .or(agent.name)
        .ok_or_else(|| RelayError::Config("agent name is required (--name or agent.name)".into()))?;

    let broker_url = overrides.url.unwrap_or(agent.broker_url);
    validate_url(&broker_url).map_err(|e| RelayError::Config(e.to_string()))?;

    let (cfg_downstream, cfg_fallback) = match agent.role {
        Some(RoleConfig::Responder {
            downstream,
            fallback,
        }) => (Some(downstream), Some(fallback)),
        Some(RoleConfig::Initiator { .. }) if overrides.downstream.is_none() => {
            return Err(RelayError::Config(
                "agent.role is an initiator; use `relay chat` or pass --downstream".into(),
            ));
        }
        _ => (None, None),
    };
    let downstream = overrides
        .downstream
        .or(cfg_downstream)
        .ok_or_else(|| RelayError::Config("--downstream is required for a responder".into()))?;
    let fallback = overrides
        .fallback
        .or(cfg_fallback)
        .unwrap_or_else(|| downstream.clone());

    let worker_config = match (overrides.echo_prefix, overrides.exec) {
        (Some(prefix), _) => WorkerConfig::Echo { prefix },
        (None, Some(command)) => {
            let mut parts = command.into_iter();
            let program = parts
                .next()
                .ok_or_else(|| RelayError::Config("--exec needs a program".into()))?;
            let timeout_secs = match agent.worker {
                WorkerConfig::Command { timeout_secs, .. } => timeout_secs,
                WorkerConfig::Echo { .. } => 120,
            };
            WorkerConfig::Command {
                program,
                args: parts.collect(),
                timeout_secs,
            }
        }
        (None, None) => agent.worker,
    };

    info!(
        agent = %name,
        downstream = %downstream,
        fallback = %fallback,
        "Responder configured"
    );
    let role = Role::responder(downstream, fallback, worker::from_config(&worker_config));
    Ok(Session::new(name, broker_url, role).with_backoff(backoff::from_config(&agent.backoff)))
}

async fn run_agent(session: Session) -> RelayResult<()> {
    let handle = session.spawn();
    tokio::signal::ctrl_c().await?;
    info!("Ctrl+C received");
    handle.shutdown();
    handle
        .join()
        .await
        .map_err(|e| RelayError::Network(format!("session task failed: {e}")))?;
    Ok(())
}
