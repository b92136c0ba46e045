//! `relay chat`: interactive initiator on stdin/stdout.
//!
//! Each non-empty line is one request; the reply is printed before the next
//! line is sent. An empty line or end of input ends the session.

use crate::config::load_config;
use relay_client::{backoff, validate_url, ChannelOperator, Role, Session, SessionExit};
use relay_types::config::{AgentConfig, RoleConfig};
use relay_types::{RelayError, RelayResult};
use std::io::BufRead;
use std::path::PathBuf;
use tokio::sync::{mpsc, watch};
use tracing::info;

pub fn cmd_chat(
    config: Option<PathBuf>,
    name: String,
    target: Option<String>,
    url: Option<String>,
) {
    let agent = load_config(config.as_deref()).agent;
    super::run_or_exit(async move {
        let target = resolve_target(&agent, target)?;
        let broker_url = url.unwrap_or_else(|| agent.broker_url.clone());
        validate_url(&broker_url).map_err(|e| RelayError::Config(e.to_string()))?;

        let (operator, request_tx, reply_rx) = ChannelOperator::new();
        let session = Session::new(name, broker_url, Role::initiator(target, operator))
            .with_backoff(backoff::from_config(&agent.backoff));
        spawn_stdin_reader(request_tx);
        run_chat(session, reply_rx).await
    });
}

fn resolve_target(agent: &AgentConfig, target: Option<String>) -> RelayResult<String> {
    match (target, &agent.role) {
        (Some(target), _) => Ok(target),
        (None, Some(RoleConfig::Initiator { target })) => Ok(target.clone()),
        (None, _) => Err(RelayError::Config(
            "--target is required (or set agent.role to an initiator)".into(),
        )),
    }
}

/// Forward stdin lines as requests until an empty line or EOF.
fn spawn_stdin_reader(request_tx: mpsc::UnboundedSender<String>) {
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            let line = line.trim().to_string();
            if line.is_empty() || request_tx.send(line).is_err() {
                break;
            }
        }
    });
}

async fn run_chat(
    session: Session,
    mut reply_rx: mpsc::UnboundedReceiver<String>,
) -> RelayResult<()> {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut session_task = tokio::spawn(session.run(shutdown_rx));
    let printer = tokio::spawn(async move {
        while let Some(reply) = reply_rx.recv().await {
            println!("{reply}");
        }
    });

    let joined = tokio::select! {
        joined = &mut session_task => joined,
        signal = tokio::signal::ctrl_c() => {
            signal?;
            shutdown_tx.send_replace(true);
            session_task.await
        }
    };
    let exit = joined.map_err(|e| RelayError::Network(format!("session task failed: {e}")))?;
    let _ = printer.await;

    if exit == SessionExit::Finished {
        info!("Chat ended");
    }
    Ok(())
}
