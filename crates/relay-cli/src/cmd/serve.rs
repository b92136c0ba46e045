//! `relay serve`: run the broker.

use crate::config::load_config;
use relay_broker::Broker;
use relay_types::config::BrokerConfig;
use relay_types::{RelayError, RelayResult};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

/// How long to wait for connections to close after Ctrl+C.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

pub fn cmd_serve(config: Option<PathBuf>, listen: Option<SocketAddr>) {
    let broker_config = broker_config(config, listen);
    super::run_or_exit(serve(broker_config));
}

fn broker_config(config: Option<PathBuf>, listen: Option<SocketAddr>) -> BrokerConfig {
    let mut broker_config = load_config(config.as_deref()).broker;
    if let Some(addr) = listen {
        broker_config.listen_addr = addr;
    }
    broker_config
}

async fn serve(config: BrokerConfig) -> RelayResult<()> {
    let (broker, mut accept_task) = Broker::start(config)
        .await
        .map_err(|e| RelayError::Startup(e.to_string()))?;

    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal?;
            info!("Ctrl+C received");
            broker.shutdown();
            if tokio::time::timeout(SHUTDOWN_GRACE, &mut accept_task).await.is_err() {
                warn!("Connections did not close within {SHUTDOWN_GRACE:?}");
                accept_task.abort();
            }
        }
        result = &mut accept_task => {
            if let Err(e) = result {
                return Err(RelayError::Network(format!("accept loop failed: {e}")));
            }
        }
    }
    Ok(())
}
