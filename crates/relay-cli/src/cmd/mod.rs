//! Command implementations.

pub mod agent;
pub mod chat;
pub mod serve;

use relay_types::RelayResult;
use std::future::Future;

/// Run an async command on a fresh runtime; print the error and exit 1 on failure.
pub fn run_or_exit(fut: impl Future<Output = RelayResult<()>>) {
    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create Tokio runtime: {e}");
            std::process::exit(1);
        }
    };
    if let Err(e) = rt.block_on(fut) {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
