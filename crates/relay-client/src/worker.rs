//! Responder work sources.
//!
//! A [`Worker`] turns one inbound payload into one result. The responder
//! treats every `Err` as a failed unit of work and keeps going.

use crate::error::WorkError;
use async_trait::async_trait;
use relay_types::config::WorkerConfig;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

/// Maximum stderr characters carried into a [`WorkError::Exit`].
const STDERR_LIMIT: usize = 500;

/// Performs the work behind a responder.
#[async_trait]
pub trait Worker: Send + Sync {
    async fn process(&self, request: &str) -> Result<String, WorkError>;
}

/// Replies with the request, prefixed.
#[derive(Debug, Clone, Default)]
pub struct EchoWorker {
    pub prefix: String,
}

impl EchoWorker {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }
}

#[async_trait]
impl Worker for EchoWorker {
    async fn process(&self, request: &str) -> Result<String, WorkError> {
        Ok(format!("{}{}", self.prefix, request))
    }
}

/// Runs an external program per request.
///
/// The request is written to the program's stdin, and its trimmed stdout is
/// the result. A non-zero exit status or exceeding `timeout` fails the unit of
/// work; the child is killed when it times out.
#[derive(Debug, Clone)]
pub struct CommandWorker {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandWorker {
    pub fn new(program: impl Into<String>, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args,
            timeout,
        }
    }
}

#[async_trait]
impl Worker for CommandWorker {
    async fn process(&self, request: &str) -> Result<String, WorkError> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        // Stdin is fed from its own task while output is collected.
        if let Some(mut stdin) = child.stdin.take() {
            let input = request.to_string();
            tokio::spawn(async move {
                if let Err(e) = stdin.write_all(input.as_bytes()).await {
                    debug!("Worker stdin write failed: {e}");
                }
            });
        }

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(result) => result?,
            Err(_) => {
                warn!(program = %self.program, "Worker timed out after {:?}", self.timeout);
                return Err(WorkError::Timeout(self.timeout));
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(WorkError::Exit {
                status: output.status.to_string(),
                stderr: stderr.trim().chars().take(STDERR_LIMIT).collect(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

/// Build the worker named by configuration.
pub fn from_config(config: &WorkerConfig) -> Arc<dyn Worker> {
    match config {
        WorkerConfig::Echo { prefix } => Arc::new(EchoWorker::new(prefix.clone())),
        WorkerConfig::Command {
            program,
            args,
            timeout_secs,
        } => Arc::new(CommandWorker::new(
            program.clone(),
            args.clone(),
            Duration::from_secs(*timeout_secs),
        )),
    }
}
