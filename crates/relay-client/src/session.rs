//! Reconnecting client session.
//!
//! ```text
//! Disconnected ─► Connecting ─► Registered ─► Active
//!      ▲              │              │           │
//!      └──── backoff ◄┴──────────────┴───────────┘
//! ```
//!
//! The outer loop connects, registers the session's name and hands the link to
//! the role's inner loop. Any transport failure, including a clean close by the
//! broker, sends it back to `Disconnected`, where the backoff policy decides how
//! long to wait. There is no retry limit. The loop ends only when the role
//! finishes or shutdown is requested.

use crate::backoff::{BackoffPolicy, ConstantBackoff};
use crate::link::Link;
use crate::role::{Role, RoleExit};
use relay_wire::Frame;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Observable state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No link; waiting out the backoff delay (or not started yet).
    Disconnected,
    /// Establishing the transport.
    Connecting,
    /// Registration sent; no work has happened on this link yet.
    Registered,
    /// At least one unit of work has happened on this link.
    Active,
    /// Terminal.
    Stopped,
}

impl SessionState {
    /// Registered on the current link, whether or not work has started.
    pub fn is_registered(self) -> bool {
        matches!(self, Self::Registered | Self::Active)
    }
}

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionExit {
    /// The role ran out of work.
    Finished,
    /// Shutdown was requested.
    Shutdown,
}

pub(crate) fn mark_active(state: &watch::Sender<SessionState>) {
    state.send_if_modified(|current| {
        if *current == SessionState::Registered {
            *current = SessionState::Active;
            true
        } else {
            false
        }
    });
}

/// A named participant that keeps itself registered with the broker.
pub struct Session {
    name: String,
    broker_url: String,
    role: Role,
    backoff: Arc<dyn BackoffPolicy>,
    state_tx: watch::Sender<SessionState>,
    registrations: Arc<AtomicU64>,
}

impl Session {
    /// New session using the default constant backoff.
    pub fn new(name: impl Into<String>, broker_url: impl Into<String>, role: Role) -> Self {
        let (state_tx, _) = watch::channel(SessionState::Disconnected);
        Self {
            name: name.into(),
            broker_url: broker_url.into(),
            role,
            backoff: Arc::new(ConstantBackoff::default()),
            state_tx,
            registrations: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Replace the reconnect delay policy.
    pub fn with_backoff(mut self, backoff: Arc<dyn BackoffPolicy>) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn broker_url(&self) -> &str {
        &self.broker_url
    }

    pub fn role(&self) -> &Role {
        &self.role
    }

    /// Watch the session's state.
    pub fn state(&self) -> watch::Receiver<SessionState> {
        self.state_tx.subscribe()
    }

    /// Run on a new task, returning a handle to observe and stop it.
    pub fn spawn(self) -> SessionHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let state_rx = self.state();
        let registrations = Arc::clone(&self.registrations);
        let task = tokio::spawn(self.run(shutdown_rx));
        SessionHandle {
            state_rx,
            registrations,
            shutdown_tx,
            task,
        }
    }

    /// Run the outer loop until the role finishes or `shutdown` turns `true`.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> SessionExit {
        let mut attempt: u32 = 0;
        info!(
            agent = %self.name,
            role = self.role.kind(),
            url = %self.broker_url,
            "Session starting"
        );

        let exit = loop {
            if *shutdown.borrow() {
                break SessionExit::Shutdown;
            }

            self.state_tx.send_replace(SessionState::Connecting);
            let connected = tokio::select! {
                result = Link::connect(&self.broker_url) => result,
                _ = wait_for_shutdown(&mut shutdown) => break SessionExit::Shutdown,
            };

            match connected {
                Ok(mut link) => {
                    if link.send(&Frame::register(self.name.as_str())).is_ok() {
                        self.registrations.fetch_add(1, Ordering::Relaxed);
                        self.state_tx.send_replace(SessionState::Registered);
                        info!(agent = %self.name, "Registered with broker");
                        attempt = 0;

                        let role_exit = tokio::select! {
                            exit = self.role.run(&mut link, &self.state_tx) => Some(exit),
                            _ = wait_for_shutdown(&mut shutdown) => None,
                        };
                        link.close().await;

                        match role_exit {
                            Some(RoleExit::Finished) => break SessionExit::Finished,
                            None => break SessionExit::Shutdown,
                            Some(RoleExit::Disconnected) => {
                                warn!(agent = %self.name, "Connection to broker lost");
                            }
                        }
                    } else {
                        warn!(agent = %self.name, "Connection closed before registration");
                    }
                }
                Err(e) => {
                    if matches!(e, crate::error::ClientError::InvalidUrl(_)) {
                        error!(agent = %self.name, "{e}");
                    } else {
                        warn!(agent = %self.name, "Failed to connect to broker: {e}");
                    }
                }
            }

            self.state_tx.send_replace(SessionState::Disconnected);
            let delay = self.backoff.delay(attempt);
            attempt = attempt.saturating_add(1);
            warn!(agent = %self.name, "Reconnecting in {delay:?} (attempt {attempt})");

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = wait_for_shutdown(&mut shutdown) => break SessionExit::Shutdown,
            }
        };

        self.state_tx.send_replace(SessionState::Stopped);
        info!(agent = %self.name, "Session stopped ({exit:?})");
        exit
    }
}

/// Resolves once `shutdown` is `true`. Never resolves if the sender is gone.
async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    let requested = shutdown.wait_for(|stop| *stop).await.is_ok();
    if !requested {
        std::future::pending::<()>().await;
    }
}

/// Handle to a spawned [`Session`].
pub struct SessionHandle {
    state_rx: watch::Receiver<SessionState>,
    registrations: Arc<AtomicU64>,
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<SessionExit>,
}

impl SessionHandle {
    pub fn state(&self) -> watch::Receiver<SessionState> {
        self.state_rx.clone()
    }

    pub fn current_state(&self) -> SessionState {
        *self.state_rx.borrow()
    }

    /// How many times the session has registered (once per established link).
    pub fn registrations(&self) -> u64 {
        self.registrations.load(Ordering::Relaxed)
    }

    /// Wait until the session is registered on a link.
    ///
    /// Returns `false` if the session stopped first.
    pub async fn registered(&self) -> bool {
        let mut rx = self.state_rx.clone();
        let registered = match rx
            .wait_for(|s| s.is_registered() || *s == SessionState::Stopped)
            .await
        {
            Ok(state) => state.is_registered(),
            Err(_) => false,
        };
        registered
    }

    /// Ask the session to stop at its next suspension point.
    pub fn shutdown(&self) {
        self.shutdown_tx.send_replace(true);
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the session task to end.
    pub async fn join(self) -> Result<SessionExit, tokio::task::JoinError> {
        self.task.await
    }
}
