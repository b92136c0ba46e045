//! Participant roles and their inner loops.
//!
//! A role is assigned by configuration, never inferred from traffic. The
//! session runs the role's inner loop once per established link; the loop
//! returns when the link drops or the role has nothing more to do.

use crate::error::WorkError;
use crate::link::Link;
use crate::session::{mark_active, SessionState};
use crate::worker::Worker;
use async_trait::async_trait;
use relay_wire::{Frame, Notice};
use std::any::Any;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

/// Whether the initiator keeps going after a reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Stop,
}

/// Drives an initiator: supplies requests and consumes replies.
#[async_trait]
pub trait Operator: Send {
    /// Next request payload, or `None` when there is no more work.
    ///
    /// Must be cancel-safe: it is raced against inbound traffic.
    async fn next_request(&mut self) -> Option<String>;

    /// A reply (or an unsolicited inbound message, such as a broker notice).
    async fn on_reply(&mut self, reply: String) -> Flow;

    /// The link dropped. An outstanding request, if any, is lost.
    async fn on_disconnect(&mut self) {}
}

/// [`Operator`] backed by a pair of channels.
///
/// Requests are read from `requests` until it closes; replies are pushed to
/// `replies`. Used by the interactive CLI and by tests.
pub struct ChannelOperator {
    requests: mpsc::UnboundedReceiver<String>,
    replies: mpsc::UnboundedSender<String>,
}

impl ChannelOperator {
    /// Returns the operator along with the request sender and reply receiver.
    pub fn new() -> (
        Self,
        mpsc::UnboundedSender<String>,
        mpsc::UnboundedReceiver<String>,
    ) {
        let (request_tx, requests) = mpsc::unbounded_channel();
        let (replies, reply_rx) = mpsc::unbounded_channel();
        (Self { requests, replies }, request_tx, reply_rx)
    }
}

#[async_trait]
impl Operator for ChannelOperator {
    async fn next_request(&mut self) -> Option<String> {
        self.requests.recv().await
    }

    async fn on_reply(&mut self, reply: String) -> Flow {
        match self.replies.send(reply) {
            Ok(()) => Flow::Continue,
            Err(_) => Flow::Stop,
        }
    }
}

/// Role of a participant.
pub enum Role {
    /// Sends one request to `target`, then waits for exactly one reply.
    Initiator {
        target: String,
        operator: Box<dyn Operator>,
    },
    /// Waits for payloads, runs `worker`, sends the result to `downstream`.
    /// Failed work is reported to `fallback` instead.
    Responder {
        downstream: String,
        fallback: String,
        worker: Arc<dyn Worker>,
    },
}

impl Role {
    pub fn initiator(target: impl Into<String>, operator: impl Operator + 'static) -> Self {
        Self::Initiator {
            target: target.into(),
            operator: Box::new(operator),
        }
    }

    pub fn responder(
        downstream: impl Into<String>,
        fallback: impl Into<String>,
        worker: Arc<dyn Worker>,
    ) -> Self {
        Self::Responder {
            downstream: downstream.into(),
            fallback: fallback.into(),
            worker,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Initiator { .. } => "initiator",
            Self::Responder { .. } => "responder",
        }
    }

    /// Run the inner loop on `link` until it drops or the role finishes.
    ///
    /// The session moves to `Active` once the first unit of work is under way.
    pub(crate) async fn run(
        &mut self,
        link: &mut Link,
        state: &watch::Sender<SessionState>,
    ) -> RoleExit {
        match self {
            Self::Initiator { target, operator } => {
                run_initiator(target, operator.as_mut(), link, state).await
            }
            Self::Responder {
                downstream,
                fallback,
                worker,
            } => run_responder(downstream, fallback, worker, link, state).await,
        }
    }
}

impl fmt::Debug for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Initiator { target, .. } => f
                .debug_struct("Initiator")
                .field("target", target)
                .finish_non_exhaustive(),
            Self::Responder {
                downstream,
                fallback,
                ..
            } => f
                .debug_struct("Responder")
                .field("downstream", downstream)
                .field("fallback", fallback)
                .finish_non_exhaustive(),
        }
    }
}

/// Why an inner loop returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RoleExit {
    /// The transport failed or was closed; reconnect.
    Disconnected,
    /// The role has no more work; end the session.
    Finished,
}

async fn run_initiator(
    target: &str,
    operator: &mut dyn Operator,
    link: &mut Link,
    state: &watch::Sender<SessionState>,
) -> RoleExit {
    let mut awaiting_reply = false;

    loop {
        if awaiting_reply {
            let Some(reply) = link.recv().await else {
                operator.on_disconnect().await;
                return RoleExit::Disconnected;
            };
            awaiting_reply = false;
            if operator.on_reply(reply).await == Flow::Stop {
                return RoleExit::Finished;
            }
            continue;
        }

        tokio::select! {
            request = operator.next_request() => {
                let Some(request) = request else {
                    info!("Initiator has no more requests");
                    return RoleExit::Finished;
                };
                if link.send(&Frame::send(target, request)).is_err() {
                    operator.on_disconnect().await;
                    return RoleExit::Disconnected;
                }
                mark_active(state);
                awaiting_reply = true;
                debug!(to = %target, "Request sent; awaiting reply");
            }
            inbound = link.recv() => {
                let Some(text) = inbound else {
                    operator.on_disconnect().await;
                    return RoleExit::Disconnected;
                };
                if operator.on_reply(text).await == Flow::Stop {
                    return RoleExit::Finished;
                }
            }
        }
    }
}

async fn run_responder(
    downstream: &str,
    fallback: &str,
    worker: &Arc<dyn Worker>,
    link: &mut Link,
    state: &watch::Sender<SessionState>,
) -> RoleExit {
    while let Some(request) = link.recv().await {
        if let Some(notice) = Notice::recognize(&request) {
            warn!("Broker notice: {notice}");
            continue;
        }
        mark_active(state);

        let frame = match perform(worker, request).await {
            Ok(result) => {
                debug!(to = %downstream, "Work done; forwarding result");
                Frame::send(downstream, result)
            }
            Err(e) => {
                warn!(to = %fallback, "Work failed: {e}");
                Frame::send(fallback, format!("Error processing request: {e}"))
            }
        };
        if link.send(&frame).is_err() {
            return RoleExit::Disconnected;
        }
    }
    RoleExit::Disconnected
}

/// Run one unit of work on its own task so a panicking worker is contained.
async fn perform(worker: &Arc<dyn Worker>, request: String) -> Result<String, WorkError> {
    let worker = Arc::clone(worker);
    match tokio::spawn(async move { worker.process(&request).await }).await {
        Ok(result) => result,
        Err(e) if e.is_panic() => Err(WorkError::Panicked(panic_message(e.into_panic()))),
        Err(e) => Err(WorkError::Failed(e.to_string())),
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::worker::EchoWorker;

    struct PanickingWorker;

    #[async_trait]
    impl Worker for PanickingWorker {
        async fn process(&self, _request: &str) -> Result<String, WorkError> {
            panic!("model exploded");
        }
    }

    #[tokio::test]
    async fn test_perform_ok() {
        let worker: Arc<dyn Worker> = Arc::new(EchoWorker::new("> "));
        assert_eq!(perform(&worker, "hi".to_string()).await.unwrap(), "> hi");
    }

    #[tokio::test]
    async fn test_perform_contains_panic() {
        let worker: Arc<dyn Worker> = Arc::new(PanickingWorker);
        match perform(&worker, "hi".to_string()).await {
            Err(WorkError::Panicked(msg)) => assert_eq!(msg, "model exploded"),
            other => panic!("Expected Panicked, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_channel_operator() {
        let (mut op, request_tx, mut reply_rx) = ChannelOperator::new();
        request_tx.send("q1".to_string()).unwrap();
        assert_eq!(op.next_request().await.as_deref(), Some("q1"));

        assert_eq!(op.on_reply("a1".to_string()).await, Flow::Continue);
        assert_eq!(reply_rx.recv().await.as_deref(), Some("a1"));

        drop(request_tx);
        assert_eq!(op.next_request().await, None);

        drop(reply_rx);
        assert_eq!(op.on_reply("late".to_string()).await, Flow::Stop);
    }

    #[test]
    fn test_role_kind_and_debug() {
        let (op, _tx, _rx) = ChannelOperator::new();
        let role = Role::initiator("planner", op);
        assert_eq!(role.kind(), "initiator");
        assert!(format!("{role:?}").contains("planner"));

        let role = Role::responder("reviewer", "user", Arc::new(EchoWorker::default()));
        assert_eq!(role.kind(), "responder");
        assert!(format!("{role:?}").contains("reviewer"));
    }
}
