//! Router: per-frame dispatch against the registry.
//!
//! The router never fails. Each frame produces a [`DispatchOutcome`] and the
//! connection task decides what, if anything, to send back. Failures are
//! always scoped to the connection that produced them.

use crate::connection::{CloseTransition, Connection};
use crate::registry::Registry;
use relay_wire::{Frame, FrameError, Notice};
use tracing::{debug, info, warn};

/// Result of dispatching one inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The connection is now bound to `name`.
    Registered {
        name: String,
        /// Another connection held the name and was orphaned.
        replaced: bool,
    },
    /// The payload was queued on the target's connection.
    Delivered { target: String },
    /// No open connection holds `target`.
    TargetUnavailable { target: String },
    /// The frame could not be parsed.
    Malformed(FrameError),
    /// The connection was already closed; the frame was dropped.
    ConnectionClosed,
}

impl DispatchOutcome {
    /// Notice to send back to the originating connection.
    pub fn notice(&self) -> Option<Notice> {
        match self {
            Self::TargetUnavailable { target } => Some(Notice::TargetUnavailable(target.clone())),
            Self::Malformed(_) => Some(Notice::Malformed),
            Self::Registered { .. } | Self::Delivered { .. } | Self::ConnectionClosed => None,
        }
    }
}

/// Stateless dispatcher over a shared [`Registry`].
#[derive(Debug, Clone, Default)]
pub struct Router {
    registry: Registry,
}

impl Router {
    pub fn new(registry: Registry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Dispatch one text frame received on `conn`.
    pub fn dispatch(&self, conn: &mut Connection, text: &str) -> DispatchOutcome {
        if !conn.is_open() {
            return DispatchOutcome::ConnectionClosed;
        }

        match Frame::parse(text) {
            Ok(Frame::Register { name }) => self.register(conn, name),
            Ok(Frame::Send { target, payload }) => self.forward(conn, target, payload),
            Err(e) => {
                warn!(
                    connection = %conn.id(),
                    agent = conn.display_name(),
                    error = %e,
                    "Malformed frame: {}",
                    preview(text)
                );
                DispatchOutcome::Malformed(e)
            }
        }
    }

    fn register(&self, conn: &mut Connection, name: String) -> DispatchOutcome {
        // Moving to a new name releases the old one, if still ours.
        if let Some(old) = conn.bind(name.clone()) {
            if old != name && self.registry.unregister(&old, conn.id()) {
                info!(agent = %old, "Agent unregistered (renamed to '{name}')");
            }
        }

        let replaced = self.registry.register(&name, conn.handle().clone());
        if let Some(prev) = &replaced {
            info!(
                agent = %name,
                connection = %conn.id(),
                peer = ?conn.handle().peer_addr(),
                previous = %prev.handle.id(),
                previous_peer = ?prev.handle.peer_addr(),
                held_since = %prev.registered_at,
                "Agent re-registered from a new connection"
            );
        } else {
            info!(
                agent = %name,
                connection = %conn.id(),
                peer = ?conn.handle().peer_addr(),
                "Agent registered"
            );
        }

        DispatchOutcome::Registered {
            name,
            replaced: replaced.is_some(),
        }
    }

    fn forward(&self, conn: &Connection, target: String, payload: String) -> DispatchOutcome {
        let delivered = self
            .registry
            .lookup(&target)
            .map(|handle| handle.send_text(payload))
            .unwrap_or(false);

        if delivered {
            info!("Message routed: {} → {}", conn.display_name(), target);
            DispatchOutcome::Delivered { target }
        } else {
            warn!(
                from = conn.display_name(),
                "Target agent '{}' not available", target
            );
            DispatchOutcome::TargetUnavailable { target }
        }
    }

    /// Close `conn` and release its name. Idempotent.
    pub fn close(&self, conn: &mut Connection) {
        let CloseTransition::Closed { bound_name } = conn.mark_closed() else {
            return;
        };
        match bound_name {
            Some(name) => {
                if self.registry.unregister(&name, conn.id()) {
                    info!(agent = %name, "Agent unregistered");
                } else {
                    debug!(
                        agent = %name,
                        connection = %conn.id(),
                        "Stale connection closed; newer registration kept"
                    );
                }
            }
            None => debug!(connection = %conn.id(), "Unregistered connection closed"),
        }
    }
}

/// First 50 characters of a frame, for log lines.
fn preview(text: &str) -> String {
    let mut out: String = text.chars().take(50).collect();
    if out.len() < text.len() {
        out.push_str("...");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::{ConnectionHandle, Outbound};
    use tokio::sync::mpsc::UnboundedReceiver;

    fn open() -> (Connection, UnboundedReceiver<Outbound>) {
        let (handle, rx) = ConnectionHandle::new(None);
        (Connection::new(handle), rx)
    }

    fn drain(rx: &mut UnboundedReceiver<Outbound>) -> Vec<Outbound> {
        let mut out = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            out.push(msg);
        }
        out
    }

    #[test]
    fn test_register_binds_connection() {
        let router = Router::default();
        let (mut conn, _rx) = open();

        let outcome = router.dispatch(&mut conn, "register:planner");
        assert_eq!(
            outcome,
            DispatchOutcome::Registered {
                name: "planner".to_string(),
                replaced: false
            }
        );
        assert_eq!(conn.bound_name(), Some("planner"));
        assert_eq!(
            router.registry().lookup("planner").unwrap().id(),
            conn.id()
        );
        assert!(outcome.notice().is_none());
    }

    #[test]
    fn test_send_delivers_payload_verbatim() {
        let router = Router::default();
        let (mut planner, mut planner_rx) = open();
        let (mut user, mut user_rx) = open();
        router.dispatch(&mut planner, "register:planner");
        router.dispatch(&mut user, "register:user");

        let outcome = router.dispatch(&mut user, "send:planner:Make me a plan: 3 days");
        assert_eq!(
            outcome,
            DispatchOutcome::Delivered {
                target: "planner".to_string()
            }
        );
        assert_eq!(
            drain(&mut planner_rx),
            vec![Outbound::Text("Make me a plan: 3 days".to_string())]
        );
        assert!(drain(&mut user_rx).is_empty());
    }

    #[test]
    fn test_unregistered_sender_may_send() {
        let router = Router::default();
        let (mut planner, mut planner_rx) = open();
        let (mut anon, _anon_rx) = open();
        router.dispatch(&mut planner, "register:planner");

        let outcome = router.dispatch(&mut anon, "send:planner:hi");
        assert!(matches!(outcome, DispatchOutcome::Delivered { .. }));
        assert_eq!(drain(&mut planner_rx).len(), 1);
    }

    #[test]
    fn test_miss_yields_notice_and_leaves_registry() {
        let router = Router::default();
        let (mut user, _rx) = open();
        router.dispatch(&mut user, "register:user");
        let before = router.registry().names();

        let outcome = router.dispatch(&mut user, "send:ghost:hi");
        assert_eq!(
            outcome,
            DispatchOutcome::TargetUnavailable {
                target: "ghost".to_string()
            }
        );
        assert_eq!(
            outcome.notice().unwrap().to_string(),
            "Error: Agent 'ghost' not available"
        );
        assert_eq!(router.registry().names(), before);
    }

    #[test]
    fn test_malformed_frame_keeps_connection_open() {
        let router = Router::default();
        let (mut x, _x_rx) = open();

        let outcome = router.dispatch(&mut x, "garbage-no-colons");
        assert_eq!(
            outcome,
            DispatchOutcome::Malformed(FrameError::MissingDelimiter)
        );
        assert_eq!(outcome.notice(), Some(Notice::Malformed));
        assert!(x.is_open());

        // Subsequent frames on the same connection are still processed.
        let outcome = router.dispatch(&mut x, "register:x");
        assert!(matches!(outcome, DispatchOutcome::Registered { .. }));
    }

    #[test]
    fn test_fault_isolation() {
        let router = Router::default();
        let (mut x, _x_rx) = open();
        let (mut y, mut y_rx) = open();
        let (mut z, mut z_rx) = open();
        router.dispatch(&mut y, "register:y");
        router.dispatch(&mut z, "register:z");

        assert!(matches!(
            router.dispatch(&mut x, "garbage-no-colons"),
            DispatchOutcome::Malformed(_)
        ));
        assert!(matches!(
            router.dispatch(&mut y, "send:z:question"),
            DispatchOutcome::Delivered { .. }
        ));
        assert!(matches!(
            router.dispatch(&mut z, "send:y:answer"),
            DispatchOutcome::Delivered { .. }
        ));
        assert_eq!(
            drain(&mut z_rx),
            vec![Outbound::Text("question".to_string())]
        );
        assert_eq!(drain(&mut y_rx), vec![Outbound::Text("answer".to_string())]);
    }

    #[test]
    fn test_order_preserved_per_pair() {
        let router = Router::default();
        let (mut sender, _s_rx) = open();
        let (mut target, mut t_rx) = open();
        router.dispatch(&mut target, "register:target");

        for m in ["m1", "m2", "m3"] {
            router.dispatch(&mut sender, &format!("send:target:{m}"));
        }
        assert_eq!(
            drain(&mut t_rx),
            vec![
                Outbound::Text("m1".to_string()),
                Outbound::Text("m2".to_string()),
                Outbound::Text("m3".to_string()),
            ]
        );
    }

    #[test]
    fn test_last_writer_wins_and_stale_close() {
        let router = Router::default();
        let (mut c1, mut c1_rx) = open();
        let (mut c2, mut c2_rx) = open();
        let (mut user, _user_rx) = open();

        router.dispatch(&mut c1, "register:A");
        let outcome = router.dispatch(&mut c2, "register:A");
        assert_eq!(
            outcome,
            DispatchOutcome::Registered {
                name: "A".to_string(),
                replaced: true
            }
        );

        router.close(&mut c1);
        assert_eq!(router.registry().lookup("A").unwrap().id(), c2.id());

        router.dispatch(&mut user, "send:A:hello");
        assert!(drain(&mut c1_rx).is_empty());
        assert_eq!(drain(&mut c2_rx), vec![Outbound::Text("hello".to_string())]);
    }

    #[test]
    fn test_close_unregisters_and_is_terminal() {
        let router = Router::default();
        let (mut conn, _rx) = open();
        router.dispatch(&mut conn, "register:planner");

        router.close(&mut conn);
        assert!(router.registry().lookup("planner").is_none());
        assert!(router.registry().is_empty());
        assert_eq!(
            router.dispatch(&mut conn, "register:planner"),
            DispatchOutcome::ConnectionClosed
        );
        assert!(router.registry().is_empty());

        // Second close is a no-op.
        router.close(&mut conn);
    }

    #[test]
    fn test_rename_releases_old_name() {
        let router = Router::default();
        let (mut conn, _rx) = open();
        router.dispatch(&mut conn, "register:old");
        router.dispatch(&mut conn, "register:new");

        assert!(router.registry().lookup("old").is_none());
        assert_eq!(router.registry().lookup("new").unwrap().id(), conn.id());
    }

    #[test]
    fn test_rename_does_not_steal_reregistered_name() {
        let router = Router::default();
        let (mut c1, _rx1) = open();
        let (mut c2, _rx2) = open();
        router.dispatch(&mut c1, "register:A");
        router.dispatch(&mut c2, "register:A");
        router.dispatch(&mut c1, "register:B");

        assert_eq!(router.registry().lookup("A").unwrap().id(), c2.id());
        assert_eq!(router.registry().lookup("B").unwrap().id(), c1.id());
    }

    #[test]
    fn test_send_to_closed_target_is_unavailable() {
        let router = Router::default();
        let (mut target, target_rx) = open();
        let (mut sender, _rx) = open();
        router.dispatch(&mut target, "register:target");
        drop(target_rx);

        assert_eq!(
            router.dispatch(&mut sender, "send:target:hi"),
            DispatchOutcome::TargetUnavailable {
                target: "target".to_string()
            }
        );
    }

    #[test]
    fn test_preview_truncates() {
        assert_eq!(preview("short"), "short");
        let long = "x".repeat(80);
        assert_eq!(preview(&long), format!("{}...", "x".repeat(50)));
    }
}
