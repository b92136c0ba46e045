//! Agent registry: the broker's table of currently reachable names.
//!
//! The [`Registry`] is a thread-safe mapping from agent name to the
//! connection that registered it most recently. Every access goes through a
//! single lock, so a `register` racing an `unregister` for the same name is
//! resolved by the identity check in [`Registry::unregister`].

use crate::connection::{ConnectionHandle, ConnectionId};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// A single binding of a name to a connection.
#[derive(Debug, Clone)]
pub struct RegistryEntry {
    /// Agent name.
    pub name: String,
    /// Connection currently holding the name.
    pub handle: ConnectionHandle,
    /// When this binding was made.
    pub registered_at: DateTime<Utc>,
}

/// Thread-safe name → connection table.
#[derive(Debug, Clone)]
pub struct Registry {
    entries: Arc<RwLock<HashMap<String, RegistryEntry>>>,
}

impl Registry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Bind `name` to `handle`, replacing any prior binding.
    ///
    /// Returns the binding this one replaced, if it belonged to a different
    /// connection. That connection is left open and simply orphaned.
    pub fn register(&self, name: &str, handle: ConnectionHandle) -> Option<RegistryEntry> {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        let previous = entries.insert(
            name.to_string(),
            RegistryEntry {
                name: name.to_string(),
                handle: handle.clone(),
                registered_at: Utc::now(),
            },
        );
        previous.filter(|prev| prev.handle.id() != handle.id())
    }

    /// Current open connection for `name`. Absent is a normal result.
    pub fn lookup(&self, name: &str) -> Option<ConnectionHandle> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries
            .get(name)
            .filter(|entry| entry.handle.is_open())
            .map(|entry| entry.handle.clone())
    }

    /// Remove the binding for `name` only if it is still held by `id`.
    ///
    /// Returns `true` if a binding was removed. A stale connection closing
    /// after its name was re-registered elsewhere removes nothing.
    pub fn unregister(&self, name: &str, id: ConnectionId) -> bool {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        match entries.get(name) {
            Some(entry) if entry.handle.id() == id => {
                entries.remove(name);
                true
            }
            _ => false,
        }
    }

    /// Snapshot of a single binding.
    pub fn get(&self, name: &str) -> Option<RegistryEntry> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries.get(name).cloned()
    }

    /// Names currently bound, sorted.
    pub fn names(&self) -> Vec<String> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        let mut names: Vec<String> = entries.keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of bindings.
    pub fn len(&self) -> usize {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::Outbound;
    use tokio::sync::mpsc::UnboundedReceiver;

    fn make_handle() -> (ConnectionHandle, UnboundedReceiver<Outbound>) {
        ConnectionHandle::new(None)
    }

    #[test]
    fn test_register_and_lookup() {
        let registry = Registry::new();
        let (c1, _rx1) = make_handle();
        assert!(registry.register("planner", c1.clone()).is_none());

        assert_eq!(registry.lookup("planner").unwrap().id(), c1.id());
        assert!(registry.lookup("reviewer").is_none());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_names_are_case_sensitive() {
        let registry = Registry::new();
        let (c1, _rx1) = make_handle();
        registry.register("Planner", c1);
        assert!(registry.lookup("planner").is_none());
        assert!(registry.lookup("Planner").is_some());
    }

    #[test]
    fn test_last_writer_wins() {
        let registry = Registry::new();
        let (c1, _rx1) = make_handle();
        let (c2, _rx2) = make_handle();

        registry.register("A", c1.clone());
        let replaced = registry.register("A", c2.clone()).unwrap();
        assert_eq!(replaced.name, "A");
        assert_eq!(replaced.handle.id(), c1.id());
        assert!(replaced.registered_at <= registry.get("A").unwrap().registered_at);
        assert_eq!(registry.lookup("A").unwrap().id(), c2.id());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_reregister_same_connection_reports_no_replacement() {
        let registry = Registry::new();
        let (c1, _rx1) = make_handle();
        registry.register("A", c1.clone());
        assert!(registry.register("A", c1).is_none());
    }

    #[test]
    fn test_stale_unregister_keeps_newer_binding() {
        let registry = Registry::new();
        let (c1, _rx1) = make_handle();
        let (c2, _rx2) = make_handle();

        registry.register("A", c1.clone());
        registry.register("A", c2.clone());

        // C1 closes late: must not erase C2's registration.
        assert!(!registry.unregister("A", c1.id()));
        assert_eq!(registry.lookup("A").unwrap().id(), c2.id());

        assert!(registry.unregister("A", c2.id()));
        assert!(registry.lookup("A").is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_unregister_unknown_name() {
        let registry = Registry::new();
        let (c1, _rx1) = make_handle();
        assert!(!registry.unregister("ghost", c1.id()));
    }

    #[test]
    fn test_lookup_skips_closed_connection() {
        let registry = Registry::new();
        let (c1, rx1) = make_handle();
        registry.register("A", c1);
        drop(rx1);
        assert!(registry.lookup("A").is_none());
        // The entry itself stays until its owner unregisters it.
        assert!(registry.get("A").is_some());
    }

    #[test]
    fn test_unrelated_names_unaffected() {
        let registry = Registry::new();
        let (c1, _rx1) = make_handle();
        let (c2, _rx2) = make_handle();
        registry.register("planner", c1.clone());
        registry.register("reviewer", c2.clone());

        registry.unregister("planner", c1.id());
        assert_eq!(registry.lookup("reviewer").unwrap().id(), c2.id());
        assert_eq!(registry.names(), vec!["reviewer".to_string()]);
    }

    #[test]
    fn test_concurrent_register_unregister() {
        let registry = Registry::new();
        let mut threads = Vec::new();
        for i in 0..8 {
            let registry = registry.clone();
            threads.push(std::thread::spawn(move || {
                let (handle, _rx) = ConnectionHandle::new(None);
                let name = format!("agent-{i}");
                for _ in 0..100 {
                    registry.register(&name, handle.clone());
                    assert!(registry.get(&name).is_some());
                    assert!(registry.unregister(&name, handle.id()));
                }
                registry.register(&name, handle);
            }));
        }
        for t in threads {
            t.join().unwrap();
        }
        assert_eq!(registry.len(), 8);
    }
}
