//! Registry of devices with an open push channel

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, PoisonError, RwLock};

use uuid::Uuid;

use super::types::SessionHandle;

/// Shared session registry
pub type SharedSessionRegistry = Arc<SessionRegistry>;

/// Maps device codes to their live push channel
///
/// At most one handle per device. A newer registration replaces the older
/// one; the replaced connection is not told.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, SessionHandle>>,
}

impl SessionRegistry {
    /// Create a new empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a device's push channel, replacing any previous one
    pub fn register(&self, device_id: &str, handle: SessionHandle) {
        let connection_id = handle.id();
        let replaced = self
            .sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(device_id.to_string(), handle);

        if let Some(old) = replaced {
            tracing::info!(
                device_id = %device_id,
                connection_id = %connection_id,
                replaced = %old.id(),
                replaced_connected_at = %old.connected_at(),
                "device reconnected, replacing push channel"
            );
        } else {
            tracing::info!(device_id = %device_id, connection_id = %connection_id, "device connected");
        }
    }

    /// Register a device's push channel and tie its removal to a guard
    #[must_use = "dropping the guard unregisters the session immediately"]
    pub fn register_guarded(self: &Arc<Self>, device_id: &str, handle: SessionHandle) -> SessionGuard {
        let connection_id = handle.id();
        self.register(device_id, handle);
        SessionGuard {
            registry: Arc::clone(self),
            device_id: device_id.to_string(),
            connection_id,
        }
    }

    /// Remove a device's push channel whatever connection holds it
    ///
    /// The removed connection is told to close its stream.
    pub fn unregister(&self, device_id: &str) -> Option<SessionHandle> {
        let removed = self
            .sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(device_id);

        if let Some(handle) = &removed {
            handle.close();
            tracing::info!(device_id = %device_id, connection_id = %handle.id(), "device unregistered");
        }
        removed
    }

    /// Remove a device's push channel only if `connection_id` still holds it
    ///
    /// Returns true if an entry was removed.
    pub fn release(&self, device_id: &str, connection_id: Uuid) -> bool {
        let mut sessions = self
            .sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner);

        if sessions.get(device_id).is_some_and(|h| h.id() == connection_id) {
            sessions.remove(device_id);
            true
        } else {
            false
        }
    }

    /// Current push channel of a device
    #[must_use]
    pub fn lookup(&self, device_id: &str) -> Option<SessionHandle> {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(device_id)
            .cloned()
    }

    /// Whether the device has a registered push channel
    #[must_use]
    pub fn is_connected(&self, device_id: &str) -> bool {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(device_id)
    }

    /// Device codes with a registered push channel
    #[must_use]
    pub fn list_connected(&self) -> BTreeSet<String> {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    /// Number of connected devices
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether no device is connected
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Unregisters one connection's session when dropped
///
/// Removal is conditional on the connection ID, so a stale connection going
/// away never evicts the device's newer connection.
#[derive(Debug)]
pub struct SessionGuard {
    registry: SharedSessionRegistry,
    device_id: String,
    connection_id: Uuid,
}

impl SessionGuard {
    #[must_use]
    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    #[must_use]
    pub const fn connection_id(&self) -> Uuid {
        self.connection_id
    }

    /// Whether the device still has any registered push channel
    #[must_use]
    pub fn device_registered(&self) -> bool {
        self.registry.is_connected(&self.device_id)
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        if self.registry.release(&self.device_id, self.connection_id) {
            tracing::info!(
                device_id = %self.device_id,
                connection_id = %self.connection_id,
                "device disconnected"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::sessions::types::{PushFrame, PushSink, SinkError};

    struct NullSink;

    #[async_trait]
    impl PushSink for NullSink {
        async fn write(&self, _frame: PushFrame) -> Result<(), SinkError> {
            Ok(())
        }

        async fn flush(&self) -> Result<(), SinkError> {
            Ok(())
        }
    }

    fn handle() -> SessionHandle {
        SessionHandle::new(Arc::new(NullSink))
    }

    #[test]
    fn register_and_lookup() {
        let registry = SessionRegistry::new();
        let h = handle();
        let id = h.id();

        registry.register("tv-1", h);

        assert_eq!(registry.lookup("tv-1").unwrap().id(), id);
        assert!(registry.is_connected("tv-1"));
        assert!(registry.lookup("tv-2").is_none());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn later_registration_wins() {
        let registry = SessionRegistry::new();
        let first = handle();
        let second = handle();
        let second_id = second.id();

        registry.register("tv-1", first);
        registry.register("tv-1", second);

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.lookup("tv-1").unwrap().id(), second_id);
    }

    #[test]
    fn unregister_removes_entry() {
        let registry = SessionRegistry::new();
        registry.register("tv-1", handle());

        assert!(registry.unregister("tv-1").is_some());
        assert!(registry.unregister("tv-1").is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn list_connected_is_sorted() {
        let registry = SessionRegistry::new();
        registry.register("b", handle());
        registry.register("a", handle());

        let connected: Vec<_> = registry.list_connected().into_iter().collect();
        assert_eq!(connected, ["a", "b"]);
    }

    #[test]
    fn guard_releases_on_drop() {
        let registry = Arc::new(SessionRegistry::new());

        let guard = registry.register_guarded("tv-1", handle());
        assert!(guard.device_registered());
        drop(guard);

        assert!(!registry.is_connected("tv-1"));
    }

    #[test]
    fn stale_guard_keeps_newer_connection() {
        let registry = Arc::new(SessionRegistry::new());

        let old = registry.register_guarded("tv-1", handle());
        let new = registry.register_guarded("tv-1", handle());
        let new_id = new.connection_id();

        drop(old);
        assert_eq!(registry.lookup("tv-1").unwrap().id(), new_id);

        drop(new);
        assert!(registry.is_empty());
    }

    #[test]
    fn guard_releases_on_panic() {
        let registry = Arc::new(SessionRegistry::new());
        let inner = Arc::clone(&registry);

        let result = std::thread::spawn(move || {
            let _guard = inner.register_guarded("tv-1", handle());
            panic!("connection task failed");
        })
        .join();

        assert!(result.is_err());
        assert!(registry.is_empty());
    }
}
