//! Identity registry: which user is reachable over which connection.
//!
//! At most one entry per identity. Registering again replaces the entry
//! (last registration wins) without closing the connection it displaced.
//! All operations go through one lock, so each identity's register,
//! lookup and remove calls are observed in program order.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, info};

use parley_shared::UserId;

use crate::connection::{ConnectionHandle, ConnectionId};

#[derive(Clone, Default)]
pub struct Registry {
    entries: Arc<RwLock<HashMap<UserId, ConnectionHandle>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `identity` to `connection`, returning the displaced handle if
    /// another connection held it.
    pub async fn register(
        &self,
        identity: UserId,
        connection: ConnectionHandle,
    ) -> Option<ConnectionHandle> {
        let conn_id = connection.id();
        let previous = self
            .entries
            .write()
            .await
            .insert(identity.clone(), connection)
            .filter(|old| old.id() != conn_id);

        match &previous {
            Some(old) => info!(
                user = %identity.short(),
                old = %old.id(),
                new = %conn_id,
                "Identity taken over by newer connection"
            ),
            None => debug!(user = %identity.short(), conn = %conn_id, "Identity registered"),
        }
        previous
    }

    pub async fn lookup(&self, identity: &UserId) -> Option<ConnectionHandle> {
        self.entries.read().await.get(identity).cloned()
    }

    /// Remove whatever entry `identity` has. Removing an absent identity
    /// is a no-op. Connection teardown goes through `remove_if_current`.
    #[cfg(test)]
    pub async fn remove(&self, identity: &UserId) -> Option<ConnectionHandle> {
        let removed = self.entries.write().await.remove(identity);
        if removed.is_some() {
            debug!(user = %identity.short(), "Identity removed");
        }
        removed
    }

    /// Remove the entry for `identity` only if it still points at
    /// `connection`. A connection closing after being taken over must not
    /// evict its successor.
    pub async fn remove_if_current(&self, identity: &UserId, connection: ConnectionId) -> bool {
        let mut entries = self.entries.write().await;
        let is_current = entries
            .get(identity)
            .is_some_and(|current| current.id() == connection);
        if is_current {
            entries.remove(identity);
            debug!(user = %identity.short(), conn = %connection, "Closed connection unregistered");
        }
        is_current
    }

    /// Point-in-time copy of every entry, so callers can send without
    /// holding the lock.
    pub async fn snapshot(&self) -> Vec<(UserId, ConnectionHandle)> {
        self.entries
            .read()
            .await
            .iter()
            .map(|(id, conn)| (id.clone(), conn.clone()))
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    #[cfg(test)]
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[tokio::test]
    async fn test_last_registration_wins() {
        let registry = Registry::new();
        let (a, _ra) = ConnectionHandle::new(4);
        let (b, _rb) = ConnectionHandle::new(4);
        let id = UserId::new("u1");

        assert!(registry.register(id.clone(), a.clone()).await.is_none());
        let displaced = registry.register(id.clone(), b.clone()).await.unwrap();
        assert_eq!(displaced.id(), a.id());

        assert_eq!(registry.lookup(&id).await.unwrap().id(), b.id());
        assert_eq!(registry.len().await, 1);
        // The displaced connection is left open.
        assert!(a.is_open());
    }

    #[tokio::test]
    async fn test_reregistering_same_connection_displaces_nothing() {
        let registry = Registry::new();
        let (a, _ra) = ConnectionHandle::new(4);
        let id = UserId::new("u1");

        registry.register(id.clone(), a.clone()).await;
        assert!(registry.register(id, a).await.is_none());
    }

    #[tokio::test]
    async fn test_remove_is_idempotent() {
        let registry = Registry::new();
        let (a, _ra) = ConnectionHandle::new(4);
        let id = UserId::new("u1");

        registry.register(id.clone(), a).await;
        assert!(registry.remove(&id).await.is_some());
        assert!(registry.remove(&id).await.is_none());
        assert!(registry.lookup(&id).await.is_none());
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_stale_close_does_not_evict_successor() {
        let registry = Registry::new();
        let (old, _ro) = ConnectionHandle::new(4);
        let (new, _rn) = ConnectionHandle::new(4);
        let id = UserId::new("u1");

        registry.register(id.clone(), old.clone()).await;
        registry.register(id.clone(), new.clone()).await;

        assert!(!registry.remove_if_current(&id, old.id()).await);
        assert_eq!(registry.lookup(&id).await.unwrap().id(), new.id());

        assert!(registry.remove_if_current(&id, new.id()).await);
        assert!(registry.lookup(&id).await.is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_same_identity_races_never_resurrect() {
        let registry = Registry::new();
        let id = UserId::new("u1");
        let removed = Arc::new(std::sync::Mutex::new(HashSet::new()));

        let mut tasks = Vec::new();
        for i in 0..64 {
            let registry = registry.clone();
            let id = id.clone();
            let removed = removed.clone();
            tasks.push(tokio::spawn(async move {
                let (conn, _rx) = ConnectionHandle::new(1);
                registry.register(id.clone(), conn.clone()).await;
                tokio::task::yield_now().await;
                if i % 3 != 0 {
                    registry.remove_if_current(&id, conn.id()).await;
                    removed.lock().unwrap().insert(conn.id());
                    if let Some(current) = registry.lookup(&id).await {
                        assert_ne!(current.id(), conn.id());
                    }
                }
                conn.id()
            }));
        }

        let mut registered = HashSet::new();
        for task in tasks {
            registered.insert(task.await.unwrap());
        }
        let removed = removed.lock().unwrap().clone();

        if let Some(current) = registry.lookup(&id).await {
            assert!(registered.contains(&current.id()));
            assert!(!removed.contains(&current.id()));
        }
        assert!(registry.len().await <= 1);
    }

    #[tokio::test]
    async fn test_concurrent_distinct_identities() {
        let registry = Registry::new();
        let mut tasks = Vec::new();
        for i in 0..32 {
            let registry = registry.clone();
            tasks.push(tokio::spawn(async move {
                let (conn, rx) = ConnectionHandle::new(1);
                let id = UserId::new(format!("user-{i}"));
                registry.register(id.clone(), conn.clone()).await;
                assert_eq!(registry.lookup(&id).await.unwrap().id(), conn.id());
                if i % 2 == 0 {
                    registry.remove_if_current(&id, conn.id()).await;
                }
                drop(rx);
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }
        assert_eq!(registry.len().await, 16);
    }
}
