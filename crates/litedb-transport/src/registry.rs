//! Live connection table keyed by connection id.

use std::sync::Arc;

use dashmap::DashMap;

use crate::client::ClientConnection;

#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    clients: DashMap<String, Arc<ClientConnection>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` if the id is already taken.
    pub fn insert(&self, connection: Arc<ClientConnection>) -> bool {
        match self.clients.entry(connection.id().to_string()) {
            dashmap::mapref::entry::Entry::Occupied(_) => false,
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(connection);
                true
            }
        }
    }

    pub fn get(&self, id: &str) -> Option<Arc<ClientConnection>> {
        self.clients.get(id).map(|entry| entry.value().clone())
    }

    pub fn remove(&self, id: &str) -> Option<Arc<ClientConnection>> {
        self.clients.remove(id).map(|(_, connection)| connection)
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    pub fn ids(&self) -> Vec<String> {
        self.clients.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Clone out every connection so callers can await on them without
    /// holding a shard lock.
    pub fn snapshot(&self) -> Vec<Arc<ClientConnection>> {
        self.clients.iter().map(|entry| entry.value().clone()).collect()
    }

    pub fn clear(&self) {
        self.clients.clear();
    }
}
