use dashmap::DashMap;

use crate::state::room::{ConnectionId, RoomId, UserId};

/// Membership a connection currently represents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    /// Room the connection joined.
    pub room_id: RoomId,
    /// Member the connection speaks for.
    pub user_id: UserId,
}

/// Secondary index from live connections to the (room, user) they act for.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    bindings: DashMap<ConnectionId, Binding>,
}

impl ConnectionRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a connection, replacing any previous binding it had.
    pub fn bind(&self, connection_id: ConnectionId, room_id: RoomId, user_id: UserId) {
        self.bindings
            .insert(connection_id, Binding { room_id, user_id });
    }

    /// Drop the binding of a connection, returning it if there was one.
    pub fn unbind(&self, connection_id: ConnectionId) -> Option<Binding> {
        self.bindings
            .remove(&connection_id)
            .map(|(_, binding)| binding)
    }

    /// Resolve who a connection speaks for.
    pub fn lookup(&self, connection_id: ConnectionId) -> Option<Binding> {
        self.bindings
            .get(&connection_id)
            .map(|entry| entry.value().clone())
    }

    /// Number of bound connections.
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    /// Whether no connection is bound.
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;

    #[test]
    fn bind_then_lookup() {
        let registry = ConnectionRegistry::new();
        let connection = Uuid::new_v4();
        registry.bind(connection, "room".into(), "u1".into());

        assert_eq!(
            registry.lookup(connection),
            Some(Binding {
                room_id: "room".into(),
                user_id: "u1".into(),
            })
        );
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn rebinding_replaces_previous_entry() {
        let registry = ConnectionRegistry::new();
        let connection = Uuid::new_v4();
        registry.bind(connection, "room-a".into(), "u1".into());
        registry.bind(connection, "room-b".into(), "u1".into());

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.lookup(connection).unwrap().room_id, "room-b");
    }

    #[test]
    fn unbind_is_idempotent() {
        let registry = ConnectionRegistry::new();
        let connection = Uuid::new_v4();
        registry.bind(connection, "room".into(), "u1".into());

        assert!(registry.unbind(connection).is_some());
        assert!(registry.unbind(connection).is_none());
        assert!(registry.lookup(connection).is_none());
        assert!(registry.is_empty());
    }
}
