use std::collections::{HashMap, HashSet};

use crate::transport::ConnectionId;

/// Maps a user id to the set of live connections it owns. A user is
/// online exactly while their entry exists, and an entry exists only
/// while its connection set is non-empty.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    users: HashMap<i64, HashSet<ConnectionId>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, user_id: i64, conn: ConnectionId) {
        self.users.entry(user_id).or_default().insert(conn);
    }

    /// Idempotent: removing an unknown connection leaves the registry
    /// unchanged. The user's entry is deleted the moment its set
    /// becomes empty.
    pub fn unregister(&mut self, user_id: i64, conn: ConnectionId) {
        if let Some(conns) = self.users.get_mut(&user_id) {
            conns.remove(&conn);
            if conns.is_empty() {
                self.users.remove(&user_id);
            }
        }
    }

    pub fn is_online(&self, user_id: i64) -> bool {
        self.users.contains_key(&user_id)
    }

    /// Sorted snapshot of every online user id.
    pub fn online_ids(&self) -> Vec<i64> {
        let mut ids: Vec<i64> = self.users.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn connections_of(&self, user_id: i64) -> impl Iterator<Item = ConnectionId> + '_ {
        self.users
            .get(&user_id)
            .into_iter()
            .flat_map(|conns| conns.iter().copied())
    }

    pub fn online_count(&self) -> usize {
        self.users.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn online_tracks_nonempty_connection_sets() {
        let mut reg = ConnectionRegistry::new();
        let (a, b) = (ConnectionId::next(), ConnectionId::next());
        assert!(!reg.is_online(1));

        reg.register(1, a);
        reg.register(1, b);
        assert!(reg.is_online(1));
        assert_eq!(reg.online_ids(), vec![1]);

        reg.unregister(1, a);
        assert!(reg.is_online(1));
        reg.unregister(1, b);
        assert!(!reg.is_online(1));
        assert!(reg.online_ids().is_empty());
        assert_eq!(reg.online_count(), 0);
    }

    #[test]
    fn unregister_is_idempotent() {
        let mut reg = ConnectionRegistry::new();
        let a = ConnectionId::next();
        reg.register(7, a);
        reg.unregister(7, a);
        reg.unregister(7, a);
        reg.unregister(8, a);
        assert!(reg.online_ids().is_empty());
    }

    #[test]
    fn online_ids_are_sorted() {
        let mut reg = ConnectionRegistry::new();
        for user in [30, 10, 20] {
            reg.register(user, ConnectionId::next());
        }
        assert_eq!(reg.online_ids(), vec![10, 20, 30]);
    }

    #[test]
    fn connections_of_enumerates_only_that_user() {
        let mut reg = ConnectionRegistry::new();
        let (a, b, c) = (
            ConnectionId::next(),
            ConnectionId::next(),
            ConnectionId::next(),
        );
        reg.register(1, a);
        reg.register(1, b);
        reg.register(2, c);
        let mut conns: Vec<ConnectionId> = reg.connections_of(1).collect();
        conns.sort_unstable();
        let mut expected = vec![a, b];
        expected.sort_unstable();
        assert_eq!(conns, expected);
        assert!(reg.connections_of(3).next().is_none());
    }
}
