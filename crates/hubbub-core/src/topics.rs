use std::collections::{HashMap, HashSet};

use hubbub_models::{Topic, VoiceRoomKey};

use crate::transport::ConnectionId;

/// Maps topics to subscribed connections, plus the reverse view used
/// to tear a connection out of every topic on disconnect.
///
/// Invariant: a topic key is present iff its connection set is
/// non-empty; the bucket is pruned immediately after the removal that
/// empties it. The forward map is authoritative; `by_conn` is the
/// derived per-connection view and is kept in lockstep.
#[derive(Debug, Default)]
pub struct TopicTable {
    topics: HashMap<Topic, HashSet<ConnectionId>>,
    by_conn: HashMap<ConnectionId, HashSet<Topic>>,
}

impl TopicTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Idempotent: subscribing twice is a no-op.
    pub fn subscribe(&mut self, topic: Topic, conn: ConnectionId) {
        self.topics.entry(topic.clone()).or_default().insert(conn);
        self.by_conn.entry(conn).or_default().insert(topic);
    }

    /// Idempotent: unsubscribing an absent connection is a no-op,
    /// never an error.
    pub fn unsubscribe(&mut self, topic: &Topic, conn: ConnectionId) {
        if let Some(conns) = self.topics.get_mut(topic) {
            conns.remove(&conn);
            self.prune_if_empty(topic);
        }
        if let Some(topics) = self.by_conn.get_mut(&conn) {
            topics.remove(topic);
            if topics.is_empty() {
                self.by_conn.remove(&conn);
            }
        }
    }

    /// Remove a connection from every topic it was in. Returns the
    /// topics it left.
    pub fn unsubscribe_all(&mut self, conn: ConnectionId) -> Vec<Topic> {
        let Some(topics) = self.by_conn.remove(&conn) else {
            return Vec::new();
        };
        let left: Vec<Topic> = topics.into_iter().collect();
        for topic in &left {
            if let Some(conns) = self.topics.get_mut(topic) {
                conns.remove(&conn);
                self.prune_if_empty(topic);
            }
        }
        left
    }

    fn prune_if_empty(&mut self, topic: &Topic) {
        if self.topics.get(topic).is_some_and(HashSet::is_empty) {
            self.topics.remove(topic);
        }
    }

    pub fn contains(&self, topic: &Topic) -> bool {
        self.topics.contains_key(topic)
    }

    pub fn subscribers(&self, topic: &Topic) -> impl Iterator<Item = ConnectionId> + '_ {
        self.topics
            .get(topic)
            .into_iter()
            .flat_map(|conns| conns.iter().copied())
    }

    pub fn is_subscribed(&self, topic: &Topic, conn: ConnectionId) -> bool {
        self.topics
            .get(topic)
            .is_some_and(|conns| conns.contains(&conn))
    }

    pub fn topics_of(&self, conn: ConnectionId) -> impl Iterator<Item = &Topic> + '_ {
        self.by_conn.get(&conn).into_iter().flatten()
    }

    /// Voice rooms belonging to one guild that currently have members.
    pub fn voice_rooms_in_guild(&self, guild_id: i64) -> Vec<VoiceRoomKey> {
        let mut rooms: Vec<VoiceRoomKey> = self
            .topics
            .keys()
            .filter_map(|topic| match topic {
                Topic::Voice(key) if key.guild_id == guild_id => Some(*key),
                _ => None,
            })
            .collect();
        rooms.sort_unstable();
        rooms
    }

    pub fn topic_count(&self) -> usize {
        self.topics.len()
    }

    #[cfg(test)]
    fn has_dangling_state(&self) -> bool {
        self.topics.values().any(HashSet::is_empty) || self.by_conn.values().any(HashSet::is_empty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscribe_is_idempotent() {
        let mut table = TopicTable::new();
        let conn = ConnectionId::next();
        table.subscribe(Topic::Channel(1), conn);
        table.subscribe(Topic::Channel(1), conn);
        assert_eq!(table.subscribers(&Topic::Channel(1)).count(), 1);
        assert_eq!(table.topic_count(), 1);
    }

    #[test]
    fn empty_buckets_are_pruned_immediately() {
        let mut table = TopicTable::new();
        let conn = ConnectionId::next();
        table.subscribe(Topic::Dm(9), conn);
        assert!(table.contains(&Topic::Dm(9)));

        table.unsubscribe(&Topic::Dm(9), conn);
        assert!(!table.contains(&Topic::Dm(9)));
        assert_eq!(table.topic_count(), 0);
        assert!(!table.has_dangling_state());
    }

    #[test]
    fn unsubscribe_absent_is_a_noop() {
        let mut table = TopicTable::new();
        let (a, b) = (ConnectionId::next(), ConnectionId::next());
        table.subscribe(Topic::Channel(1), a);
        table.unsubscribe(&Topic::Channel(1), b);
        table.unsubscribe(&Topic::Channel(2), a);
        table.unsubscribe(&Topic::Channel(1), a);
        table.unsubscribe(&Topic::Channel(1), a);
        assert_eq!(table.topic_count(), 0);
        assert!(!table.has_dangling_state());
    }

    #[test]
    fn unsubscribe_all_clears_every_topic() {
        let mut table = TopicTable::new();
        let (a, b) = (ConnectionId::next(), ConnectionId::next());
        table.subscribe(Topic::Channel(1), a);
        table.subscribe(Topic::Dm(2), a);
        table.subscribe(Topic::Presence, a);
        table.subscribe(Topic::Channel(1), b);

        let mut left = table.unsubscribe_all(a);
        left.sort_by_key(|t| t.to_string());
        assert_eq!(left.len(), 3);

        // Channel 1 survives through b; the rest are pruned.
        assert!(table.contains(&Topic::Channel(1)));
        assert!(!table.contains(&Topic::Dm(2)));
        assert!(!table.contains(&Topic::Presence));
        assert!(table.topics_of(a).next().is_none());
        assert!(!table.has_dangling_state());

        assert!(table.unsubscribe_all(a).is_empty());
    }

    #[test]
    fn voice_rooms_in_guild_filters_by_guild() {
        let mut table = TopicTable::new();
        let conn = ConnectionId::next();
        table.subscribe(Topic::voice(1, 10), conn);
        table.subscribe(Topic::voice(1, 11), conn);
        table.subscribe(Topic::voice(2, 20), conn);
        table.subscribe(Topic::Channel(1), conn);
        assert_eq!(
            table.voice_rooms_in_guild(1),
            vec![VoiceRoomKey::new(1, 10), VoiceRoomKey::new(1, 11)]
        );
        assert!(table.voice_rooms_in_guild(3).is_empty());
    }
}
