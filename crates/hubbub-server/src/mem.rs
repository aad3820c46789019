//! Reference collaborators: a static token table and an in-memory
//! message store. Good enough for development and single-node
//! deployments; a database-backed store slots in behind the same
//! traits.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use futures_util::future::BoxFuture;

use hubbub_core::auth::{AuthError, AuthGate};
use hubbub_core::store::{ChatStore, NewMessage, ReactionUpdate, StoreError};
use hubbub_models::{Message, RoomKind, UserProfile, VoiceRoomKey};

pub struct StaticAuth {
    tokens: HashMap<String, UserProfile>,
}

impl StaticAuth {
    pub fn new(tokens: impl IntoIterator<Item = (String, UserProfile)>) -> Self {
        Self {
            tokens: tokens.into_iter().collect(),
        }
    }
}

impl AuthGate for StaticAuth {
    fn authenticate<'a>(&'a self, token: &'a str) -> BoxFuture<'a, Result<UserProfile, AuthError>> {
        let result = self
            .tokens
            .get(token)
            .cloned()
            .ok_or(AuthError::InvalidToken);
        Box::pin(async move { result })
    }
}

#[derive(Default)]
struct Inner {
    next_message_id: i64,
    messages: HashMap<i64, Message>,
    room_order: HashMap<(RoomKind, i64), Vec<i64>>,
    guild_members: HashMap<i64, HashSet<i64>>,
    channel_guilds: HashMap<i64, i64>,
    dm_parties: HashMap<i64, HashSet<i64>>,
}

#[derive(Default)]
pub struct MemStore {
    inner: Mutex<Inner>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_guild(&self, guild_id: i64, members: impl IntoIterator<Item = i64>) {
        let mut inner = self.lock();
        inner
            .guild_members
            .entry(guild_id)
            .or_default()
            .extend(members);
    }

    pub fn add_channel(&self, channel_id: i64, guild_id: i64) {
        self.lock().channel_guilds.insert(channel_id, guild_id);
    }

    pub fn add_dm(&self, dm_id: i64, party: impl IntoIterator<Item = i64>) {
        let mut inner = self.lock();
        inner.dm_parties.entry(dm_id).or_default().extend(party);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Inner {
    fn can_access(&self, user_id: i64, kind: RoomKind, target_id: i64) -> bool {
        match kind {
            RoomKind::Channel => self
                .channel_guilds
                .get(&target_id)
                .and_then(|guild_id| self.guild_members.get(guild_id))
                .is_some_and(|members| members.contains(&user_id)),
            RoomKind::Dm => self
                .dm_parties
                .get(&target_id)
                .is_some_and(|party| party.contains(&user_id)),
        }
    }
}

impl ChatStore for MemStore {
    fn can_access<'a>(
        &'a self,
        user_id: i64,
        kind: RoomKind,
        target_id: i64,
    ) -> BoxFuture<'a, bool> {
        let allowed = self.lock().can_access(user_id, kind, target_id);
        Box::pin(async move { allowed })
    }

    fn can_join_voice<'a>(&'a self, user_id: i64, room: VoiceRoomKey) -> BoxFuture<'a, bool> {
        let allowed = self
            .lock()
            .guild_members
            .get(&room.guild_id)
            .is_some_and(|members| members.contains(&user_id));
        Box::pin(async move { allowed })
    }

    fn in_guild<'a>(&'a self, user_id: i64, guild_id: i64) -> BoxFuture<'a, bool> {
        let member = self
            .lock()
            .guild_members
            .get(&guild_id)
            .is_some_and(|members| members.contains(&user_id));
        Box::pin(async move { member })
    }

    fn locate_message<'a>(
        &'a self,
        msg_id: i64,
    ) -> BoxFuture<'a, Result<(RoomKind, i64), StoreError>> {
        let located = self
            .lock()
            .messages
            .get(&msg_id)
            .map(|message| (message.kind, message.target_id))
            .ok_or(StoreError::UnknownMessage(msg_id));
        Box::pin(async move { located })
    }

    fn append_message<'a>(&'a self, new: NewMessage) -> BoxFuture<'a, Result<Message, StoreError>> {
        let mut inner = self.lock();
        inner.next_message_id += 1;
        let message = Message {
            id: inner.next_message_id,
            kind: new.kind,
            target_id: new.target_id,
            author: new.author,
            content: new.content,
            attachments: new.attachments,
            created_at: chrono::Utc::now().timestamp_millis(),
            edited_at: None,
            reactions: Default::default(),
        };
        inner
            .room_order
            .entry((new.kind, new.target_id))
            .or_default()
            .push(message.id);
        inner.messages.insert(message.id, message.clone());
        Box::pin(async move { Ok(message) })
    }

    fn recent_messages<'a>(
        &'a self,
        kind: RoomKind,
        target_id: i64,
        limit: usize,
    ) -> BoxFuture<'a, Result<Vec<Message>, StoreError>> {
        let inner = self.lock();
        let messages: Vec<Message> = inner
            .room_order
            .get(&(kind, target_id))
            .map(|order| {
                let skip = order.len().saturating_sub(limit);
                order[skip..]
                    .iter()
                    .filter_map(|id| inner.messages.get(id).cloned())
                    .collect()
            })
            .unwrap_or_default();
        Box::pin(async move { Ok(messages) })
    }

    fn toggle_reaction<'a>(
        &'a self,
        user_id: i64,
        msg_id: i64,
        emoji: &'a str,
        add: bool,
    ) -> BoxFuture<'a, Result<ReactionUpdate, StoreError>> {
        let result = {
            let mut inner = self.lock();
            match inner.messages.get_mut(&msg_id) {
                None => Err(StoreError::UnknownMessage(msg_id)),
                Some(message) => {
                    let entry = message.reactions.entry(emoji.to_owned()).or_default();
                    if add {
                        if !entry.users.contains(&user_id) {
                            entry.users.push(user_id);
                        }
                    } else {
                        entry.users.retain(|&id| id != user_id);
                    }
                    entry.count = entry.users.len();
                    if entry.users.is_empty() {
                        message.reactions.remove(emoji);
                    }
                    serde_json::to_value(&message.reactions)
                        .map(|reactions| ReactionUpdate {
                            kind: message.kind,
                            target_id: message.target_id,
                            msg_id,
                            reactions,
                        })
                        .map_err(|err| StoreError::Backend(err.to_string()))
                }
            }
        };
        Box::pin(async move { result })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn seeded() -> MemStore {
        let store = MemStore::new();
        store.add_guild(1, [1, 2]);
        store.add_channel(10, 1);
        store.add_dm(5, [1, 3]);
        store
    }

    fn author(id: i64) -> UserProfile {
        UserProfile::new(id, format!("user{id}"))
    }

    #[tokio::test]
    async fn access_follows_membership() {
        let store = seeded();
        assert!(store.can_access(1, RoomKind::Channel, 10).await);
        assert!(store.can_access(2, RoomKind::Channel, 10).await);
        // Not a guild member.
        assert!(!store.can_access(3, RoomKind::Channel, 10).await);
        // Unknown channel.
        assert!(!store.can_access(1, RoomKind::Channel, 99).await);

        assert!(store.can_access(3, RoomKind::Dm, 5).await);
        assert!(!store.can_access(2, RoomKind::Dm, 5).await);

        assert!(store.can_join_voice(2, VoiceRoomKey::new(1, 7)).await);
        assert!(!store.can_join_voice(3, VoiceRoomKey::new(1, 7)).await);

        assert!(store.in_guild(1, 1).await);
        assert!(!store.in_guild(3, 1).await);
    }

    #[tokio::test]
    async fn messages_locate_to_their_room() {
        let store = seeded();
        let message = store
            .append_message(NewMessage {
                kind: RoomKind::Dm,
                target_id: 5,
                author: author(1),
                content: "psst".into(),
                attachments: vec![],
            })
            .await
            .unwrap();

        assert_eq!(
            store.locate_message(message.id).await.unwrap(),
            (RoomKind::Dm, 5)
        );
        assert!(matches!(
            store.locate_message(404).await,
            Err(StoreError::UnknownMessage(404))
        ));
    }

    #[tokio::test]
    async fn history_is_oldest_first_and_bounded() {
        let store = seeded();
        for n in 0..5 {
            store
                .append_message(NewMessage {
                    kind: RoomKind::Channel,
                    target_id: 10,
                    author: author(1),
                    content: format!("msg {n}"),
                    attachments: vec![],
                })
                .await
                .unwrap();
        }

        let recent = store.recent_messages(RoomKind::Channel, 10, 3).await.unwrap();
        let contents: Vec<&str> = recent.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["msg 2", "msg 3", "msg 4"]);

        // Other rooms are unaffected.
        let other = store.recent_messages(RoomKind::Dm, 5, 10).await.unwrap();
        assert!(other.is_empty());
    }

    #[tokio::test]
    async fn reactions_toggle_and_clear() {
        let store = seeded();
        let message = store
            .append_message(NewMessage {
                kind: RoomKind::Channel,
                target_id: 10,
                author: author(1),
                content: "hello".into(),
                attachments: vec![],
            })
            .await
            .unwrap();

        let update = store.toggle_reaction(2, message.id, "👍", true).await.unwrap();
        assert_eq!(update.reactions["👍"]["count"], json!(1));
        assert_eq!(update.reactions["👍"]["users"], json!([2]));

        // Re-adding is idempotent.
        let update = store.toggle_reaction(2, message.id, "👍", true).await.unwrap();
        assert_eq!(update.reactions["👍"]["count"], json!(1));

        let update = store.toggle_reaction(2, message.id, "👍", false).await.unwrap();
        assert_eq!(update.reactions, json!({}));

        assert!(matches!(
            store.toggle_reaction(2, 999, "👍", true).await,
            Err(StoreError::UnknownMessage(999))
        ));
    }

    #[tokio::test]
    async fn auth_resolves_known_tokens_only() {
        let auth = StaticAuth::new([("tok-a".to_string(), author(1))]);
        assert_eq!(auth.authenticate("tok-a").await.unwrap().id, 1);
        assert!(matches!(
            auth.authenticate("nope").await,
            Err(AuthError::InvalidToken)
        ));
    }
}
