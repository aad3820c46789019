use futures_util::future::BoxFuture;
use hubbub_models::{Message, RoomKind, UserProfile, VoiceRoomKey};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("unknown message {0}")]
    UnknownMessage(i64),
    #[error("store backend unavailable: {0}")]
    Backend(String),
}

/// Input for appending one chat message; the store assigns the id and
/// timestamp.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub kind: RoomKind,
    pub target_id: i64,
    pub author: UserProfile,
    pub content: String,
    pub attachments: Vec<Value>,
}

/// Result of a reaction toggle: where the message lives, so the
/// caller knows which topic to rebroadcast on, plus the full updated
/// reaction map.
#[derive(Debug, Clone)]
pub struct ReactionUpdate {
    pub kind: RoomKind,
    pub target_id: i64,
    pub msg_id: i64,
    pub reactions: Value,
}

/// Persistence and authorization seam for the chat gateway. The hub
/// itself never consults this; handlers check access here before
/// touching hub subscriptions.
pub trait ChatStore: Send + Sync + 'static {
    /// Whether `user_id` may read and post in the given room.
    fn can_access<'a>(
        &'a self,
        user_id: i64,
        kind: RoomKind,
        target_id: i64,
    ) -> BoxFuture<'a, bool>;

    /// Whether `user_id` may enter the given voice room.
    fn can_join_voice<'a>(&'a self, user_id: i64, room: VoiceRoomKey) -> BoxFuture<'a, bool>;

    /// Whether `user_id` belongs to the guild.
    fn in_guild<'a>(&'a self, user_id: i64, guild_id: i64) -> BoxFuture<'a, bool>;

    /// The room a message lives in, so handlers can run the room's
    /// access check before mutating the message.
    fn locate_message<'a>(
        &'a self,
        msg_id: i64,
    ) -> BoxFuture<'a, Result<(RoomKind, i64), StoreError>>;

    /// Append a message and return it with id and timestamp assigned.
    fn append_message<'a>(&'a self, new: NewMessage) -> BoxFuture<'a, Result<Message, StoreError>>;

    /// Most recent messages for a room, oldest first, at most `limit`.
    fn recent_messages<'a>(
        &'a self,
        kind: RoomKind,
        target_id: i64,
        limit: usize,
    ) -> BoxFuture<'a, Result<Vec<Message>, StoreError>>;

    /// Add or remove one user's reaction on a message.
    fn toggle_reaction<'a>(
        &'a self,
        user_id: i64,
        msg_id: i64,
        emoji: &'a str,
        add: bool,
    ) -> BoxFuture<'a, Result<ReactionUpdate, StoreError>>;
}
