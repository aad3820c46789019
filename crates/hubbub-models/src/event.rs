//! Server -> client event names and payload builders.
//!
//! Every outbound frame is a JSON object tagged by `t`. The fanout
//! engine carries these payloads opaquely; only the voice coordinator
//! ever looks inside one.

use serde_json::{json, Value};

use crate::message::Message;
use crate::topic::VoiceRoomKey;
use crate::user::UserProfile;

pub const EVENT_READY: &str = "ready";
pub const EVENT_PONG: &str = "pong";
pub const EVENT_HISTORY: &str = "history";
pub const EVENT_MESSAGE: &str = "message";
pub const EVENT_REACTIONS: &str = "reactions";
pub const EVENT_ONLINE: &str = "online";
pub const EVENT_GUILD_STATE: &str = "guild_state";
pub const EVENT_ERROR: &str = "error";

pub const EVENT_VOICE_READY: &str = "voice_ready";
pub const EVENT_VOICE_ACTIVE: &str = "voice_active";
pub const EVENT_PEER_JOINED: &str = "peer_joined";
pub const EVENT_PEER_LEFT: &str = "peer_left";
pub const EVENT_SIGNAL: &str = "signal";

pub fn online(online_ids: &[i64]) -> Value {
    json!({ "t": EVENT_ONLINE, "online": online_ids })
}

pub fn message(message: &Message) -> Value {
    json!({ "t": EVENT_MESSAGE, "message": message })
}

pub fn reactions(msg_id: i64, reactions: &Value) -> Value {
    json!({ "t": EVENT_REACTIONS, "msg_id": msg_id, "reactions": reactions })
}

pub fn error(detail: &str) -> Value {
    json!({ "t": EVENT_ERROR, "message": detail })
}

pub fn voice_active(room: VoiceRoomKey, speaker: Option<i64>) -> Value {
    json!({ "t": EVENT_VOICE_ACTIVE, "room": room.to_string(), "user_id": speaker })
}

pub fn peer_joined(room: VoiceRoomKey, peer: &UserProfile) -> Value {
    json!({ "t": EVENT_PEER_JOINED, "room": room.to_string(), "peer": peer })
}

pub fn peer_left(room: VoiceRoomKey, user_id: i64) -> Value {
    json!({ "t": EVENT_PEER_LEFT, "room": room.to_string(), "user_id": user_id })
}

pub fn signal(room: VoiceRoomKey, from: i64, payload: &Value) -> Value {
    json!({ "t": EVENT_SIGNAL, "room": room.to_string(), "from": from, "payload": payload })
}
