use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::topic::Topic;
use crate::user::UserProfile;

/// Which kind of text room a message belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomKind {
    Channel,
    Dm,
}

impl RoomKind {
    pub fn topic(self, target_id: i64) -> Topic {
        match self {
            RoomKind::Channel => Topic::Channel(target_id),
            RoomKind::Dm => Topic::Dm(target_id),
        }
    }
}

/// One reaction bucket on a message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReactionEntry {
    pub count: usize,
    pub users: Vec<i64>,
}

/// A persisted chat message as returned by the store collaborator.
/// The hub never inspects this; it is serialized once and fanned out.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: i64,
    pub kind: RoomKind,
    pub target_id: i64,
    pub author: UserProfile,
    pub content: String,
    #[serde(default)]
    pub attachments: Vec<serde_json::Value>,
    pub created_at: i64,
    #[serde(default)]
    pub edited_at: Option<i64>,
    #[serde(default)]
    pub reactions: BTreeMap<String, ReactionEntry>,
}
