//! Client -> server frame shapes for the two gateway sockets.
//!
//! Frames that fail to deserialize are dropped by the protocol handler
//! before any hub call is made.

use serde::Deserialize;
use serde_json::Value;

use crate::message::RoomKind;

/// Operations accepted on the chat socket.
#[derive(Debug, Deserialize)]
#[serde(tag = "t", rename_all = "snake_case")]
pub enum ChatOp {
    Ping,
    Join {
        kind: RoomKind,
        target_id: i64,
    },
    Leave {
        kind: RoomKind,
        target_id: i64,
    },
    Say {
        kind: RoomKind,
        target_id: i64,
        #[serde(default)]
        content: String,
        #[serde(default)]
        attachments: Vec<Value>,
    },
    React {
        msg_id: i64,
        emoji: String,
        add: bool,
    },
    Presence,
    GuildState {
        guild_id: i64,
    },
}

/// Text operations accepted on the voice socket. Binary frames on the
/// same socket are audio and bypass this enum entirely.
#[derive(Debug, Deserialize)]
#[serde(tag = "t", rename_all = "snake_case")]
pub enum VoiceOp {
    VoiceBegin,
    VoiceEnd,
    Signal { to: i64, payload: Value },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_ops_deserialize() {
        let op: ChatOp = serde_json::from_str(r#"{"t":"ping"}"#).unwrap();
        assert!(matches!(op, ChatOp::Ping));

        let op: ChatOp =
            serde_json::from_str(r#"{"t":"join","kind":"channel","target_id":42}"#).unwrap();
        assert!(matches!(
            op,
            ChatOp::Join {
                kind: RoomKind::Channel,
                target_id: 42
            }
        ));

        let op: ChatOp = serde_json::from_str(r#"{"t":"guild_state","guild_id":7}"#).unwrap();
        assert!(matches!(op, ChatOp::GuildState { guild_id: 7 }));

        let op: ChatOp =
            serde_json::from_str(r#"{"t":"say","kind":"dm","target_id":3,"content":"hi"}"#)
                .unwrap();
        match op {
            ChatOp::Say {
                content,
                attachments,
                ..
            } => {
                assert_eq!(content, "hi");
                assert!(attachments.is_empty());
            }
            other => panic!("unexpected op: {other:?}"),
        }
    }

    #[test]
    fn unknown_op_is_an_error() {
        assert!(serde_json::from_str::<ChatOp>(r#"{"t":"sudo"}"#).is_err());
        assert!(serde_json::from_str::<VoiceOp>(r#"{"t":"say"}"#).is_err());
    }

    #[test]
    fn voice_signal_carries_opaque_payload() {
        let op: VoiceOp =
            serde_json::from_str(r#"{"t":"signal","to":9,"payload":{"sdp":"offer"}}"#).unwrap();
        match op {
            VoiceOp::Signal { to, payload } => {
                assert_eq!(to, 9);
                assert_eq!(payload["sdp"], "offer");
            }
            other => panic!("unexpected op: {other:?}"),
        }
    }
}
