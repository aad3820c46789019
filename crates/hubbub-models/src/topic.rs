use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Identifies one voice room. The string form is `<guild_id>:<channel_id>`,
/// which is also what clients pass in the `room` query parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VoiceRoomKey {
    pub guild_id: i64,
    pub channel_id: i64,
}

impl VoiceRoomKey {
    pub fn new(guild_id: i64, channel_id: i64) -> Self {
        Self {
            guild_id,
            channel_id,
        }
    }
}

impl fmt::Display for VoiceRoomKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.guild_id, self.channel_id)
    }
}

impl FromStr for VoiceRoomKey {
    type Err = TopicParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (guild, channel) = s
            .split_once(':')
            .ok_or_else(|| TopicParseError::BadVoiceRoom(s.to_string()))?;
        let guild_id = guild
            .parse()
            .map_err(|_| TopicParseError::BadVoiceRoom(s.to_string()))?;
        let channel_id = channel
            .parse()
            .map_err(|_| TopicParseError::BadVoiceRoom(s.to_string()))?;
        Ok(Self {
            guild_id,
            channel_id,
        })
    }
}

/// A named broadcast scope. A topic exists in the subscription table
/// only while at least one connection is subscribed to it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Topic {
    /// Text channel inside a guild.
    Channel(i64),
    /// Direct-message thread.
    Dm(i64),
    /// Guild-wide feed.
    Guild(i64),
    /// Voice room.
    Voice(VoiceRoomKey),
    /// Global presence feed; every chat connection subscribes on register.
    Presence,
}

impl Topic {
    pub fn voice(guild_id: i64, channel_id: i64) -> Self {
        Self::Voice(VoiceRoomKey::new(guild_id, channel_id))
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Topic::Channel(id) => write!(f, "channel:{id}"),
            Topic::Dm(id) => write!(f, "dm:{id}"),
            Topic::Guild(id) => write!(f, "guild:{id}"),
            Topic::Voice(key) => write!(f, "voice:{key}"),
            Topic::Presence => write!(f, "presence"),
        }
    }
}

impl FromStr for Topic {
    type Err = TopicParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "presence" {
            return Ok(Topic::Presence);
        }
        let (namespace, rest) = s
            .split_once(':')
            .ok_or_else(|| TopicParseError::MissingNamespace(s.to_string()))?;
        match namespace {
            "channel" => rest
                .parse()
                .map(Topic::Channel)
                .map_err(|_| TopicParseError::BadId(s.to_string())),
            "dm" => rest
                .parse()
                .map(Topic::Dm)
                .map_err(|_| TopicParseError::BadId(s.to_string())),
            "guild" => rest
                .parse()
                .map(Topic::Guild)
                .map_err(|_| TopicParseError::BadId(s.to_string())),
            "voice" => rest.parse().map(Topic::Voice),
            other => Err(TopicParseError::UnknownNamespace(other.to_string())),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TopicParseError {
    #[error("topic has no namespace: {0}")]
    MissingNamespace(String),
    #[error("unknown topic namespace: {0}")]
    UnknownNamespace(String),
    #[error("topic id is not numeric: {0}")]
    BadId(String),
    #[error("voice room key must be <guild>:<channel>: {0}")]
    BadVoiceRoom(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_round_trips() {
        for topic in [
            Topic::Channel(42),
            Topic::Dm(7),
            Topic::Guild(1),
            Topic::voice(3, 9),
            Topic::Presence,
        ] {
            let parsed: Topic = topic.to_string().parse().unwrap();
            assert_eq!(parsed, topic);
        }
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!("".parse::<Topic>().is_err());
        assert!("channel".parse::<Topic>().is_err());
        assert!("channel:x".parse::<Topic>().is_err());
        assert!("webhook:1".parse::<Topic>().is_err());
        assert!("voice:5".parse::<Topic>().is_err());
    }

    #[test]
    fn voice_room_key_parses() {
        let key: VoiceRoomKey = "12:34".parse().unwrap();
        assert_eq!(key, VoiceRoomKey::new(12, 34));
        assert!("12".parse::<VoiceRoomKey>().is_err());
        assert!("a:b".parse::<VoiceRoomKey>().is_err());
    }
}
