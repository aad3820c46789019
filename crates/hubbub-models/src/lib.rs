pub mod event;
pub mod frame;
pub mod message;
pub mod topic;
pub mod user;

pub use frame::{ChatOp, VoiceOp};
pub use message::{Message, ReactionEntry, RoomKind};
pub use topic::{Topic, TopicParseError, VoiceRoomKey};
pub use user::UserProfile;
