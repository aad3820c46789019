use serde::{Deserialize, Serialize};

/// Public identity attached to a connection for its lifetime.
/// Supplied by the auth collaborator; the hub only indexes by `id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: i64,
    pub username: String,
    #[serde(default)]
    pub avatar: Option<String>,
}

impl UserProfile {
    pub fn new(id: i64, username: impl Into<String>) -> Self {
        Self {
            id,
            username: username.into(),
            avatar: None,
        }
    }
}
