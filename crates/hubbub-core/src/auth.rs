use futures_util::future::BoxFuture;
use hubbub_models::UserProfile;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid or expired token")]
    InvalidToken,
    #[error("auth backend unavailable: {0}")]
    Backend(String),
}

/// Token verification seam. The gateway resolves the `?token=` query
/// parameter through this before a socket is admitted to the hub.
pub trait AuthGate: Send + Sync + 'static {
    fn authenticate<'a>(&'a self, token: &'a str) -> BoxFuture<'a, Result<UserProfile, AuthError>>;
}
