//! Per-user rate limiting, shared across all of a user's connections
//! so opening extra tabs does not multiply the budget.

use std::num::NonZeroU32;
use std::sync::OnceLock;

use governor::{DefaultKeyedRateLimiter, Quota, RateLimiter};
use tokio::time::Duration;

const MAX_MESSAGES_PER_MINUTE: u32 = 120;
const MAX_REACTIONS_PER_MINUTE: u32 = 120;
const MAX_VOICE_UPDATES_PER_MINUTE: u32 = 60;

pub struct UserRateLimits {
    messages: DefaultKeyedRateLimiter<i64>,
    reactions: DefaultKeyedRateLimiter<i64>,
    voice: DefaultKeyedRateLimiter<i64>,
}

impl UserRateLimits {
    pub fn allow_message(&self, user_id: i64) -> bool {
        self.messages.check_key(&user_id).is_ok()
    }

    pub fn allow_reaction(&self, user_id: i64) -> bool {
        self.reactions.check_key(&user_id).is_ok()
    }

    pub fn allow_voice_update(&self, user_id: i64) -> bool {
        self.voice.check_key(&user_id).is_ok()
    }
}

static USER_RATE_LIMITS: OnceLock<UserRateLimits> = OnceLock::new();

pub fn user_rate_limits() -> &'static UserRateLimits {
    USER_RATE_LIMITS.get_or_init(|| {
        let limits = UserRateLimits {
            messages: RateLimiter::keyed(Quota::per_minute(
                NonZeroU32::new(MAX_MESSAGES_PER_MINUTE).unwrap(),
            )),
            reactions: RateLimiter::keyed(Quota::per_minute(
                NonZeroU32::new(MAX_REACTIONS_PER_MINUTE).unwrap(),
            )),
            voice: RateLimiter::keyed(Quota::per_minute(
                NonZeroU32::new(MAX_VOICE_UPDATES_PER_MINUTE).unwrap(),
            )),
        };

        // Stale keys would otherwise accumulate for the process lifetime.
        tokio::spawn(async {
            let mut interval = tokio::time::interval(Duration::from_secs(300));
            interval.tick().await;
            loop {
                interval.tick().await;
                let limits = user_rate_limits();
                limits.messages.retain_recent();
                limits.reactions.retain_recent();
                limits.voice.retain_recent();
                limits.messages.shrink_to_fit();
                limits.reactions.shrink_to_fit();
                limits.voice.shrink_to_fit();
                tracing::trace!("rate limiter cleanup: pruned stale entries");
            }
        });

        limits
    })
}
