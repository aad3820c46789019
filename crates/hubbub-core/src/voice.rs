use std::collections::HashMap;

use hubbub_models::VoiceRoomKey;

/// Outcome of a push-to-talk acquisition attempt. Only `Granted`
/// represents a state change worth broadcasting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeakerTransition {
    /// The slot was empty and is now held by the caller.
    Granted,
    /// The caller already held the slot (re-assert).
    Reasserted,
    /// Somebody else holds the slot; state unchanged, no queueing.
    Denied { current: i64 },
}

/// Per-voice-room active-speaker slots. Absence of a key means the
/// room is idle. Optimistic, non-queued arbitration: only the holder
/// can release or re-assert, and the slot can only be taken while
/// empty.
#[derive(Debug, Default)]
pub struct SpeakerSlots {
    slots: HashMap<VoiceRoomKey, i64>,
}

impl SpeakerSlots {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn speaker(&self, room: VoiceRoomKey) -> Option<i64> {
        self.slots.get(&room).copied()
    }

    pub fn begin(&mut self, room: VoiceRoomKey, user_id: i64) -> SpeakerTransition {
        match self.slots.get(&room) {
            None => {
                self.slots.insert(room, user_id);
                SpeakerTransition::Granted
            }
            Some(&current) if current == user_id => SpeakerTransition::Reasserted,
            Some(&current) => SpeakerTransition::Denied { current },
        }
    }

    /// Release the slot if `user_id` holds it. Returns whether the
    /// room transitioned back to idle.
    pub fn end(&mut self, room: VoiceRoomKey, user_id: i64) -> bool {
        if self.slots.get(&room) == Some(&user_id) {
            self.slots.remove(&room);
            true
        } else {
            false
        }
    }

    /// Drop all slot state for a room once it has no members left.
    pub fn remove_room(&mut self, room: VoiceRoomKey) {
        self.slots.remove(&room);
    }

    pub fn room_count(&self) -> usize {
        self.slots.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ROOM: VoiceRoomKey = VoiceRoomKey {
        guild_id: 1,
        channel_id: 2,
    };

    #[test]
    fn idle_room_grants_first_caller() {
        let mut slots = SpeakerSlots::new();
        assert_eq!(slots.speaker(ROOM), None);
        assert_eq!(slots.begin(ROOM, 10), SpeakerTransition::Granted);
        assert_eq!(slots.speaker(ROOM), Some(10));
    }

    #[test]
    fn holder_may_reassert_without_state_change() {
        let mut slots = SpeakerSlots::new();
        slots.begin(ROOM, 10);
        assert_eq!(slots.begin(ROOM, 10), SpeakerTransition::Reasserted);
        assert_eq!(slots.speaker(ROOM), Some(10));
    }

    #[test]
    fn contender_is_denied_until_release() {
        let mut slots = SpeakerSlots::new();
        slots.begin(ROOM, 10);
        assert_eq!(
            slots.begin(ROOM, 20),
            SpeakerTransition::Denied { current: 10 }
        );
        assert_eq!(slots.speaker(ROOM), Some(10));

        assert!(slots.end(ROOM, 10));
        assert_eq!(slots.begin(ROOM, 20), SpeakerTransition::Granted);
        assert_eq!(slots.speaker(ROOM), Some(20));
    }

    #[test]
    fn only_the_holder_can_release() {
        let mut slots = SpeakerSlots::new();
        slots.begin(ROOM, 10);
        assert!(!slots.end(ROOM, 20));
        assert_eq!(slots.speaker(ROOM), Some(10));
    }

    #[test]
    fn release_on_idle_room_is_noop() {
        let mut slots = SpeakerSlots::new();
        assert!(!slots.end(ROOM, 10));
        assert_eq!(slots.room_count(), 0);
    }

    #[test]
    fn rooms_are_independent() {
        let other = VoiceRoomKey::new(3, 4);
        let mut slots = SpeakerSlots::new();
        slots.begin(ROOM, 10);
        assert_eq!(slots.begin(other, 20), SpeakerTransition::Granted);
        slots.remove_room(ROOM);
        assert_eq!(slots.speaker(ROOM), None);
        assert_eq!(slots.speaker(other), Some(20));
    }
}
