use hubbub_models::{UserProfile, VoiceRoomKey};

/// Derived occupancy view for one room scope. Never cached: computed
/// from registry + subscription state at snapshot time so it cannot
/// drift from ground truth.
#[derive(Debug, Clone, Default)]
pub struct RoomPresence {
    /// Unique users with at least one connection in the room, sorted
    /// case-insensitively by username.
    pub members: Vec<UserProfile>,
    /// Occupancy of each live voice room in scope.
    pub voice: Vec<VoiceOccupancy>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceOccupancy {
    pub room: VoiceRoomKey,
    pub user_ids: Vec<i64>,
}

/// Dedupe by user id, then order case-insensitively by username with
/// the id as tiebreaker so the result is stable.
pub fn normalize_members(mut members: Vec<UserProfile>) -> Vec<UserProfile> {
    members.sort_by_key(|profile| profile.id);
    members.dedup_by_key(|profile| profile.id);
    members.sort_by(|a, b| {
        a.username
            .to_lowercase()
            .cmp(&b.username.to_lowercase())
            .then(a.id.cmp(&b.id))
    });
    members
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn members_sort_case_insensitively() {
        let members = normalize_members(vec![
            UserProfile::new(3, "charlie"),
            UserProfile::new(1, "Alice"),
            UserProfile::new(2, "bob"),
        ]);
        let names: Vec<&str> = members.iter().map(|m| m.username.as_str()).collect();
        assert_eq!(names, vec!["Alice", "bob", "charlie"]);
    }

    #[test]
    fn duplicate_user_ids_collapse() {
        let members = normalize_members(vec![
            UserProfile::new(1, "alice"),
            UserProfile::new(1, "alice"),
            UserProfile::new(2, "bob"),
        ]);
        assert_eq!(members.len(), 2);
    }

    #[test]
    fn equal_names_break_ties_by_id() {
        let members = normalize_members(vec![UserProfile::new(9, "sam"), UserProfile::new(4, "Sam")]);
        assert_eq!(members[0].id, 4);
        assert_eq!(members[1].id, 9);
    }
}
