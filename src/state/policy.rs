//! Pure decision functions over a room snapshot.
//!
//! Vote values stay private to their owner until the round is revealed, while
//! the fact that a member has voted is always public.

use std::collections::BTreeMap;

use crate::state::room::{RevealPolicy, Room, UserId, VoteToken};

/// Public projection of a member, safe to send to every viewer at any time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberSummary {
    /// User id.
    pub id: UserId,
    /// Display name.
    pub name: String,
    /// Whether the member holds a vote.
    pub has_voted: bool,
}

/// Whether `actor_id` may reveal the current round.
pub fn can_reveal(room: &Room, actor_id: &str) -> bool {
    room.reveal_policy == RevealPolicy::Everyone || is_admin(room, actor_id)
}

/// Whether `actor_id` may reset the current round. Same rule as reveal.
pub fn can_reset(room: &Room, actor_id: &str) -> bool {
    can_reveal(room, actor_id)
}

/// Whether `actor_id` may change the room name, voting system or reveal policy.
pub fn can_change_settings(room: &Room, actor_id: &str) -> bool {
    is_admin(room, actor_id)
}

/// Pick the next admin when `leaving_id` leaves.
///
/// Returns the first other member in insertion order when the leaving user is
/// the admin, `None` when they are not admin or nobody else remains.
pub fn succeed_admin(room: &Room, leaving_id: &str) -> Option<UserId> {
    if room.admin_id != leaving_id {
        return None;
    }

    room.members
        .keys()
        .find(|id| id.as_str() != leaving_id)
        .cloned()
}

/// Votes `viewer_id` is allowed to see. Absent votes are omitted.
pub fn visible_votes(room: &Room, viewer_id: &str) -> BTreeMap<UserId, VoteToken> {
    room.members
        .values()
        .filter(|member| room.revealed() || member.id == viewer_id)
        .filter_map(|member| {
            member
                .vote
                .as_ref()
                .map(|vote| (member.id.clone(), vote.clone()))
        })
        .collect()
}

/// Public member list with vote presence, independent of the reveal state.
pub fn member_summaries(room: &Room) -> Vec<MemberSummary> {
    room.members
        .values()
        .map(|member| MemberSummary {
            id: member.id.clone(),
            name: member.name.clone(),
            has_voted: member.has_voted(),
        })
        .collect()
}

fn is_admin(room: &Room, actor_id: &str) -> bool {
    room.admin_id == actor_id
}
