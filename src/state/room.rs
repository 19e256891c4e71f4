use std::time::SystemTime;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::state::{
    policy,
    round::{InvalidTransition, RoundEvent, RoundPhase},
};

/// Short, human-shareable room identifier.
pub type RoomId = String;
/// Stable user identifier supplied by the identity provider.
pub type UserId = String;
/// Identifier of a live WebSocket connection.
pub type ConnectionId = Uuid;
/// Opaque card value picked by a member.
pub type VoteToken = String;

/// Card deck a room votes with. Advisory only: any non-empty token is accepted as a vote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub enum VotingSystem {
    /// Classic Fibonacci sequence.
    #[serde(rename = "fibonacci")]
    Fibonacci,
    /// Fibonacci rounded past 13.
    #[serde(rename = "modified_fibonacci")]
    ModifiedFibonacci,
    /// T-shirt sizes.
    #[serde(rename = "tshirts")]
    TShirts,
    /// Powers of two.
    #[serde(rename = "powers_2")]
    PowersOfTwo,
}

impl VotingSystem {
    /// Cards offered to clients for this voting system.
    pub fn deck(self) -> &'static [&'static str] {
        match self {
            VotingSystem::Fibonacci => &[
                "0", "1", "2", "3", "5", "8", "13", "21", "34", "55", "89", "?",
            ],
            VotingSystem::ModifiedFibonacci => &[
                "0", "½", "1", "2", "3", "5", "8", "13", "20", "40", "100", "?",
            ],
            VotingSystem::TShirts => &["XS", "S", "M", "L", "XL", "XXL", "?"],
            VotingSystem::PowersOfTwo => &["0", "1", "2", "4", "8", "16", "32", "64", "?"],
        }
    }
}

/// Who may reveal and reset a round.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum RevealPolicy {
    /// Any member.
    #[default]
    Everyone,
    /// Only the room admin.
    Admin,
}

/// Membership record of a user inside one room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    /// User id.
    pub id: UserId,
    /// Display name.
    pub name: String,
    /// Connection currently representing this member.
    pub connection_id: ConnectionId,
    /// `None` is the absent-vote marker.
    pub vote: Option<VoteToken>,
}

impl Member {
    /// Build a member holding an unset vote slot.
    pub fn new(id: impl Into<UserId>, name: impl Into<String>, connection_id: ConnectionId) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            connection_id,
            vote: None,
        }
    }

    /// Whether the member currently holds a vote.
    pub fn has_voted(&self) -> bool {
        self.vote.is_some()
    }
}

/// Partial update applied to a member.
#[derive(Debug, Clone, Default)]
pub struct MemberPatch {
    /// New display name.
    pub name: Option<String>,
}

/// Partial update applied to the room settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SettingsPatch {
    /// New room name.
    pub name: Option<String>,
    /// New voting system.
    pub voting_system: Option<VotingSystem>,
    /// New reveal policy.
    pub reveal_policy: Option<RevealPolicy>,
}

/// Outcome of removing a member from a room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberRemoval {
    /// The record that was removed.
    pub member: Member,
    /// Set when the removed member was admin and someone else took over.
    pub new_admin: Option<UserId>,
}

/// Errors raised by room mutations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoomError {
    /// The user is not in the room.
    #[error("user `{0}` is not a member of this room")]
    UnknownMember(UserId),
    /// The round refused the event.
    #[error(transparent)]
    Round(#[from] InvalidTransition),
}

/// An isolated voting session.
///
/// Members are kept in insertion order; the first remaining member is the
/// successor when the admin leaves. Each member owns exactly one vote slot,
/// so the member and vote key sets can never diverge.
#[derive(Debug, Clone)]
pub struct Room {
    /// Shareable room code.
    pub id: RoomId,
    /// Display name.
    pub name: String,
    /// Current moderator.
    pub admin_id: UserId,
    /// Deck offered to members.
    pub voting_system: VotingSystem,
    /// Who may reveal and reset.
    pub reveal_policy: RevealPolicy,
    /// Round state.
    pub phase: RoundPhase,
    /// Members keyed by user id, in join order.
    pub members: IndexMap<UserId, Member>,
    /// Creation time.
    pub created_at: SystemTime,
}

impl Room {
    /// Create an empty room in the collecting phase, open to everyone.
    pub fn new(
        id: RoomId,
        name: impl Into<String>,
        voting_system: VotingSystem,
        admin_id: impl Into<UserId>,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            admin_id: admin_id.into(),
            voting_system,
            reveal_policy: RevealPolicy::Everyone,
            phase: RoundPhase::Collecting,
            members: IndexMap::new(),
            created_at: SystemTime::now(),
        }
    }

    /// Whether the votes are visible to everyone.
    pub fn revealed(&self) -> bool {
        self.phase.is_revealed()
    }

    /// Look up a member by user id.
    pub fn member(&self, user_id: &str) -> Option<&Member> {
        self.members.get(user_id)
    }

    /// Insert or overwrite a member, giving them an unset vote slot.
    ///
    /// Returns the connection of the record that was overwritten, if any.
    /// When the current admin is not present the newcomer takes over.
    pub fn add_member(&mut self, member: Member) -> Option<ConnectionId> {
        if !self.members.contains_key(&self.admin_id) {
            self.admin_id = member.id.clone();
        }

        // Overwriting keeps the original position, so succession order is stable across rejoins.
        self.members
            .insert(member.id.clone(), member)
            .map(|previous| previous.connection_id)
    }

    /// Remove a member and run admin succession.
    ///
    /// When the admin leaves and members remain, the first remaining member
    /// becomes admin and the reveal policy falls back to [`RevealPolicy::Everyone`].
    pub fn remove_member(&mut self, user_id: &str) -> Option<MemberRemoval> {
        let new_admin = policy::succeed_admin(self, user_id);
        let member = self.members.shift_remove(user_id)?;

        if let Some(successor) = new_admin.as_ref() {
            self.admin_id = successor.clone();
            self.reveal_policy = RevealPolicy::Everyone;
        }

        Some(MemberRemoval { member, new_admin })
    }

    /// Apply a partial update to a member.
    pub fn update_member(&mut self, user_id: &str, patch: MemberPatch) -> Result<(), RoomError> {
        let member = self
            .members
            .get_mut(user_id)
            .ok_or_else(|| RoomError::UnknownMember(user_id.to_string()))?;

        if let Some(name) = patch.name {
            member.name = name;
        }
        Ok(())
    }

    /// Apply a partial update to the room settings.
    pub fn update_settings(&mut self, patch: SettingsPatch) {
        let SettingsPatch {
            name,
            voting_system,
            reveal_policy,
        } = patch;

        if let Some(name) = name {
            self.name = name;
        }
        if let Some(voting_system) = voting_system {
            self.voting_system = voting_system;
        }
        if let Some(reveal_policy) = reveal_policy {
            self.reveal_policy = reveal_policy;
        }
    }

    /// Set or retract a member's vote. Empty strings and `None` both retract.
    pub fn cast_vote(&mut self, user_id: &str, token: Option<VoteToken>) -> Result<(), RoomError> {
        let next = self.phase.transition(RoundEvent::CastVote)?;
        let member = self
            .members
            .get_mut(user_id)
            .ok_or_else(|| RoomError::UnknownMember(user_id.to_string()))?;

        member.vote = normalize_vote(token);
        self.phase = next;
        Ok(())
    }

    /// Make every vote visible. Revealing twice is a no-op.
    pub fn reveal(&mut self) -> Result<(), RoomError> {
        self.phase = self.phase.transition(RoundEvent::Reveal)?;
        Ok(())
    }

    /// Clear every vote slot and start a new round.
    pub fn reset_votes(&mut self) -> Result<(), RoomError> {
        self.phase = self.phase.transition(RoundEvent::Reset)?;
        for member in self.members.values_mut() {
            member.vote = None;
        }
        Ok(())
    }
}

/// Collapse the two retraction encodings (`null` and `""`) into the absent marker.
pub fn normalize_vote(token: Option<VoteToken>) -> Option<VoteToken> {
    token.filter(|value| !value.is_empty())
}
