use thiserror::Error;

use crate::state::room::{
    ConnectionId, Member, MemberPatch, MemberRemoval, Room, RoomError, RoomId, SettingsPatch,
    UserId, VoteToken, VotingSystem,
};

/// Result alias for repository operations.
pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// Error raised by room repositories regardless of the backing store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RepositoryError {
    /// No room under this id.
    #[error("room `{0}` not found")]
    RoomNotFound(RoomId),
    /// The user is not a member of the room.
    #[error("user `{0}` not found")]
    UserNotFound(UserId),
    /// A vote arrived after the reveal.
    #[error("votes have already been revealed")]
    RoundAlreadyRevealed,
}

impl From<RoomError> for RepositoryError {
    fn from(err: RoomError) -> Self {
        match err {
            RoomError::UnknownMember(user_id) => RepositoryError::UserNotFound(user_id),
            // Voting while revealed is the only transition the round rejects.
            RoomError::Round(_) => RepositoryError::RoundAlreadyRevealed,
        }
    }
}

/// Owner of the canonical room id → room mapping.
///
/// Reads hand out snapshots; every mutation goes through the repository so an
/// implementation can shard or persist rooms without the callers noticing.
pub trait RoomRepository: Send + Sync {
    /// Allocate a fresh unique id and store an empty room under it.
    fn create_room(&self, name: String, voting_system: VotingSystem, admin_id: UserId) -> Room;
    /// Snapshot of a room.
    fn get_room(&self, room_id: &str) -> Option<Room>;
    /// Whether a room exists, without copying it.
    fn contains_room(&self, room_id: &str) -> bool;
    /// Insert or overwrite a member. Returns the connection that was displaced, if any.
    fn add_member(&self, room_id: &str, member: Member) -> RepositoryResult<Option<ConnectionId>>;
    /// Remove a member and run admin succession. `Ok(None)` when the user was not a member.
    fn remove_member(&self, room_id: &str, user_id: &str)
    -> RepositoryResult<Option<MemberRemoval>>;
    /// Apply a partial update to a member.
    fn update_member(&self, room_id: &str, user_id: &str, patch: MemberPatch)
    -> RepositoryResult<()>;
    /// Apply a partial update to the room settings.
    fn update_settings(&self, room_id: &str, patch: SettingsPatch) -> RepositoryResult<()>;
    /// Set or retract a vote; rejected once the round is revealed.
    fn cast_vote(
        &self,
        room_id: &str,
        user_id: &str,
        token: Option<VoteToken>,
    ) -> RepositoryResult<()>;
    /// Make every vote visible; idempotent.
    fn reveal(&self, room_id: &str) -> RepositoryResult<()>;
    /// Clear every vote and reopen the round.
    fn reset_votes(&self, room_id: &str) -> RepositoryResult<()>;
    /// Scan every room for the member bound to `connection_id`.
    fn find_member_by_connection(&self, connection_id: ConnectionId) -> Option<(Member, RoomId)>;
    /// Number of rooms currently held.
    fn room_count(&self) -> usize;
}
