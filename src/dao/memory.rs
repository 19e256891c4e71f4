use dashmap::{DashMap, mapref::entry::Entry};
use rand::Rng;
use tracing::debug;

use crate::{
    dao::room_store::{RepositoryError, RepositoryResult, RoomRepository},
    state::room::{
        ConnectionId, Member, MemberPatch, MemberRemoval, Room, RoomError, RoomId, SettingsPatch,
        UserId, VoteToken, VotingSystem,
    },
};

/// Characters used for room codes; look-alikes (0/o, 1/l/i) are left out.
const ROOM_CODE_ALPHABET: &[u8] = b"abcdefghjkmnpqrstuvwxyz23456789";

/// Process-local room store. Rooms live until the process exits.
pub struct InMemoryRoomRepository {
    rooms: DashMap<RoomId, Room>,
    code_length: usize,
}

impl InMemoryRoomRepository {
    /// Build an empty store generating room codes of `code_length` characters.
    pub fn new(code_length: usize) -> Self {
        Self {
            rooms: DashMap::new(),
            code_length,
        }
    }

    fn with_room_mut<T>(
        &self,
        room_id: &str,
        work: impl FnOnce(&mut Room) -> Result<T, RoomError>,
    ) -> RepositoryResult<T> {
        let mut entry = self
            .rooms
            .get_mut(room_id)
            .ok_or_else(|| RepositoryError::RoomNotFound(room_id.to_string()))?;
        work(entry.value_mut()).map_err(Into::into)
    }
}

impl RoomRepository for InMemoryRoomRepository {
    fn create_room(&self, name: String, voting_system: VotingSystem, admin_id: UserId) -> Room {
        loop {
            let code = generate_room_code(self.code_length);
            if let Entry::Vacant(slot) = self.rooms.entry(code.clone()) {
                let room = Room::new(code, name, voting_system, admin_id);
                slot.insert(room.clone());
                return room;
            }
            debug!(room_id = %code, "room code collision, drawing again");
        }
    }

    fn get_room(&self, room_id: &str) -> Option<Room> {
        self.rooms.get(room_id).map(|entry| entry.value().clone())
    }

    fn contains_room(&self, room_id: &str) -> bool {
        self.rooms.contains_key(room_id)
    }

    fn add_member(&self, room_id: &str, member: Member) -> RepositoryResult<Option<ConnectionId>> {
        self.with_room_mut(room_id, |room| Ok(room.add_member(member)))
    }

    fn remove_member(
        &self,
        room_id: &str,
        user_id: &str,
    ) -> RepositoryResult<Option<MemberRemoval>> {
        self.with_room_mut(room_id, |room| Ok(room.remove_member(user_id)))
    }

    fn update_member(
        &self,
        room_id: &str,
        user_id: &str,
        patch: MemberPatch,
    ) -> RepositoryResult<()> {
        self.with_room_mut(room_id, |room| room.update_member(user_id, patch))
    }

    fn update_settings(&self, room_id: &str, patch: SettingsPatch) -> RepositoryResult<()> {
        self.with_room_mut(room_id, |room| {
            room.update_settings(patch);
            Ok(())
        })
    }

    fn cast_vote(
        &self,
        room_id: &str,
        user_id: &str,
        token: Option<VoteToken>,
    ) -> RepositoryResult<()> {
        self.with_room_mut(room_id, |room| room.cast_vote(user_id, token))
    }

    fn reveal(&self, room_id: &str) -> RepositoryResult<()> {
        self.with_room_mut(room_id, Room::reveal)
    }

    fn reset_votes(&self, room_id: &str) -> RepositoryResult<()> {
        self.with_room_mut(room_id, Room::reset_votes)
    }

    fn find_member_by_connection(&self, connection_id: ConnectionId) -> Option<(Member, RoomId)> {
        self.rooms.iter().find_map(|entry| {
            entry
                .value()
                .members
                .values()
                .find(|member| member.connection_id == connection_id)
                .map(|member| (member.clone(), entry.key().clone()))
        })
    }

    fn room_count(&self) -> usize {
        self.rooms.len()
    }
}

fn generate_room_code(length: usize) -> String {
    let mut rng = rand::rng();
    (0..length)
        .map(|_| ROOM_CODE_ALPHABET[rng.random_range(0..ROOM_CODE_ALPHABET.len())] as char)
        .collect()
}
