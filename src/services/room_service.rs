use tracing::info;
use validator::Validate;

use crate::{
    dto::room::{CreateRoomRequest, CreateRoomResponse, RoomMetadata},
    error::ServiceError,
    state::SharedState,
};

/// Open a new room and hand back its shareable join link.
pub fn create_room(
    state: &SharedState,
    request: CreateRoomRequest,
) -> Result<CreateRoomResponse, ServiceError> {
    request
        .validate()
        .map_err(|err| ServiceError::InvalidInput(err.to_string()))?;

    let room = state.rooms().create_room(
        request.name.trim().to_string(),
        request.voting_system,
        request.admin_id,
    );
    info!(
        room_id = %room.id,
        admin_id = %room.admin_id,
        voting_system = ?room.voting_system,
        "room created"
    );

    Ok(CreateRoomResponse {
        join_url: state.config().join_url(&room.id),
        room_id: room.id,
    })
}

/// Public metadata of a room, available before joining it.
pub fn room_metadata(state: &SharedState, room_id: &str) -> Result<RoomMetadata, ServiceError> {
    state
        .rooms()
        .get_room(room_id)
        .map(|room| RoomMetadata::from(&room))
        .ok_or_else(|| ServiceError::RoomNotFound(room_id.to_string()))
}
