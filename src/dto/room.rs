use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::{
    dto::{format_system_time, validation::{validate_display_name, validate_identifier}},
    state::room::{Room, VotingSystem},
};

/// Payload used to open a new estimation room.
#[derive(Debug, Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateRoomRequest {
    /// Room display name.
    #[validate(custom(function = validate_display_name))]
    pub name: String,
    /// Deck the room votes with.
    pub voting_system: VotingSystem,
    /// Identifier of the moderator, as issued by the identity provider.
    #[validate(custom(function = validate_identifier))]
    pub admin_id: String,
}

/// Identifier and shareable link of a freshly created room.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateRoomResponse {
    /// Code of the new room.
    pub room_id: String,
    /// Link participants open to join.
    pub join_url: String,
}

/// Public metadata of a room, available without joining it.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RoomMetadata {
    /// Room code.
    pub id: String,
    /// Room display name.
    pub name: String,
    /// Deck the room votes with.
    pub voting_system: VotingSystem,
    /// Cards offered by the room's voting system.
    pub deck: Vec<String>,
    /// RFC 3339 creation timestamp.
    pub created_at: String,
}

impl From<&Room> for RoomMetadata {
    fn from(room: &Room) -> Self {
        Self {
            id: room.id.clone(),
            name: room.name.clone(),
            voting_system: room.voting_system,
            deck: room
                .voting_system
                .deck()
                .iter()
                .map(|card| card.to_string())
                .collect(),
            created_at: format_system_time(room.created_at),
        }
    }
}
