use tracing::{debug, warn};

use crate::{
    dto::ws::{RoomStatePayload, ServerMessage, UserSummary},
    error::ServiceError,
    services::websocket_service::send_message_to_websocket,
    state::{SharedState, policy, room::ConnectionId},
};

/// Push the current state of a room to each of its members, personalized per recipient.
///
/// There is no diffing: every member receives a full snapshot. Non-members receive nothing.
pub fn broadcast_room_state(state: &SharedState, room_id: &str) {
    let Some(room) = state.rooms().get_room(room_id) else {
        warn!(%room_id, "cannot broadcast: room not found");
        return;
    };

    let users: Vec<UserSummary> = policy::member_summaries(&room)
        .into_iter()
        .map(UserSummary::from)
        .collect();

    for member in room.members.values() {
        let message =
            ServerMessage::RoomState(RoomStatePayload::for_viewer(&room, &users, &member.id));
        send_to_connection(state, member.connection_id, &message);
    }
}

/// Report a rejected command to the connection that sent it, and nobody else.
pub fn send_error(state: &SharedState, connection_id: ConnectionId, err: &ServiceError) {
    let message = ServerMessage::Error {
        message: err.to_string(),
    };
    send_to_connection(state, connection_id, &message);
}

fn send_to_connection(state: &SharedState, connection_id: ConnectionId, message: &ServerMessage) {
    let Some(tx) = state
        .clients()
        .get(&connection_id)
        .map(|client| client.tx.clone())
    else {
        debug!(%connection_id, "no live socket for connection; dropping message");
        return;
    };

    if send_message_to_websocket(&tx, message).is_err() {
        warn!(%connection_id, "send failed (writer closed)");
    }
}
