use crate::{dto::health::HealthResponse, state::SharedState};

/// Report liveness along with the size of the in-memory state.
pub fn health_status(state: &SharedState) -> HealthResponse {
    HealthResponse::ok(state.rooms().room_count(), state.clients().len())
}
