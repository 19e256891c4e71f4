//! Applies client commands to the room engine and triggers broadcasts.
//!
//! Every command runs under the command gate: resolve the sender, authorize,
//! mutate, then broadcast to the touched rooms before the next command starts.
//! Successful mutations are broadcast to the whole room; rejections only reach
//! the sender.

use tracing::{debug, info, warn};
use validator::Validate;

use crate::{
    dto::ws::ClientCommand,
    error::ServiceError,
    services::broadcaster,
    state::{
        SharedState,
        connections::Binding,
        policy,
        room::{ConnectionId, Member, MemberPatch, Room, RoomId, SettingsPatch, UserId},
    },
};

/// Handle one inbound command from `connection_id`.
pub async fn dispatch(state: &SharedState, connection_id: ConnectionId, command: ClientCommand) {
    let kind = command.kind();
    let _gate = state.command_gate().lock().await;

    match apply_command(state, connection_id, command) {
        Ok(touched) => {
            for room_id in touched {
                broadcaster::broadcast_room_state(state, &room_id);
            }
        }
        Err(err) => {
            warn!(%connection_id, command = kind, error = %err, "command rejected");
            broadcaster::send_error(state, connection_id, &err);
        }
    }
}

/// Handle the loss of a connection exactly like an explicit leave.
pub async fn disconnect(state: &SharedState, connection_id: ConnectionId) {
    let _gate = state.command_gate().lock().await;

    if let Some(room_id) = leave(state, connection_id) {
        broadcaster::broadcast_room_state(state, &room_id);
    }
}

/// Apply a command and return the rooms whose members must be refreshed.
fn apply_command(
    state: &SharedState,
    connection_id: ConnectionId,
    command: ClientCommand,
) -> Result<Vec<RoomId>, ServiceError> {
    command
        .validate()
        .map_err(|err| ServiceError::InvalidInput(err.to_string()))?;

    match command {
        ClientCommand::JoinRoom {
            room_id,
            user_id,
            name,
        } => join_room(state, connection_id, room_id, user_id, name),
        ClientCommand::CastVote { value } => {
            let binding = resolve_sender(state, connection_id)?;
            state
                .rooms()
                .cast_vote(&binding.room_id, &binding.user_id, value)?;
            Ok(vec![binding.room_id])
        }
        ClientCommand::Reveal => {
            let (binding, room) = resolve_room(state, connection_id)?;
            if !policy::can_reveal(&room, &binding.user_id) {
                return Err(ServiceError::PermissionDenied(
                    "only the room admin can reveal votes".into(),
                ));
            }
            state.rooms().reveal(&binding.room_id)?;
            info!(room_id = %binding.room_id, user_id = %binding.user_id, "votes revealed");
            Ok(vec![binding.room_id])
        }
        ClientCommand::Reset => {
            let (binding, room) = resolve_room(state, connection_id)?;
            if !policy::can_reset(&room, &binding.user_id) {
                return Err(ServiceError::PermissionDenied(
                    "only the room admin can reset votes".into(),
                ));
            }
            state.rooms().reset_votes(&binding.room_id)?;
            info!(room_id = %binding.room_id, user_id = %binding.user_id, "round reset");
            Ok(vec![binding.room_id])
        }
        ClientCommand::UpdateName { name } => {
            let binding = resolve_sender(state, connection_id)?;
            state.rooms().update_member(
                &binding.room_id,
                &binding.user_id,
                MemberPatch { name: Some(name) },
            )?;
            Ok(vec![binding.room_id])
        }
        ClientCommand::UpdateSettings {
            name,
            voting_system,
            reveal_policy,
        } => {
            let (binding, room) = resolve_room(state, connection_id)?;
            if !policy::can_change_settings(&room, &binding.user_id) {
                return Err(ServiceError::PermissionDenied(
                    "only the room admin can change settings".into(),
                ));
            }
            state.rooms().update_settings(
                &binding.room_id,
                SettingsPatch {
                    name,
                    voting_system,
                    reveal_policy,
                },
            )?;
            Ok(vec![binding.room_id])
        }
        ClientCommand::LeaveRoom => Ok(leave(state, connection_id).into_iter().collect()),
    }
}

fn join_room(
    state: &SharedState,
    connection_id: ConnectionId,
    room_id: RoomId,
    user_id: UserId,
    name: String,
) -> Result<Vec<RoomId>, ServiceError> {
    if !state.rooms().contains_room(&room_id) {
        return Err(ServiceError::RoomNotFound(room_id));
    }

    let mut touched = Vec::new();

    // A connection speaks for one member at a time: leave the previous membership first.
    if let Some(previous) = state.connections().lookup(connection_id) {
        if previous.room_id != room_id || previous.user_id != user_id {
            touched.extend(leave(state, connection_id));
        }
    }

    let displaced = state.rooms().add_member(
        &room_id,
        Member::new(user_id.clone(), name, connection_id),
    )?;
    if let Some(previous_connection) = displaced.filter(|previous| *previous != connection_id) {
        debug!(
            %room_id,
            %user_id,
            %previous_connection,
            "member rejoined from another connection"
        );
        state.connections().unbind(previous_connection);
    }

    state
        .connections()
        .bind(connection_id, room_id.clone(), user_id.clone());
    info!(%room_id, %user_id, %connection_id, "member joined");

    touched.retain(|touched_id| *touched_id != room_id);
    touched.push(room_id);
    Ok(touched)
}

/// Remove the member represented by `connection_id`, returning the room to refresh.
///
/// A no-op when the connection is unbound, and when a newer connection has
/// since taken over the member.
fn leave(state: &SharedState, connection_id: ConnectionId) -> Option<RoomId> {
    let Binding { room_id, user_id } = state.connections().unbind(connection_id)?;

    let room = state.rooms().get_room(&room_id)?;
    let owns_member = room
        .member(&user_id)
        .is_some_and(|member| member.connection_id == connection_id);
    if !owns_member {
        debug!(%room_id, %user_id, %connection_id, "stale binding released");
        return None;
    }

    match state.rooms().remove_member(&room_id, &user_id) {
        Ok(Some(removal)) => {
            if let Some(new_admin) = removal.new_admin {
                info!(%room_id, previous_admin = %user_id, %new_admin, "admin handed over");
            }
            info!(%room_id, %user_id, %connection_id, "member left");
            Some(room_id)
        }
        Ok(None) => None,
        Err(err) => {
            warn!(%room_id, %user_id, error = %err, "failed to remove member");
            None
        }
    }
}

fn resolve_sender(
    state: &SharedState,
    connection_id: ConnectionId,
) -> Result<Binding, ServiceError> {
    state
        .connections()
        .lookup(connection_id)
        .ok_or(ServiceError::UserNotFound)
}

fn resolve_room(
    state: &SharedState,
    connection_id: ConnectionId,
) -> Result<(Binding, Room), ServiceError> {
    let binding = resolve_sender(state, connection_id)?;
    let room = state
        .rooms()
        .get_room(&binding.room_id)
        .ok_or_else(|| ServiceError::RoomNotFound(binding.room_id.clone()))?;
    Ok((binding, room))
}

#[cfg(test)]
mod tests {
    use axum::extract::ws::Message;
    use serde_json::{Value, json};
    use tokio::sync::mpsc;
    use uuid::Uuid;

    use super::*;
    use crate::{
        config::AppConfig,
        state::{
            AppState, ClientConnection,
            room::{RevealPolicy, VotingSystem},
        },
    };

    struct Client {
        id: ConnectionId,
        rx: mpsc::UnboundedReceiver<Message>,
    }

    impl Client {
        fn connect(state: &SharedState) -> Self {
            let (tx, rx) = mpsc::unbounded_channel();
            let id = Uuid::new_v4();
            state.clients().insert(id, ClientConnection { tx });
            Self { id, rx }
        }

        fn drain(&mut self) -> Vec<Value> {
            let mut frames = Vec::new();
            while let Ok(message) = self.rx.try_recv() {
                if let Message::Text(text) = message {
                    frames.push(serde_json::from_str(text.as_str()).unwrap());
                }
            }
            frames
        }

        fn last_room_state(&mut self) -> Value {
            self.drain()
                .into_iter()
                .rev()
                .find(|frame| frame["type"] == "ROOM_STATE")
                .expect("expected a ROOM_STATE frame")
        }

        fn last_error(&mut self) -> String {
            let frame = self
                .drain()
                .into_iter()
                .rev()
                .find(|frame| frame["type"] == "ERROR")
                .expect("expected an ERROR frame");
            frame["message"].as_str().unwrap().to_string()
        }

        async fn send(&self, state: &SharedState, command: ClientCommand) {
            dispatch(state, self.id, command).await;
        }

        async fn join(&self, state: &SharedState, room_id: &str, user_id: &str) {
            self.send(
                state,
                ClientCommand::JoinRoom {
                    room_id: room_id.into(),
                    user_id: user_id.into(),
                    name: user_id.to_uppercase(),
                },
            )
            .await;
        }

        async fn vote(&self, state: &SharedState, value: Option<&str>) {
            self.send(
                state,
                ClientCommand::CastVote {
                    value: value.map(str::to_string),
                },
            )
            .await;
        }
    }

    fn setup() -> (SharedState, RoomId) {
        let state = AppState::new(AppConfig::default());
        let room = state
            .rooms()
            .create_room("Sprint".into(), VotingSystem::Fibonacci, "u1".into());
        (state, room.id)
    }

    async fn two_member_room() -> (SharedState, RoomId, Client, Client) {
        let (state, room_id) = setup();
        let mut u1 = Client::connect(&state);
        let mut u2 = Client::connect(&state);
        u1.join(&state, &room_id, "u1").await;
        u2.join(&state, &room_id, "u2").await;
        u1.drain();
        u2.drain();
        (state, room_id, u1, u2)
    }

    #[tokio::test]
    async fn join_broadcasts_to_every_member() {
        let (state, room_id) = setup();
        let mut u1 = Client::connect(&state);
        let mut u2 = Client::connect(&state);

        u1.join(&state, &room_id, "u1").await;
        let first = u1.last_room_state();
        assert_eq!(first["users"], json!([{"id": "u1", "name": "U1", "hasVoted": false}]));
        assert_eq!(first["adminId"], "u1");

        u2.join(&state, &room_id, "u2").await;
        let seen_by_u1 = u1.last_room_state();
        let seen_by_u2 = u2.last_room_state();
        assert_eq!(seen_by_u1["users"].as_array().unwrap().len(), 2);
        assert_eq!(seen_by_u1["users"], seen_by_u2["users"]);
        assert_eq!(
            state.connections().lookup(u2.id).unwrap().room_id,
            room_id
        );
    }

    #[tokio::test]
    async fn join_unknown_room_errors_to_sender_only() {
        let (state, room_id, mut u1, _u2) = two_member_room().await;
        let mut stranger = Client::connect(&state);

        stranger.join(&state, "missing", "u9").await;
        assert_eq!(stranger.last_error(), "room `missing` not found");
        assert!(u1.drain().is_empty());
        assert!(state.connections().lookup(stranger.id).is_none());
        assert_eq!(state.rooms().get_room(&room_id).unwrap().members.len(), 2);
    }

    #[tokio::test]
    async fn votes_stay_private_until_reveal() {
        let (state, _room_id, mut u1, mut u2) = two_member_room().await;

        u1.vote(&state, Some("5")).await;
        u2.vote(&state, Some("8")).await;

        let seen_by_u2 = u2.last_room_state();
        assert_eq!(seen_by_u2["votes"], json!({"u2": "8"}));
        assert_eq!(seen_by_u2["revealed"], false);
        assert!(
            seen_by_u2["users"]
                .as_array()
                .unwrap()
                .iter()
                .all(|user| user["hasVoted"] == true)
        );
        assert_eq!(u1.last_room_state()["votes"], json!({"u1": "5"}));

        u1.send(&state, ClientCommand::Reveal).await;
        let expected = json!({"u1": "5", "u2": "8"});
        let seen_by_u1 = u1.last_room_state();
        let seen_by_u2 = u2.last_room_state();
        assert_eq!(seen_by_u1["revealed"], true);
        assert_eq!(seen_by_u1["votes"], expected);
        assert_eq!(seen_by_u2["votes"], expected);
    }

    #[tokio::test]
    async fn admin_only_reveal_rejects_other_members() {
        let (state, room_id, mut u1, mut u2) = two_member_room().await;
        u1.send(
            &state,
            ClientCommand::UpdateSettings {
                name: None,
                voting_system: None,
                reveal_policy: Some(RevealPolicy::Admin),
            },
        )
        .await;
        assert_eq!(u2.last_room_state()["revealPolicy"], "admin");
        u1.drain();

        u2.send(&state, ClientCommand::Reveal).await;
        assert_eq!(
            u2.last_error(),
            "permission denied: only the room admin can reveal votes"
        );
        assert!(u1.drain().is_empty());
        assert!(!state.rooms().get_room(&room_id).unwrap().revealed());

        u2.send(&state, ClientCommand::Reset).await;
        assert!(u2.last_error().starts_with("permission denied"));

        u1.send(&state, ClientCommand::Reveal).await;
        assert_eq!(u2.last_room_state()["revealed"], true);
    }

    #[tokio::test]
    async fn admin_leaving_hands_over_and_reopens_policy() {
        let (state, room_id, mut u1, mut u2) = two_member_room().await;
        u1.send(
            &state,
            ClientCommand::UpdateSettings {
                name: None,
                voting_system: None,
                reveal_policy: Some(RevealPolicy::Admin),
            },
        )
        .await;
        u1.drain();
        u2.drain();

        u1.send(&state, ClientCommand::LeaveRoom).await;

        let seen_by_u2 = u2.last_room_state();
        assert_eq!(seen_by_u2["adminId"], "u2");
        assert_eq!(seen_by_u2["revealPolicy"], "everyone");
        assert_eq!(seen_by_u2["users"], json!([{"id": "u2", "name": "U2", "hasVoted": false}]));
        assert!(u1.drain().is_empty());
        assert!(state.connections().lookup(u1.id).is_none());
        assert_eq!(state.rooms().get_room(&room_id).unwrap().admin_id, "u2");
    }

    #[tokio::test]
    async fn retracting_vote_clears_has_voted() {
        let (state, _room_id, mut u1, mut u2) = two_member_room().await;

        u1.vote(&state, Some("3")).await;
        assert_eq!(u1.last_room_state()["votes"], json!({"u1": "3"}));
        u2.drain();

        u1.vote(&state, None).await;
        let seen_by_u1 = u1.last_room_state();
        assert_eq!(seen_by_u1["votes"], json!({}));
        assert_eq!(seen_by_u1["users"][0]["hasVoted"], false);
        assert_eq!(u2.last_room_state()["users"][0]["hasVoted"], false);

        u1.vote(&state, Some("5")).await;
        u1.vote(&state, Some("")).await;
        assert_eq!(u1.last_room_state()["users"][0]["hasVoted"], false);
    }

    #[tokio::test]
    async fn vote_after_reveal_is_rejected_without_broadcast() {
        let (state, room_id, mut u1, mut u2) = two_member_room().await;
        u1.vote(&state, Some("5")).await;
        u1.send(&state, ClientCommand::Reveal).await;
        u1.drain();
        u2.drain();

        u1.vote(&state, Some("13")).await;
        assert_eq!(
            u1.last_error(),
            "votes have already been revealed; reset the round to vote again"
        );
        assert!(u2.drain().is_empty());
        let room = state.rooms().get_room(&room_id).unwrap();
        assert_eq!(room.member("u1").unwrap().vote.as_deref(), Some("5"));
    }

    #[tokio::test]
    async fn reset_clears_votes_and_reopens_round() {
        let (state, _room_id, mut u1, mut u2) = two_member_room().await;
        u1.vote(&state, Some("5")).await;
        u2.vote(&state, Some("8")).await;
        u2.send(&state, ClientCommand::Reveal).await;

        u2.send(&state, ClientCommand::Reset).await;
        let seen_by_u1 = u1.last_room_state();
        assert_eq!(seen_by_u1["revealed"], false);
        assert_eq!(seen_by_u1["votes"], json!({}));
        assert!(
            seen_by_u1["users"]
                .as_array()
                .unwrap()
                .iter()
                .all(|user| user["hasVoted"] == false)
        );
        u2.drain();

        u2.vote(&state, Some("3")).await;
        assert_eq!(u2.last_room_state()["votes"], json!({"u2": "3"}));
    }

    #[tokio::test]
    async fn unbound_connection_gets_user_not_found() {
        let (state, _room_id, mut u1, _u2) = two_member_room().await;
        let mut stranger = Client::connect(&state);

        stranger.vote(&state, Some("1")).await;
        assert_eq!(stranger.last_error(), "you are not a member of any room");

        stranger
            .send(&state, ClientCommand::UpdateName { name: "X".into() })
            .await;
        assert_eq!(stranger.last_error(), "you are not a member of any room");

        stranger.send(&state, ClientCommand::Reveal).await;
        assert_eq!(stranger.last_error(), "you are not a member of any room");
        assert!(u1.drain().is_empty());
    }

    #[tokio::test]
    async fn non_admin_cannot_change_settings() {
        let (state, room_id, mut u1, mut u2) = two_member_room().await;

        u2.send(
            &state,
            ClientCommand::UpdateSettings {
                name: Some("Hijacked".into()),
                voting_system: None,
                reveal_policy: None,
            },
        )
        .await;
        assert_eq!(
            u2.last_error(),
            "permission denied: only the room admin can change settings"
        );
        assert!(u1.drain().is_empty());
        assert_eq!(state.rooms().get_room(&room_id).unwrap().name, "Sprint");

        u1.send(
            &state,
            ClientCommand::UpdateSettings {
                name: Some("Sprint 2".into()),
                voting_system: Some(VotingSystem::TShirts),
                reveal_policy: None,
            },
        )
        .await;
        let seen_by_u2 = u2.last_room_state();
        assert_eq!(seen_by_u2["name"], "Sprint 2");
        assert_eq!(seen_by_u2["votingSystem"], "tshirts");
    }

    #[tokio::test]
    async fn rename_is_broadcast() {
        let (state, _room_id, mut u1, mut u2) = two_member_room().await;

        u2.send(&state, ClientCommand::UpdateName { name: "Robert".into() })
            .await;
        assert_eq!(u1.last_room_state()["users"][1]["name"], "Robert");
        assert_eq!(u2.last_room_state()["users"][1]["name"], "Robert");
    }

    #[tokio::test]
    async fn disconnect_behaves_like_leave() {
        let (state, room_id, mut u1, mut u2) = two_member_room().await;
        u2.vote(&state, Some("8")).await;
        u1.drain();
        u2.drain();

        disconnect(&state, u2.id).await;
        state.clients().remove(&u2.id);

        let seen_by_u1 = u1.last_room_state();
        assert_eq!(seen_by_u1["users"].as_array().unwrap().len(), 1);
        assert!(u2.drain().is_empty());
        assert!(state.connections().lookup(u2.id).is_none());
        assert!(
            state
                .rooms()
                .get_room(&room_id)
                .unwrap()
                .member("u2")
                .is_none()
        );
    }

    #[tokio::test]
    async fn admin_disconnect_hands_over_like_leave() {
        let (state, room_id, mut u1, mut u2) = two_member_room().await;
        u1.send(
            &state,
            ClientCommand::UpdateSettings {
                name: None,
                voting_system: None,
                reveal_policy: Some(RevealPolicy::Admin),
            },
        )
        .await;
        u1.drain();
        u2.drain();

        disconnect(&state, u1.id).await;
        state.clients().remove(&u1.id);

        let seen_by_u2 = u2.last_room_state();
        assert_eq!(seen_by_u2["adminId"], "u2");
        assert_eq!(seen_by_u2["revealPolicy"], "everyone");
        assert!(u1.drain().is_empty());

        let room = state.rooms().get_room(&room_id).unwrap();
        assert_eq!(room.admin_id, "u2");
        assert_eq!(room.reveal_policy, RevealPolicy::Everyone);
    }

    #[tokio::test]
    async fn invalid_names_are_rejected_to_sender_only() {
        let (state, room_id) = setup();
        let mut stranger = Client::connect(&state);

        stranger
            .send(
                &state,
                ClientCommand::JoinRoom {
                    room_id: room_id.clone(),
                    user_id: String::new(),
                    name: "   ".into(),
                },
            )
            .await;
        assert!(stranger.last_error().starts_with("invalid input:"));
        assert!(state.connections().lookup(stranger.id).is_none());
        let room = state.rooms().get_room(&room_id).unwrap();
        assert!(room.members.is_empty());
        assert_eq!(room.admin_id, "u1");

        let mut u1 = Client::connect(&state);
        let mut u2 = Client::connect(&state);
        u1.join(&state, &room_id, "u1").await;
        u2.join(&state, &room_id, "u2").await;
        u1.drain();
        u2.drain();

        u1.send(
            &state,
            ClientCommand::UpdateSettings {
                name: Some("x".repeat(10_000)),
                voting_system: None,
                reveal_policy: None,
            },
        )
        .await;
        assert!(u1.last_error().starts_with("invalid input:"));

        u2.send(&state, ClientCommand::UpdateName { name: " ".into() })
            .await;
        assert!(u2.last_error().starts_with("invalid input:"));
        assert!(u1.drain().is_empty());

        let room = state.rooms().get_room(&room_id).unwrap();
        assert_eq!(room.name, "Sprint");
        assert_eq!(room.member("u2").unwrap().name, "U2");
    }

    #[tokio::test]
    async fn leave_when_unbound_is_a_no_op() {
        let (state, _room_id, mut u1, _u2) = two_member_room().await;
        let mut stranger = Client::connect(&state);

        stranger.send(&state, ClientCommand::LeaveRoom).await;
        disconnect(&state, stranger.id).await;

        assert!(stranger.drain().is_empty());
        assert!(u1.drain().is_empty());
    }

    #[tokio::test]
    async fn last_member_leaving_keeps_room() {
        let (state, room_id) = setup();
        let u1 = Client::connect(&state);
        u1.join(&state, &room_id, "u1").await;
        u1.send(&state, ClientCommand::LeaveRoom).await;

        let room = state.rooms().get_room(&room_id).unwrap();
        assert!(room.members.is_empty());

        let mut u2 = Client::connect(&state);
        u2.join(&state, &room_id, "u2").await;
        assert_eq!(u2.last_room_state()["adminId"], "u2");
    }

    #[tokio::test]
    async fn rejoin_from_new_connection_displaces_old_one() {
        let (state, room_id, mut u1, mut u2) = two_member_room().await;
        let mut u2_new_tab = Client::connect(&state);

        u2_new_tab.join(&state, &room_id, "u2").await;
        assert_eq!(u1.last_room_state()["users"].as_array().unwrap().len(), 2);
        assert!(u2_new_tab.last_room_state()["users"].is_array());
        assert!(state.connections().lookup(u2.id).is_none());
        assert!(u2.drain().is_empty());

        // The old tab going away must not evict the member now owned by the new tab.
        disconnect(&state, u2.id).await;
        let room = state.rooms().get_room(&room_id).unwrap();
        assert_eq!(room.member("u2").unwrap().connection_id, u2_new_tab.id);
        assert!(u1.drain().is_empty());
    }

    #[tokio::test]
    async fn joining_another_room_leaves_the_previous_one() {
        let (state, first_room, mut u1, mut u2) = two_member_room().await;
        let second_room = state
            .rooms()
            .create_room("Other".into(), VotingSystem::TShirts, "u2".into())
            .id;

        u2.join(&state, &second_room, "u2").await;

        assert_eq!(u1.last_room_state()["users"].as_array().unwrap().len(), 1);
        let seen_by_u2 = u2.last_room_state();
        assert_eq!(seen_by_u2["id"], second_room.as_str());
        assert!(
            state
                .rooms()
                .get_room(&first_room)
                .unwrap()
                .member("u2")
                .is_none()
        );
        assert_eq!(
            state.connections().lookup(u2.id).unwrap().room_id,
            second_room
        );
    }
}
