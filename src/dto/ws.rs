use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationErrors};

use crate::{
    dto::validation::{validate_display_name, validate_identifier},
    state::{
        policy::{self, MemberSummary},
        room::{RevealPolicy, Room, VotingSystem},
    },
};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
/// Commands accepted from room WebSocket clients.
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientCommand {
    /// Bind the connection to a member of a room.
    #[serde(rename_all = "camelCase")]
    JoinRoom {
        /// Room code.
        room_id: String,
        /// Identity of the joining user.
        user_id: String,
        /// Display name.
        name: String,
    },
    /// `null`, a missing value and `""` all retract the vote.
    CastVote {
        /// Card picked by the sender.
        #[serde(default)]
        value: Option<String>,
    },
    /// Make every vote visible.
    Reveal,
    /// Clear the votes and start a new round.
    Reset,
    /// Rename the sender.
    UpdateName {
        /// New display name.
        name: String,
    },
    /// Change room settings; absent fields stay untouched.
    #[serde(rename_all = "camelCase")]
    UpdateSettings {
        /// New room name.
        #[serde(default)]
        name: Option<String>,
        /// New voting system.
        #[serde(default)]
        voting_system: Option<VotingSystem>,
        /// New reveal policy.
        #[serde(default)]
        reveal_policy: Option<RevealPolicy>,
    },
    /// Leave the room the connection is bound to.
    LeaveRoom,
}

impl Validate for ClientCommand {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        match self {
            Self::JoinRoom { user_id, name, .. } => {
                if let Err(e) = validate_identifier(user_id) {
                    errors.add("userId", e);
                }
                if let Err(e) = validate_display_name(name) {
                    errors.add("name", e);
                }
            }
            Self::UpdateName { name }
            | Self::UpdateSettings {
                name: Some(name), ..
            } => {
                if let Err(e) = validate_display_name(name) {
                    errors.add("name", e);
                }
            }
            _ => {}
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

impl ClientCommand {
    /// Decode a text frame.
    pub fn from_json_str(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }

    /// Short label used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::JoinRoom { .. } => "join_room",
            Self::CastVote { .. } => "cast_vote",
            Self::Reveal => "reveal",
            Self::Reset => "reset",
            Self::UpdateName { .. } => "update_name",
            Self::UpdateSettings { .. } => "update_settings",
            Self::LeaveRoom => "leave_room",
        }
    }
}

#[derive(Debug, Serialize)]
/// Messages pushed to room WebSocket clients.
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServerMessage {
    /// Room snapshot personalized for its recipient.
    RoomState(RoomStatePayload),
    /// Rejection of the recipient's last command.
    Error {
        /// Human-readable reason.
        message: String,
    },
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
/// Public projection of a member.
pub struct UserSummary {
    /// User id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Whether a vote is held, regardless of reveal state.
    pub has_voted: bool,
}

impl From<MemberSummary> for UserSummary {
    fn from(summary: MemberSummary) -> Self {
        Self {
            id: summary.id,
            name: summary.name,
            has_voted: summary.has_voted,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
/// Room state as seen by one member.
pub struct RoomStatePayload {
    /// Room code.
    pub id: String,
    /// Room display name.
    pub name: String,
    /// Current moderator.
    pub admin_id: String,
    /// Deck in use.
    pub voting_system: VotingSystem,
    /// Who may reveal and reset.
    pub reveal_policy: RevealPolicy,
    /// Whether the round is revealed.
    pub revealed: bool,
    /// Members in join order.
    pub users: Vec<UserSummary>,
    /// Only the votes the recipient may see.
    pub votes: BTreeMap<String, String>,
}

impl RoomStatePayload {
    /// Build the view of `room` for `viewer_id`, reusing a precomputed member list.
    pub fn for_viewer(room: &Room, users: &[UserSummary], viewer_id: &str) -> Self {
        Self {
            id: room.id.clone(),
            name: room.name.clone(),
            admin_id: room.admin_id.clone(),
            voting_system: room.voting_system,
            reveal_policy: room.reveal_policy,
            revealed: room.revealed(),
            users: users.to_vec(),
            votes: policy::visible_votes(room, viewer_id),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use uuid::Uuid;

    use super::*;
    use crate::state::room::Member;

    #[test]
    fn parses_every_command() {
        let cases = [
            (
                json!({"type": "JOIN_ROOM", "roomId": "abc", "userId": "u1", "name": "Ann"}),
                ClientCommand::JoinRoom {
                    room_id: "abc".into(),
                    user_id: "u1".into(),
                    name: "Ann".into(),
                },
            ),
            (
                json!({"type": "CAST_VOTE", "value": "5"}),
                ClientCommand::CastVote {
                    value: Some("5".into()),
                },
            ),
            (
                json!({"type": "CAST_VOTE", "value": null}),
                ClientCommand::CastVote { value: None },
            ),
            (json!({"type": "REVEAL"}), ClientCommand::Reveal),
            (json!({"type": "RESET"}), ClientCommand::Reset),
            (
                json!({"type": "UPDATE_NAME", "name": "Bob"}),
                ClientCommand::UpdateName { name: "Bob".into() },
            ),
            (
                json!({"type": "UPDATE_SETTINGS", "revealPolicy": "admin"}),
                ClientCommand::UpdateSettings {
                    name: None,
                    voting_system: None,
                    reveal_policy: Some(RevealPolicy::Admin),
                },
            ),
            (json!({"type": "LEAVE_ROOM"}), ClientCommand::LeaveRoom),
        ];

        for (payload, expected) in cases {
            let parsed = ClientCommand::from_json_str(&payload.to_string()).unwrap();
            assert_eq!(parsed, expected);
        }
    }

    #[test]
    fn rejects_unknown_or_malformed_commands() {
        assert!(ClientCommand::from_json_str(r#"{"type":"SHUFFLE"}"#).is_err());
        assert!(ClientCommand::from_json_str(r#"{"type":"JOIN_ROOM"}"#).is_err());
        assert!(ClientCommand::from_json_str("not json").is_err());
    }

    #[test]
    fn room_state_serializes_camel_case_with_hidden_votes() {
        let mut room = Room::new("abc".into(), "Sprint", VotingSystem::Fibonacci, "u1");
        room.add_member(Member::new("u1", "Ann", Uuid::new_v4()));
        room.add_member(Member::new("u2", "Bob", Uuid::new_v4()));
        room.cast_vote("u1", Some("5".into())).unwrap();
        room.cast_vote("u2", Some("8".into())).unwrap();

        let users: Vec<UserSummary> = policy::member_summaries(&room)
            .into_iter()
            .map(UserSummary::from)
            .collect();
        let message = ServerMessage::RoomState(RoomStatePayload::for_viewer(&room, &users, "u2"));
        let value = serde_json::to_value(&message).unwrap();

        assert_eq!(
            value,
            json!({
                "type": "ROOM_STATE",
                "id": "abc",
                "name": "Sprint",
                "adminId": "u1",
                "votingSystem": "fibonacci",
                "revealPolicy": "everyone",
                "revealed": false,
                "users": [
                    {"id": "u1", "name": "Ann", "hasVoted": true},
                    {"id": "u2", "name": "Bob", "hasVoted": true},
                ],
                "votes": {"u2": "8"},
            })
        );
    }

    #[test]
    fn error_message_shape() {
        let value = serde_json::to_value(ServerMessage::Error {
            message: "room `x` not found".into(),
        })
        .unwrap();
        assert_eq!(value, json!({"type": "ERROR", "message": "room `x` not found"}));
    }

    #[test]
    fn name_commands_are_validated() {
        let blank_join = ClientCommand::JoinRoom {
            room_id: "abc".into(),
            user_id: String::new(),
            name: "   ".into(),
        };
        let errors = blank_join.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("userId"));
        assert!(errors.field_errors().contains_key("name"));

        let long_rename = ClientCommand::UpdateName {
            name: "x".repeat(65),
        };
        assert!(long_rename.validate().is_err());

        let long_settings = ClientCommand::UpdateSettings {
            name: Some("x".repeat(10_000)),
            voting_system: None,
            reveal_policy: None,
        };
        assert!(long_settings.validate().is_err());

        let policy_only = ClientCommand::UpdateSettings {
            name: None,
            voting_system: None,
            reveal_policy: Some(RevealPolicy::Admin),
        };
        assert!(policy_only.validate().is_ok());
        assert!(ClientCommand::CastVote { value: None }.validate().is_ok());
    }
}
