/// Connection to membership bindings.
pub mod connections;
/// Authorization, visibility and succession rules.
pub mod policy;
/// Room and member model.
pub mod room;
/// Round phase state machine.
pub mod round;

use std::sync::Arc;

use axum::extract::ws::Message;
use dashmap::DashMap;
use tokio::sync::{Mutex, mpsc};

use crate::{
    config::AppConfig,
    dao::{memory::InMemoryRoomRepository, room_store::RoomRepository},
};

use self::{connections::ConnectionRegistry, room::ConnectionId};

/// Application state shared between handlers and socket tasks.
pub type SharedState = Arc<AppState>;

#[derive(Clone)]
/// Handle used to push messages to a connected client.
pub struct ClientConnection {
    /// Outbound queue drained by the socket's writer task.
    pub tx: mpsc::UnboundedSender<Message>,
}

/// Central application state: rooms, connection bindings and live sockets.
pub struct AppState {
    config: Arc<AppConfig>,
    rooms: Arc<dyn RoomRepository>,
    connections: ConnectionRegistry,
    clients: DashMap<ConnectionId, ClientConnection>,
    command_gate: Mutex<()>,
}

impl AppState {
    /// Construct a new [`AppState`] backed by the in-memory room store.
    pub fn new(config: AppConfig) -> SharedState {
        let rooms = Arc::new(InMemoryRoomRepository::new(config.room_code_length()));
        Self::with_repository(config, rooms)
    }

    /// Construct a new [`AppState`] around an existing room repository.
    pub fn with_repository(config: AppConfig, rooms: Arc<dyn RoomRepository>) -> SharedState {
        Arc::new(Self {
            config: Arc::new(config),
            rooms,
            connections: ConnectionRegistry::new(),
            clients: DashMap::new(),
            command_gate: Mutex::new(()),
        })
    }

    /// Immutable runtime configuration.
    pub fn config(&self) -> Arc<AppConfig> {
        Arc::clone(&self.config)
    }

    /// Canonical room store.
    pub fn rooms(&self) -> &dyn RoomRepository {
        self.rooms.as_ref()
    }

    /// Connection → (room, user) bindings.
    pub fn connections(&self) -> &ConnectionRegistry {
        &self.connections
    }

    /// Outbound channels of every open socket, bound or not.
    pub fn clients(&self) -> &DashMap<ConnectionId, ClientConnection> {
        &self.clients
    }

    /// Gate serializing commands so each mutate-then-broadcast runs as one unit.
    pub fn command_gate(&self) -> &Mutex<()> {
        &self.command_gate
    }
}
