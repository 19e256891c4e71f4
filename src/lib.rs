//! Library crate for planning-poker-back, exposing modules for binaries and tests.

/// Runtime configuration.
pub mod config;
/// Room storage.
pub mod dao;
/// Wire payloads for REST and WebSocket clients.
pub mod dto;
/// Service and HTTP error types.
pub mod error;
/// HTTP routes.
pub mod routes;
/// Application services.
pub mod services;
/// Shared state and the room domain model.
pub mod state;
