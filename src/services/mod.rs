/// Per-member room state fan-out.
pub mod broadcaster;
/// Command routing, authorization and mutation.
pub mod dispatcher;
/// OpenAPI documentation generation.
pub mod documentation;
/// Health check service.
pub mod health_service;
/// Room creation and lookup over HTTP.
pub mod room_service;
/// WebSocket connection and message handling service.
pub mod websocket_service;
