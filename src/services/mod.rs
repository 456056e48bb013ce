/// Per-room actors, command application and connection fanout.
pub mod coordinator;
/// OpenAPI documentation generation.
pub mod documentation;
/// Health check service.
pub mod health_service;
/// Vote recommendation algorithms.
pub mod judge;
/// Background housekeeping tasks.
pub mod maintenance;
/// Moderation and settings operations behind the HTTP API.
pub mod room_service;
/// Room creation, admission and session lifecycle.
pub mod session_service;
/// Room store connection supervisor.
pub mod storage_supervisor;
/// External strudel code generation.
pub mod strudel;
/// WebSocket connection handling.
pub mod websocket_service;
