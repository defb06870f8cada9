/// Chat announcements of train lifecycle events.
pub mod chat_service;
/// OpenAPI documentation generation.
pub mod documentation;
/// Health check service.
pub mod health_service;
/// Upstream signals and read-side queries.
pub mod ingest_service;
/// Overlay WebSocket connection handling and heartbeat.
pub mod overlay_service;
