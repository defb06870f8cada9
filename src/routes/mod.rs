use axum::Router;

use crate::state::SharedState;

/// Swagger UI and the OpenAPI document.
pub mod docs;
/// Upstream signal ingestion.
pub mod events;
/// Health check endpoint.
pub mod health;
/// Train snapshot, records and overlay control.
pub mod train;
/// Overlay WebSocket upgrade.
pub mod websocket;

/// Compose all route trees and attach the shared state.
pub fn router(state: SharedState) -> Router<()> {
    health::router()
        .merge(websocket::router())
        .merge(events::router())
        .merge(train::router())
        .merge(docs::router())
        .with_state(state)
}
