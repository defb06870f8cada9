use tracing::warn;

use crate::{dto::health::HealthResponse, state::SharedState};

/// Report whether the record store is readable, along with the overlay count.
pub async fn health_status(state: &SharedState) -> HealthResponse {
    let overlays = state.overlays().len();
    match state.records().all().await {
        Ok(_) => HealthResponse::ok(overlays),
        Err(err) => {
            warn!(error = %err, "record store health check failed");
            HealthResponse::degraded(overlays)
        }
    }
}
