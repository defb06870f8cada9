use serde::Serialize;
use utoipa::ToSchema;

/// Health response returned by the `/healthcheck` route.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// Health status ("ok" or "degraded").
    pub status: String,
    /// Overlay clients currently connected.
    pub overlays: usize,
}

impl HealthResponse {
    /// Create a health response indicating the system is operational.
    pub fn ok(overlays: usize) -> Self {
        Self {
            status: "ok".to_string(),
            overlays,
        }
    }

    /// Create a health response indicating the record store cannot be read.
    pub fn degraded(overlays: usize) -> Self {
        Self {
            status: "degraded".to_string(),
            overlays,
        }
    }
}
