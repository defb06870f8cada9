/// Depot lookup responses.
pub mod depot;
/// Health check payloads.
pub mod health;
pub mod ingest;
pub mod overlay;
pub mod validation;
