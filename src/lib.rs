//! Library crate for grace-train-back, exposing modules for binaries and integration tests.

pub mod config;
/// Record persistence.
pub mod dao;
/// JSON wire types.
pub mod dto;
pub mod engine;
/// Service and HTTP error types.
pub mod error;
/// HTTP and WebSocket routes.
pub mod routes;
/// Business logic behind the routes.
pub mod services;
/// Shared application state.
pub mod state;
