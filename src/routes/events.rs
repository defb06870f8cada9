use axum::{Json, Router, extract::State, http::StatusCode, routing::post};
use axum_valid::Valid;

use crate::{
    dto::ingest::{
        BreakRequest, GraceEventRequest, HypeBeginRequest, HypeEndRequest, HypeProgressRequest,
    },
    error::AppError,
    services::ingest_service,
    state::SharedState,
};

/// Routes accepting normalized upstream signals.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/events/grace", post(grace))
        .route("/events/break", post(break_train))
        .route("/events/hype/begin", post(hype_begin))
        .route("/events/hype/progress", post(hype_progress))
        .route("/events/hype/end", post(hype_end))
}

/// Count a grace event.
#[utoipa::path(
    post,
    path = "/events/grace",
    tag = "events",
    request_body = GraceEventRequest,
    responses(
        (status = 202, description = "Event applied"),
        (status = 400, description = "Invalid payload")
    )
)]
pub async fn grace(
    State(state): State<SharedState>,
    Valid(Json(payload)): Valid<Json<GraceEventRequest>>,
) -> Result<StatusCode, AppError> {
    ingest_service::record_grace(&state, payload).await?;
    Ok(StatusCode::ACCEPTED)
}

/// Report a chat message that was not a grace.
#[utoipa::path(
    post,
    path = "/events/break",
    tag = "events",
    request_body = BreakRequest,
    responses(
        (status = 202, description = "Break applied"),
        (status = 400, description = "Invalid payload")
    )
)]
pub async fn break_train(
    State(state): State<SharedState>,
    Valid(Json(payload)): Valid<Json<BreakRequest>>,
) -> Result<StatusCode, AppError> {
    ingest_service::break_train(&state, payload).await?;
    Ok(StatusCode::ACCEPTED)
}

/// Hype train begin signal.
#[utoipa::path(
    post,
    path = "/events/hype/begin",
    tag = "events",
    request_body = HypeBeginRequest,
    responses((status = 202, description = "Signal logged"))
)]
pub async fn hype_begin(
    State(state): State<SharedState>,
    Valid(Json(payload)): Valid<Json<HypeBeginRequest>>,
) -> StatusCode {
    ingest_service::hype_begin(&state, payload);
    StatusCode::ACCEPTED
}

/// Hype train progress signal.
#[utoipa::path(
    post,
    path = "/events/hype/progress",
    tag = "events",
    request_body = HypeProgressRequest,
    responses(
        (status = 202, description = "Signal applied"),
        (status = 400, description = "Invalid payload")
    )
)]
pub async fn hype_progress(
    State(state): State<SharedState>,
    Valid(Json(payload)): Valid<Json<HypeProgressRequest>>,
) -> Result<StatusCode, AppError> {
    ingest_service::hype_progress(&state, payload).await?;
    Ok(StatusCode::ACCEPTED)
}

/// Hype train end signal.
#[utoipa::path(
    post,
    path = "/events/hype/end",
    tag = "events",
    request_body = HypeEndRequest,
    responses(
        (status = 202, description = "Signal applied"),
        (status = 400, description = "Invalid payload")
    )
)]
pub async fn hype_end(
    State(state): State<SharedState>,
    Valid(Json(payload)): Valid<Json<HypeEndRequest>>,
) -> Result<StatusCode, AppError> {
    ingest_service::hype_end(&state, payload).await?;
    Ok(StatusCode::ACCEPTED)
}
