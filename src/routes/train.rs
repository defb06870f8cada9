use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, put},
};

use crate::{
    dao::models::RecordDocument,
    dto::{depot::UserCarsResponse, ingest::OverlayPositionRequest, overlay::TrainStartMessage},
    error::AppError,
    services::ingest_service,
    state::SharedState,
};

/// Read-side routes and overlay control.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/train", get(current_train))
        .route("/records", get(records))
        .route("/overlay/position", put(overlay_position))
        .route("/depot/users/{id}/cars", get(user_cars))
}

/// Snapshot of the visible train.
#[utoipa::path(
    get,
    path = "/train",
    tag = "train",
    responses(
        (status = 200, description = "A train is visible", body = TrainStartMessage),
        (status = 204, description = "No visible train")
    )
)]
pub async fn current_train(State(state): State<SharedState>) -> Result<Response, AppError> {
    let snapshot = ingest_service::current_train(&state).await?;
    Ok(match snapshot {
        Some(snapshot) => Json(snapshot).into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    })
}

/// Both top record lists.
#[utoipa::path(
    get,
    path = "/records",
    tag = "train",
    responses(
        (status = 200, description = "Stored records", body = RecordDocument),
        (status = 503, description = "Record store unavailable")
    )
)]
pub async fn records(State(state): State<SharedState>) -> Result<Json<RecordDocument>, AppError> {
    let document = ingest_service::records(&state).await?;
    Ok(Json(document))
}

/// Move every overlay.
#[utoipa::path(
    put,
    path = "/overlay/position",
    tag = "train",
    request_body = OverlayPositionRequest,
    responses((status = 204, description = "Position broadcast"))
)]
pub async fn overlay_position(
    State(state): State<SharedState>,
    Json(payload): Json<OverlayPositionRequest>,
) -> StatusCode {
    ingest_service::set_overlay_position(&state, payload.position);
    StatusCode::NO_CONTENT
}

/// Cars a chat user owns at the depot.
#[utoipa::path(
    get,
    path = "/depot/users/{id}/cars",
    tag = "train",
    params(("id" = String, Path, description = "Chat user id")),
    responses(
        (status = 200, description = "Owned cars", body = UserCarsResponse),
        (status = 503, description = "Depot unavailable")
    )
)]
pub async fn user_cars(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<UserCarsResponse>, AppError> {
    let cars = ingest_service::user_cars(&state, id).await?;
    Ok(Json(cars))
}
