//! Entry points for normalized upstream signals and read-side queries.

use tracing::{debug, info};

use crate::{
    dao::models::RecordDocument,
    dto::{
        depot::UserCarsResponse,
        ingest::{
            BreakRequest, GraceEventRequest, HypeBeginRequest, HypeEndRequest,
            HypeProgressRequest,
        },
        overlay::{OverlayPosition, TrainStartMessage},
    },
    engine::{hype::HypeBegin, train::GraceEvent},
    error::ServiceError,
    state::SharedState,
};

/// Count a grace event. Resolves once the engine has applied it.
pub async fn record_grace(state: &SharedState, request: GraceEventRequest) -> Result<(), ServiceError> {
    let event = GraceEvent::from(request);
    debug!(user = %event.user.id, kind = ?event.kind, "grace event received");
    state.machine().on_grace(event).await?;
    Ok(())
}

/// Break the live train because of a non-grace chat message.
pub async fn break_train(state: &SharedState, request: BreakRequest) -> Result<(), ServiceError> {
    state
        .machine()
        .break_train(request.display_name, request.message_id)
        .await?;
    Ok(())
}

/// Log a hype train begin signal.
pub fn hype_begin(state: &SharedState, request: HypeBeginRequest) {
    state.hype().begin(&HypeBegin::from(request));
}

/// Fold a hype train progress signal.
pub async fn hype_progress(
    state: &SharedState,
    request: HypeProgressRequest,
) -> Result<(), ServiceError> {
    state.hype().progress(request.into()).await?;
    Ok(())
}

/// End the hype train and the grace train merged with it.
pub async fn hype_end(state: &SharedState, request: HypeEndRequest) -> Result<(), ServiceError> {
    state.hype().end(request.into()).await?;
    Ok(())
}

/// Snapshot of the visible train, if any.
pub async fn current_train(state: &SharedState) -> Result<Option<TrainStartMessage>, ServiceError> {
    let snapshot = state.machine().current_train().await?;
    Ok(snapshot.as_ref().map(TrainStartMessage::from))
}

/// Both top record lists.
pub async fn records(state: &SharedState) -> Result<RecordDocument, ServiceError> {
    Ok(state.records().all().await?)
}

/// Move every overlay.
pub fn set_overlay_position(state: &SharedState, position: OverlayPosition) {
    state.overlays().set_position(position);
}

/// Cars a user owns at the depot.
pub async fn user_cars(state: &SharedState, user_id: String) -> Result<UserCarsResponse, ServiceError> {
    if user_id.trim().is_empty() || !user_id.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(ServiceError::InvalidInput(format!(
            "user id `{user_id}` must be alphanumeric"
        )));
    }
    let cars = state
        .depot()
        .user_cars(&user_id)
        .await
        .map_err(|err| ServiceError::Depot(err.to_string()))?;
    info!(user = %user_id, count = cars.len(), "fetched depot cars");
    Ok(UserCarsResponse { user_id, cars })
}
