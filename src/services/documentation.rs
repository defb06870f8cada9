use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for the grace train backend.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::websocket::ws_handler,
        crate::routes::events::grace,
        crate::routes::events::break_train,
        crate::routes::events::hype_begin,
        crate::routes::events::hype_progress,
        crate::routes::events::hype_end,
        crate::routes::train::current_train,
        crate::routes::train::records,
        crate::routes::train::overlay_position,
        crate::routes::train::user_cars,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::overlay::OverlayOutbound,
            crate::dto::overlay::OverlayInbound,
            crate::dto::overlay::TrainStartMessage,
            crate::dto::ingest::GraceEventRequest,
            crate::dto::ingest::BreakRequest,
            crate::dto::ingest::HypeBeginRequest,
            crate::dto::ingest::HypeProgressRequest,
            crate::dto::ingest::HypeEndRequest,
            crate::dto::ingest::OverlayPositionRequest,
            crate::dto::depot::UserCarsResponse,
            crate::dao::models::RecordDocument,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "events", description = "Normalized chat and hype train signals"),
        (name = "train", description = "Train snapshot, records and overlay control"),
        (name = "overlay", description = "WebSocket protocol for overlays"),
    )
)]
pub struct ApiDoc;
