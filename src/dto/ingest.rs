//! Normalized upstream signals accepted on the `/events` routes.

use serde::Deserialize;
use utoipa::ToSchema;
use validator::Validate;

use crate::{
    dto::{overlay::OverlayPosition, validation::validate_color},
    engine::{
        hype::{HypeBegin, HypeEnd, HypeProgress, RawContribution, RawContributionKind},
        train::{GraceEvent, GraceKind, GraceUser, unix_millis},
    },
};

/// Chat user credited with a grace event.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct GraceUserInput {
    /// Stable platform id.
    #[validate(length(min = 1))]
    pub id: String,
    /// Name shown in chat.
    #[validate(length(min = 1))]
    pub display_name: String,
    /// Chat color as `#rrggbb`.
    #[validate(custom(function = "validate_color"))]
    pub color: String,
}

/// A chat message or redemption recognized as a grace.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct GraceEventRequest {
    /// Credited user.
    #[validate(nested)]
    pub user: GraceUserInput,
    /// Message, highlight or redemption.
    pub kind: GraceKind,
    /// Unix milliseconds; defaults to the time of receipt.
    #[serde(default)]
    pub timestamp_ms: Option<i64>,
}

impl From<GraceEventRequest> for GraceEvent {
    fn from(request: GraceEventRequest) -> Self {
        Self {
            timestamp_ms: request.timestamp_ms.unwrap_or_else(unix_millis),
            user: GraceUser {
                id: request.user.id,
                display_name: request.user.display_name,
                color: request.user.color,
            },
            kind: request.kind,
        }
    }
}

/// A chat message that was not a grace.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct BreakRequest {
    /// Who broke the combo.
    #[validate(length(min = 1))]
    pub display_name: String,
    /// Chat message id, used to reply when announcing the end.
    #[serde(default)]
    pub message_id: Option<String>,
}

/// Hype train begin signal.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct HypeBeginRequest {
    /// Platform hype train id.
    #[validate(length(min = 1))]
    pub id: String,
}

impl From<HypeBeginRequest> for HypeBegin {
    fn from(request: HypeBeginRequest) -> Self {
        Self { id: request.id }
    }
}

/// Contribution attached to a hype progress signal.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct HypeContributionInput {
    /// Contributing user.
    #[validate(length(min = 1))]
    pub user_id: String,
    /// Their chat color as `#rrggbb`.
    #[validate(custom(function = "validate_color"))]
    pub color: String,
    /// Bits or subscription.
    pub kind: RawContributionKind,
    /// Bits, or raw subscription points.
    pub total: u64,
}

/// Hype train progress signal.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct HypeProgressRequest {
    /// Platform hype train id.
    #[validate(length(min = 1))]
    pub id: String,
    /// Current level.
    pub level: u32,
    /// Total contribution so far.
    pub total: u64,
    /// Progress toward the next level.
    pub progress: u64,
    /// Points needed for the next level.
    pub goal: u64,
    /// Contribution that triggered this signal.
    #[serde(default)]
    #[validate(nested)]
    pub last_contribution: Option<HypeContributionInput>,
}

impl From<HypeProgressRequest> for HypeProgress {
    fn from(request: HypeProgressRequest) -> Self {
        Self {
            id: request.id,
            level: request.level,
            total: request.total,
            progress: request.progress,
            goal: request.goal,
            last_contribution: request.last_contribution.map(|raw| RawContribution {
                user_id: raw.user_id,
                color: raw.color,
                kind: raw.kind,
                total: raw.total,
            }),
        }
    }
}

/// Hype train end signal.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct HypeEndRequest {
    /// Platform hype train id.
    #[validate(length(min = 1))]
    pub id: String,
    /// Level reached.
    pub level: u32,
    /// Final total contribution.
    pub total: u64,
}

impl From<HypeEndRequest> for HypeEnd {
    fn from(request: HypeEndRequest) -> Self {
        Self {
            id: request.id,
            level: request.level,
            total: request.total,
        }
    }
}

/// Request to move the overlay.
#[derive(Debug, Deserialize, ToSchema)]
pub struct OverlayPositionRequest {
    /// Where overlays should draw.
    pub position: OverlayPosition,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grace_request_validates_nested_user() {
        let request: GraceEventRequest = serde_json::from_str(
            r##"{"user":{"id":"1","display_name":"Ann","color":"nope"},"kind":"normal"}"##,
        )
        .unwrap();
        assert!(request.validate().is_err());

        let request: GraceEventRequest = serde_json::from_str(
            r##"{"user":{"id":"1","display_name":"Ann","color":"#abcdef"},"kind":"redeem","timestamp_ms":5}"##,
        )
        .unwrap();
        assert!(request.validate().is_ok());
        let event = GraceEvent::from(request);
        assert_eq!(event.timestamp_ms, 5);
        assert_eq!(event.kind, GraceKind::Redeem);
    }

    #[test]
    fn progress_request_validates_contribution() {
        let request: HypeProgressRequest = serde_json::from_str(
            r##"{"id":"h","level":1,"total":10,"progress":10,"goal":100,
                "last_contribution":{"user_id":"","color":"#000000","kind":"bits","total":10}}"##,
        )
        .unwrap();
        assert!(request.validate().is_err());
    }
}
