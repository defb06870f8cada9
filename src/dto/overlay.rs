//! Messages exchanged with overlay WebSocket clients.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::engine::{
    depot::Car,
    events::{AddPayload, EndPayload, StartPayload, TrainAdd, TrainEnd, TrainStart},
    hype::{HypeContribution, HypeTotals},
    train::TrainId,
};

/// Version of the overlay protocol announced in [`InitMessage`].
pub const OVERLAY_PROTOCOL_VERSION: u32 = 1;

/// Where the overlay renders the train.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum OverlayPosition {
    /// Top edge of the screen.
    Top,
    /// Bottom edge of the screen.
    Bottom,
}

/// Messages pushed to overlay clients.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum OverlayOutbound {
    /// First message on every connection.
    Init(InitMessage),
    /// A train became visible, or a snapshot of the live train.
    TrainStart(TrainStartMessage),
    /// A live train grew.
    TrainAdd(TrainAddMessage),
    /// A live train ended.
    TrainEnd(TrainEndMessage),
    /// The overlay should move.
    OverlayPosition(OverlayPositionMessage),
}

/// Messages accepted from overlay clients.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, ToSchema)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum OverlayInbound {
    /// Ask for the current train snapshot.
    TrainQuery,
    /// Anything else is logged and ignored.
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
/// Connection greeting.
pub struct InitMessage {
    /// Protocol version spoken by the server.
    pub version: u32,
    /// No train is visible; no `train-start` follows.
    pub no_trains_active: bool,
    /// Where the overlay should draw.
    pub overlay_position: OverlayPosition,
}

/// Full state of a visible train.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TrainStartMessage {
    /// Train identifier.
    #[schema(value_type = u64)]
    pub id: TrainId,
    /// Events counted so far.
    pub combo_count: u32,
    /// Current final score.
    pub score: u64,
    /// Cosmetic rare-event flag.
    pub easter_egg: bool,
    /// Car colors in train order; absent on hyped trains.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub participant_colors: Option<Vec<String>>,
    /// Full cars in train order; absent on hyped trains.
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Vec<Object>>)]
    pub cars: Option<Vec<Car>>,
    /// Hype totals; present only on hyped trains.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hype_totals: Option<HypeTotals>,
}

/// Growth of a live train.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TrainAddMessage {
    /// Train identifier.
    #[schema(value_type = u64)]
    pub id: TrainId,
    /// Events counted so far.
    pub combo_count: u32,
    /// Current final score.
    pub score: u64,
    /// Color of the new car.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latest_color: Option<String>,
    /// The new car.
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub car: Option<Car>,
    /// Hype totals after the update, on hyped trains.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hype_totals: Option<HypeTotals>,
    /// Contribution that caused the update, on hyped trains.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hype_contribution: Option<HypeContribution>,
}

/// End of a live train.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TrainEndMessage {
    /// Train identifier.
    #[schema(value_type = u64)]
    pub id: TrainId,
    /// Events counted in total.
    pub combo_count: u32,
    /// Final score.
    pub score: u64,
    /// Who broke the train, for normal trains.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ending_user_display_name: Option<String>,
    /// Final hype totals, for hyped trains.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hype_totals: Option<HypeTotals>,
}

/// New overlay position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct OverlayPositionMessage {
    /// Position to switch to.
    pub position: OverlayPosition,
}

impl From<&TrainStart> for TrainStartMessage {
    fn from(start: &TrainStart) -> Self {
        let mut message = Self {
            id: start.id,
            combo_count: start.combo_count,
            score: start.score,
            easter_egg: start.easter_egg,
            participant_colors: None,
            cars: None,
            hype_totals: None,
        };
        match &start.payload {
            StartPayload::Grace { cars } => {
                message.participant_colors = Some(cars.iter().map(|car| car.color.clone()).collect());
                message.cars = Some(cars.clone());
            }
            StartPayload::Hype(totals) => message.hype_totals = Some(totals.clone()),
        }
        message
    }
}

impl From<&TrainAdd> for TrainAddMessage {
    fn from(add: &TrainAdd) -> Self {
        let mut message = Self {
            id: add.id,
            combo_count: add.combo_count,
            score: add.score,
            latest_color: None,
            car: None,
            hype_totals: None,
            hype_contribution: None,
        };
        match &add.payload {
            AddPayload::Grace { car } => {
                message.latest_color = Some(car.color.clone());
                message.car = Some(car.clone());
            }
            AddPayload::Hype {
                totals,
                contribution,
            } => {
                message.hype_totals = Some(totals.clone());
                message.hype_contribution = contribution.clone();
            }
        }
        message
    }
}

impl From<&TrainEnd> for TrainEndMessage {
    fn from(end: &TrainEnd) -> Self {
        let (ending_user_display_name, hype_totals) = match &end.payload {
            EndPayload::Grace {
                ending_user_display_name,
            } => (Some(ending_user_display_name.clone()), None),
            EndPayload::Hype(totals) => (None, Some(totals.clone())),
        };
        Self {
            id: end.id,
            combo_count: end.combo_count,
            score: end.score,
            ending_user_display_name,
            hype_totals,
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn init_uses_kebab_tag_and_camel_fields() {
        let message = OverlayOutbound::Init(InitMessage {
            version: OVERLAY_PROTOCOL_VERSION,
            no_trains_active: true,
            overlay_position: OverlayPosition::Top,
        });

        assert_eq!(
            serde_json::to_value(&message).unwrap(),
            json!({
                "type": "init",
                "version": 1,
                "noTrainsActive": true,
                "overlayPosition": "top",
            })
        );
    }

    #[test]
    fn grace_start_lists_colors_and_omits_hype() {
        let start = TrainStart {
            id: TrainId(42),
            combo_count: 2,
            score: 7,
            easter_egg: false,
            payload: StartPayload::Grace {
                cars: vec![Car::solid("#111111"), Car::solid("#222222")],
            },
        };

        let value =
            serde_json::to_value(OverlayOutbound::TrainStart(TrainStartMessage::from(&start)))
                .unwrap();
        assert_eq!(value["type"], "train-start");
        assert_eq!(value["id"], 42);
        assert_eq!(value["comboCount"], 2);
        assert_eq!(value["participantColors"], json!(["#111111", "#222222"]));
        assert!(value.get("hypeTotals").is_none());
    }

    #[test]
    fn hype_end_carries_totals_instead_of_a_name() {
        let end = TrainEnd {
            id: TrainId(1),
            combo_count: 9,
            score: 30,
            payload: EndPayload::Hype(HypeTotals {
                level: 3,
                ..HypeTotals::default()
            }),
        };

        let value =
            serde_json::to_value(OverlayOutbound::TrainEnd(TrainEndMessage::from(&end))).unwrap();
        assert_eq!(value["type"], "train-end");
        assert_eq!(value["hypeTotals"]["level"], 3);
        assert!(value.get("endingUserDisplayName").is_none());
    }

    #[test]
    fn inbound_query_and_unknown_messages_parse() {
        let query: OverlayInbound = serde_json::from_str(r#"{"type":"train-query"}"#).unwrap();
        assert_eq!(query, OverlayInbound::TrainQuery);

        let other: OverlayInbound = serde_json::from_str(r#"{"type":"dance"}"#).unwrap();
        assert_eq!(other, OverlayInbound::Unknown);

        assert!(serde_json::from_str::<OverlayInbound>("not json").is_err());
    }
}
