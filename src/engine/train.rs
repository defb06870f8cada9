//! Data model for grace events and the live grace train.

use std::fmt;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use utoipa::ToSchema;

use crate::engine::{
    depot::Car,
    score::{Participant, Tally},
};

/// Kind of chat interaction that produced a grace event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum GraceKind {
    /// Channel-point redemption of the grace reward.
    Redeem,
    /// Highlighted chat message containing the grace phrase.
    Highlight,
    /// Plain chat message containing the grace phrase.
    Normal,
}

/// Chat user credited with a grace event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraceUser {
    /// Stable platform identifier.
    pub id: String,
    /// Name as currently displayed in chat; may change between events.
    pub display_name: String,
    /// Chat color, used as the fallback car color.
    pub color: String,
}

/// A single qualifying chat message or reward redemption.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraceEvent {
    /// Unix timestamp in milliseconds.
    pub timestamp_ms: i64,
    /// User credited for the event.
    pub user: GraceUser,
    /// What kind of interaction it was.
    pub kind: GraceKind,
}

impl GraceEvent {
    /// Build an event stamped with the current wall clock.
    pub fn now(user: GraceUser, kind: GraceKind) -> Self {
        Self {
            timestamp_ms: unix_millis(),
            user,
            kind,
        }
    }
}

/// Opaque train identifier derived from a monotonic millisecond timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrainId(pub u64);

impl fmt::Display for TrainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Hands out strictly increasing [`TrainId`]s, even if the wall clock stalls or steps back.
#[derive(Debug, Default)]
pub struct TrainIdSource {
    last: u64,
}

impl TrainIdSource {
    /// Allocate the next identifier.
    pub fn next_id(&mut self) -> TrainId {
        let now = u64::try_from(unix_millis()).unwrap_or(0);
        self.last = now.max(self.last + 1);
        TrainId(self.last)
    }
}

/// A grace event that made it onto the visible train, with its decorative car.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommittedEvent {
    /// The event itself.
    pub event: GraceEvent,
    /// Car assigned by the depot (or the solid-color fallback).
    pub car: Car,
}

/// Aggregate root for one grace train lifecycle.
#[derive(Debug, Clone)]
pub struct GraceTrainState {
    /// Identifier assigned at creation.
    pub train_id: TrainId,
    /// Whether the start threshold has been reached.
    pub started: bool,
    /// Whether the train merged with a live hype train.
    pub hyped: bool,
    /// Cosmetic rare-event flag rolled once per train.
    pub easter_egg_active: bool,
    /// Scores, combo, and participants.
    pub tally: Tally,
    /// Events collected before the train started, in arrival order.
    pub pending_events: Vec<GraceEvent>,
    /// Events on the visible train, in arrival order.
    pub committed_events: Vec<CommittedEvent>,
}

impl GraceTrainState {
    /// Fresh, empty train in the buffering state.
    pub fn new(train_id: TrainId, easter_egg_active: bool) -> Self {
        Self {
            train_id,
            started: false,
            hyped: false,
            easter_egg_active,
            tally: Tally::default(),
            pending_events: Vec::new(),
            committed_events: Vec::new(),
        }
    }

    /// Cars of the committed events, in train order.
    pub fn cars(&self) -> Vec<Car> {
        self.committed_events
            .iter()
            .map(|committed| committed.car.clone())
            .collect()
    }

    /// Display name of the participant whose contribution count strictly beats everyone else.
    ///
    /// Only trains with at least `min_events` events and `min_participants` distinct
    /// participants can have a top gracer; ties produce none.
    pub fn top_gracer(&self, min_events: u32, min_participants: usize) -> Option<String> {
        let participants = &self.tally.participants;
        if self.tally.total_combo_count < min_events || participants.len() < min_participants {
            return None;
        }

        let mut best: Option<&Participant> = None;
        let mut tied = false;
        for participant in participants.values() {
            match best {
                Some(current) if participant.contribution_count == current.contribution_count => {
                    tied = true;
                }
                Some(current) if participant.contribution_count < current.contribution_count => {}
                _ => {
                    best = Some(participant);
                    tied = false;
                }
            }
        }

        if tied {
            None
        } else {
            best.map(|participant| participant.display_name.clone())
        }
    }
}

/// Current Unix time in milliseconds.
pub fn unix_millis() -> i64 {
    i64::try_from(OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000).unwrap_or(0)
}
