//! Lifecycle events emitted by the grace train machine, and the observers that receive them.

use std::sync::Arc;

use crate::{
    dao::{models::TrainRecord, record_store::RecordOutcome},
    engine::{
        depot::Car,
        hype::{HypeContribution, HypeTotals},
        train::TrainId,
    },
};

/// Payload specific to how a train started.
#[derive(Debug, Clone, PartialEq)]
pub enum StartPayload {
    /// Normal start: the buffered events reached the threshold.
    Grace {
        /// Cars of the committed events, in arrival order.
        cars: Vec<Car>,
    },
    /// The train merged with a hype train.
    Hype(HypeTotals),
}

/// A train became visible.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainStart {
    /// Train identifier.
    pub id: TrainId,
    /// Events counted so far.
    pub combo_count: u32,
    /// Current final score.
    pub score: u64,
    /// Cosmetic rare-event flag.
    pub easter_egg: bool,
    /// How the train started.
    pub payload: StartPayload,
}

/// Payload of a train extension.
#[derive(Debug, Clone, PartialEq)]
pub enum AddPayload {
    /// A grace event was committed with this car.
    Grace {
        /// Car of the newly committed event.
        car: Car,
    },
    /// A hyped train progressed.
    Hype {
        /// Hype totals after the update.
        totals: HypeTotals,
        /// Visible contribution that caused the update, if any.
        contribution: Option<HypeContribution>,
    },
}

/// A live train grew.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainAdd {
    /// Train identifier.
    pub id: TrainId,
    /// Events counted so far.
    pub combo_count: u32,
    /// Current final score.
    pub score: u64,
    /// What was added.
    pub payload: AddPayload,
}

/// Payload describing why a train ended.
#[derive(Debug, Clone, PartialEq)]
pub enum EndPayload {
    /// A chat message broke the combo.
    Grace {
        /// Display name of the user whose message broke the train.
        ending_user_display_name: String,
    },
    /// The merged hype train ended.
    Hype(HypeTotals),
}

/// A live train ended.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainEnd {
    /// Train identifier.
    pub id: TrainId,
    /// Events counted in total.
    pub combo_count: u32,
    /// Final score.
    pub score: u64,
    /// Why the train ended.
    pub payload: EndPayload,
}

/// Post-mortem of an ended train, published once the record is persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainReport {
    /// Train identifier.
    pub id: TrainId,
    /// Whether the record went to the hyped list.
    pub hyped: bool,
    /// Record that was saved.
    pub record: TrainRecord,
    /// Best record of the same list before this one was saved.
    pub previous_best: TrainRecord,
    /// Whether the train beat or tied the previous best.
    pub outcome: RecordOutcome,
    /// Cars that appeared for the first time, as reported by the depot.
    pub debut_count: u32,
    /// Participant that strictly out-contributed everyone else.
    pub top_gracer: Option<String>,
    /// Display name of whoever ended the train.
    pub ended_by: String,
    /// Chat message to reply to when announcing the end.
    pub reply_to: Option<String>,
}

/// Every event the machine publishes.
#[derive(Debug, Clone, PartialEq)]
pub enum TrainEvent {
    /// See [`TrainStart`].
    Start(TrainStart),
    /// See [`TrainAdd`].
    Add(TrainAdd),
    /// See [`TrainEnd`].
    End(TrainEnd),
    /// See [`TrainReport`].
    Report(TrainReport),
}

/// Observer of train lifecycle events. Called synchronously, in emission order.
pub trait TrainListener: Send + Sync {
    /// Handle one event. Must not block.
    fn on_train_event(&self, event: &TrainEvent);
}

/// Ordered list of observers.
#[derive(Clone, Default)]
pub struct Listeners {
    listeners: Vec<Arc<dyn TrainListener>>,
}

impl Listeners {
    /// Append an observer.
    pub fn push(&mut self, listener: Arc<dyn TrainListener>) {
        self.listeners.push(listener);
    }

    /// Deliver `event` to every observer.
    pub fn publish(&self, event: TrainEvent) {
        for listener in &self.listeners {
            listener.on_train_event(&event);
        }
    }
}
