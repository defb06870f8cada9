//! The grace train state machine.
//!
//! Lifecycle: `Idle -> Buffering -> Started -> Ended`. A buffering train that is broken before
//! reaching the start threshold is dropped without a trace. A train merged with a hype train is
//! `hyped`: combo breaks no longer affect it and only the hype train's end can end it.
//!
//! All mutation goes through one [`TaskQueue`], so only one operation observes or changes the
//! live train at a time even though operations await the depot and the record store.

use std::sync::Arc;

use futures::future::BoxFuture;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::{
    dao::{models::TrainRecord, record_store::{RecordOutcome, RecordStore}},
    engine::{
        depot::{Car, CarDepot},
        events::{
            AddPayload, EndPayload, Listeners, StartPayload, TrainAdd, TrainEnd, TrainEvent,
            TrainListener, TrainReport, TrainStart,
        },
        hype::{ContributionKind, HypeBoard, HypeContribution, HypeTotals},
        score::ScoreRules,
        task_queue::{QueueError, TaskQueue},
        train::{CommittedEvent, GraceEvent, GraceTrainState, TrainIdSource, unix_millis},
    },
};

/// Display name credited with ending a train when its hype train ends.
pub const HYPE_TRAIN_ENDER: &str = "HYPE TRAIN";

/// Tunables of the state machine.
#[derive(Debug, Clone)]
pub struct GraceSettings {
    /// Buffered events needed before a train starts.
    pub min_train_length: usize,
    /// Events a train needs before it can have a top gracer.
    pub top_gracer_min_events: u32,
    /// Distinct participants a train needs before it can have a top gracer.
    pub top_gracer_min_participants: usize,
    /// Chance in `[0, 1]` that a new train gets the easter egg flag.
    pub easter_egg_chance: f64,
    /// Point values.
    pub score_rules: ScoreRules,
}

impl Default for GraceSettings {
    fn default() -> Self {
        Self {
            min_train_length: 5,
            top_gracer_min_events: 15,
            top_gracer_min_participants: 4,
            easter_egg_chance: 0.0,
            score_rules: ScoreRules::default(),
        }
    }
}

/// Why a train is being broken.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BreakCause {
    /// A chat message that was not a grace event.
    ComboBroken {
        /// Author of the message.
        display_name: String,
        /// Id of the message, for chat replies.
        message_id: Option<String>,
    },
    /// The merged hype train ended.
    HypeTrainEnded(HypeTotals),
}

impl BreakCause {
    fn ended_by(&self) -> &str {
        match self {
            BreakCause::ComboBroken { display_name, .. } => display_name,
            BreakCause::HypeTrainEnded(_) => HYPE_TRAIN_ENDER,
        }
    }
}

struct GraceCore {
    train: Option<GraceTrainState>,
    ids: TrainIdSource,
    settings: GraceSettings,
    depot: Arc<dyn CarDepot>,
    records: RecordStore,
    hype: HypeBoard,
    listeners: Listeners,
}

/// Handle to the grace train state machine. Cloning shares the same machine.
#[derive(Clone)]
pub struct GraceTrainMachine {
    queue: TaskQueue,
    core: Arc<Mutex<GraceCore>>,
}

/// Builder collecting the collaborators of a [`GraceTrainMachine`].
pub struct GraceTrainMachineBuilder {
    settings: GraceSettings,
    depot: Arc<dyn CarDepot>,
    records: RecordStore,
    hype: HypeBoard,
    listeners: Listeners,
}

impl GraceTrainMachineBuilder {
    /// Use `settings` instead of the defaults.
    pub fn settings(mut self, settings: GraceSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Share `board` with a hype train tracker.
    pub fn hype_board(mut self, board: HypeBoard) -> Self {
        self.hype = board;
        self
    }

    /// Register a lifecycle observer.
    pub fn listener(mut self, listener: Arc<dyn TrainListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    /// Spawn the machine's task queue and return the handle.
    pub fn build(self) -> GraceTrainMachine {
        GraceTrainMachine {
            queue: TaskQueue::spawn("grace-train"),
            core: Arc::new(Mutex::new(GraceCore {
                train: None,
                ids: TrainIdSource::default(),
                settings: self.settings,
                depot: self.depot,
                records: self.records,
                hype: self.hype,
                listeners: self.listeners,
            })),
        }
    }
}

impl GraceTrainMachine {
    /// Start building a machine around its two mandatory collaborators.
    pub fn builder(depot: Arc<dyn CarDepot>, records: RecordStore) -> GraceTrainMachineBuilder {
        GraceTrainMachineBuilder {
            settings: GraceSettings::default(),
            depot,
            records,
            hype: HypeBoard::default(),
            listeners: Listeners::default(),
        }
    }

    fn submit<F, Fut, T>(&self, operation: F) -> BoxFuture<'static, Result<T, QueueError>>
    where
        F: FnOnce(tokio::sync::OwnedMutexGuard<GraceCore>) -> Fut + Send + 'static,
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let core = self.core.clone();
        self.queue.enqueue(async move {
            let guard = core.lock_owned().await;
            operation(guard).await
        })
    }

    /// Count a grace event.
    pub fn on_grace(&self, event: GraceEvent) -> BoxFuture<'static, Result<(), QueueError>> {
        self.submit(move |mut core| async move { core.on_grace(event).await })
    }

    /// Break the live train because `display_name` posted a non-grace message.
    pub fn break_train(
        &self,
        display_name: impl Into<String>,
        message_id: Option<String>,
    ) -> BoxFuture<'static, Result<(), QueueError>> {
        let cause = BreakCause::ComboBroken {
            display_name: display_name.into(),
            message_id,
        };
        self.submit(move |mut core| async move { core.break_train(cause).await })
    }

    /// Snapshot of the live train, if it is visible.
    pub fn current_train(&self) -> BoxFuture<'static, Result<Option<TrainStart>, QueueError>> {
        self.submit(|core| async move { core.current_train() })
    }

    /// Merge the live hype train into the grace train, creating one if needed.
    pub fn merge_hype(&self) -> BoxFuture<'static, Result<(), QueueError>> {
        self.submit(|mut core| async move { core.merge_hype() })
    }

    /// Publish hype progress on the hyped train.
    pub fn hype_progress(
        &self,
        totals: HypeTotals,
        contribution: Option<HypeContribution>,
    ) -> BoxFuture<'static, Result<(), QueueError>> {
        self.submit(move |core| async move { core.hype_progress(totals, contribution) })
    }

    /// End the hyped train and clear the hype board.
    pub fn end_hype(&self) -> BoxFuture<'static, Result<(), QueueError>> {
        self.submit(|mut core| async move {
            let totals = core.hype.retire();
            match totals {
                Some(totals) => core.break_train(BreakCause::HypeTrainEnded(totals)).await,
                None => warn!("hype train end requested but no hype train is live"),
            }
        })
    }
}

impl GraceCore {
    fn new_train(&mut self) -> GraceTrainState {
        let chance = self.settings.easter_egg_chance.clamp(0.0, 1.0);
        let easter_egg = chance > 0.0 && rand::random_bool(chance);
        let train = GraceTrainState::new(self.ids.next_id(), easter_egg);
        debug!(train_id = %train.train_id, easter_egg, "new grace train buffering");
        train
    }

    async fn on_grace(&mut self, event: GraceEvent) {
        if self.train.is_none() {
            let train = self.new_train();
            self.train = Some(train);
        }

        if self.hype.is_live() {
            self.merge_hype();
            self.add_hype_grace(&event);
            return;
        }

        let Some(train) = self.train.as_mut() else {
            return;
        };
        if train.hyped {
            // The hype board was cleared by an end that has not been applied yet.
            debug!(train_id = %train.train_id, "hyped train is ending; counting grace without scoring");
            train.tally.record_participation(&event);
            return;
        }

        train.tally.apply(&event, &self.settings.score_rules);
        let score = train.tally.final_score;

        if train.started {
            let index = train.committed_events.len();
            let car = self
                .depot
                .assign_car(train.train_id, score, &event.user, index)
                .await;
            train.committed_events.push(CommittedEvent {
                event,
                car: car.clone(),
            });

            self.listeners.publish(TrainEvent::Add(TrainAdd {
                id: train.train_id,
                combo_count: train.tally.total_combo_count,
                score,
                payload: AddPayload::Grace { car },
            }));
            return;
        }

        train.pending_events.push(event);
        if train.pending_events.len() < self.settings.min_train_length {
            debug!(
                train_id = %train.train_id,
                buffered = train.pending_events.len(),
                "grace train still buffering"
            );
            return;
        }

        let users: Vec<_> = train
            .pending_events
            .iter()
            .map(|pending| pending.user.clone())
            .collect();
        let cars = self
            .depot
            .start_batch(train.train_id, score, &users)
            .await;

        let committed = train
            .pending_events
            .drain(..)
            .enumerate()
            .map(|(index, pending)| {
                let car = cars
                    .get(index)
                    .cloned()
                    .unwrap_or_else(|| Car::solid(pending.user.color.clone()));
                CommittedEvent {
                    event: pending,
                    car,
                }
            });
        train.committed_events.extend(committed);
        train.started = true;

        info!(
            train_id = %train.train_id,
            length = train.committed_events.len(),
            score,
            "grace train started"
        );
        self.listeners.publish(TrainEvent::Start(TrainStart {
            id: train.train_id,
            combo_count: train.tally.total_combo_count,
            score,
            easter_egg: train.easter_egg_active,
            payload: StartPayload::Grace { cars: train.cars() },
        }));
    }

    /// Route a grace event onto the hyped train.
    fn add_hype_grace(&mut self, event: &GraceEvent) {
        let Some(train) = self.train.as_mut() else {
            warn!("hype grace without a live train");
            return;
        };
        train.tally.record_participation(event);

        let contribution = HypeContribution {
            kind: ContributionKind::Grace,
            amount: 1,
            color: event.user.color.clone(),
        };
        let totals = self.hype.with(|slot| {
            slot.as_mut().map(|hype| {
                hype.grace_contributions += 1;
                hype.contributions.push(contribution.clone());
                hype.totals()
            })
        });
        let Some(totals) = totals else {
            return;
        };

        self.listeners.publish(TrainEvent::Add(TrainAdd {
            id: train.train_id,
            combo_count: train.tally.total_combo_count,
            score: train.tally.final_score,
            payload: AddPayload::Hype {
                totals,
                contribution: Some(contribution),
            },
        }));
    }

    fn merge_hype(&mut self) {
        if self.train.is_none() {
            let train = self.new_train();
            self.train = Some(train);
        }
        let Some(train) = self.train.as_mut() else {
            return;
        };
        if train.hyped {
            return;
        }

        let combo_count = train.tally.total_combo_count;
        let totals = self.hype.with(|slot| {
            slot.as_mut().map(|hype| {
                hype.grace_contributions = combo_count;
                hype.totals()
            })
        });
        let Some(totals) = totals else {
            warn!(train_id = %train.train_id, "no live hype train to merge");
            return;
        };

        train.hyped = true;
        info!(
            train_id = %train.train_id,
            was_started = train.started,
            graces = combo_count,
            "grace train merged with hype train"
        );
        self.listeners.publish(TrainEvent::Start(TrainStart {
            id: train.train_id,
            combo_count,
            score: train.tally.final_score,
            easter_egg: train.easter_egg_active,
            payload: StartPayload::Hype(totals),
        }));
    }

    fn hype_progress(&self, totals: HypeTotals, contribution: Option<HypeContribution>) {
        let Some(train) = self.train.as_ref().filter(|train| train.hyped) else {
            warn!("hype progress without a hyped grace train; ignoring");
            return;
        };

        self.listeners.publish(TrainEvent::Add(TrainAdd {
            id: train.train_id,
            combo_count: train.tally.total_combo_count,
            score: train.tally.final_score,
            payload: AddPayload::Hype {
                totals,
                contribution,
            },
        }));
    }

    async fn break_train(&mut self, cause: BreakCause) {
        let Some(train) = self.train.as_ref() else {
            debug!(ended_by = cause.ended_by(), "no live train to break");
            return;
        };

        let hype_end = matches!(cause, BreakCause::HypeTrainEnded(_));
        if train.hyped && !hype_end {
            debug!(train_id = %train.train_id, "hyped train ignores combo breaks");
            return;
        }
        if !train.started && !train.hyped {
            debug!(
                train_id = %train.train_id,
                buffered = train.pending_events.len(),
                "discarding grace train below start threshold"
            );
            self.train = None;
            return;
        }

        let Some(train) = self.train.take() else {
            return;
        };
        let score = train.tally.final_score;
        let ended_by = cause.ended_by().to_string();

        let (payload, reply_to) = match cause {
            BreakCause::ComboBroken {
                display_name,
                message_id,
            } => (
                EndPayload::Grace {
                    ending_user_display_name: display_name,
                },
                message_id,
            ),
            BreakCause::HypeTrainEnded(totals) => (EndPayload::Hype(totals), None),
        };

        info!(
            train_id = %train.train_id,
            length = train.tally.total_combo_count,
            score,
            hyped = train.hyped,
            ended_by = %ended_by,
            "grace train ended"
        );
        self.listeners.publish(TrainEvent::End(TrainEnd {
            id: train.train_id,
            combo_count: train.tally.total_combo_count,
            score,
            payload,
        }));

        let outcome = self.depot.end_train(train.train_id, score).await;
        let top_gracer = train.top_gracer(
            self.settings.top_gracer_min_events,
            self.settings.top_gracer_min_participants,
        );

        let record = TrainRecord {
            length: train.tally.total_combo_count,
            score,
            participant_count: u32::try_from(train.tally.participants.len()).unwrap_or(u32::MAX),
            timestamp: unix_millis(),
        };
        let previous_best = self.records.best(train.hyped).await;
        let record_outcome = RecordOutcome::judge(score, previous_best.score);
        self.records.save(record, train.hyped).await;

        self.listeners.publish(TrainEvent::Report(TrainReport {
            id: train.train_id,
            hyped: train.hyped,
            record,
            previous_best,
            outcome: record_outcome,
            debut_count: outcome.debut_count,
            top_gracer,
            ended_by,
            reply_to,
        }));
    }

    fn current_train(&self) -> Option<TrainStart> {
        let train = self.train.as_ref()?;

        if train.hyped {
            let totals = self.hype.totals().unwrap_or_default();
            return Some(TrainStart {
                id: train.train_id,
                combo_count: train.tally.total_combo_count,
                score: train.tally.final_score,
                easter_egg: train.easter_egg_active,
                payload: StartPayload::Hype(totals),
            });
        }

        if !train.started || train.committed_events.len() < self.settings.min_train_length {
            return None;
        }

        Some(TrainStart {
            id: train.train_id,
            combo_count: train.tally.total_combo_count,
            score: train.tally.final_score,
            easter_egg: train.easter_egg_active,
            payload: StartPayload::Grace { cars: train.cars() },
        })
    }
}
