//! Tracking of platform-reported hype trains and their merge into the grace train.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use utoipa::ToSchema;

use crate::engine::{grace::GraceTrainMachine, task_queue::QueueError};

/// Smallest bits contribution shown on the overlay.
pub const MIN_VISIBLE_BITS: u64 = 100;

/// Kind of contribution shown on a hyped train.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ContributionKind {
    /// Cheered bits.
    Bits,
    /// Subscriptions, as a sub count.
    Subs,
    /// A grace event routed onto the hyped train.
    Grace,
}

/// One visible car of a hyped train.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct HypeContribution {
    /// What was contributed.
    pub kind: ContributionKind,
    /// Bits, sub count, or 1 for a grace event.
    pub amount: u64,
    /// Contributor's chat color.
    pub color: String,
}

/// Aggregated hype train progress, as shown on the overlay.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct HypeTotals {
    /// Current hype train level.
    pub level: u32,
    /// Total contribution reported by the platform.
    pub total: u64,
    /// Progress towards the next level.
    pub progress: u64,
    /// Goal of the current level.
    pub goal: u64,
    /// Bits seen in contributions.
    pub bits: u64,
    /// Subscriptions seen in contributions.
    pub subs: u64,
    /// Grace events routed onto the hype train.
    pub graces: u32,
}

/// Contribution kind as reported by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum RawContributionKind {
    /// Bits cheer.
    Bits,
    /// Subscription points.
    Subscription,
}

/// Last contribution attached to a progress signal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawContribution {
    /// Contributor id.
    pub user_id: String,
    /// Contributor chat color.
    pub color: String,
    /// What was contributed.
    pub kind: RawContributionKind,
    /// Raw total; bits, or subscription points.
    pub total: u64,
}

/// Hype train begin signal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HypeBegin {
    /// Platform hype train id.
    pub id: String,
}

/// Hype train progress signal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HypeProgress {
    /// Platform hype train id.
    pub id: String,
    /// Current level.
    pub level: u32,
    /// Total contribution so far.
    pub total: u64,
    /// Progress within the level.
    pub progress: u64,
    /// Goal of the level.
    pub goal: u64,
    /// Contribution that triggered the signal.
    pub last_contribution: Option<RawContribution>,
}

/// Hype train end signal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HypeEnd {
    /// Platform hype train id.
    pub id: String,
    /// Final level.
    pub level: u32,
    /// Final total.
    pub total: u64,
}

/// Turns raw subscription points into a sub count.
///
/// The platform payload shape is not documented, so the conversion is pluggable.
pub trait SubNormalizer: Send + Sync {
    /// Number of subs represented by `raw_total`.
    fn sub_count(&self, raw_total: u64) -> u64;
}

/// Divides raw totals of at least one sub's worth of points by the points per sub.
#[derive(Debug, Clone, Copy)]
pub struct PointsPerSub(pub u64);

impl SubNormalizer for PointsPerSub {
    fn sub_count(&self, raw_total: u64) -> u64 {
        if self.0 > 0 && raw_total >= self.0 {
            raw_total / self.0
        } else {
            raw_total
        }
    }
}

/// The live hype train.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HypeTrainState {
    /// Platform hype train id.
    pub id: String,
    /// Current level.
    pub level: u32,
    /// Largest total seen so far.
    pub total_contribution: u64,
    /// Progress within the level.
    pub progress: u64,
    /// Goal of the level.
    pub goal: u64,
    /// Visible contributions, in arrival order.
    pub contributions: Vec<HypeContribution>,
    /// Bits across all contributions.
    pub bits: u64,
    /// Subs across all contributions.
    pub subs: u64,
    /// Grace events routed onto the hype train.
    pub grace_contributions: u32,
    /// The end signal arrived; the merged grace train is about to end.
    pub ending: bool,
    last_contribution_key: Option<String>,
}

impl HypeTrainState {
    fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            level: 0,
            total_contribution: 0,
            progress: 0,
            goal: 0,
            contributions: Vec::new(),
            bits: 0,
            subs: 0,
            grace_contributions: 0,
            ending: false,
            last_contribution_key: None,
        }
    }

    /// Overlay view of the hype train.
    pub fn totals(&self) -> HypeTotals {
        HypeTotals {
            level: self.level,
            total: self.total_contribution,
            progress: self.progress,
            goal: self.goal,
            bits: self.bits,
            subs: self.subs,
            graces: self.grace_contributions,
        }
    }

    /// Count `raw` once, returning it if it should be shown.
    fn record_contribution(
        &mut self,
        raw: &RawContribution,
        normalizer: &dyn SubNormalizer,
    ) -> Option<HypeContribution> {
        let key = format!("{:?}:{}:{}", raw.kind, raw.user_id, raw.total);
        if self.last_contribution_key.as_deref() == Some(key.as_str()) {
            return None;
        }
        self.last_contribution_key = Some(key);

        let contribution = match raw.kind {
            RawContributionKind::Bits => {
                self.bits += raw.total;
                if raw.total < MIN_VISIBLE_BITS {
                    debug!(bits = raw.total, "bits contribution too small to show");
                    return None;
                }
                HypeContribution {
                    kind: ContributionKind::Bits,
                    amount: raw.total,
                    color: raw.color.clone(),
                }
            }
            RawContributionKind::Subscription => {
                let amount = normalizer.sub_count(raw.total);
                self.subs += amount;
                HypeContribution {
                    kind: ContributionKind::Subs,
                    amount,
                    color: raw.color.clone(),
                }
            }
        };

        self.contributions.push(contribution.clone());
        Some(contribution)
    }
}

#[derive(Default)]
struct BoardSlot {
    live: Option<HypeTrainState>,
    last_ended: Option<String>,
}

/// Shared slot holding the live hype train, read by the grace train machine.
///
/// Also remembers the id of the last hype train that ended, so late signals for it are dropped.
/// The lock is never held across an await.
#[derive(Clone, Default)]
pub struct HypeBoard {
    slot: Arc<Mutex<BoardSlot>>,
}

impl HypeBoard {
    fn lock(&self) -> MutexGuard<'_, BoardSlot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `f` with exclusive access to the live hype train.
    pub fn with<R>(&self, f: impl FnOnce(&mut Option<HypeTrainState>) -> R) -> R {
        f(&mut self.lock().live)
    }

    /// Whether a hype train is live.
    pub fn is_live(&self) -> bool {
        self.with(|slot| slot.is_some())
    }

    /// Totals of the live hype train.
    pub fn totals(&self) -> Option<HypeTotals> {
        self.with(|slot| slot.as_ref().map(HypeTrainState::totals))
    }

    /// Whether `id` names the hype train that already ended.
    pub fn has_ended(&self, id: &str) -> bool {
        self.lock().last_ended.as_deref() == Some(id)
    }

    /// Fold a progress signal in, dropping it if its hype train already ended.
    pub fn fold_progress(
        &self,
        signal: &HypeProgress,
        normalizer: &dyn SubNormalizer,
    ) -> ProgressStep {
        let mut slot = self.lock();
        if slot.last_ended.as_deref() == Some(signal.id.as_str()) {
            debug!(id = %signal.id, "progress for a hype train that already ended; ignoring");
            return ProgressStep::Ignored;
        }
        apply_progress(&mut slot.live, signal, normalizer)
    }

    /// Clear the live hype train, remembering its id, and return its final totals.
    pub fn retire(&self) -> Option<HypeTotals> {
        let mut slot = self.lock();
        let hype = slot.live.take()?;
        let totals = hype.totals();
        slot.last_ended = Some(hype.id);
        Some(totals)
    }
}

/// Result of folding a progress signal into the board.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressStep {
    /// A new hype train was created.
    Created,
    /// The live hype train changed.
    Updated {
        /// Totals after the change.
        totals: HypeTotals,
        /// Newly visible contribution.
        contribution: Option<HypeContribution>,
    },
    /// Nothing changed.
    Ignored,
}

/// Fold `signal` into `slot`.
///
/// Stats only move forward: a signal reporting a smaller total than already seen keeps the
/// previous level and progress, but its contribution is still counted once.
pub fn apply_progress(
    slot: &mut Option<HypeTrainState>,
    signal: &HypeProgress,
    normalizer: &dyn SubNormalizer,
) -> ProgressStep {
    let created = !slot.as_ref().is_some_and(|hype| hype.id == signal.id);
    if created {
        if let Some(previous) = slot.as_ref() {
            warn!(previous = %previous.id, next = %signal.id, "replacing hype train that never ended");
        }
        *slot = Some(HypeTrainState::new(&signal.id));
    }
    let Some(hype) = slot.as_mut() else {
        return ProgressStep::Ignored;
    };

    if hype.ending {
        debug!(id = %hype.id, "hype train is ending; ignoring progress");
        return ProgressStep::Ignored;
    }

    let fresh = signal.total >= hype.total_contribution;
    if fresh {
        hype.level = signal.level;
        hype.total_contribution = signal.total;
        hype.progress = signal.progress;
        hype.goal = signal.goal;
    } else {
        debug!(
            id = %hype.id,
            reported = signal.total,
            known = hype.total_contribution,
            "stale hype progress; keeping stats"
        );
    }

    let contribution = signal
        .last_contribution
        .as_ref()
        .and_then(|raw| hype.record_contribution(raw, normalizer));

    if created {
        ProgressStep::Created
    } else if fresh || contribution.is_some() {
        ProgressStep::Updated {
            totals: hype.totals(),
            contribution,
        }
    } else {
        ProgressStep::Ignored
    }
}

/// Consumes hype train signals and drives the grace train machine accordingly.
#[derive(Clone)]
pub struct HypeTrainTracker {
    board: HypeBoard,
    machine: GraceTrainMachine,
    normalizer: Arc<dyn SubNormalizer>,
}

impl HypeTrainTracker {
    /// Build a tracker sharing `board` with `machine`.
    pub fn new(
        board: HypeBoard,
        machine: GraceTrainMachine,
        normalizer: Arc<dyn SubNormalizer>,
    ) -> Self {
        Self {
            board,
            machine,
            normalizer,
        }
    }

    /// Begin signals are only logged; the first progress signal creates the hype train.
    pub fn begin(&self, signal: &HypeBegin) {
        info!(id = %signal.id, "hype train began");
    }

    /// Apply a progress signal.
    pub async fn progress(&self, signal: HypeProgress) -> Result<(), QueueError> {
        let step = self.board.fold_progress(&signal, self.normalizer.as_ref());

        match step {
            ProgressStep::Created => {
                info!(id = %signal.id, level = signal.level, "hype train is live");
                self.machine.merge_hype().await
            }
            ProgressStep::Updated {
                totals,
                contribution,
            } => self.machine.hype_progress(totals, contribution).await,
            ProgressStep::Ignored => Ok(()),
        }
    }

    /// Apply an end signal: finalize stats, then end the merged grace train.
    pub async fn end(&self, signal: HypeEnd) -> Result<(), QueueError> {
        if self.board.has_ended(&signal.id) {
            debug!(id = %signal.id, "repeated end signal; ignoring");
            return Ok(());
        }

        let known = self.board.with(|slot| match slot {
            Some(hype) if hype.id == signal.id => {
                hype.level = hype.level.max(signal.level);
                hype.total_contribution = hype.total_contribution.max(signal.total);
                hype.ending = true;
                true
            }
            _ => false,
        });

        if !known {
            warn!(id = %signal.id, "end signal for unknown hype train; ignoring");
            return Ok(());
        }

        info!(id = %signal.id, level = signal.level, total = signal.total, "hype train ended");
        self.machine.end_hype().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn progress(total: u64, contribution: Option<RawContribution>) -> HypeProgress {
        HypeProgress {
            id: "hype-1".into(),
            level: 1 + (total / 1000) as u32,
            total,
            progress: total % 1000,
            goal: 1000,
            last_contribution: contribution,
        }
    }

    fn bits(user: &str, total: u64) -> Option<RawContribution> {
        Some(RawContribution {
            user_id: user.into(),
            color: "#9146ff".into(),
            kind: RawContributionKind::Bits,
            total,
        })
    }

    fn subs(user: &str, total: u64) -> Option<RawContribution> {
        Some(RawContribution {
            user_id: user.into(),
            color: "#ff4500".into(),
            kind: RawContributionKind::Subscription,
            total,
        })
    }

    #[test]
    fn first_progress_creates_the_hype_train() {
        let mut slot = None;
        let step = apply_progress(&mut slot, &progress(500, bits("a", 500)), &PointsPerSub(500));

        assert_eq!(step, ProgressStep::Created);
        let hype = slot.unwrap();
        assert_eq!(hype.total_contribution, 500);
        assert_eq!(hype.contributions.len(), 1);
    }

    #[test]
    fn stale_progress_keeps_stats_but_counts_the_contribution() {
        let mut slot = None;
        apply_progress(&mut slot, &progress(1500, None), &PointsPerSub(500));

        let step = apply_progress(&mut slot, &progress(1200, bits("b", 300)), &PointsPerSub(500));

        let hype = slot.as_ref().unwrap();
        assert_eq!(hype.total_contribution, 1500);
        assert_eq!(hype.level, 2);
        match step {
            ProgressStep::Updated { contribution, .. } => {
                assert_eq!(contribution.unwrap().amount, 300)
            }
            other => panic!("expected an update, got {other:?}"),
        }
    }

    #[test]
    fn small_bits_are_hidden_but_do_not_block_stats() {
        let mut slot = None;
        apply_progress(&mut slot, &progress(100, None), &PointsPerSub(500));

        let step = apply_progress(&mut slot, &progress(150, bits("c", 50)), &PointsPerSub(500));

        let hype = slot.as_ref().unwrap();
        assert_eq!(hype.total_contribution, 150);
        assert!(hype.contributions.is_empty());
        assert_eq!(hype.bits, 50);
        assert!(matches!(
            step,
            ProgressStep::Updated {
                contribution: None,
                ..
            }
        ));
    }

    #[test]
    fn repeated_contribution_is_counted_once() {
        let mut slot = None;
        apply_progress(&mut slot, &progress(1000, subs("d", 1000)), &PointsPerSub(500));
        apply_progress(&mut slot, &progress(1000, subs("d", 1000)), &PointsPerSub(500));

        let hype = slot.unwrap();
        assert_eq!(hype.contributions.len(), 1);
        assert_eq!(hype.subs, 2);
    }

    #[test]
    fn retired_hype_train_ignores_late_progress() {
        let board = HypeBoard::default();
        let normalizer = PointsPerSub(500);
        assert_eq!(
            board.fold_progress(&progress(500, None), &normalizer),
            ProgressStep::Created
        );

        assert_eq!(board.retire().unwrap().total, 500);
        assert!(board.has_ended("hype-1"));
        assert_eq!(
            board.fold_progress(&progress(900, bits("e", 400)), &normalizer),
            ProgressStep::Ignored
        );
        assert!(!board.is_live());

        let next = HypeProgress {
            id: "hype-2".into(),
            ..progress(100, None)
        };
        assert_eq!(board.fold_progress(&next, &normalizer), ProgressStep::Created);
    }

    #[test]
    fn sub_points_are_normalized_to_sub_counts() {
        let normalizer = PointsPerSub(500);
        assert_eq!(normalizer.sub_count(2500), 5);
        assert_eq!(normalizer.sub_count(999), 1);
        assert_eq!(normalizer.sub_count(3), 3);
    }
}
