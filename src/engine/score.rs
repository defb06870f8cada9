//! Combo and score bookkeeping for a grace train.
//!
//! Scoring is deterministic and free of I/O: [`Tally::apply`] folds one event into the running
//! totals and nothing else.

use std::collections::{BTreeSet, HashSet};

use indexmap::IndexMap;
use tracing::debug;

use crate::engine::train::{GraceEvent, GraceKind};

/// Base points for a channel-point redemption.
pub const REDEEM_POINTS: u64 = 10;
/// Base points for a highlighted message.
pub const HIGHLIGHT_POINTS: u64 = 5;
/// Base points for a plain chat message.
pub const NORMAL_POINTS: u64 = 1;
/// Base points awarded to recognized bonus accounts, whatever the event kind.
pub const SPECIAL_ACCOUNT_POINTS: u64 = 10_000;

/// Scoring parameters that vary per deployment.
#[derive(Debug, Clone, Default)]
pub struct ScoreRules {
    /// User ids that earn [`SPECIAL_ACCOUNT_POINTS`] instead of the per-kind value.
    pub special_accounts: HashSet<String>,
}

impl ScoreRules {
    /// Base points for `event`, and whether the bonus override applied.
    pub fn base_points(&self, event: &GraceEvent) -> (u64, bool) {
        if self.special_accounts.contains(&event.user.id) {
            return (SPECIAL_ACCOUNT_POINTS, true);
        }

        let points = match event.kind {
            GraceKind::Redeem => REDEEM_POINTS,
            GraceKind::Highlight => HIGHLIGHT_POINTS,
            GraceKind::Normal => NORMAL_POINTS,
        };
        (points, false)
    }
}

/// The active streak of same-kind events.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ComboState {
    /// Sum of base points in this combo.
    pub base_points: u64,
    /// Multiplied score of this combo.
    pub score: u64,
    /// Number of events in this combo.
    pub size: u32,
    /// Users that contributed to this combo.
    pub distinct_user_ids: HashSet<String>,
    /// Scores of every combo that ended before this one.
    pub ended_combo_score_carryover: u64,
}

impl ComboState {
    /// Fold the current combo into the carryover and start an empty one.
    fn roll_over(&mut self) {
        self.ended_combo_score_carryover += self.score;
        self.base_points = 0;
        self.score = 0;
        self.size = 0;
        self.distinct_user_ids.clear();
    }
}

/// Per-user contribution within one train.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Participant {
    /// Latest display name seen for the user.
    pub display_name: String,
    /// Number of events the user contributed.
    pub contribution_count: u32,
}

/// Running totals for one train.
#[derive(Debug, Clone, Default)]
pub struct Tally {
    /// Every event counted so far, across combos.
    pub total_combo_count: u32,
    /// Sum of ended combos plus the current combo score.
    pub running_score: u64,
    /// Running score with the train-wide participant bonus applied.
    pub final_score: u64,
    /// Current combo.
    pub combo: ComboState,
    /// Participants keyed by user id.
    pub participants: IndexMap<String, Participant>,
    /// Bonus accounts that took part.
    pub special_participants: BTreeSet<String>,
    /// Most recent event, used to detect kind changes.
    pub last_event: Option<GraceEvent>,
}

impl Tally {
    /// Count `event` and record its user, without scoring it.
    pub fn record_participation(&mut self, event: &GraceEvent) {
        self.total_combo_count += 1;
        let participant = self
            .participants
            .entry(event.user.id.clone())
            .or_insert_with(|| Participant {
                display_name: event.user.display_name.clone(),
                contribution_count: 0,
            });
        participant.contribution_count += 1;
        participant.display_name = event.user.display_name.clone();
    }

    /// Fold one event into the combo and scores.
    pub fn apply(&mut self, event: &GraceEvent, rules: &ScoreRules) {
        self.record_participation(event);

        if self
            .last_event
            .as_ref()
            .is_some_and(|last| last.kind != event.kind)
        {
            self.combo.roll_over();
        }

        let (points, special) = rules.base_points(event);
        if special {
            self.special_participants.insert(event.user.id.clone());
        }

        self.combo.base_points += points;
        self.combo.size += 1;
        self.combo.distinct_user_ids.insert(event.user.id.clone());
        self.combo.score = combo_score(
            self.combo.base_points,
            self.combo.size,
            self.combo.distinct_user_ids.len(),
        );

        self.running_score = self.combo.ended_combo_score_carryover + self.combo.score;
        self.final_score = with_participant_bonus(self.running_score, self.participants.len());
        self.last_event = Some(event.clone());

        debug!(
            user = %event.user.id,
            kind = ?event.kind,
            combo_size = self.combo.size,
            combo_score = self.combo.score,
            final_score = self.final_score,
            "grace event scored"
        );
    }
}

/// `ceil(base * (1 + (size - 1) / 2) * (1 + (users - 1) / 5))`, computed exactly.
pub fn combo_score(base_points: u64, size: u32, distinct_users: usize) -> u64 {
    if size == 0 || distinct_users == 0 {
        return 0;
    }
    let size = u64::from(size);
    let users = distinct_users as u64;
    (base_points * (size + 1) * (users + 4)).div_ceil(10)
}

/// `ceil(running * (1 + (participants - 1) / 10))`, computed exactly.
pub fn with_participant_bonus(running_score: u64, participants: usize) -> u64 {
    if participants == 0 {
        return running_score;
    }
    (running_score * (participants as u64 + 9)).div_ceil(10)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::train::GraceUser;

    fn event(user: &str, kind: GraceKind) -> GraceEvent {
        GraceEvent {
            timestamp_ms: 0,
            user: GraceUser {
                id: user.into(),
                display_name: user.into(),
                color: "#00ff00".into(),
            },
            kind,
        }
    }

    #[test]
    fn five_normal_events_from_four_users() {
        let rules = ScoreRules::default();
        let mut tally = Tally::default();
        for user in ["user1", "user2", "user3", "user1", "user4"] {
            tally.apply(&event(user, GraceKind::Normal), &rules);
        }

        assert_eq!(tally.combo.size, 5);
        assert_eq!(tally.combo.distinct_user_ids.len(), 4);
        assert_eq!(tally.combo.base_points, 5);
        assert_eq!(tally.combo.score, 24);
        assert_eq!(tally.running_score, 24);
        // ceil(24 * 1.3)
        assert_eq!(tally.final_score, 32);
        assert_eq!(tally.participants["user1"].contribution_count, 2);
    }

    #[test]
    fn kind_change_starts_a_fresh_combo_but_keeps_the_total() {
        let rules = ScoreRules::default();
        let mut tally = Tally::default();
        tally.apply(&event("a", GraceKind::Normal), &rules);
        tally.apply(&event("b", GraceKind::Normal), &rules);
        let before = tally.running_score;

        tally.apply(&event("c", GraceKind::Redeem), &rules);

        assert_eq!(tally.combo.size, 1);
        assert_eq!(tally.combo.base_points, REDEEM_POINTS);
        assert_eq!(tally.combo.distinct_user_ids.len(), 1);
        assert_eq!(tally.combo.ended_combo_score_carryover, before);
        assert_eq!(tally.running_score, before + REDEEM_POINTS);
        assert_eq!(tally.total_combo_count, 3);
    }

    #[test]
    fn combo_score_never_drops_within_a_streak() {
        let rules = ScoreRules::default();
        let mut tally = Tally::default();
        let mut previous = 0;
        for (index, user) in ["a", "b", "a", "a", "c", "d", "a", "b"].iter().enumerate() {
            tally.apply(&event(user, GraceKind::Highlight), &rules);
            assert!(tally.combo.score >= previous, "dropped at event {index}");
            previous = tally.combo.score;
        }
    }

    #[test]
    fn participant_bonus_is_never_negative() {
        let rules = ScoreRules::default();
        let mut tally = Tally::default();
        for user in ["a", "b", "c", "b", "a"] {
            tally.apply(&event(user, GraceKind::Normal), &rules);
            assert!(tally.final_score >= tally.running_score);
        }
    }

    #[test]
    fn special_accounts_earn_the_fixed_bonus() {
        let rules = ScoreRules {
            special_accounts: HashSet::from(["bot".to_string()]),
        };
        let mut tally = Tally::default();
        tally.apply(&event("bot", GraceKind::Normal), &rules);

        assert_eq!(tally.combo.base_points, SPECIAL_ACCOUNT_POINTS);
        assert!(tally.special_participants.contains("bot"));
    }

    #[test]
    fn display_name_tracks_the_latest_value() {
        let rules = ScoreRules::default();
        let mut tally = Tally::default();
        tally.apply(&event("a", GraceKind::Normal), &rules);
        let mut renamed = event("a", GraceKind::Normal);
        renamed.user.display_name = "Renamed".into();
        tally.apply(&renamed, &rules);

        assert_eq!(tally.participants["a"].display_name, "Renamed");
        assert_eq!(tally.participants["a"].contribution_count, 2);
    }
}
