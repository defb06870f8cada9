use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::{
    dao::record_store::RecordOutcome,
    engine::events::{StartPayload, TrainEvent, TrainListener, TrainReport, TrainStart},
};

/// Plain-text line for the chat collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    /// Text to post.
    pub text: String,
    /// Chat message to reply to, when known.
    pub reply_to: Option<String>,
}

/// Turns train lifecycle events into chat lines.
pub struct ChatAnnouncer {
    tx: mpsc::UnboundedSender<ChatMessage>,
}

impl ChatAnnouncer {
    /// Announcer writing to `tx`.
    pub fn new(tx: mpsc::UnboundedSender<ChatMessage>) -> Self {
        Self { tx }
    }

    fn send(&self, text: String, reply_to: Option<String>) {
        if self.tx.send(ChatMessage { text, reply_to }).is_err() {
            debug!("chat receiver gone; dropping announcement");
        }
    }
}

impl TrainListener for ChatAnnouncer {
    fn on_train_event(&self, event: &TrainEvent) {
        match event {
            TrainEvent::Start(start) => self.send(start_text(start), None),
            TrainEvent::Report(report) => self.send(report_text(report), report.reply_to.clone()),
            TrainEvent::Add(_) | TrainEvent::End(_) => {}
        }
    }
}

fn start_text(start: &TrainStart) -> String {
    match start.payload {
        StartPayload::Hype(_) => format!(
            "The grace train just merged with a HYPE TRAIN after {} graces! Nothing can stop it now.",
            start.combo_count
        ),
        StartPayload::Grace { .. } if start.easter_egg => format!(
            "Choo choo! A very special grace train is leaving the station with {} graces!",
            start.combo_count
        ),
        StartPayload::Grace { .. } => format!(
            "A grace train is leaving the station with {} graces!",
            start.combo_count
        ),
    }
}

fn report_text(report: &TrainReport) -> String {
    let mut text = if report.hyped {
        format!(
            "The HYPE TRAIN pulled in after {} graces for {} points.",
            report.record.length, report.record.score
        )
    } else {
        format!(
            "{} broke the grace train! {} graces for {} points.",
            report.ended_by, report.record.length, report.record.score
        )
    };

    // An empty list reads back as an all-zero record; there is nothing to tie.
    let has_previous = report.previous_best.timestamp != 0;
    match report.outcome {
        RecordOutcome::Broken if has_previous => text.push_str(&format!(
            " NEW RECORD! The previous best was {} points.",
            report.previous_best.score
        )),
        RecordOutcome::Broken => text.push_str(" That's a new record!"),
        RecordOutcome::Tied if has_previous => text.push_str(&format!(
            " That ties the record of {} points!",
            report.previous_best.score
        )),
        RecordOutcome::Tied | RecordOutcome::None => {}
    }

    if let Some(top) = &report.top_gracer {
        text.push_str(&format!(" Top gracer: {top}."));
    }
    match report.debut_count {
        0 => {}
        1 => text.push_str(" One new car made its debut."),
        n => text.push_str(&format!(" {n} new cars made their debut.")),
    }

    info!(train_id = %report.id, outcome = ?report.outcome, "announcing train end");
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{dao::models::TrainRecord, engine::train::TrainId};

    fn report(outcome: RecordOutcome, previous: u64) -> TrainReport {
        TrainReport {
            id: TrainId(1),
            hyped: false,
            record: TrainRecord {
                length: 12,
                score: 80,
                participant_count: 5,
                timestamp: 0,
            },
            previous_best: TrainRecord {
                score: previous,
                timestamp: 1_700_000_000_000,
                ..TrainRecord::default()
            },
            outcome,
            debut_count: 2,
            top_gracer: Some("Ann".into()),
            ended_by: "Bob".into(),
            reply_to: Some("msg-9".into()),
        }
    }

    #[test]
    fn report_mentions_record_top_gracer_and_debuts() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let announcer = ChatAnnouncer::new(tx);

        announcer.on_train_event(&TrainEvent::Report(report(RecordOutcome::Broken, 60)));

        let message = rx.try_recv().unwrap();
        assert_eq!(message.reply_to.as_deref(), Some("msg-9"));
        assert!(message.text.starts_with("Bob broke the grace train!"));
        assert!(message.text.contains("previous best was 60"));
        assert!(message.text.contains("Top gracer: Ann."));
        assert!(message.text.contains("2 new cars"));
    }

    #[test]
    fn tie_and_plain_outcomes_differ() {
        assert!(report_text(&report(RecordOutcome::Tied, 80)).contains("ties the record of 80"));
        let plain = report_text(&report(RecordOutcome::None, 90));
        assert!(!plain.contains("record"));
    }

    #[test]
    fn zero_score_against_an_empty_list_is_not_a_tie() {
        let mut empty_hype = report(RecordOutcome::Tied, 0);
        empty_hype.hyped = true;
        empty_hype.record.score = 0;
        empty_hype.previous_best = TrainRecord::default();

        let text = report_text(&empty_hype);
        assert!(text.starts_with("The HYPE TRAIN pulled in"));
        assert!(!text.contains("record"));
    }
}
