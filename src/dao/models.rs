use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Persisted summary of an ended train.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct TrainRecord {
    /// Number of grace events on the train.
    pub length: u32,
    /// Final score.
    pub score: u64,
    /// Distinct participants.
    pub participant_count: u32,
    /// Unix timestamp (milliseconds) of the end of the train.
    pub timestamp: i64,
}

/// Document holding both top record lists.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct RecordDocument {
    /// Best trains that never merged with a hype train.
    #[serde(default)]
    pub grace_records: Vec<TrainRecord>,
    /// Best trains that merged with a hype train.
    #[serde(default)]
    pub hyped_records: Vec<TrainRecord>,
}

impl RecordDocument {
    /// The list a train belongs to.
    pub fn list(&self, hyped: bool) -> &[TrainRecord] {
        if hyped {
            &self.hyped_records
        } else {
            &self.grace_records
        }
    }

    /// Mutable access to the list a train belongs to.
    pub fn list_mut(&mut self, hyped: bool) -> &mut Vec<TrainRecord> {
        if hyped {
            &mut self.hyped_records
        } else {
            &mut self.grace_records
        }
    }
}
