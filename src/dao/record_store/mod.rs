/// CouchDB-backed document store.
#[cfg(feature = "couch-store")]
pub mod couchdb;
mod file;
mod memory;

use std::{sync::Arc, time::Duration};

use futures::future::BoxFuture;
use serde::Serialize;
use tokio::time::sleep;
use tracing::{info, warn};
use utoipa::ToSchema;

use crate::dao::{
    models::{RecordDocument, TrainRecord},
    storage::StorageResult,
};

pub use self::file::JsonFileStore;
pub use self::memory::MemoryStore;

/// Maximum entries kept in each record list.
pub const MAX_RECORDS: usize = 5;

const INITIAL_RETRY_DELAY: Duration = Duration::from_millis(500);
const MAX_RETRY_DELAY: Duration = Duration::from_secs(10);

/// Abstraction over the key-value store holding the record document.
pub trait DocumentStore: Send + Sync {
    /// Fetch the document; a store that was never written reads as empty.
    fn read(&self) -> BoxFuture<'static, StorageResult<RecordDocument>>;
    /// Replace the document.
    fn write(&self, document: RecordDocument) -> BoxFuture<'static, StorageResult<()>>;
}

/// How a finished train compares to the best record of its list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum RecordOutcome {
    /// Strictly greater score.
    Broken,
    /// Exactly equal score.
    Tied,
    /// Anything else.
    None,
}

impl RecordOutcome {
    /// Compare `score` against the previous best score.
    pub fn judge(score: u64, best: u64) -> Self {
        match score.cmp(&best) {
            std::cmp::Ordering::Greater => RecordOutcome::Broken,
            std::cmp::Ordering::Equal => RecordOutcome::Tied,
            std::cmp::Ordering::Less => RecordOutcome::None,
        }
    }
}

/// Append `record`, sort by descending score, and keep the top [`MAX_RECORDS`].
pub fn insert_record(list: &mut Vec<TrainRecord>, record: TrainRecord) {
    list.push(record);
    list.sort_by(|a, b| b.score.cmp(&a.score));
    list.truncate(MAX_RECORDS);
}

/// Reads and updates the top record lists.
#[derive(Clone)]
pub struct RecordStore {
    store: Arc<dyn DocumentStore>,
    initial_delay: Duration,
}

impl RecordStore {
    /// Wrap a document store.
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            initial_delay: INITIAL_RETRY_DELAY,
        }
    }

    /// Override the first retry delay (doubles up to 10s).
    pub fn with_retry_delay(mut self, initial_delay: Duration) -> Self {
        self.initial_delay = initial_delay;
        self
    }

    /// Both record lists as currently stored.
    pub async fn all(&self) -> StorageResult<RecordDocument> {
        self.store.read().await
    }

    /// Best record of a list, or the all-zero record when the list is empty or unreadable.
    pub async fn best(&self, hyped: bool) -> TrainRecord {
        match self.store.read().await {
            Ok(document) => document.list(hyped).first().copied().unwrap_or_default(),
            Err(err) => {
                warn!(hyped, error = %err, "failed to read records; assuming no best record");
                TrainRecord::default()
            }
        }
    }

    /// Insert `record` into its list, retrying the read-modify-write until it succeeds.
    pub async fn save(&self, record: TrainRecord, hyped: bool) {
        let mut delay = self.initial_delay;
        let mut attempt: u32 = 0;

        loop {
            match self.try_save(record, hyped).await {
                Ok(()) => {
                    if attempt > 0 {
                        info!(attempt, "record saved after retrying");
                    }
                    return;
                }
                Err(err) => {
                    warn!(attempt, hyped, error = %err, "failed to save train record; retrying");
                    attempt += 1;
                    sleep(delay).await;
                    delay = (delay * 2).min(MAX_RETRY_DELAY);
                }
            }
        }
    }

    async fn try_save(&self, record: TrainRecord, hyped: bool) -> StorageResult<()> {
        let mut document = self.store.read().await?;
        insert_record(document.list_mut(hyped), record);
        self.store.write(document).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(score: u64) -> TrainRecord {
        TrainRecord {
            length: 5,
            score,
            participant_count: 3,
            timestamp: score as i64,
        }
    }

    #[test]
    fn judge_distinguishes_break_tie_and_neither() {
        assert_eq!(RecordOutcome::judge(11, 10), RecordOutcome::Broken);
        assert_eq!(RecordOutcome::judge(10, 10), RecordOutcome::Tied);
        assert_eq!(RecordOutcome::judge(9, 10), RecordOutcome::None);
    }

    #[test]
    fn lists_stay_sorted_and_capped() {
        let mut list = Vec::new();
        for score in [30, 10, 50, 20, 40, 60, 5] {
            insert_record(&mut list, record(score));
            assert!(list.len() <= MAX_RECORDS);
            assert!(list.windows(2).all(|pair| pair[0].score >= pair[1].score));
        }
        let scores: Vec<u64> = list.iter().map(|r| r.score).collect();
        assert_eq!(scores, vec![60, 50, 40, 30, 20]);
    }

    #[tokio::test]
    async fn tied_records_are_both_kept() {
        let records = RecordStore::new(Arc::new(MemoryStore::default()));
        records.save(record(100), false).await;
        records.save(record(100), false).await;

        let document = records.all().await.unwrap();
        assert_eq!(document.grace_records.len(), 2);
        assert!(document.hyped_records.is_empty());
    }

    #[tokio::test]
    async fn best_falls_back_to_the_zero_record() {
        let records = RecordStore::new(Arc::new(MemoryStore::default()));
        assert_eq!(records.best(true).await, TrainRecord::default());

        records.save(record(42), true).await;
        assert_eq!(records.best(true).await.score, 42);
        assert_eq!(records.best(false).await, TrainRecord::default());
    }

    #[tokio::test(start_paused = true)]
    async fn save_retries_until_the_write_lands() {
        let store = Arc::new(MemoryStore::default());
        store.fail_next_writes(3);
        let records = RecordStore::new(store.clone()).with_retry_delay(Duration::from_millis(10));

        records.save(record(7), false).await;

        assert_eq!(store.snapshot().grace_records, vec![record(7)]);
        assert_eq!(store.write_attempts(), 4);
    }
}
