use std::{
    io,
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicU32, Ordering},
    },
};

use futures::future::BoxFuture;

use crate::dao::{
    models::RecordDocument,
    record_store::DocumentStore,
    storage::{StorageError, StorageResult},
};

/// Volatile document store, with optional injected write failures.
#[derive(Clone, Default)]
pub struct MemoryStore {
    document: Arc<Mutex<RecordDocument>>,
    failing_writes: Arc<AtomicU32>,
    write_attempts: Arc<AtomicU32>,
}

impl MemoryStore {
    /// Make the next `count` writes fail as if the backend were down.
    pub fn fail_next_writes(&self, count: u32) {
        self.failing_writes.store(count, Ordering::SeqCst);
    }

    /// Writes attempted so far, failed ones included.
    pub fn write_attempts(&self) -> u32 {
        self.write_attempts.load(Ordering::SeqCst)
    }

    /// Copy of the stored document.
    pub fn snapshot(&self) -> RecordDocument {
        self.document
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl DocumentStore for MemoryStore {
    fn read(&self) -> BoxFuture<'static, StorageResult<RecordDocument>> {
        let document = self.snapshot();
        Box::pin(async move { Ok(document) })
    }

    fn write(&self, document: RecordDocument) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store.write_attempts.fetch_add(1, Ordering::SeqCst);
            let failed = store
                .failing_writes
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
                .is_ok();
            if failed {
                return Err(StorageError::unavailable(
                    "injected write failure".into(),
                    io::Error::other("memory store offline"),
                ));
            }

            *store.document.lock().unwrap_or_else(PoisonError::into_inner) = document;
            Ok(())
        })
    }
}
