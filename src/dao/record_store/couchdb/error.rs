//! Error types for the CouchDB record document store.

use reqwest::StatusCode;
use thiserror::Error;

use crate::dao::storage::StorageError;

/// Result alias for CouchDB operations.
pub type CouchResult<T> = Result<T, CouchDaoError>;

/// What the store was doing when CouchDB failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CouchOperation {
    /// Checking or creating the database.
    EnsureDatabase,
    /// Reading the record document.
    Fetch,
    /// Writing the record document.
    Store,
}

/// Failures talking to CouchDB.
#[derive(Debug, Error)]
pub enum CouchDaoError {
    /// `COUCH_BASE_URL` is set but a companion variable is not.
    #[error("`COUCH_BASE_URL` is set but `{var}` is not")]
    MissingEnvVar {
        /// Missing variable.
        var: &'static str,
    },
    /// The HTTP client could not be built.
    #[error("could not build the CouchDB HTTP client")]
    Client(#[source] reqwest::Error),
    /// The request never got an answer.
    #[error("CouchDB {operation:?} request failed")]
    Transport {
        /// Operation that failed.
        operation: CouchOperation,
        /// Underlying error.
        #[source]
        source: reqwest::Error,
    },
    /// CouchDB answered with an unexpected status.
    #[error("CouchDB {operation:?} answered {status}")]
    Status {
        /// Operation that failed.
        operation: CouchOperation,
        /// Status returned.
        status: StatusCode,
    },
    /// The document revision moved between read and write.
    #[error("CouchDB revision conflict on `{doc_id}`")]
    Conflict {
        /// Record document id.
        doc_id: String,
    },
    /// The document body is not a record document.
    #[error("CouchDB record document `{doc_id}` is not valid")]
    Decode {
        /// Record document id.
        doc_id: String,
        /// Underlying error.
        #[source]
        source: reqwest::Error,
    },
}

impl From<CouchDaoError> for StorageError {
    fn from(err: CouchDaoError) -> Self {
        if matches!(err, CouchDaoError::Decode { .. }) {
            StorageError::malformed("CouchDB record document".into(), err)
        } else {
            StorageError::unavailable("CouchDB record store".into(), err)
        }
    }
}
