use std::env;

use super::error::{CouchDaoError, CouchResult};

/// Default CouchDB document id holding the record lists.
const DEFAULT_DOC_ID: &str = "grace-train::records";

/// Basic-auth credentials for CouchDB.
#[derive(Debug, Clone)]
pub struct Credentials {
    /// CouchDB user.
    pub username: String,
    /// Its password.
    pub password: String,
}

/// Where the record document lives in CouchDB.
#[derive(Debug, Clone)]
pub struct CouchConfig {
    /// Server URL, without trailing slash.
    pub base_url: String,
    /// Database holding the document; created on connect when missing.
    pub database: String,
    /// Id of the record document.
    pub doc_id: String,
    /// Optional basic-auth credentials.
    pub credentials: Option<Credentials>,
}

impl CouchConfig {
    /// Read `COUCH_BASE_URL`, `COUCH_DB`, `COUCH_RECORDS_DOC`, `COUCH_USERNAME` and
    /// `COUCH_PASSWORD`.
    ///
    /// Returns `Ok(None)` when `COUCH_BASE_URL` is unset: CouchDB is not wanted.
    pub fn from_env() -> CouchResult<Option<Self>> {
        let Some(base_url) = var("COUCH_BASE_URL") else {
            return Ok(None);
        };
        let database = var("COUCH_DB").ok_or(CouchDaoError::MissingEnvVar { var: "COUCH_DB" })?;

        let credentials = var("COUCH_USERNAME")
            .zip(var("COUCH_PASSWORD"))
            .map(|(username, password)| Credentials { username, password });

        Ok(Some(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            database,
            doc_id: var("COUCH_RECORDS_DOC").unwrap_or_else(|| DEFAULT_DOC_ID.into()),
            credentials,
        }))
    }

    pub(super) fn database_url(&self) -> String {
        format!("{}/{}", self.base_url, self.database)
    }

    pub(super) fn document_url(&self) -> String {
        format!("{}/{}/{}", self.base_url, self.database, self.doc_id)
    }
}

fn var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.is_empty())
}
