use std::sync::Arc;

use futures::future::BoxFuture;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::dao::{models::RecordDocument, record_store::DocumentStore, storage::StorageResult};

use super::{
    config::CouchConfig,
    error::{CouchDaoError, CouchOperation, CouchResult},
};

/// Record document as stored in CouchDB, with its revision.
#[derive(Debug, Serialize, Deserialize)]
struct Revisioned {
    #[serde(rename = "_id")]
    id: String,
    #[serde(rename = "_rev", skip_serializing_if = "Option::is_none")]
    rev: Option<String>,
    #[serde(flatten)]
    records: RecordDocument,
}

/// Keeps the record lists in a single CouchDB document.
#[derive(Clone)]
pub struct CouchDocumentStore {
    client: Client,
    config: Arc<CouchConfig>,
}

impl CouchDocumentStore {
    /// Build the client and create the database if it does not exist yet.
    pub async fn connect(config: CouchConfig) -> CouchResult<Self> {
        let client = Client::builder().build().map_err(CouchDaoError::Client)?;
        let store = Self {
            client,
            config: Arc::new(config),
        };
        store.ensure_database().await?;
        Ok(store)
    }

    fn with_auth(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.config.credentials {
            Some(credentials) => {
                request.basic_auth(&credentials.username, Some(&credentials.password))
            }
            None => request,
        }
    }

    async fn send(
        &self,
        request: RequestBuilder,
        operation: CouchOperation,
    ) -> CouchResult<reqwest::Response> {
        self.with_auth(request)
            .send()
            .await
            .map_err(|source| CouchDaoError::Transport { operation, source })
    }

    async fn ensure_database(&self) -> CouchResult<()> {
        let operation = CouchOperation::EnsureDatabase;
        let url = self.config.database_url();

        let status = self.send(self.client.head(&url), operation).await?.status();
        if status.is_success() {
            return Ok(());
        }
        if status != StatusCode::NOT_FOUND {
            return Err(CouchDaoError::Status { operation, status });
        }

        let status = self.send(self.client.put(&url), operation).await?.status();
        // 412 means another process created it first.
        if status.is_success() || status == StatusCode::PRECONDITION_FAILED {
            info!(database = %self.config.database, "created CouchDB database");
            Ok(())
        } else {
            Err(CouchDaoError::Status { operation, status })
        }
    }

    async fn fetch(&self) -> CouchResult<Option<Revisioned>> {
        let operation = CouchOperation::Fetch;
        let response = self
            .send(self.client.get(self.config.document_url()), operation)
            .await?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                response
                    .json()
                    .await
                    .map(Some)
                    .map_err(|source| CouchDaoError::Decode {
                        doc_id: self.config.doc_id.clone(),
                        source,
                    })
            }
            status => Err(CouchDaoError::Status { operation, status }),
        }
    }

    async fn store(&self, records: RecordDocument) -> CouchResult<()> {
        let operation = CouchOperation::Store;
        let rev = self.fetch().await?.and_then(|current| current.rev);
        let document = Revisioned {
            id: self.config.doc_id.clone(),
            rev,
            records,
        };

        let response = self
            .send(
                self.client.put(self.config.document_url()).json(&document),
                operation,
            )
            .await?;

        match response.status() {
            status if status.is_success() => Ok(()),
            StatusCode::CONFLICT => Err(CouchDaoError::Conflict {
                doc_id: document.id,
            }),
            status => Err(CouchDaoError::Status { operation, status }),
        }
    }
}

impl DocumentStore for CouchDocumentStore {
    fn read(&self) -> BoxFuture<'static, StorageResult<RecordDocument>> {
        let store = self.clone();
        Box::pin(async move {
            let current = store.fetch().await?;
            Ok(current.map(|doc| doc.records).unwrap_or_default())
        })
    }

    fn write(&self, document: RecordDocument) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.store(document).await.map_err(Into::into) })
    }
}
