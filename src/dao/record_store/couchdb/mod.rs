mod config;
mod error;
mod store;

pub use config::{CouchConfig, Credentials};
pub use error::{CouchDaoError, CouchOperation, CouchResult};
pub use store::CouchDocumentStore;
