/// Database model definitions.
pub mod models;
/// Top-record persistence on top of a key-value document store.
pub mod record_store;
/// Storage abstraction layer for database operations.
pub mod storage;
