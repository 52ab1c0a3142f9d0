//! Storage backends - the persistent side of the cache.
//!
//! A [`Backend`] opens named databases; the [`Connection`] it returns runs
//! single-store transactions over records in their serialized JSON form.
//! Every call is an independent transaction: nothing groups two writes.
//!
//! ## Included backends
//!
//! - [`InMemoryBackend`]: process-local, clone-shared registry of databases.
//! - [`FileBackend`] (feature `file`): one JSON document per database on disk.
//!
//! ## Example
//!
//! ```
//! use viewstore::backend::{Backend, Connection, InMemoryBackend};
//! use viewstore::{IndexDefinition, StoreSchema};
//!
//! # tokio_test_block(async {
//! let backend = InMemoryBackend::new();
//! let schema = StoreSchema::new("main", "id").index(IndexDefinition::new("byType", "type"));
//! let conn = backend.open("app", 1, &schema).await.unwrap();
//! conn.put("main", serde_json::json!({"id": "u1", "type": "user"})).await.unwrap();
//! assert_eq!(conn.get_all_keys("main").await.unwrap(), vec!["u1"]);
//! # });
//! # fn tokio_test_block(f: impl std::future::Future<Output = ()>) {
//! #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f)
//! # }
//! ```

mod engine;
#[cfg(feature = "file")]
mod file;
mod in_memory;

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::BackendError;
use crate::key::KeyRange;
use crate::schema::StoreSchema;

#[cfg(feature = "file")]
pub use file::FileBackend;
pub use in_memory::InMemoryBackend;

/// Opens databases.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Opens `name`, creating it if needed. When the database is new or
    /// `version` is above the stored version, creates the store described by
    /// `schema` and any of its indexes that do not exist yet. Fails with
    /// [`BackendError::Version`] when `version` is below the stored one.
    async fn open(
        &self,
        name: &str,
        version: u32,
        schema: &StoreSchema,
    ) -> Result<Arc<dyn Connection>, BackendError>;
}

/// Per-record result of [`Connection::add_missing`].
#[derive(Debug, Clone, PartialEq)]
pub enum AddOutcome {
    /// Inserted under this key.
    Added(String),
    /// Skipped: the key, or a unique index value, was already taken.
    Exists(BackendError),
}

/// An open database. Each method is one transaction.
#[async_trait]
pub trait Connection: Send + Sync {
    fn database(&self) -> &str;

    async fn get_all(&self, store: &str) -> Result<Vec<Value>, BackendError>;

    async fn get(&self, store: &str, key: &str) -> Result<Option<Value>, BackendError>;

    async fn get_all_keys(&self, store: &str) -> Result<Vec<String>, BackendError>;

    /// Ascending by index key, then by primary key.
    async fn get_all_by_range(
        &self,
        store: &str,
        index: &str,
        range: &KeyRange,
    ) -> Result<Vec<Value>, BackendError>;

    /// Insert or replace; returns the record's key.
    async fn put(&self, store: &str, value: Value) -> Result<String, BackendError>;

    /// Non-overwriting insert of every value in one transaction. Key
    /// collisions are reported per record and do not abort; any other failure
    /// aborts the transaction and nothing is written.
    async fn add_missing(
        &self,
        store: &str,
        values: Vec<Value>,
    ) -> Result<Vec<AddOutcome>, BackendError>;

    async fn delete(&self, store: &str, key: &str) -> Result<(), BackendError>;

    async fn clear(&self, store: &str) -> Result<(), BackendError>;
}
