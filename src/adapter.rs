//! StoreAdapter - typed access to one object store through a backend connection.

use std::marker::PhantomData;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use crate::backend::{AddOutcome, Backend, Connection};
use crate::config::{CollectionConfig, SeedSet};
use crate::error::{BackendError, CacheError};
use crate::query::RangeQuery;
use crate::record::Record;

/// What a seeding pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeedReport {
    pub inserted: usize,
    /// Seed records whose key was already present and left alone.
    pub skipped: usize,
}

/// Typed wrapper over a [`Connection`] for records of type `T` in one store.
///
/// Every method is an independent transaction. Cloning shares the connection.
pub struct StoreAdapter<T> {
    connection: Arc<dyn Connection>,
    store: String,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for StoreAdapter<T> {
    fn clone(&self) -> Self {
        Self {
            connection: Arc::clone(&self.connection),
            store: self.store.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T: Record> StoreAdapter<T> {
    /// Opens (creating or upgrading as needed) the database `config` names.
    pub async fn open(
        backend: &dyn Backend,
        config: &CollectionConfig<T>,
    ) -> Result<Self, CacheError> {
        let database = config.database.as_str();
        let version = config.version;
        let schema = &config.store;
        let connection = backend
            .open(database, version, schema)
            .await
            .map_err(|err| CacheError::StoreOpen {
                database: database.to_string(),
                reason: err.to_string(),
            })?;
        debug!(database, store = %schema.name, version, "opened store");
        Ok(Self::from_connection(connection, &schema.name))
    }

    /// Wraps a connection that is already open.
    pub fn from_connection(connection: Arc<dyn Connection>, store: &str) -> Self {
        Self {
            connection,
            store: store.to_string(),
            _marker: PhantomData,
        }
    }

    pub fn database(&self) -> &str {
        self.connection.database()
    }

    pub fn store(&self) -> &str {
        &self.store
    }

    pub async fn get_all(&self) -> Result<Vec<T>, CacheError> {
        let values = self
            .connection
            .get_all(&self.store)
            .await
            .map_err(|e| CacheError::transaction("get_all", e))?;
        decode_all(values, "get_all")
    }

    pub async fn get_by_id(&self, id: &str) -> Result<Option<T>, CacheError> {
        self.connection
            .get(&self.store, id)
            .await
            .map_err(|e| CacheError::transaction("get_by_id", e))?
            .map(|value| decode(value, "get_by_id"))
            .transpose()
    }

    pub async fn get_all_keys(&self) -> Result<Vec<String>, CacheError> {
        self.connection
            .get_all_keys(&self.store)
            .await
            .map_err(|e| CacheError::transaction("get_all_keys", e))
    }

    /// Runs `query` against its index. With `reverse` set, the ascending
    /// result is read in full and then reversed.
    pub async fn get_all_by_range(&self, query: &RangeQuery) -> Result<Vec<T>, CacheError> {
        let range = query
            .key_range()
            .map_err(|e| CacheError::range(&query.index, e))?;

        let values = self
            .connection
            .get_all_by_range(&self.store, &query.index, &range)
            .await
            .map_err(|e| match e {
                BackendError::MissingIndex(_) | BackendError::Data(_) => {
                    CacheError::range(&query.index, e)
                }
                other => CacheError::transaction("get_all_by_range", other),
            })?;

        let mut records = decode_all(values, "get_all_by_range")?;
        if query.reverse {
            records.reverse();
        }
        Ok(records)
    }

    pub async fn put(&self, record: &T) -> Result<(), CacheError> {
        let value = encode(record, "put")?;
        self.connection
            .put(&self.store, value)
            .await
            .map_err(|e| CacheError::transaction("put", e))?;
        Ok(())
    }

    pub async fn delete(&self, id: &str) -> Result<(), CacheError> {
        self.connection
            .delete(&self.store, id)
            .await
            .map_err(|e| CacheError::transaction("delete", e))
    }

    pub async fn clear(&self) -> Result<(), CacheError> {
        self.connection
            .clear(&self.store)
            .await
            .map_err(|e| CacheError::transaction("clear", e))
    }

    /// Inserts every seed record whose key is absent, in one transaction.
    /// Existing keys are expected and skipped, so seeding is idempotent and
    /// never overwrites. Any other failure aborts the whole pass.
    pub async fn seed(&self, seed: &SeedSet<T>) -> Result<SeedReport, CacheError> {
        if seed.is_empty() {
            return Ok(SeedReport::default());
        }

        let values = seed
            .iter()
            .map(|(_, record)| encode(record, "seed"))
            .collect::<Result<Vec<_>, _>>()?;

        let outcomes = self
            .connection
            .add_missing(&self.store, values)
            .await
            .map_err(|e| CacheError::transaction("seed", e))?;

        let mut report = SeedReport::default();
        for outcome in outcomes {
            match outcome {
                AddOutcome::Added(_) => report.inserted += 1,
                AddOutcome::Exists(reason) => {
                    debug!(store = %self.store, %reason, "seed record already present");
                    report.skipped += 1;
                }
            }
        }
        debug!(
            store = %self.store,
            inserted = report.inserted,
            skipped = report.skipped,
            "seeded store"
        );
        Ok(report)
    }
}

fn encode<T: Record>(record: &T, operation: &'static str) -> Result<Value, CacheError> {
    serde_json::to_value(record).map_err(|e| CacheError::transaction(operation, e))
}

fn decode<T: Record>(value: Value, operation: &'static str) -> Result<T, CacheError> {
    serde_json::from_value(value).map_err(|e| {
        warn!(operation, error = %e, "stored record does not match the record type");
        CacheError::transaction(operation, e)
    })
}

fn decode_all<T: Record>(values: Vec<Value>, operation: &'static str) -> Result<Vec<T>, CacheError> {
    values.into_iter().map(|v| decode(v, operation)).collect()
}
