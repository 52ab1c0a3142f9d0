//! Object-store engine shared by the bundled backends.
//!
//! A database holds named object stores. Each store keeps its records in
//! primary-key order and one ordered map per secondary index, from index key
//! to the primary keys carrying it.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use super::{AddOutcome, Connection};
use crate::error::BackendError;
use crate::key::{IndexKey, KeyRange};
use crate::schema::{IndexDefinition, StoreSchema};

type IndexData = BTreeMap<IndexKey, BTreeSet<String>>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct ObjectStore {
    /// The store as it was actually created, which may lag the caller's schema
    /// until a version bump adds the missing indexes.
    schema: StoreSchema,
    records: BTreeMap<String, Value>,
    #[serde(skip)]
    indexes: HashMap<String, IndexData>,
}

impl ObjectStore {
    fn new(schema: &StoreSchema) -> Self {
        Self {
            schema: StoreSchema {
                indexes: Vec::new(),
                ..schema.clone()
            },
            records: BTreeMap::new(),
            indexes: HashMap::new(),
        }
    }

    /// Adds an index, populated from the records already stored.
    fn create_index(&mut self, definition: IndexDefinition) -> Result<(), BackendError> {
        let data = build_index(&definition, &self.records)?;
        self.indexes.insert(definition.name.clone(), data);
        self.schema.indexes.push(definition);
        Ok(())
    }

    fn rebuild_indexes(&mut self) -> Result<(), BackendError> {
        self.indexes.clear();
        for definition in &self.schema.indexes {
            let data = build_index(definition, &self.records)?;
            self.indexes.insert(definition.name.clone(), data);
        }
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.records.get(key)
    }

    pub fn values(&self) -> Vec<Value> {
        self.records.values().cloned().collect()
    }

    pub fn keys(&self) -> Vec<String> {
        self.records.keys().cloned().collect()
    }

    /// Records whose index key falls in `range`, ascending by index key and
    /// then by primary key. A multi-entry index yields a record once per
    /// matching key.
    pub fn range(&self, index: &str, range: &KeyRange) -> Result<Vec<Value>, BackendError> {
        let data = self
            .indexes
            .get(index)
            .ok_or_else(|| BackendError::MissingIndex(index.to_string()))?;

        Ok(data
            .range(range.as_bounds())
            .flat_map(|(_, owners)| owners.iter())
            .filter_map(|key| self.records.get(key).cloned())
            .collect())
    }

    /// Insert or replace a record.
    pub fn put(&mut self, value: Value) -> Result<String, BackendError> {
        self.write(value, true)
    }

    /// Insert a record only if its key is absent.
    pub fn add(&mut self, value: Value) -> Result<String, BackendError> {
        self.write(value, false)
    }

    pub fn delete(&mut self, key: &str) -> bool {
        self.unindex(key);
        self.records.remove(key).is_some()
    }

    pub fn clear(&mut self) {
        self.records.clear();
        for data in self.indexes.values_mut() {
            data.clear();
        }
    }

    fn write(&mut self, value: Value, overwrite: bool) -> Result<String, BackendError> {
        let key = self.schema.primary_key(&value)?;
        if !overwrite && self.records.contains_key(&key) {
            return Err(BackendError::KeyExists {
                store: self.schema.name.clone(),
                key,
            });
        }

        let entries: Vec<Vec<IndexKey>> = self
            .schema
            .indexes
            .iter()
            .map(|definition| definition.keys_for(&value))
            .collect();

        // Nothing is touched until every unique index accepts the record.
        for (definition, keys) in self.schema.indexes.iter().zip(&entries) {
            if !definition.unique {
                continue;
            }
            let Some(data) = self.indexes.get(&definition.name) else {
                continue;
            };
            for index_key in keys {
                let taken = data
                    .get(index_key)
                    .is_some_and(|owners| owners.iter().any(|owner| *owner != key));
                if taken {
                    return Err(BackendError::Constraint {
                        index: definition.name.clone(),
                        key: index_key.to_string(),
                    });
                }
            }
        }

        self.unindex(&key);
        for (definition, keys) in self.schema.indexes.iter().zip(entries) {
            let data = self.indexes.entry(definition.name.clone()).or_default();
            for index_key in keys {
                data.entry(index_key).or_default().insert(key.clone());
            }
        }
        self.records.insert(key.clone(), value);
        Ok(key)
    }

    fn unindex(&mut self, key: &str) {
        let Some(old) = self.records.get(key) else {
            return;
        };
        for definition in &self.schema.indexes {
            let Some(data) = self.indexes.get_mut(&definition.name) else {
                continue;
            };
            for index_key in definition.keys_for(old) {
                if let Some(owners) = data.get_mut(&index_key) {
                    owners.remove(key);
                    if owners.is_empty() {
                        data.remove(&index_key);
                    }
                }
            }
        }
    }
}

fn build_index(
    definition: &IndexDefinition,
    records: &BTreeMap<String, Value>,
) -> Result<IndexData, BackendError> {
    let mut data = IndexData::new();
    for (key, value) in records {
        for index_key in definition.keys_for(value) {
            let owners = data.entry(index_key).or_default();
            if definition.unique && !owners.is_empty() {
                return Err(BackendError::Constraint {
                    index: definition.name.clone(),
                    key: key.clone(),
                });
            }
            owners.insert(key.clone());
        }
    }
    Ok(data)
}

/// One named database: its version and its object stores.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct DatabaseState {
    version: u32,
    stores: BTreeMap<String, ObjectStore>,
    /// Bumped on every committed write; orders file images.
    #[serde(skip)]
    generation: u64,
}

impl DatabaseState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    /// Runs the upgrade step when `version` is newer than the stored one:
    /// creates the store if missing and adds any declared index it lacks.
    /// Returns whether an upgrade happened. All or nothing.
    pub fn upgrade(&mut self, version: u32, schema: &StoreSchema) -> Result<bool, BackendError> {
        if version < self.version {
            return Err(BackendError::Version {
                requested: version,
                existing: self.version,
            });
        }
        if version == self.version {
            return Ok(false);
        }

        let mut store = match self.stores.get(&schema.name) {
            Some(existing) => existing.clone(),
            None => {
                debug!(store = %schema.name, "creating object store");
                ObjectStore::new(schema)
            }
        };
        for definition in &schema.indexes {
            if store.schema.find_index(&definition.name).is_none() {
                debug!(store = %schema.name, index = %definition.name, "creating index");
                store.create_index(definition.clone())?;
            }
        }

        self.stores.insert(schema.name.clone(), store);
        self.version = version;
        self.generation += 1;
        Ok(true)
    }

    pub fn store(&self, name: &str) -> Result<&ObjectStore, BackendError> {
        self.stores
            .get(name)
            .ok_or_else(|| BackendError::MissingStore(name.to_string()))
    }

    pub fn store_mut(&mut self, name: &str) -> Result<&mut ObjectStore, BackendError> {
        self.stores
            .get_mut(name)
            .ok_or_else(|| BackendError::MissingStore(name.to_string()))
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn encode(&self) -> Result<Vec<u8>, BackendError> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, BackendError> {
        let mut state: DatabaseState = serde_json::from_slice(bytes)?;
        for store in state.stores.values_mut() {
            store.rebuild_indexes()?;
        }
        Ok(state)
    }
}

/// Receives a full database image after each committed write.
#[async_trait]
pub(crate) trait Sink: Send + Sync {
    /// Images may arrive out of order; `generation` says which is newest.
    async fn flush(&self, generation: u64, image: Vec<u8>) -> Result<(), BackendError>;
}

pub(crate) type SharedState = Arc<RwLock<DatabaseState>>;

/// A sink plus the lock that orders commits through it. One per database,
/// shared by every connection to it.
pub(crate) struct Durable {
    sink: Arc<dyn Sink>,
    commits: tokio::sync::Mutex<()>,
}

impl Durable {
    pub fn new(sink: Arc<dyn Sink>) -> Self {
        Self {
            sink,
            commits: tokio::sync::Mutex::new(()),
        }
    }

    /// Applies `f` to a copy of the state, flushes the copy, and only then
    /// makes it the shared state. A failed `f` or flush leaves the shared
    /// state untouched. Nothing is flushed when `f` leaves the generation
    /// where it was.
    pub async fn commit<R, F>(&self, state: &SharedState, f: F) -> Result<R, BackendError>
    where
        F: FnOnce(&mut DatabaseState) -> Result<R, BackendError> + Send,
        R: Send,
    {
        let _commit = self.commits.lock().await;

        let (result, staged) = {
            let current = state
                .read()
                .map_err(|_| BackendError::LockPoisoned("commit read"))?;
            let mut staged = current.clone();
            let result = f(&mut staged)?;
            if staged.generation == current.generation {
                return Ok(result);
            }
            (result, staged)
        };

        self.sink.flush(staged.generation, staged.encode()?).await?;

        let mut current = state
            .write()
            .map_err(|_| BackendError::LockPoisoned("commit write"))?;
        *current = staged;
        Ok(result)
    }
}

/// A connection over a shared [`DatabaseState`]. Every call is its own
/// transaction and completes on a later scheduler tick.
pub(crate) struct EngineConnection {
    database: String,
    state: SharedState,
    durable: Option<Arc<Durable>>,
}

impl EngineConnection {
    pub fn new(database: &str, state: SharedState, durable: Option<Arc<Durable>>) -> Self {
        Self {
            database: database.to_string(),
            state,
            durable,
        }
    }

    async fn read<R, F>(&self, f: F) -> Result<R, BackendError>
    where
        F: FnOnce(&DatabaseState) -> Result<R, BackendError> + Send,
        R: Send,
    {
        tokio::task::yield_now().await;
        let state = self
            .state
            .read()
            .map_err(|_| BackendError::LockPoisoned("read"))?;
        f(&state)
    }

    /// With a durable sink the write is staged and only visible once
    /// flushed; without one it applies in place.
    async fn write<R, F>(&self, f: F) -> Result<R, BackendError>
    where
        F: FnOnce(&mut DatabaseState) -> Result<R, BackendError> + Send,
        R: Send,
    {
        tokio::task::yield_now().await;
        let apply = |state: &mut DatabaseState| -> Result<R, BackendError> {
            let result = f(state)?;
            state.generation += 1;
            Ok(result)
        };
        match &self.durable {
            Some(durable) => durable.commit(&self.state, apply).await,
            None => {
                let mut state = self
                    .state
                    .write()
                    .map_err(|_| BackendError::LockPoisoned("write"))?;
                apply(&mut state)
            }
        }
    }
}

#[async_trait]
impl Connection for EngineConnection {
    fn database(&self) -> &str {
        &self.database
    }

    async fn get_all(&self, store: &str) -> Result<Vec<Value>, BackendError> {
        self.read(|state| Ok(state.store(store)?.values())).await
    }

    async fn get(&self, store: &str, key: &str) -> Result<Option<Value>, BackendError> {
        self.read(|state| Ok(state.store(store)?.get(key).cloned()))
            .await
    }

    async fn get_all_keys(&self, store: &str) -> Result<Vec<String>, BackendError> {
        self.read(|state| Ok(state.store(store)?.keys())).await
    }

    async fn get_all_by_range(
        &self,
        store: &str,
        index: &str,
        range: &KeyRange,
    ) -> Result<Vec<Value>, BackendError> {
        self.read(|state| state.store(store)?.range(index, range))
            .await
    }

    async fn put(&self, store: &str, value: Value) -> Result<String, BackendError> {
        self.write(|state| state.store_mut(store)?.put(value)).await
    }

    async fn add_missing(
        &self,
        store: &str,
        values: Vec<Value>,
    ) -> Result<Vec<AddOutcome>, BackendError> {
        self.write(|state| {
            // Work on a copy so a hard failure leaves the store untouched.
            let mut staged = state.store(store)?.clone();
            let mut outcomes = Vec::with_capacity(values.len());
            for value in values {
                match staged.add(value) {
                    Ok(key) => outcomes.push(AddOutcome::Added(key)),
                    Err(err) if err.is_key_collision() => outcomes.push(AddOutcome::Exists(err)),
                    Err(err) => return Err(err),
                }
            }
            *state.store_mut(store)? = staged;
            Ok(outcomes)
        })
        .await
    }

    async fn delete(&self, store: &str, key: &str) -> Result<(), BackendError> {
        self.write(|state| {
            state.store_mut(store)?.delete(key);
            Ok(())
        })
        .await
    }

    async fn clear(&self, store: &str) -> Result<(), BackendError> {
        self.write(|state| {
            state.store_mut(store)?.clear();
            Ok(())
        })
        .await
    }
}
