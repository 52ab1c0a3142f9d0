//! Shared fixtures: a record type, its schema, and a backend that can be
//! told to fail or stall.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::watch;
use viewstore::{
    AddOutcome, Backend, BackendError, Collection, CollectionConfig, Connection, IndexDefinition,
    IndexKey, InMemoryBackend, KeyRange, Record, SeedSet, StoreSchema,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Record)]
#[serde(rename_all = "camelCase")]
pub struct Entry {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub created_at: u64,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

pub fn entry(id: &str, kind: &str, created_at: u64) -> Entry {
    Entry {
        id: id.into(),
        kind: kind.into(),
        created_at,
        tags: Vec::new(),
        email: None,
    }
}

pub fn tagged(id: &str, tags: &[&str]) -> Entry {
    Entry {
        tags: tags.iter().map(|t| t.to_string()).collect(),
        ..entry(id, "tagged", 0)
    }
}

pub fn composite(kind: &str, created_at: u64) -> IndexKey {
    IndexKey::compound([IndexKey::from(kind), IndexKey::from(created_at)])
}

pub fn schema() -> StoreSchema {
    StoreSchema::new("main", "id")
        .index(IndexDefinition::new("byType", "type"))
        .index(IndexDefinition::new("byTypeAndCreatedAt", ["type", "createdAt"]))
        .index(IndexDefinition::new("byTag", "tags").multi_entry())
        .index(IndexDefinition::new("byEmail", "email").unique())
}

pub fn config(database: &str) -> CollectionConfig<Entry> {
    CollectionConfig::new(database, 1, schema())
}

pub fn seeded(database: &str, seed: Vec<Entry>) -> CollectionConfig<Entry> {
    config(database).with_seed(seed.into_iter().collect::<SeedSet<_>>())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Record)]
pub struct Folder {
    pub id: String,
    pub name: String,
}

pub fn folder(id: &str, name: &str) -> Folder {
    Folder {
        id: id.into(),
        name: name.into(),
    }
}

/// A folder store with no secondary indexes.
pub fn folders(database: &str, seed: Vec<Folder>) -> CollectionConfig<Folder> {
    CollectionConfig::new(database, 1, StoreSchema::new("folders", "id"))
        .with_seed(seed.into_iter().collect::<SeedSet<_>>())
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

/// Lets the runtime run other tasks until `done` holds.
pub async fn settle(mut done: impl FnMut() -> bool) {
    for _ in 0..200 {
        if done() {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("condition not reached");
}

/// Ids currently persisted in `database`, read straight from the backend.
pub async fn stored_ids(backend: &InMemoryBackend, database: &str) -> Vec<String> {
    let conn = backend.open(database, 1, &schema()).await.unwrap();
    conn.get_all_keys("main").await.unwrap()
}

/// Open/closed switch that stalls operations while closed.
pub struct Gate {
    open: watch::Sender<bool>,
}

impl Gate {
    fn new() -> Self {
        Self {
            open: watch::channel(true).0,
        }
    }

    pub fn close(&self) {
        self.open.send_replace(false);
    }

    pub fn open(&self) {
        self.open.send_replace(true);
    }

    async fn pass(&self) {
        let mut rx = self.open.subscribe();
        let _ = rx.wait_for(|open| *open).await;
    }
}

pub struct Faults {
    pub fail_open: AtomicBool,
    pub fail_writes: AtomicBool,
    pub opens: AtomicUsize,
    pub range_queries: AtomicUsize,
    pub writes: Gate,
    pub ranges: Gate,
}

/// [`InMemoryBackend`] with switchable failures and stalls.
#[derive(Clone)]
pub struct FaultyBackend {
    pub inner: InMemoryBackend,
    pub faults: Arc<Faults>,
}

impl FaultyBackend {
    pub fn new() -> Self {
        Self {
            inner: InMemoryBackend::new(),
            faults: Arc::new(Faults {
                fail_open: AtomicBool::new(false),
                fail_writes: AtomicBool::new(false),
                opens: AtomicUsize::new(0),
                range_queries: AtomicUsize::new(0),
                writes: Gate::new(),
                ranges: Gate::new(),
            }),
        }
    }

    pub fn opens(&self) -> usize {
        self.faults.opens.load(Ordering::SeqCst)
    }

    pub fn range_queries(&self) -> usize {
        self.faults.range_queries.load(Ordering::SeqCst)
    }

    pub fn collection(&self, config: CollectionConfig<Entry>) -> Collection<Entry> {
        Collection::new(self.clone(), config)
    }
}

#[async_trait]
impl Backend for FaultyBackend {
    async fn open(
        &self,
        name: &str,
        version: u32,
        schema: &StoreSchema,
    ) -> Result<Arc<dyn Connection>, BackendError> {
        self.faults.opens.fetch_add(1, Ordering::SeqCst);
        if self.faults.fail_open.load(Ordering::SeqCst) {
            return Err(BackendError::Io("disk unavailable".into()));
        }
        let inner = self.inner.open(name, version, schema).await?;
        Ok(Arc::new(FaultyConnection {
            inner,
            faults: Arc::clone(&self.faults),
        }))
    }
}

struct FaultyConnection {
    inner: Arc<dyn Connection>,
    faults: Arc<Faults>,
}

impl FaultyConnection {
    async fn before_write(&self) -> Result<(), BackendError> {
        self.faults.writes.pass().await;
        if self.faults.fail_writes.load(Ordering::SeqCst) {
            return Err(BackendError::Io("write rejected".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl Connection for FaultyConnection {
    fn database(&self) -> &str {
        self.inner.database()
    }

    async fn get_all(&self, store: &str) -> Result<Vec<Value>, BackendError> {
        self.inner.get_all(store).await
    }

    async fn get(&self, store: &str, key: &str) -> Result<Option<Value>, BackendError> {
        self.inner.get(store, key).await
    }

    async fn get_all_keys(&self, store: &str) -> Result<Vec<String>, BackendError> {
        self.inner.get_all_keys(store).await
    }

    async fn get_all_by_range(
        &self,
        store: &str,
        index: &str,
        range: &KeyRange,
    ) -> Result<Vec<Value>, BackendError> {
        self.faults.range_queries.fetch_add(1, Ordering::SeqCst);
        self.faults.ranges.pass().await;
        self.inner.get_all_by_range(store, index, range).await
    }

    async fn put(&self, store: &str, value: Value) -> Result<String, BackendError> {
        self.before_write().await?;
        self.inner.put(store, value).await
    }

    async fn add_missing(
        &self,
        store: &str,
        values: Vec<Value>,
    ) -> Result<Vec<AddOutcome>, BackendError> {
        self.inner.add_missing(store, values).await
    }

    async fn delete(&self, store: &str, key: &str) -> Result<(), BackendError> {
        self.before_write().await?;
        self.inner.delete(store, key).await
    }

    async fn clear(&self, store: &str) -> Result<(), BackendError> {
        self.before_write().await?;
        self.inner.clear(store).await
    }
}
