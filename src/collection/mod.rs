//! Collection - a lazily loaded, memoizing cache over one object store.
//!
//! A [`Collection`] mirrors every record of its store in an in-memory
//! [`Snapshot`]. Nothing is read until the first view access; that access
//! starts a one-time initialization (open, seed, full load) that all readers
//! share. After that, id and listing reads come from the snapshot while range
//! reads go back to the store every time.
//!
//! ```
//! use viewstore::{Collection, CollectionConfig, InMemoryBackend, Record, StoreSchema};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Debug, Clone, Serialize, Deserialize, Record)]
//! struct Todo {
//!     id: String,
//!     done: bool,
//! }
//!
//! # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
//! let config = CollectionConfig::<Todo>::new("todos", 1, StoreSchema::new("main", "id"));
//! let todos = Collection::new(InMemoryBackend::new(), config);
//!
//! todos.set("t1", Todo { id: "t1".into(), done: false }).await.unwrap();
//! let t1 = todos.item("t1").get().await.unwrap().unwrap();
//! assert!(!t1.done);
//! # });
//! ```

mod init;
mod snapshot;
mod views;
mod writes;

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;
use tokio::sync::watch;

use crate::adapter::StoreAdapter;
use crate::backend::Backend;
use crate::config::CollectionConfig;
use crate::error::CacheError;
use crate::query::RangeQuery;
use crate::record::{Action, Record};

pub use init::InitState;
use init::InitController;
pub use snapshot::Snapshot;
pub use views::{ItemView, RangeView, Subscription};

type SnapshotCell<T> = watch::Sender<Option<Arc<Snapshot<T>>>>;

/// State shared by a collection, its clones and every view it hands out.
struct Core<T> {
    config: CollectionConfig<T>,
    backend: Arc<dyn Backend>,
    /// `None` until the first load publishes.
    snapshot: SnapshotCell<T>,
    init: InitController,
    adapter: OnceLock<StoreAdapter<T>>,
}

impl<T: Record> Core<T> {
    fn current(&self) -> Option<Arc<Snapshot<T>>> {
        self.snapshot.borrow().clone()
    }

    fn adapter(&self) -> Result<StoreAdapter<T>, CacheError> {
        self.adapter.get().cloned().ok_or(CacheError::Uninitialized)
    }
}

/// Cached, reactive view of one object store.
///
/// Cheap to clone; clones share the snapshot, the initialization and the
/// memoized views.
pub struct Collection<T> {
    core: Arc<Core<T>>,
    items: Arc<Mutex<HashMap<String, Arc<ItemView<T>>>>>,
    ranges: Arc<Mutex<HashMap<RangeQuery, Arc<RangeView<T>>>>>,
}

impl<T> Clone for Collection<T> {
    fn clone(&self) -> Self {
        Self {
            core: Arc::clone(&self.core),
            items: Arc::clone(&self.items),
            ranges: Arc::clone(&self.ranges),
        }
    }
}

impl<T: Record> Collection<T> {
    /// Creates an uninitialized collection. Nothing touches `backend` until
    /// the first read or write.
    pub fn new<B: Backend + 'static>(backend: B, config: CollectionConfig<T>) -> Self {
        Self::with_backend(Arc::new(backend), config)
    }

    pub fn with_backend(backend: Arc<dyn Backend>, config: CollectionConfig<T>) -> Self {
        let (snapshot, _) = watch::channel(None);
        let core = Core {
            config,
            backend,
            snapshot,
            init: InitController::new(),
            adapter: OnceLock::new(),
        };
        Self {
            core: Arc::new(core),
            items: Arc::new(Mutex::new(HashMap::new())),
            ranges: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn config(&self) -> &CollectionConfig<T> {
        &self.core.config
    }

    /// View of the record with `id`. The same id always yields the same
    /// handle.
    pub fn item(&self, id: &str) -> Arc<ItemView<T>> {
        let mut items = self.items.lock();
        if let Some(view) = items.get(id) {
            return Arc::clone(view);
        }
        let view = Arc::new(ItemView::new(id, Arc::clone(&self.core)));
        items.insert(id.to_string(), Arc::clone(&view));
        view
    }

    /// View of a live range query. Equal descriptors yield the same handle.
    pub fn range(&self, query: RangeQuery) -> Arc<RangeView<T>> {
        let mut ranges = self.ranges.lock();
        if let Some(view) = ranges.get(&query) {
            return Arc::clone(view);
        }
        let view = Arc::new(RangeView::new(query.clone(), Arc::clone(&self.core)));
        ranges.insert(query, Arc::clone(&view));
        view
    }

    /// Every id, in snapshot order.
    pub async fn keys(&self) -> Result<Vec<String>, CacheError> {
        Ok(self.core.ready().await?.keys())
    }

    /// Every (id, record) pair, in snapshot order.
    pub async fn entries(&self) -> Result<Vec<(String, Arc<T>)>, CacheError> {
        Ok(self.core.ready().await?.entries())
    }

    /// The whole snapshot.
    pub async fn items(&self) -> Result<Arc<Snapshot<T>>, CacheError> {
        self.core.ready().await
    }

    /// The published snapshot, if any. Never starts initialization.
    pub fn snapshot(&self) -> Option<Arc<Snapshot<T>>> {
        self.core.current()
    }

    /// True once a snapshot has been loaded. Never starts initialization.
    pub fn is_ready(&self) -> bool {
        self.core.init.state() == InitState::Ready
    }

    pub fn init_state(&self) -> InitState {
        self.core.init.state()
    }

    /// Starts initialization if needed and waits for its outcome.
    pub async fn ready(&self) -> Result<(), CacheError> {
        self.core.ready().await.map(|_| ())
    }

    /// Receives every snapshot replacement. Starts initialization when a
    /// runtime is available.
    pub fn subscribe(&self) -> Subscription<T> {
        let _ = self.core.request_init();
        Subscription::new(self.core.snapshot.subscribe())
    }

    pub async fn set(&self, id: &str, record: T) -> Result<(), CacheError> {
        self.core.set(id, record).await
    }

    pub async fn delete(&self, id: &str) -> Result<(), CacheError> {
        self.core.delete(id).await
    }

    pub async fn clear(&self) -> Result<(), CacheError> {
        self.core.clear().await
    }

    pub async fn dispatch(&self, action: Action<T>) -> Result<(), CacheError> {
        self.core.dispatch(action).await
    }
}
