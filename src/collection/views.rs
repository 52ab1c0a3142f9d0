use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures_util::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::debug;

use super::{Core, Snapshot};
use crate::error::CacheError;
use crate::query::RangeQuery;
use crate::record::Record;

/// Handle on one record id. Obtained from [`Collection::item`](super::Collection::item).
pub struct ItemView<T> {
    id: String,
    core: Arc<Core<T>>,
}

impl<T: Record> ItemView<T> {
    pub(super) fn new(id: &str, core: Arc<Core<T>>) -> Self {
        Self {
            id: id.to_string(),
            core,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Waits for the collection to load, then reads the record. `None` when
    /// no record has this id.
    pub async fn get(&self) -> Result<Option<Arc<T>>, CacheError> {
        Ok(self.core.ready().await?.get(&self.id))
    }

    /// Current value without waiting. Starts initialization if it has not
    /// started, and returns `None` until the snapshot is loaded.
    pub fn peek(&self) -> Option<Arc<T>> {
        match self.core.current() {
            Some(snapshot) => snapshot.get(&self.id),
            None => {
                // Without a runtime this stays `None`; `get` reports why.
                let _ = self.core.request_init();
                None
            }
        }
    }

    /// Same as `Collection::set(self.id(), record)`.
    pub async fn set(&self, record: T) -> Result<(), CacheError> {
        self.core.set(&self.id, record).await
    }

    /// Receives every snapshot replacement. Starts initialization when a
    /// runtime is available.
    pub fn subscribe(&self) -> Subscription<T> {
        let _ = self.core.request_init();
        Subscription::new(self.core.snapshot.subscribe())
    }
}

type SharedQuery<T> = Shared<BoxFuture<'static, Result<Vec<T>, CacheError>>>;

/// Handle on a live range query. Every [`get`](RangeView::get) runs the
/// query against the store; callers arriving while a run is in flight share
/// its result.
pub struct RangeView<T> {
    query: RangeQuery,
    core: Arc<Core<T>>,
    runs: AtomicU64,
    inflight: Mutex<Option<(u64, SharedQuery<T>)>>,
}

impl<T: Record> RangeView<T> {
    pub(super) fn new(query: RangeQuery, core: Arc<Core<T>>) -> Self {
        Self {
            query,
            core,
            runs: AtomicU64::new(0),
            inflight: Mutex::new(None),
        }
    }

    pub fn query(&self) -> &RangeQuery {
        &self.query
    }

    pub async fn get(&self) -> Result<Vec<T>, CacheError> {
        let (run, pending) = self.pending();
        let result = pending.await;

        let mut inflight = self.inflight.lock();
        if matches!(&*inflight, Some((current, _)) if *current == run) {
            *inflight = None;
        }
        result
    }

    fn pending(&self) -> (u64, SharedQuery<T>) {
        let mut inflight = self.inflight.lock();
        if let Some((run, pending)) = &*inflight {
            return (*run, pending.clone());
        }

        let run = self.runs.fetch_add(1, Ordering::Relaxed);
        let core = Arc::clone(&self.core);
        let query = self.query.clone();
        let pending = async move {
            core.ready().await?;
            debug!(index = %query.index, "running range query");
            core.adapter()?.get_all_by_range(&query).await
        }
        .boxed()
        .shared();

        *inflight = Some((run, pending.clone()));
        (run, pending)
    }
}

/// Receives snapshot replacements.
pub struct Subscription<T> {
    rx: watch::Receiver<Option<Arc<Snapshot<T>>>>,
}

impl<T> Subscription<T> {
    pub(super) fn new(rx: watch::Receiver<Option<Arc<Snapshot<T>>>>) -> Self {
        Self { rx }
    }

    /// Latest snapshot; `None` before the first load.
    pub fn current(&self) -> Option<Arc<Snapshot<T>>> {
        self.rx.borrow().clone()
    }

    /// Waits for the next replacement and returns it. `None` once the
    /// collection has been dropped.
    pub async fn changed(&mut self) -> Option<Arc<Snapshot<T>>> {
        self.rx.changed().await.ok()?;
        self.rx.borrow_and_update().clone()
    }
}
