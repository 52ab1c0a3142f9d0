//! Optimistic writes.
//!
//! Every write first waits for the collection to be loaded, then publishes a
//! new snapshot, then persists through the adapter. The snapshot change is
//! visible to readers before persistence finishes.
//!
//! A failed persist is returned to the caller and logged, and the snapshot
//! keeps the optimistic value: cache and store disagree until the next
//! successful write of that id or a reload. Overlapping writes to one id
//! update the cache in call order, but their store transactions are
//! independent and may finish in any order.

use std::sync::Arc;

use tracing::warn;

use super::{Core, Snapshot};
use crate::error::CacheError;
use crate::record::{Action, Record};

impl<T: Record> Core<T> {
    /// Maps `id` to `record` and persists `record`. The store keys the
    /// record by its own primary key, so `id` should equal `record.id()`.
    pub(super) async fn set(self: &Arc<Self>, id: &str, record: T) -> Result<(), CacheError> {
        self.ready().await?;
        let record = Arc::new(record);
        self.replace(|snapshot| snapshot.with(id, Arc::clone(&record)));

        self.adapter()?.put(&record).await.map_err(|err| {
            warn!(id, error = %err, "write failed; cached value kept");
            err
        })
    }

    pub(super) async fn delete(self: &Arc<Self>, id: &str) -> Result<(), CacheError> {
        self.ready().await?;
        self.replace(|snapshot| snapshot.without(id));

        self.adapter()?.delete(id).await.map_err(|err| {
            warn!(id, error = %err, "delete failed; cached removal kept");
            err
        })
    }

    pub(super) async fn clear(self: &Arc<Self>) -> Result<(), CacheError> {
        self.ready().await?;
        self.replace(|_| Snapshot::empty());

        self.adapter()?.clear().await.map_err(|err| {
            warn!(error = %err, "clear failed; cached clear kept");
            err
        })
    }

    pub(super) async fn dispatch(self: &Arc<Self>, action: Action<T>) -> Result<(), CacheError> {
        match action {
            Action::Put(record) => {
                let id = record.id().to_string();
                self.set(&id, record).await
            }
            Action::Delete(id) => self.delete(&id).await,
        }
    }

    fn replace(&self, update: impl FnOnce(&Snapshot<T>) -> Snapshot<T>) {
        self.snapshot.send_modify(|slot| {
            if let Some(current) = slot {
                *current = Arc::new(update(current));
            }
        });
    }
}
