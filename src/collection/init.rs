//! One-shot initialization: open, seed, load, publish.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use super::{Core, Snapshot};
use crate::adapter::StoreAdapter;
use crate::error::CacheError;
use crate::record::Record;

const NOT_STARTED: u8 = 0;
const PENDING: u8 = 1;
const READY: u8 = 2;
const FAILED: u8 = 3;

/// Where a collection is in its one-way initialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitState {
    NotStarted,
    Pending,
    Ready,
    /// Terminal. The collection never retries.
    Failed,
}

impl InitState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            NOT_STARTED => InitState::NotStarted,
            PENDING => InitState::Pending,
            READY => InitState::Ready,
            _ => InitState::Failed,
        }
    }
}

/// A result resolved at most once and observed by any number of waiters,
/// before or after it resolves.
pub(crate) struct CompletionSignal {
    outcome: watch::Sender<Option<Result<(), CacheError>>>,
}

impl CompletionSignal {
    pub(crate) fn new() -> Self {
        let (outcome, _) = watch::channel(None);
        Self { outcome }
    }

    /// Returns false if already resolved; the first outcome stands.
    pub(crate) fn resolve(&self, result: Result<(), CacheError>) -> bool {
        self.outcome.send_if_modified(|slot| {
            if slot.is_some() {
                return false;
            }
            *slot = Some(result);
            true
        })
    }

    pub(crate) fn outcome(&self) -> Option<Result<(), CacheError>> {
        self.outcome.borrow().clone()
    }

    pub(crate) async fn wait(&self) -> Result<(), CacheError> {
        let mut rx = self.outcome.subscribe();
        let outcome = match rx.wait_for(Option::is_some).await {
            Ok(resolved) => (*resolved).clone(),
            // The sender lives as long as `self`.
            Err(_) => None,
        };
        outcome.unwrap_or(Err(CacheError::Uninitialized))
    }
}

pub(crate) struct InitController {
    state: AtomicU8,
    /// Set once a trigger task has been spawned.
    scheduled: AtomicBool,
    signal: CompletionSignal,
}

impl InitController {
    pub(crate) fn new() -> Self {
        Self {
            state: AtomicU8::new(NOT_STARTED),
            scheduled: AtomicBool::new(false),
            signal: CompletionSignal::new(),
        }
    }

    pub(crate) fn state(&self) -> InitState {
        InitState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn begin(&self) -> bool {
        self.state
            .compare_exchange(NOT_STARTED, PENDING, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn finish(&self, result: Result<(), CacheError>) {
        let state = if result.is_ok() { READY } else { FAILED };
        self.state.store(state, Ordering::Release);
        self.signal.resolve(result);
    }
}

impl<T: Record> Core<T> {
    /// Schedules initialization on the ambient runtime, one tick later.
    /// Repeated calls before (or after) it runs are no-ops. Fails only when
    /// initialization still has to start and there is no runtime to run it.
    pub(super) fn request_init(self: &Arc<Self>) -> Result<(), CacheError> {
        if self.init.state() != InitState::NotStarted
            || self.init.scheduled.load(Ordering::Acquire)
        {
            return Ok(());
        }
        let handle = tokio::runtime::Handle::try_current().map_err(|_| {
            warn!(
                database = %self.config.database,
                "no tokio runtime; collection initialization not started"
            );
            CacheError::NoRuntime
        })?;
        if self.init.scheduled.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        let core = Arc::clone(self);
        handle.spawn(async move {
            tokio::task::yield_now().await;
            core.run_init().await;
        });
        Ok(())
    }

    async fn run_init(self: Arc<Self>) {
        if !self.init.begin() {
            return;
        }
        debug!(database = %self.config.database, "initializing collection");
        let result = self.load().await;
        if let Err(err) = &result {
            error!(database = %self.config.database, error = %err, "collection initialization failed");
        }
        self.init.finish(result);
    }

    async fn load(&self) -> Result<(), CacheError> {
        let adapter = StoreAdapter::open(self.backend.as_ref(), &self.config).await?;

        // Seed problems leave the store as it was; the load still goes ahead.
        if let Err(err) = adapter.seed(&self.config.seed).await {
            warn!(database = %self.config.database, error = %err, "seeding failed");
        }

        let persisted = adapter.get_all().await?;
        let snapshot = Snapshot::merge(&self.config.seed, persisted);
        let count = snapshot.len();

        let _ = self.adapter.set(adapter);
        self.snapshot.send_replace(Some(Arc::new(snapshot)));
        info!(
            database = %self.config.database,
            store = %self.config.store.name,
            records = count,
            "collection ready"
        );
        Ok(())
    }

    /// Starts initialization if needed, waits for it, and returns the
    /// current snapshot.
    pub(super) async fn ready(self: &Arc<Self>) -> Result<Arc<Snapshot<T>>, CacheError> {
        if let Some(snapshot) = self.current() {
            return Ok(snapshot);
        }
        if let Some(Err(err)) = self.init.signal.outcome() {
            return Err(err);
        }
        self.request_init()?;
        self.init.signal.wait().await?;
        self.current().ok_or(CacheError::Uninitialized)
    }
}
