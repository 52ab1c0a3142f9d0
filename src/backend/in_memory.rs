//! InMemoryBackend - HashMap-backed databases for testing and development.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use tracing::debug;

use super::engine::{DatabaseState, EngineConnection, SharedState};
use super::{Backend, Connection};
use crate::error::BackendError;
use crate::schema::StoreSchema;

/// In-memory backend keyed by database name.
///
/// Clone-friendly via Arc: clones share the same databases, so opening the
/// same name twice (from one backend or its clones) sees the same data.
#[derive(Clone, Default)]
pub struct InMemoryBackend {
    databases: Arc<RwLock<HashMap<String, SharedState>>>,
}

impl InMemoryBackend {
    /// Create a backend with no databases.
    pub fn new() -> Self {
        Self::default()
    }

    /// Names of every database opened so far.
    pub fn database_names(&self) -> Result<Vec<String>, BackendError> {
        let databases = self
            .databases
            .read()
            .map_err(|_| BackendError::LockPoisoned("database registry read"))?;
        let mut names: Vec<String> = databases.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    /// Drops a database. Connections already open keep the old data.
    pub fn delete_database(&self, name: &str) -> Result<bool, BackendError> {
        let mut databases = self
            .databases
            .write()
            .map_err(|_| BackendError::LockPoisoned("database registry write"))?;
        Ok(databases.remove(name).is_some())
    }
}

#[async_trait]
impl Backend for InMemoryBackend {
    async fn open(
        &self,
        name: &str,
        version: u32,
        schema: &StoreSchema,
    ) -> Result<Arc<dyn Connection>, BackendError> {
        tokio::task::yield_now().await;
        schema.validate()?;
        if version == 0 {
            return Err(BackendError::Data("version must be at least 1".into()));
        }

        let state = {
            let mut databases = self
                .databases
                .write()
                .map_err(|_| BackendError::LockPoisoned("database registry write"))?;
            databases
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(RwLock::new(DatabaseState::new())))
                .clone()
        };

        {
            let mut db = state
                .write()
                .map_err(|_| BackendError::LockPoisoned("upgrade"))?;
            let from = db.version();
            if db.upgrade(version, schema)? {
                debug!(database = name, from, to = version, "upgraded database");
            }
        }

        Ok(Arc::new(EngineConnection::new(name, state, None)))
    }
}
