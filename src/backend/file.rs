//! FileBackend - durable databases kept as JSON documents in a directory.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};

use async_trait::async_trait;
use tracing::{debug, info};

use super::engine::{DatabaseState, Durable, EngineConnection, SharedState, Sink};
use super::{Backend, Connection};
use crate::error::BackendError;
use crate::schema::StoreSchema;

/// Durable backend: one `<name>.db.json` file per database under `dir`.
///
/// The file is read on first open and rewritten (temp file, then rename)
/// for every write. A write becomes visible only after its file is in
/// place; when the file cannot be written the write fails and changes
/// nothing. Within one backend (and its clones) a
/// database is loaded once and shared by all connections.
#[derive(Clone)]
pub struct FileBackend {
    dir: PathBuf,
    databases: Arc<Mutex<HashMap<String, (SharedState, Arc<Durable>)>>>,
}

impl FileBackend {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            databases: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the file backing database `name`.
    pub fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}.db.json", file_stem(name)))
    }

    fn loaded(&self, name: &str) -> Result<Option<(SharedState, Arc<Durable>)>, BackendError> {
        let databases = self
            .databases
            .lock()
            .map_err(|_| BackendError::LockPoisoned("database registry read"))?;
        Ok(databases.get(name).cloned())
    }

    async fn load(&self, name: &str) -> Result<(SharedState, Arc<Durable>), BackendError> {
        if let Some(entry) = self.loaded(name)? {
            return Ok(entry);
        }

        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.path_for(name);
        let state = match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let state = DatabaseState::decode(&bytes)?;
                info!(database = name, path = %path.display(), version = state.version(), "loaded database file");
                state
            }
            Err(err) if err.kind() == ErrorKind::NotFound => DatabaseState::new(),
            Err(err) => return Err(err.into()),
        };
        let sink: Arc<dyn Sink> = Arc::new(FileSink::new(path));
        let entry = (Arc::new(RwLock::new(state)), Arc::new(Durable::new(sink)));

        // Another open may have loaded it while we were reading.
        let mut databases = self
            .databases
            .lock()
            .map_err(|_| BackendError::LockPoisoned("database registry write"))?;
        Ok(databases.entry(name.to_string()).or_insert(entry).clone())
    }
}

#[async_trait]
impl Backend for FileBackend {
    async fn open(
        &self,
        name: &str,
        version: u32,
        schema: &StoreSchema,
    ) -> Result<Arc<dyn Connection>, BackendError> {
        schema.validate()?;
        if version == 0 {
            return Err(BackendError::Data("version must be at least 1".into()));
        }

        let (state, durable) = self.load(name).await?;

        durable
            .commit(&state, |db| {
                let from = db.version();
                if db.upgrade(version, schema)? {
                    debug!(database = name, from, to = version, "upgraded database");
                }
                Ok(())
            })
            .await?;

        Ok(Arc::new(EngineConnection::new(name, state, Some(durable))))
    }
}

/// Writes database images to one file, never replacing a newer image with
/// an older one.
struct FileSink {
    path: PathBuf,
    written: tokio::sync::Mutex<u64>,
}

impl FileSink {
    fn new(path: PathBuf) -> Self {
        Self {
            path,
            written: tokio::sync::Mutex::new(0),
        }
    }
}

#[async_trait]
impl Sink for FileSink {
    async fn flush(&self, generation: u64, image: Vec<u8>) -> Result<(), BackendError> {
        let mut written = self.written.lock().await;
        if generation <= *written {
            return Ok(());
        }
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &image).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        *written = generation;
        Ok(())
    }
}

/// Database names map to file names byte for byte; anything outside
/// `[A-Za-z0-9_.-]` is percent-encoded so a name can never leave `dir`.
fn file_stem(name: &str) -> String {
    let mut stem = String::with_capacity(name.len());
    for byte in name.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'_' | b'-' | b'.' => stem.push(byte as char),
            _ => stem.push_str(&format!("%{:02X}", byte)),
        }
    }
    stem
}
