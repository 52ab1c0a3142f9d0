use thiserror::Error;

/// Errors raised by a storage backend.
///
/// These stay inside the backend seam; `StoreAdapter` maps them into
/// [`CacheError`] according to the operation that failed.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BackendError {
    /// A non-overwriting insert hit an existing primary key.
    #[error("key already exists in store {store}: {key}")]
    KeyExists { store: String, key: String },
    /// A write would break a unique index.
    #[error("unique index {index} already holds {key}")]
    Constraint { index: String, key: String },
    #[error("object store not found: {0}")]
    MissingStore(String),
    #[error("index not found: {0}")]
    MissingIndex(String),
    /// The requested version is lower than the stored one.
    #[error("requested version {requested} is lower than existing version {existing}")]
    Version { requested: u32, existing: u32 },
    /// A record or schema could not be used as given (bad key path, invalid key, ...).
    #[error("data error: {0}")]
    Data(String),
    #[error("io error: {0}")]
    Io(String),
    #[error("encoding error: {0}")]
    Encoding(String),
    #[error("backend lock poisoned during {0}")]
    LockPoisoned(&'static str),
}

impl BackendError {
    /// True for the failures a non-overwriting insert is expected to hit.
    pub fn is_key_collision(&self) -> bool {
        matches!(
            self,
            BackendError::KeyExists { .. } | BackendError::Constraint { .. }
        )
    }
}

impl From<std::io::Error> for BackendError {
    fn from(err: std::io::Error) -> Self {
        BackendError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for BackendError {
    fn from(err: serde_json::Error) -> Self {
        BackendError::Encoding(err.to_string())
    }
}

/// Errors surfaced by the cache and its views.
///
/// `Clone` because a single initialization outcome is handed to every waiter.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CacheError {
    /// The backing store could not be opened or upgraded. Fatal for the
    /// collection instance: every later dependent read fails the same way.
    #[error("failed to open database {database}: {reason}")]
    StoreOpen { database: String, reason: String },
    /// A single read or write transaction failed.
    #[error("{operation} failed: {reason}")]
    Transaction {
        operation: &'static str,
        reason: String,
    },
    /// The index does not exist or the bound is malformed.
    #[error("range query on index {index} failed: {reason}")]
    RangeQuery { index: String, reason: String },
    /// Initialization reported success but no snapshot was published.
    #[error("collection is not initialized")]
    Uninitialized,
    /// Initialization had to start but no tokio runtime was available to
    /// run it.
    #[error("no tokio runtime available to initialize the collection")]
    NoRuntime,
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl CacheError {
    pub(crate) fn transaction(operation: &'static str, err: impl ToString) -> Self {
        CacheError::Transaction {
            operation,
            reason: err.to_string(),
        }
    }

    pub(crate) fn range(index: &str, err: impl ToString) -> Self {
        CacheError::RangeQuery {
            index: index.to_string(),
            reason: err.to_string(),
        }
    }
}
