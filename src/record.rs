use serde::{de::DeserializeOwned, Serialize};

/// A value the cache can hold: serializable, cloneable, with a unique string id.
///
/// The cache never looks inside a record except through index key paths on
/// its serialized form. Implement it by hand or with `#[derive(Record)]`.
pub trait Record: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// The unique identifier for this record.
    fn id(&self) -> &str;
}

/// A write routed through [`Collection::dispatch`](crate::Collection::dispatch).
#[derive(Debug, Clone, PartialEq)]
pub enum Action<T> {
    /// Insert or replace the record under its own id.
    Put(T),
    /// Remove the record with this id.
    Delete(String),
}

impl<T> Action<T> {
    pub fn put(record: T) -> Self {
        Action::Put(record)
    }

    pub fn delete(id: impl Into<String>) -> Self {
        Action::Delete(id.into())
    }
}
