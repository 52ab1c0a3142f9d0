//! Store schema: primary key path and secondary index definitions.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::BackendError;
use crate::key::IndexKey;

/// Where an index (or the primary key) reads its key from.
///
/// A single path yields the value at that field; a compound path yields an
/// array of the values at each field. Dots traverse nested objects.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum KeyPath {
    Single(String),
    Compound(Vec<String>),
}

impl KeyPath {
    /// The value at this path, or `None` when any component is missing.
    pub fn evaluate(&self, record: &Value) -> Option<Value> {
        match self {
            KeyPath::Single(path) => lookup(record, path).cloned(),
            KeyPath::Compound(paths) => paths
                .iter()
                .map(|path| lookup(record, path).cloned())
                .collect::<Option<Vec<_>>>()
                .map(Value::Array),
        }
    }

    fn is_compound(&self) -> bool {
        matches!(self, KeyPath::Compound(_))
    }
}

impl From<&str> for KeyPath {
    fn from(path: &str) -> Self {
        KeyPath::Single(path.to_string())
    }
}

impl From<String> for KeyPath {
    fn from(path: String) -> Self {
        KeyPath::Single(path)
    }
}

impl<S: Into<String>> From<Vec<S>> for KeyPath {
    fn from(paths: Vec<S>) -> Self {
        KeyPath::Compound(paths.into_iter().map(Into::into).collect())
    }
}

impl<S: Into<String>, const N: usize> From<[S; N]> for KeyPath {
    fn from(paths: [S; N]) -> Self {
        KeyPath::Compound(paths.into_iter().map(Into::into).collect())
    }
}

fn lookup<'a>(record: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return Some(record);
    }
    path.split('.')
        .try_fold(record, |value, field| value.as_object()?.get(field))
}

/// A secondary index on the object store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexDefinition {
    pub name: String,
    pub key_path: KeyPath,
    #[serde(default)]
    pub unique: bool,
    /// One index entry per element when the key is an array.
    #[serde(default)]
    pub multi_entry: bool,
}

impl IndexDefinition {
    pub fn new(name: impl Into<String>, key_path: impl Into<KeyPath>) -> Self {
        Self {
            name: name.into(),
            key_path: key_path.into(),
            unique: false,
            multi_entry: false,
        }
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn multi_entry(mut self) -> Self {
        self.multi_entry = true;
        self
    }

    /// The keys a record contributes to this index. Empty when the key path
    /// is missing or holds something that is not a key.
    pub fn keys_for(&self, record: &Value) -> Vec<IndexKey> {
        let Some(value) = self.key_path.evaluate(record) else {
            return Vec::new();
        };

        match (&value, self.multi_entry) {
            (Value::Array(items), true) => {
                let mut keys: Vec<IndexKey> = items.iter().filter_map(IndexKey::from_value).collect();
                keys.sort();
                keys.dedup();
                keys
            }
            _ => IndexKey::from_value(&value).into_iter().collect(),
        }
    }
}

/// The object store and its indexes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreSchema {
    pub name: String,
    /// Field holding the record's string id.
    pub key_path: String,
    #[serde(default)]
    pub indexes: Vec<IndexDefinition>,
}

impl StoreSchema {
    pub fn new(name: impl Into<String>, key_path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            key_path: key_path.into(),
            indexes: Vec::new(),
        }
    }

    pub fn index(mut self, index: IndexDefinition) -> Self {
        self.indexes.push(index);
        self
    }

    pub fn find_index(&self, name: &str) -> Option<&IndexDefinition> {
        self.indexes.iter().find(|index| index.name == name)
    }

    /// Rejects schemas a backend could never create.
    pub fn validate(&self) -> Result<(), BackendError> {
        if self.name.is_empty() {
            return Err(BackendError::Data("store name is empty".into()));
        }
        if self.key_path.is_empty() {
            return Err(BackendError::Data(format!(
                "store {} has an empty key path",
                self.name
            )));
        }
        for (i, index) in self.indexes.iter().enumerate() {
            if index.name.is_empty() {
                return Err(BackendError::Data(format!(
                    "index #{} on store {} has no name",
                    i, self.name
                )));
            }
            if self.indexes[..i].iter().any(|other| other.name == index.name) {
                return Err(BackendError::Data(format!(
                    "index {} declared twice",
                    index.name
                )));
            }
            if index.multi_entry && index.key_path.is_compound() {
                return Err(BackendError::Data(format!(
                    "index {} cannot be multi-entry with a compound key path",
                    index.name
                )));
            }
        }
        Ok(())
    }

    /// The record's primary key, which must be a string.
    pub fn primary_key(&self, record: &Value) -> Result<String, BackendError> {
        match lookup(record, &self.key_path) {
            Some(Value::String(id)) => Ok(id.clone()),
            Some(other) => Err(BackendError::Data(format!(
                "primary key {} must be a string, found {}",
                self.key_path, other
            ))),
            None => Err(BackendError::Data(format!(
                "record has no value at key path {}",
                self.key_path
            ))),
        }
    }
}
