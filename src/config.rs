//! Collection configuration and seed data.

use std::fmt;
use std::marker::PhantomData;

use serde::de::{DeserializeOwned, MapAccess, Visitor};
use serde::{Deserialize, Deserializer};

use crate::error::CacheError;
use crate::record::Record;
use crate::schema::StoreSchema;

/// Records used to pre-populate the store, keyed by id, in insertion order.
///
/// Seeding never overwrites: a persisted record with the same id always
/// wins, so user edits survive reopening with the same seed set.
#[derive(Debug, Clone)]
pub struct SeedSet<T> {
    entries: Vec<(String, T)>,
}

impl<T> Default for SeedSet<T> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<T> SeedSet<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `record` under `id`, replacing an earlier entry in place.
    pub fn insert(&mut self, id: impl Into<String>, record: T) {
        let id = id.into();
        match self.entries.iter_mut().find(|(existing, _)| *existing == id) {
            Some(entry) => entry.1 = record,
            None => self.entries.push((id, record)),
        }
    }

    pub fn get(&self, id: &str) -> Option<&T> {
        self.entries
            .iter()
            .find(|(existing, _)| existing == id)
            .map(|(_, record)| record)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &T)> {
        self.entries.iter().map(|(id, record)| (id.as_str(), record))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<T: Record> FromIterator<T> for SeedSet<T> {
    /// Keys each record by its own id.
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut seed = SeedSet::new();
        for record in iter {
            seed.insert(record.id().to_string(), record);
        }
        seed
    }
}

impl<'de, T: DeserializeOwned> Deserialize<'de> for SeedSet<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct SeedVisitor<T>(PhantomData<T>);

        impl<'de, T: DeserializeOwned> Visitor<'de> for SeedVisitor<T> {
            type Value = SeedSet<T>;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "a map of record id to record")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
                let mut seed = SeedSet::new();
                while let Some((id, record)) = map.next_entry::<String, T>()? {
                    seed.insert(id, record);
                }
                Ok(seed)
            }
        }

        deserializer.deserialize_map(SeedVisitor(PhantomData))
    }
}

/// Everything a [`Collection`](crate::Collection) needs to open its store.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", bound(deserialize = "T: DeserializeOwned"))]
pub struct CollectionConfig<T> {
    /// Name of the backing database.
    pub database: String,
    /// Schema version; raising it runs the additive upgrade step.
    pub version: u32,
    pub store: StoreSchema,
    #[serde(default)]
    pub seed: SeedSet<T>,
}

impl<T> CollectionConfig<T> {
    pub fn new(database: impl Into<String>, version: u32, store: StoreSchema) -> Self {
        Self {
            database: database.into(),
            version,
            store,
            seed: SeedSet::new(),
        }
    }

    pub fn with_seed(mut self, seed: SeedSet<T>) -> Self {
        self.seed = seed;
        self
    }
}

impl<T: DeserializeOwned> CollectionConfig<T> {
    /// Parses a JSON configuration document.
    pub fn from_json_str(json: &str) -> Result<Self, CacheError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| CacheError::Config(e.to_string()))?;
        if config.version == 0 {
            return Err(CacheError::Config("version must be at least 1".into()));
        }
        config
            .store
            .validate()
            .map_err(|e| CacheError::Config(e.to_string()))?;
        Ok(config)
    }
}
