use std::collections::HashMap;
use std::sync::Arc;

use crate::config::SeedSet;
use crate::record::Record;

/// Immutable, ordered id -> record mapping published by a collection.
///
/// Writes never mutate a published snapshot; they build a new one with
/// [`Snapshot::with`] / [`Snapshot::without`] and replace it wholesale.
#[derive(Debug)]
pub struct Snapshot<T> {
    order: Vec<String>,
    records: HashMap<String, Arc<T>>,
}

impl<T> Clone for Snapshot<T> {
    fn clone(&self) -> Self {
        Self {
            order: self.order.clone(),
            records: self.records.clone(),
        }
    }
}

impl<T> Default for Snapshot<T> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<T> Snapshot<T> {
    pub fn empty() -> Self {
        Self {
            order: Vec::new(),
            records: HashMap::new(),
        }
    }

    pub fn get(&self, id: &str) -> Option<Arc<T>> {
        self.records.get(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.records.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Ids in snapshot order.
    pub fn keys(&self) -> Vec<String> {
        self.order.clone()
    }

    pub fn entries(&self) -> Vec<(String, Arc<T>)> {
        self.iter()
            .map(|(id, record)| (id.to_string(), Arc::clone(record)))
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Arc<T>)> {
        self.order
            .iter()
            .filter_map(move |id| self.records.get(id).map(|r| (id.as_str(), r)))
    }

    /// Copy with `id` mapped to `record`. An existing id keeps its position;
    /// a new one goes last.
    pub fn with(&self, id: &str, record: Arc<T>) -> Self {
        let mut next = self.clone();
        if next.records.insert(id.to_string(), record).is_none() {
            next.order.push(id.to_string());
        }
        next
    }

    /// Copy without `id`.
    pub fn without(&self, id: &str) -> Self {
        let mut next = self.clone();
        if next.records.remove(id).is_some() {
            next.order.retain(|existing| existing != id);
        }
        next
    }
}

impl<T: Record> Snapshot<T> {
    /// Seed records overwritten by persisted ones: seed ids first in seed
    /// order (holding the persisted value when both exist), then ids only
    /// the store knows, in store order.
    pub fn merge(seed: &SeedSet<T>, persisted: Vec<T>) -> Self {
        let mut snapshot = Self::empty();
        for (id, record) in seed.iter() {
            snapshot.order.push(id.to_string());
            snapshot
                .records
                .insert(id.to_string(), Arc::new(record.clone()));
        }
        for record in persisted {
            let id = record.id().to_string();
            if snapshot.records.insert(id.clone(), Arc::new(record)).is_none() {
                snapshot.order.push(id);
            }
        }
        snapshot
    }
}
