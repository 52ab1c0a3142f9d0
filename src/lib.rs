//! Reactive record cache kept in sync with an async key-value store.
//!
//! A [`Collection`] loads every record of one object store on first use
//! (merging in configured seed records), serves id and listing reads from
//! memory, runs index range queries live against the store, and applies
//! writes optimistically before persisting them.

extern crate self as viewstore;

mod adapter;
pub mod backend;
mod collection;
mod config;
mod error;
mod key;
mod query;
mod record;
mod schema;

pub use adapter::{SeedReport, StoreAdapter};
#[cfg(feature = "file")]
pub use backend::FileBackend;
pub use backend::{AddOutcome, Backend, Connection, InMemoryBackend};
pub use collection::{Collection, InitState, ItemView, RangeView, Snapshot, Subscription};
pub use config::{CollectionConfig, SeedSet};
pub use error::{BackendError, CacheError};
pub use key::{IndexKey, KeyRange, KeyRangeError, UNICODE_MAX};
pub use query::RangeQuery;
pub use record::{Action, Record};
pub use schema::{IndexDefinition, KeyPath, StoreSchema};

// Derive macro for `Record`
pub use viewstore_macros::Record;
