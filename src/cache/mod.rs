//! Local persistent store for offline support.
//!
//! This module provides the on-device half of the offline cache:
//! - One SQLite table per entity family, keyed by record identity
//! - Additive, versioned schema migrations
//! - A lazily opened handle that degrades to a no-op when storage is unavailable
//! - Local id synthesis for records that arrive without a key

mod handle;
mod ids;
mod schema;
mod storage;
mod traits;

pub use handle::StoreHandle;
pub use ids::IdGenerator;
pub use storage::{CacheStorage, SqliteStorage};
pub use traits::{CachedEntity, Cacheable, QueryKey, Table};
