//! Core traits and types for the caching system.

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};

/// Trait for entities that can be cached.
///
/// Implementors expose an identity key, which may be missing on records the
/// server sent without one, and name the local table they live in.
pub trait Cacheable: Clone + Send + Sync + Serialize + DeserializeOwned {
  /// Identity key of this record, if it has one.
  fn cache_key(&self) -> Option<String>;

  /// Install a locally synthesized id on a record that has no key.
  fn assign_key(&mut self, id: i64);

  /// Local table this entity family is persisted in.
  fn table() -> Table;
}

/// Logical tables of the local store, one per entity family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
  Session,
  RolePermissions,
  Permissions,
}

impl Table {
  pub const ALL: [Table; 3] = [Table::Session, Table::RolePermissions, Table::Permissions];

  /// SQL table name.
  pub fn name(self) -> &'static str {
    match self {
      Table::Session => "session",
      Table::RolePermissions => "role_permissions",
      Table::Permissions => "permissions",
    }
  }
}

/// Key identifying a remote resource in fetch bookkeeping.
pub trait QueryKey {
  /// Stable, fixed-length hash used as the storage key.
  fn cache_hash(&self) -> String;

  /// Human readable description, kept next to the hash for debugging.
  fn description(&self) -> String;
}

/// A single cached entity.
#[derive(Debug, Clone)]
pub struct CachedEntity<T> {
  /// The cached entity
  pub entity: T,
  /// When the entity was cached
  pub cached_at: DateTime<Utc>,
}
