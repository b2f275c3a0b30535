//! Cache storage trait and SQLite implementation.

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::schema::{self, MIGRATIONS};
use super::traits::{CachedEntity, Cacheable, QueryKey};

/// Trait for cache storage backends.
///
/// Records handed to the write methods must already carry a key; key
/// synthesis happens one level up in [`super::StoreHandle`].
pub trait CacheStorage: Send + Sync {
  /// Insert a record, replacing any record with the same key.
  fn upsert<T: Cacheable>(&self, record: &T) -> Result<()>;

  /// Every record of the entity family, in no particular order.
  fn get_all<T: Cacheable>(&self) -> Result<Vec<T>>;

  /// A single record by key.
  fn get<T: Cacheable>(&self, key: &str) -> Result<Option<CachedEntity<T>>>;

  /// Remove a record. Removing a missing key is not an error.
  fn delete<T: Cacheable>(&self, key: &str) -> Result<()>;

  /// Remove every record of the entity family.
  fn clear<T: Cacheable>(&self) -> Result<()>;

  /// Clear the table and write `records` in one transaction.
  fn replace_all<T: Cacheable>(&self, records: &[T]) -> Result<()>;

  /// Remember that `key` was fetched successfully just now.
  fn record_fetch<K: QueryKey>(&self, key: &K, result_count: usize) -> Result<()>;

  /// When `key` was last fetched successfully.
  fn last_fetched<K: QueryKey>(&self, key: &K) -> Result<Option<DateTime<Utc>>>;
}

/// SQLite-based cache storage implementation.
pub struct SqliteStorage {
  conn: Mutex<Connection>,
}

impl SqliteStorage {
  /// Open (or create) the store at `path` and bring its schema up to date.
  pub fn open(path: &Path) -> Result<Self> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create cache directory: {}", e))?;
    }

    let conn = Connection::open(path)
      .map_err(|e| eyre!("Failed to open cache database at {}: {}", path.display(), e))?;

    Self::from_connection(conn)
  }

  /// Open a throwaway in-memory store.
  #[cfg(test)]
  pub fn open_in_memory() -> Result<Self> {
    let conn =
      Connection::open_in_memory().map_err(|e| eyre!("Failed to open in-memory cache: {}", e))?;
    Self::from_connection(conn)
  }

  fn from_connection(mut conn: Connection) -> Result<Self> {
    schema::migrate(&mut conn, MIGRATIONS)?;
    Ok(Self {
      conn: Mutex::new(conn),
    })
  }

  /// Get the default database path.
  pub fn default_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("edudesk").join("cache.db"))
  }

  fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
    self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))
  }
}

/// Key of a record that is about to be written.
fn require_key<T: Cacheable>(record: &T) -> Result<String> {
  record
    .cache_key()
    .ok_or_else(|| eyre!("Refusing to store {} record without a key", T::table().name()))
}

fn write_record<T: Cacheable>(conn: &Connection, record: &T) -> Result<()> {
  let key = require_key(record)?;
  let data = serde_json::to_vec(record).map_err(|e| eyre!("Failed to serialize record: {}", e))?;

  conn
    .execute(
      &format!(
        "INSERT OR REPLACE INTO {} (record_key, data, cached_at) VALUES (?, ?, datetime('now'))",
        T::table().name()
      ),
      params![key, data],
    )
    .map_err(|e| eyre!("Failed to store record: {}", e))?;

  Ok(())
}

impl CacheStorage for SqliteStorage {
  fn upsert<T: Cacheable>(&self, record: &T) -> Result<()> {
    let conn = self.lock()?;
    write_record(&conn, record)
  }

  fn get_all<T: Cacheable>(&self) -> Result<Vec<T>> {
    let conn = self.lock()?;

    let mut stmt = conn
      .prepare(&format!("SELECT data FROM {}", T::table().name()))
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let records: Vec<T> = stmt
      .query_map([], |row| row.get::<_, Vec<u8>>(0))
      .map_err(|e| eyre!("Failed to query records: {}", e))?
      .filter_map(|r| r.ok())
      .filter_map(|data| serde_json::from_slice(&data).ok())
      .collect();

    Ok(records)
  }

  fn get<T: Cacheable>(&self, key: &str) -> Result<Option<CachedEntity<T>>> {
    let conn = self.lock()?;

    let row: Option<(Vec<u8>, String)> = conn
      .query_row(
        &format!(
          "SELECT data, cached_at FROM {} WHERE record_key = ?",
          T::table().name()
        ),
        params![key],
        |row| Ok((row.get(0)?, row.get(1)?)),
      )
      .optional()
      .map_err(|e| eyre!("Failed to read record {}: {}", key, e))?;

    match row {
      Some((data, cached_at_str)) => {
        let entity: T = serde_json::from_slice(&data)
          .map_err(|e| eyre!("Failed to deserialize record: {}", e))?;
        let cached_at = parse_datetime(&cached_at_str)?;
        Ok(Some(CachedEntity { entity, cached_at }))
      }
      None => Ok(None),
    }
  }

  fn delete<T: Cacheable>(&self, key: &str) -> Result<()> {
    let conn = self.lock()?;
    conn
      .execute(
        &format!("DELETE FROM {} WHERE record_key = ?", T::table().name()),
        params![key],
      )
      .map_err(|e| eyre!("Failed to delete record {}: {}", key, e))?;
    Ok(())
  }

  fn clear<T: Cacheable>(&self) -> Result<()> {
    let conn = self.lock()?;
    conn
      .execute(&format!("DELETE FROM {}", T::table().name()), [])
      .map_err(|e| eyre!("Failed to clear {}: {}", T::table().name(), e))?;
    Ok(())
  }

  fn replace_all<T: Cacheable>(&self, records: &[T]) -> Result<()> {
    let mut conn = self.lock()?;
    let tx = conn
      .transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    tx.execute(&format!("DELETE FROM {}", T::table().name()), [])
      .map_err(|e| eyre!("Failed to clear {}: {}", T::table().name(), e))?;

    for record in records {
      write_record(&tx, record)?;
    }

    tx.commit()
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;

    Ok(())
  }

  fn record_fetch<K: QueryKey>(&self, key: &K, result_count: usize) -> Result<()> {
    let conn = self.lock()?;
    conn
      .execute(
        "INSERT OR REPLACE INTO fetch_meta (query_hash, query_description, fetched_at, result_count)
         VALUES (?, ?, datetime('now'), ?)",
        params![key.cache_hash(), key.description(), result_count],
      )
      .map_err(|e| eyre!("Failed to record fetch: {}", e))?;
    Ok(())
  }

  fn last_fetched<K: QueryKey>(&self, key: &K) -> Result<Option<DateTime<Utc>>> {
    let conn = self.lock()?;
    let fetched_at: Option<String> = conn
      .query_row(
        "SELECT fetched_at FROM fetch_meta WHERE query_hash = ?",
        params![key.cache_hash()],
        |row| row.get(0),
      )
      .optional()
      .map_err(|e| eyre!("Failed to read fetch bookkeeping: {}", e))?;

    fetched_at.as_deref().map(parse_datetime).transpose()
  }
}

/// Parse a datetime string from SQLite format.
fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
  // SQLite stores as "YYYY-MM-DD HH:MM:SS"
  chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
    .map(|dt| dt.and_utc())
    .map_err(|e| eyre!("Failed to parse datetime '{}': {}", s, e))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::api::types::RolePermission;

  struct Key(&'static str);

  impl QueryKey for Key {
    fn cache_hash(&self) -> String {
      self.0.to_string()
    }

    fn description(&self) -> String {
      format!("test {}", self.0)
    }
  }

  fn role(id: i64, name: &str) -> RolePermission {
    RolePermission {
      id: Some(id),
      role_name: name.to_string(),
      role_key: name.to_lowercase().replace(' ', "_"),
      ..Default::default()
    }
  }

  #[test]
  fn test_upsert_same_key_keeps_one_record() {
    let storage = SqliteStorage::open_in_memory().unwrap();
    storage.upsert(&role(7, "Teacher")).unwrap();
    storage.upsert(&role(7, "Senior Teacher")).unwrap();

    let all: Vec<RolePermission> = storage.get_all().unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].role_name, "Senior Teacher");
  }

  #[test]
  fn test_upsert_without_key_is_rejected() {
    let storage = SqliteStorage::open_in_memory().unwrap();
    let mut keyless = role(1, "Anon");
    keyless.id = None;
    assert!(storage.upsert(&keyless).is_err());
  }

  #[test]
  fn test_get_one() {
    let storage = SqliteStorage::open_in_memory().unwrap();
    storage.upsert(&role(3, "Admin")).unwrap();

    let cached = storage.get::<RolePermission>("3").unwrap().unwrap();
    assert_eq!(cached.entity.role_name, "Admin");
    assert!(storage.get::<RolePermission>("4").unwrap().is_none());
  }

  #[test]
  fn test_delete_and_clear_are_idempotent() {
    let storage = SqliteStorage::open_in_memory().unwrap();
    storage.upsert(&role(1, "A")).unwrap();
    storage.upsert(&role(2, "B")).unwrap();

    storage.delete::<RolePermission>("1").unwrap();
    storage.delete::<RolePermission>("1").unwrap();
    assert_eq!(storage.get_all::<RolePermission>().unwrap().len(), 1);

    storage.clear::<RolePermission>().unwrap();
    storage.clear::<RolePermission>().unwrap();
    assert!(storage.get_all::<RolePermission>().unwrap().is_empty());
  }

  #[test]
  fn test_replace_all_prunes_missing_records() {
    let storage = SqliteStorage::open_in_memory().unwrap();
    storage.upsert(&role(1, "Stale")).unwrap();
    storage
      .replace_all(&[role(2, "Fresh"), role(3, "Fresher")])
      .unwrap();

    let mut ids: Vec<i64> = storage
      .get_all::<RolePermission>()
      .unwrap()
      .into_iter()
      .filter_map(|r| r.id)
      .collect();
    ids.sort();
    assert_eq!(ids, vec![2, 3]);
  }

  #[test]
  fn test_fetch_bookkeeping() {
    let storage = SqliteStorage::open_in_memory().unwrap();
    assert!(storage.last_fetched(&Key("roles")).unwrap().is_none());

    storage.record_fetch(&Key("roles"), 4).unwrap();
    assert!(storage.last_fetched(&Key("roles")).unwrap().is_some());
  }

  #[test]
  fn test_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("cache.db");

    {
      let storage = SqliteStorage::open(&path).unwrap();
      storage.upsert(&role(9, "Registrar")).unwrap();
    }

    let storage = SqliteStorage::open(&path).unwrap();
    let all: Vec<RolePermission> = storage.get_all().unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].role_name, "Registrar");
  }
}
