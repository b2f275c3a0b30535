//! Lazily opened, shared handle to the local store.

use chrono::{DateTime, Utc};
use color_eyre::Result;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use super::ids::IdGenerator;
use super::storage::{CacheStorage, SqliteStorage};
use super::traits::{Cacheable, QueryKey};

type Opener<S> = Arc<dyn Fn() -> Result<S> + Send + Sync>;

/// Handle to the local store.
///
/// The store is opened on first use. Callers that arrive while the open is
/// still running wait on that same open. If the store cannot be opened, every
/// operation becomes a no-op: writes are dropped and reads come back empty.
pub struct StoreHandle<S: CacheStorage = SqliteStorage> {
  cell: Arc<OnceCell<Option<Arc<S>>>>,
  opener: Opener<S>,
  ids: Arc<IdGenerator>,
}

impl<S: CacheStorage> Clone for StoreHandle<S> {
  fn clone(&self) -> Self {
    Self {
      cell: Arc::clone(&self.cell),
      opener: Arc::clone(&self.opener),
      ids: Arc::clone(&self.ids),
    }
  }
}

impl<S: CacheStorage + 'static> StoreHandle<S> {
  /// Create a handle that opens its storage with `opener` on first use.
  pub fn new<F>(opener: F, ids: Arc<IdGenerator>) -> Self
  where
    F: Fn() -> Result<S> + Send + Sync + 'static,
  {
    Self {
      cell: Arc::new(OnceCell::new()),
      opener: Arc::new(opener),
      ids,
    }
  }

  /// Handle with no storage behind it.
  pub fn unavailable(ids: Arc<IdGenerator>) -> Self {
    Self {
      cell: Arc::new(OnceCell::new_with(Some(None))),
      opener: Arc::new(|| Err(color_eyre::eyre::eyre!("local store disabled"))),
      ids,
    }
  }

  /// Resolve the storage, opening it if this is the first call.
  async fn storage(&self) -> Option<Arc<S>> {
    self
      .cell
      .get_or_init(|| async {
        let opener = Arc::clone(&self.opener);
        match tokio::task::spawn_blocking(move || opener()).await {
          Ok(Ok(storage)) => {
            info!("local store opened");
            Some(Arc::new(storage))
          }
          Ok(Err(e)) => {
            warn!(error = %e, "local store unavailable, offline cache disabled");
            None
          }
          Err(e) => {
            warn!(error = %e, "local store open task failed, offline cache disabled");
            None
          }
        }
      })
      .await
      .clone()
  }

  /// Whether a storage backend is actually in use. Opens the store.
  #[cfg(test)]
  pub async fn is_available(&self) -> bool {
    self.storage().await.is_some()
  }

  /// Give `record` a key if it has none, without touching storage.
  pub fn ensure_key<T: Cacheable>(&self, record: &mut T) -> String {
    match record.cache_key() {
      Some(key) => key,
      None => {
        let id = self.ids.next_id();
        record.assign_key(id);
        debug!(table = T::table().name(), id, "synthesized record key");
        id.to_string()
      }
    }
  }

  /// Insert or replace `record`, synthesizing a key first if it lacks one.
  ///
  /// Returns the record as written, key included.
  pub async fn upsert<T: Cacheable>(&self, mut record: T) -> T {
    self.ensure_key(&mut record);
    if let Some(storage) = self.storage().await {
      if let Err(e) = storage.upsert(&record) {
        warn!(table = T::table().name(), error = %e, "local upsert failed");
      }
    }
    record
  }

  /// Every record of `T`'s table. Empty when the store is unavailable.
  pub async fn get_all<T: Cacheable>(&self) -> Vec<T> {
    match self.storage().await {
      Some(storage) => storage.get_all().unwrap_or_else(|e| {
        warn!(table = T::table().name(), error = %e, "local read failed");
        Vec::new()
      }),
      None => Vec::new(),
    }
  }

  /// A single record by key.
  pub async fn get<T: Cacheable>(&self, key: &str) -> Option<T> {
    let storage = self.storage().await?;
    match storage.get::<T>(key) {
      Ok(found) => found.map(|cached| cached.entity),
      Err(e) => {
        warn!(table = T::table().name(), key, error = %e, "local read failed");
        None
      }
    }
  }

  /// Remove one record. No error when nothing matches.
  pub async fn delete<T: Cacheable>(&self, key: &str) {
    if let Some(storage) = self.storage().await {
      if let Err(e) = storage.delete::<T>(key) {
        warn!(table = T::table().name(), key, error = %e, "local delete failed");
      }
    }
  }

  /// Remove every record of `T`'s table.
  pub async fn clear<T: Cacheable>(&self) {
    if let Some(storage) = self.storage().await {
      if let Err(e) = storage.clear::<T>() {
        warn!(table = T::table().name(), error = %e, "local clear failed");
      }
    }
  }

  /// Make the table hold exactly `records`, synthesizing missing keys.
  pub async fn replace_all<T: Cacheable>(&self, mut records: Vec<T>) -> Vec<T> {
    for record in records.iter_mut() {
      self.ensure_key(record);
    }
    if let Some(storage) = self.storage().await {
      if let Err(e) = storage.replace_all(&records) {
        warn!(table = T::table().name(), error = %e, "local replace failed");
      }
    }
    records
  }

  /// Record a successful fetch of `key`.
  pub async fn record_fetch<K: QueryKey>(&self, key: &K, result_count: usize) {
    if let Some(storage) = self.storage().await {
      if let Err(e) = storage.record_fetch(key, result_count) {
        warn!(resource = %key.description(), error = %e, "failed to record fetch");
      }
    }
  }

  /// When `key` was last fetched successfully, if known.
  pub async fn last_fetched<K: QueryKey>(&self, key: &K) -> Option<DateTime<Utc>> {
    let storage = self.storage().await?;
    storage.last_fetched(key).unwrap_or_else(|e| {
      warn!(resource = %key.description(), error = %e, "failed to read fetch bookkeeping");
      None
    })
  }
}

impl StoreHandle<SqliteStorage> {
  /// Handle for an SQLite store at `path`.
  pub fn sqlite(path: std::path::PathBuf, ids: Arc<IdGenerator>) -> Self {
    Self::new(move || SqliteStorage::open(&path), ids)
  }
}
