//! Sync engine for collection families (role permissions, permission catalog).

use chrono::Utc;
use std::future::Future;
use tracing::{debug, info};

use super::notify::Notifier;
use super::slice::{Slice, SliceState, SyncPhase};
use crate::api::{FetchError, ResourceKey};
use crate::cache::{CacheStorage, Cacheable, SqliteStorage, StoreHandle};
use crate::fetch::{with_retry, RevalidatePolicy};
use crate::net::Connectivity;

/// Keeps one collection family's memory, local table and remote source in
/// step.
pub struct CollectionSync<T: Cacheable, S: CacheStorage = SqliteStorage> {
  slice: Slice<Vec<T>>,
  store: StoreHandle<S>,
  connectivity: Connectivity,
  notifier: Notifier,
  policy: RevalidatePolicy,
  resource: ResourceKey,
  /// Singular noun used in notices, e.g. "role"
  noun: &'static str,
}

impl<T: Cacheable, S: CacheStorage> Clone for CollectionSync<T, S> {
  fn clone(&self) -> Self {
    Self {
      slice: self.slice.clone(),
      store: self.store.clone(),
      connectivity: self.connectivity.clone(),
      notifier: self.notifier.clone(),
      policy: self.policy,
      resource: self.resource.clone(),
      noun: self.noun,
    }
  }
}

/// Insert `record` or replace the entry with the same key.
fn splice<T: Cacheable>(records: &mut Vec<T>, record: T) {
  let key = record.cache_key();
  match records.iter_mut().find(|r| r.cache_key() == key) {
    Some(existing) => *existing = record,
    None => records.push(record),
  }
}

fn capitalize(s: &str) -> String {
  let mut chars = s.chars();
  match chars.next() {
    Some(first) => first.to_uppercase().chain(chars).collect(),
    None => String::new(),
  }
}

impl<T: Cacheable + 'static, S: CacheStorage + 'static> CollectionSync<T, S> {
  pub fn new(
    store: StoreHandle<S>,
    connectivity: Connectivity,
    notifier: Notifier,
    resource: ResourceKey,
    noun: &'static str,
  ) -> Self {
    Self {
      slice: Slice::new(Vec::new()),
      store,
      connectivity,
      notifier,
      policy: RevalidatePolicy::manual(),
      resource,
      noun,
    }
  }

  pub fn with_policy(mut self, policy: RevalidatePolicy) -> Self {
    self.policy = policy;
    self
  }

  pub fn policy(&self) -> &RevalidatePolicy {
    &self.policy
  }

  pub fn slice(&self) -> &Slice<Vec<T>> {
    &self.slice
  }

  pub fn snapshot(&self) -> SliceState<Vec<T>> {
    self.slice.snapshot()
  }

  /// Load the local snapshot into memory.
  ///
  /// Only applies while still hydrating, so a fetch that finished first is
  /// never overwritten by older local data. Returns the number of cached
  /// records.
  pub async fn hydrate(&self) -> usize {
    let cached = self.store.get_all::<T>().await;
    let synced_at = self.store.last_fetched(&self.resource).await;
    let count = cached.len();

    self.slice.modify(|state| {
      if state.phase == SyncPhase::Hydrating {
        if count > 0 {
          state.data = cached;
        }
        state.synced_at = synced_at;
      }
    });

    debug!(family = self.noun, count, "hydrated from local store");
    count
  }

  /// Fetch the whole collection and make memory and the local table match it.
  ///
  /// While offline no request is made. On failure the local snapshot stays
  /// on screen.
  pub async fn refresh<F, Fut>(&self, fetch: F) -> SyncPhase
  where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Vec<T>, FetchError>>,
  {
    if self.connectivity.gate(&self.resource).is_none() {
      return self.fall_back(FetchError::Offline).await;
    }

    self.slice.modify(|state| state.is_validating = true);

    match with_retry(&self.policy, self.noun, fetch).await {
      Ok(records) => {
        let records = self.store.replace_all(records).await;
        self.store.record_fetch(&self.resource, records.len()).await;
        info!(family = self.noun, count = records.len(), "collection refreshed");

        self.slice.modify(|state| {
          state.data = records;
          state.phase = SyncPhase::Live;
          state.is_validating = false;
          state.synced_at = Some(Utc::now());
          state.last_error = None;
        });
        SyncPhase::Live
      }
      Err(e) => self.fall_back(e).await,
    }
  }

  /// Show the local snapshot after a suppressed or failed fetch.
  async fn fall_back(&self, error: FetchError) -> SyncPhase {
    let cached = self.store.get_all::<T>().await;
    let count = cached.len();

    self.slice.modify(|state| {
      // An empty snapshot never wipes data that is already on screen
      if count > 0 {
        state.data = cached;
      }
      state.phase = SyncPhase::Degraded;
      state.is_validating = false;
      state.last_error = Some(error.to_string());
    });

    if error == FetchError::Offline {
      self
        .notifier
        .info(format!("Offline: showing {} cached {}s", count, self.noun));
    } else {
      self.notifier.warning(format!(
        "Could not refresh {}s ({}); showing cached data",
        self.noun, error
      ));
    }

    SyncPhase::Degraded
  }

  /// Fetch one record and merge it into the collection.
  ///
  /// On failure the locally cached copy is returned, if there is one.
  pub async fn refresh_one<F, Fut>(&self, key: &str, fetch: F) -> Result<T, FetchError>
  where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, FetchError>>,
  {
    let result = if self.connectivity.is_online() {
      with_retry(&self.policy, self.noun, fetch).await
    } else {
      Err(FetchError::Offline)
    };

    match result {
      Ok(record) => {
        let record = self.store.upsert(record).await;
        self.slice.modify(|state| splice(&mut state.data, record.clone()));
        Ok(record)
      }
      Err(e) => match self.store.get::<T>(key).await {
        Some(cached) => {
          if e != FetchError::Offline {
            self.notifier.warning(format!(
              "Could not refresh {} {} ({}); showing cached copy",
              self.noun, key, e
            ));
          }
          Ok(cached)
        }
        None => Err(e),
      },
    }
  }

  /// Run a create call and record the server-confirmed result.
  pub async fn create<F, Fut>(&self, call: F) -> Result<T, FetchError>
  where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, FetchError>>,
  {
    self.write("created", call).await
  }

  /// Run an update call and record the server-confirmed result.
  pub async fn update<F, Fut>(&self, call: F) -> Result<T, FetchError>
  where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, FetchError>>,
  {
    self.write("saved", call).await
  }

  async fn write<F, Fut>(&self, verb: &str, call: F) -> Result<T, FetchError>
  where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, FetchError>>,
  {
    let result = match self.connectivity.gate(()) {
      Some(()) => call().await,
      None => Err(FetchError::Offline),
    };

    match result {
      Ok(record) => {
        let record = self.store.upsert(record).await;
        self.slice.modify(|state| splice(&mut state.data, record.clone()));
        self
          .notifier
          .success(format!("{} {}", capitalize(self.noun), verb));
        Ok(record)
      }
      Err(e) => {
        self
          .notifier
          .error(format!("{} not {}: {}", capitalize(self.noun), verb, e));
        Err(e)
      }
    }
  }

  /// Run a delete call and drop the record locally once the server agreed.
  pub async fn delete<F, Fut>(&self, key: &str, call: F) -> Result<(), FetchError>
  where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<(), FetchError>>,
  {
    let result = match self.connectivity.gate(()) {
      Some(()) => call().await,
      None => Err(FetchError::Offline),
    };

    match result {
      Ok(()) => {
        self.store.delete::<T>(key).await;
        self.slice.modify(|state| {
          state
            .data
            .retain(|r| r.cache_key().as_deref() != Some(key))
        });
        self
          .notifier
          .success(format!("{} deleted", capitalize(self.noun)));
        Ok(())
      }
      Err(e) => {
        self
          .notifier
          .error(format!("{} not deleted: {}", capitalize(self.noun), e));
        Err(e)
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::api::RolePermission;
  use crate::cache::IdGenerator;
  use crate::sync::notify::{Level, SyncEvent};
  use std::sync::atomic::{AtomicU32, Ordering};
  use std::sync::Arc;
  use std::time::Duration;
  use tokio::sync::mpsc::UnboundedReceiver;

  struct Fixture {
    sync: CollectionSync<RolePermission>,
    store: StoreHandle,
    connectivity: Connectivity,
    events: UnboundedReceiver<SyncEvent>,
  }

  fn fixture() -> Fixture {
    let store = StoreHandle::new(SqliteStorage::open_in_memory, Arc::new(IdGenerator::new()));
    let connectivity = Connectivity::new(true);
    let (notifier, events) = Notifier::channel();
    let sync = CollectionSync::new(
      store.clone(),
      connectivity.clone(),
      notifier,
      ResourceKey::RolePermissions,
      "role",
    );
    Fixture {
      sync,
      store,
      connectivity,
      events,
    }
  }

  fn role(id: i64, name: &str) -> RolePermission {
    RolePermission {
      id: Some(id),
      role_name: name.to_string(),
      ..Default::default()
    }
  }

  fn names(roles: &[RolePermission]) -> Vec<String> {
    let mut names: Vec<String> = roles.iter().map(|r| r.role_name.clone()).collect();
    names.sort();
    names
  }

  fn last_notice(events: &mut UnboundedReceiver<SyncEvent>) -> Option<(Level, String)> {
    let mut last = None;
    while let Ok(event) = events.try_recv() {
      if let SyncEvent::Notice(n) = event {
        last = Some((n.level, n.message));
      }
    }
    last
  }

  fn server_error() -> FetchError {
    FetchError::Status {
      status: 500,
      message: "boom".into(),
    }
  }

  #[tokio::test]
  async fn test_fetch_overwrites_cached_record() {
    let f = fixture();
    f.store.upsert(role(7, "Teacher")).await;
    f.sync.hydrate().await;

    let phase = f
      .sync
      .refresh(|| async { Ok(vec![role(7, "Senior Teacher")]) })
      .await;
    assert_eq!(phase, SyncPhase::Live);

    let memory = f.sync.snapshot().data;
    assert_eq!(names(&memory), vec!["Senior Teacher"]);

    let stored: Vec<RolePermission> = f.store.get_all().await;
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].role_name, "Senior Teacher");
  }

  #[tokio::test]
  async fn test_hydration_does_not_wait_for_network() {
    let f = fixture();
    f.store.upsert(role(1, "Admin")).await;
    f.store.upsert(role(2, "Teacher")).await;

    let sync = f.sync.clone();
    let slow = tokio::spawn(async move {
      sync
        .refresh(|| async {
          tokio::time::sleep(Duration::from_secs(30)).await;
          Ok(Vec::new())
        })
        .await
    });

    // Let the refresh start and park on the slow request
    tokio::task::yield_now().await;

    assert_eq!(f.sync.hydrate().await, 2);
    let state = f.sync.snapshot();
    assert_eq!(names(&state.data), vec!["Admin", "Teacher"]);
    assert!(state.is_validating);

    slow.abort();
  }

  #[tokio::test]
  async fn test_hydrate_after_live_fetch_is_ignored() {
    let f = fixture();
    f.store.upsert(role(1, "Old")).await;
    f.sync
      .refresh(|| async { Ok(vec![role(2, "New")]) })
      .await;

    f.sync.hydrate().await;
    assert_eq!(names(&f.sync.snapshot().data), vec!["New"]);
  }

  #[tokio::test]
  async fn test_offline_suppresses_request() {
    let mut f = fixture();
    f.store.upsert(role(1, "Admin")).await;
    f.connectivity.set_reachable(false);

    let calls = AtomicU32::new(0);
    let phase = f
      .sync
      .refresh(|| {
        calls.fetch_add(1, Ordering::SeqCst);
        async { Ok(Vec::new()) }
      })
      .await;

    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(phase, SyncPhase::Degraded);
    assert_eq!(names(&f.sync.snapshot().data), vec!["Admin"]);
    assert_eq!(last_notice(&mut f.events).map(|n| n.0), Some(Level::Info));
  }

  #[tokio::test]
  async fn test_fetch_error_falls_back_to_cache() {
    let mut f = fixture();
    for (id, name) in [(1, "A"), (2, "B"), (3, "C")] {
      f.store.upsert(role(id, name)).await;
    }

    let phase = f.sync.refresh(|| async { Err(server_error()) }).await;

    assert_eq!(phase, SyncPhase::Degraded);
    let state = f.sync.snapshot();
    assert_eq!(state.data.len(), 3);
    assert!(state.last_error.is_some());
    assert_eq!(last_notice(&mut f.events).map(|n| n.0), Some(Level::Warning));
  }

  #[tokio::test]
  async fn test_error_with_empty_cache_keeps_rendered_data() {
    let store: StoreHandle = StoreHandle::unavailable(Arc::new(IdGenerator::new()));
    let (notifier, _events) = Notifier::channel();
    let sync: CollectionSync<RolePermission> = CollectionSync::new(
      store,
      Connectivity::new(true),
      notifier,
      ResourceKey::RolePermissions,
      "role",
    );

    sync.refresh(|| async { Ok(vec![role(1, "Admin")]) }).await;
    sync.refresh(|| async { Err(server_error()) }).await;

    assert_eq!(names(&sync.snapshot().data), vec!["Admin"]);
  }

  #[tokio::test]
  async fn test_full_fetch_prunes_orphans() {
    let f = fixture();
    f.store.upsert(role(1, "Deleted elsewhere")).await;
    f.store.upsert(role(2, "Kept")).await;

    f.sync
      .refresh(|| async { Ok(vec![role(2, "Kept")]) })
      .await;

    let stored: Vec<RolePermission> = f.store.get_all().await;
    assert_eq!(names(&stored), vec!["Kept"]);
  }

  #[tokio::test]
  async fn test_keyless_batch_gets_distinct_keys() {
    let f = fixture();
    let keyless = |name: &str| RolePermission {
      role_name: name.to_string(),
      ..Default::default()
    };
    let batch = vec![keyless("A"), keyless("B"), keyless("C")];

    f.sync.refresh(move || {
      let batch = batch.clone();
      async move { Ok(batch) }
    })
    .await;

    let stored: Vec<RolePermission> = f.store.get_all().await;
    assert_eq!(stored.len(), 3);
  }

  #[tokio::test]
  async fn test_refresh_one_merges() {
    let f = fixture();
    f.sync
      .refresh(|| async { Ok(vec![role(1, "Admin"), role(2, "Teacher")]) })
      .await;

    f.sync
      .refresh_one("2", || async { Ok(role(2, "Senior Teacher")) })
      .await
      .unwrap();
    f.sync
      .refresh_one("3", || async { Ok(role(3, "Registrar")) })
      .await
      .unwrap();

    let memory = f.sync.snapshot().data;
    assert_eq!(
      memory.iter().map(|r| r.role_name.as_str()).collect::<Vec<_>>(),
      vec!["Admin", "Senior Teacher", "Registrar"]
    );
    assert_eq!(f.store.get_all::<RolePermission>().await.len(), 3);
  }

  #[tokio::test]
  async fn test_refresh_one_offline_uses_cache() {
    let f = fixture();
    f.store.upsert(role(4, "Cached")).await;
    f.connectivity.set_reachable(false);

    let found = f
      .sync
      .refresh_one("4", || async { Ok(role(4, "Remote")) })
      .await
      .unwrap();
    assert_eq!(found.role_name, "Cached");

    let missing = f
      .sync
      .refresh_one("5", || async { Ok(role(5, "Remote")) })
      .await;
    assert_eq!(missing, Err(FetchError::Offline));
  }

  #[tokio::test]
  async fn test_create_and_update_splice() {
    let mut f = fixture();
    f.sync
      .refresh(|| async { Ok(vec![role(1, "Admin")]) })
      .await;

    f.sync.create(|| async { Ok(role(2, "Teacher")) }).await.unwrap();
    f.sync.update(|| async { Ok(role(1, "Owner")) }).await.unwrap();

    let memory = f.sync.snapshot().data;
    assert_eq!(names(&memory), vec!["Owner", "Teacher"]);
    assert_eq!(names(&f.store.get_all::<RolePermission>().await), vec!["Owner", "Teacher"]);
    assert_eq!(
      last_notice(&mut f.events),
      Some((Level::Success, "Role saved".to_string()))
    );
  }

  #[tokio::test]
  async fn test_failed_mutation_leaves_state() {
    let mut f = fixture();
    f.sync
      .refresh(|| async { Ok(vec![role(1, "Admin")]) })
      .await;

    let result = f.sync.update(|| async { Err(server_error()) }).await;
    assert!(result.is_err());
    assert_eq!(names(&f.sync.snapshot().data), vec!["Admin"]);

    let result = f.sync.delete("1", || async { Err(server_error()) }).await;
    assert!(result.is_err());
    assert_eq!(f.store.get_all::<RolePermission>().await.len(), 1);
    assert_eq!(last_notice(&mut f.events).map(|n| n.0), Some(Level::Error));
  }

  #[tokio::test]
  async fn test_delete_removes_everywhere() {
    let f = fixture();
    f.sync
      .refresh(|| async { Ok(vec![role(1, "Admin"), role(2, "Teacher")]) })
      .await;

    f.sync.delete("1", || async { Ok(()) }).await.unwrap();

    assert_eq!(names(&f.sync.snapshot().data), vec!["Teacher"]);
    assert_eq!(names(&f.store.get_all::<RolePermission>().await), vec!["Teacher"]);
  }

  #[tokio::test]
  async fn test_mutation_offline_is_not_sent() {
    let f = fixture();
    f.connectivity.set_forced_offline(true);

    let calls = AtomicU32::new(0);
    let result = f
      .sync
      .create(|| {
        calls.fetch_add(1, Ordering::SeqCst);
        async { Ok(role(1, "Admin")) }
      })
      .await;

    assert_eq!(result, Err(FetchError::Offline));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
  }

  #[test]
  fn test_capitalize() {
    assert_eq!(capitalize("role"), "Role");
    assert_eq!(capitalize(""), "");
  }
}
