//! Sync engine for the signed-in user.

use chrono::Utc;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

use super::notify::Notifier;
use super::slice::{Slice, SliceState, SyncPhase};
use crate::api::{FetchError, ResourceKey, SessionRecord};
use crate::cache::{CacheStorage, SqliteStorage, StoreHandle};
use crate::fetch::{with_retry, RevalidatePolicy};
use crate::net::Connectivity;

/// Keeps the session slice, the local session table and `auth/me` in step.
///
/// Losing the session with nothing cached means the user is signed out, not
/// offline; waiting for the network does not bring it back.
pub struct SessionSync<S: CacheStorage = SqliteStorage> {
  slice: Slice<Option<SessionRecord>>,
  store: StoreHandle<S>,
  connectivity: Connectivity,
  notifier: Notifier,
  policy: RevalidatePolicy,
  /// Set once the sign-in redirect has been requested for this episode
  redirected: Arc<AtomicBool>,
}

impl<S: CacheStorage> Clone for SessionSync<S> {
  fn clone(&self) -> Self {
    Self {
      slice: self.slice.clone(),
      store: self.store.clone(),
      connectivity: self.connectivity.clone(),
      notifier: self.notifier.clone(),
      policy: self.policy,
      redirected: Arc::clone(&self.redirected),
    }
  }
}

impl<S: CacheStorage + 'static> SessionSync<S> {
  pub fn new(store: StoreHandle<S>, connectivity: Connectivity, notifier: Notifier) -> Self {
    Self {
      slice: Slice::new(None),
      store,
      connectivity,
      notifier,
      policy: RevalidatePolicy::session(),
      redirected: Arc::new(AtomicBool::new(false)),
    }
  }

  pub fn with_policy(mut self, policy: RevalidatePolicy) -> Self {
    self.policy = policy;
    self
  }

  pub fn policy(&self) -> &RevalidatePolicy {
    &self.policy
  }

  pub fn slice(&self) -> &Slice<Option<SessionRecord>> {
    &self.slice
  }

  pub fn snapshot(&self) -> SliceState<Option<SessionRecord>> {
    self.slice.snapshot()
  }

  pub fn current(&self) -> Option<SessionRecord> {
    self.slice.read(|state| state.data.clone())
  }

  async fn cached(&self) -> Option<SessionRecord> {
    self.store.get_all::<SessionRecord>().await.into_iter().next()
  }

  /// Load the cached session into memory. Returns whether one was found.
  pub async fn hydrate(&self) -> bool {
    let cached = self.cached().await;
    let synced_at = self.store.last_fetched(&ResourceKey::CurrentUser).await;
    let found = cached.is_some();

    self.slice.modify(|state| {
      if state.phase == SyncPhase::Hydrating {
        if cached.is_some() {
          state.data = cached;
        }
        state.synced_at = synced_at;
      }
    });
    found
  }

  /// Fetch the current user.
  pub async fn refresh<F, Fut>(&self, fetch: F) -> SyncPhase
  where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<SessionRecord, FetchError>>,
  {
    if self.connectivity.gate(ResourceKey::CurrentUser).is_none() {
      return self.offline().await;
    }

    self.slice.modify(|state| state.is_validating = true);

    match with_retry(&self.policy, "session", fetch).await {
      Ok(session) => {
        self.accept(session).await;
        SyncPhase::Live
      }
      Err(e) => self.fall_back(e).await,
    }
  }

  async fn offline(&self) -> SyncPhase {
    let cached = self.cached().await;
    let has_session = cached.is_some();

    self.slice.modify(|state| {
      if cached.is_some() {
        state.data = cached;
      }
      state.phase = SyncPhase::Degraded;
      state.is_validating = false;
    });

    if has_session {
      self.notifier.info("Offline: showing cached profile");
    } else {
      self
        .notifier
        .info("Offline: signing in needs a connection");
    }
    SyncPhase::Degraded
  }

  async fn fall_back(&self, error: FetchError) -> SyncPhase {
    if let Some(cached) = self.cached().await {
      self.slice.modify(|state| {
        state.data = Some(cached);
        state.phase = SyncPhase::Degraded;
        state.is_validating = false;
        state.last_error = Some(error.to_string());
      });
      self.notifier.warning(format!(
        "Could not verify session ({}); working from cached profile",
        error
      ));
      return SyncPhase::Degraded;
    }

    warn!(error = %error, "no session available, sign-in required");
    self.store.clear::<SessionRecord>().await;
    self.slice.modify(|state| {
      state.data = None;
      state.phase = SyncPhase::SignedOut;
      state.is_validating = false;
      state.last_error = Some(error.to_string());
    });

    if !self.redirected.swap(true, Ordering::SeqCst) {
      self.notifier.sign_in_required();
    }
    SyncPhase::SignedOut
  }

  /// Persist a confirmed session and show it.
  async fn accept(&self, session: SessionRecord) {
    let mut session = session;
    self.store.ensure_key(&mut session);
    let stored = self.store.replace_all(vec![session]).await;
    self
      .store
      .record_fetch(&ResourceKey::CurrentUser, stored.len())
      .await;
    self.redirected.store(false, Ordering::SeqCst);

    let session = stored.into_iter().next();
    if let Some(s) = &session {
      info!(user = %s.email, "session confirmed");
    }

    self.slice.modify(|state| {
      state.data = session;
      state.phase = SyncPhase::Live;
      state.is_validating = false;
      state.synced_at = Some(Utc::now());
      state.last_error = None;
    });
  }

  /// Run a sign-in call and adopt the returned session.
  pub async fn sign_in<F, Fut>(&self, call: F) -> Result<SessionRecord, FetchError>
  where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<SessionRecord, FetchError>>,
  {
    let result = match self.connectivity.gate(()) {
      Some(()) => call().await,
      None => Err(FetchError::Offline),
    };

    match result {
      Ok(session) => {
        self.accept(session).await;
        let session = self.current().unwrap_or_default();
        self
          .notifier
          .success(format!("Signed in as {}", session.display_name()));
        Ok(session)
      }
      Err(e) => {
        self.notifier.error(format!("Sign-in failed: {}", e));
        Err(e)
      }
    }
  }

  /// Forget the session in memory and on disk.
  pub async fn sign_out(&self) {
    self.store.clear::<SessionRecord>().await;
    // An explicit sign-out already shows the sign-in screen
    self.redirected.store(true, Ordering::SeqCst);
    self.slice.modify(|state| {
      state.data = None;
      state.phase = SyncPhase::SignedOut;
      state.is_validating = false;
      state.last_error = None;
    });
    self.notifier.info("Signed out");
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::{IdGenerator, SqliteStorage};
  use crate::sync::notify::SyncEvent;
  use tokio::sync::mpsc::UnboundedReceiver;

  fn fixture() -> (
    SessionSync,
    StoreHandle,
    Connectivity,
    UnboundedReceiver<SyncEvent>,
  ) {
    let store = StoreHandle::new(SqliteStorage::open_in_memory, Arc::new(IdGenerator::new()));
    let connectivity = Connectivity::new(true);
    let (notifier, events) = Notifier::channel();
    let sync = SessionSync::new(store.clone(), connectivity.clone(), notifier).with_policy(
      RevalidatePolicy {
        error_retry_interval_ms: 1,
        ..RevalidatePolicy::session()
      },
    );
    (sync, store, connectivity, events)
  }

  fn ada() -> SessionRecord {
    SessionRecord {
      id: Some("u-1".into()),
      email: "ada@example.edu".into(),
      full_name: "Ada Lovelace".into(),
      auth_type: "password".into(),
      data: serde_json::Value::Null,
    }
  }

  fn redirects(events: &mut UnboundedReceiver<SyncEvent>) -> usize {
    let mut count = 0;
    while let Ok(event) = events.try_recv() {
      if event == SyncEvent::SignInRequired {
        count += 1;
      }
    }
    count
  }

  #[tokio::test]
  async fn test_successful_fetch_persists_session() {
    let (sync, store, _, _events) = fixture();
    let phase = sync.refresh(|| async { Ok(ada()) }).await;

    assert_eq!(phase, SyncPhase::Live);
    assert_eq!(sync.current(), Some(ada()));
    assert_eq!(store.get_all::<SessionRecord>().await, vec![ada()]);
  }

  #[tokio::test]
  async fn test_refetch_overwrites_singleton() {
    let (sync, store, _, _events) = fixture();
    sync.refresh(|| async { Ok(ada()) }).await;

    let other = SessionRecord {
      id: Some("u-2".into()),
      email: "grace@example.edu".into(),
      ..Default::default()
    };
    let next = other.clone();
    sync.refresh(move || {
      let next = next.clone();
      async move { Ok(next) }
    })
    .await;

    assert_eq!(store.get_all::<SessionRecord>().await, vec![other]);
  }

  #[tokio::test]
  async fn test_failure_with_cache_degrades() {
    let (sync, store, _, mut events) = fixture();
    store.upsert(ada()).await;
    assert!(sync.hydrate().await);

    let phase = sync
      .refresh(|| async { Err(FetchError::Transport("refused".into())) })
      .await;

    assert_eq!(phase, SyncPhase::Degraded);
    assert_eq!(sync.current(), Some(ada()));
    assert_eq!(redirects(&mut events), 0);
  }

  #[tokio::test]
  async fn test_failure_without_cache_redirects_once() {
    let (sync, _, _, mut events) = fixture();

    let phase = sync.refresh(|| async { Err(FetchError::Unauthorized) }).await;
    assert_eq!(phase, SyncPhase::SignedOut);
    assert_eq!(sync.current(), None);

    sync.refresh(|| async { Err(FetchError::Unauthorized) }).await;
    assert_eq!(redirects(&mut events), 1);
  }

  #[tokio::test]
  async fn test_sign_in_rearms_redirect() {
    let (sync, _, _, mut events) = fixture();
    sync.refresh(|| async { Err(FetchError::Unauthorized) }).await;

    sync.sign_in(|| async { Ok(ada()) }).await.unwrap();
    assert_eq!(sync.snapshot().phase, SyncPhase::Live);

    sync.sign_out().await;
    sync.refresh(|| async { Err(FetchError::Unauthorized) }).await;
    // sign_out already sent the user to sign in
    assert_eq!(redirects(&mut events), 1);

    sync.sign_in(|| async { Ok(ada()) }).await.unwrap();
    sync.sign_out().await;
    sync.sign_in(|| async { Ok(ada()) }).await.unwrap();
    sync
      .refresh(|| async { Err(FetchError::Status { status: 500, message: "x".into() }) })
      .await;
    // cached session exists again, so no redirect
    assert_eq!(redirects(&mut events), 0);
  }

  #[tokio::test]
  async fn test_offline_keeps_cached_session_without_request() {
    let (sync, store, connectivity, mut events) = fixture();
    store.upsert(ada()).await;
    connectivity.set_reachable(false);

    let called = AtomicBool::new(false);
    let phase = sync
      .refresh(|| {
        called.store(true, Ordering::SeqCst);
        async { Ok(ada()) }
      })
      .await;

    assert!(!called.load(Ordering::SeqCst));
    assert_eq!(phase, SyncPhase::Degraded);
    assert_eq!(sync.current(), Some(ada()));
    assert_eq!(redirects(&mut events), 0);
  }

  #[tokio::test]
  async fn test_sign_out_clears_store() {
    let (sync, store, _, _events) = fixture();
    sync.refresh(|| async { Ok(ada()) }).await;
    sync.sign_out().await;

    assert!(store.get_all::<SessionRecord>().await.is_empty());
    assert_eq!(sync.snapshot().phase, SyncPhase::SignedOut);
  }

  #[tokio::test]
  async fn test_keyless_session_gets_key() {
    let (sync, store, _, _events) = fixture();
    sync
      .refresh(|| async {
        Ok(SessionRecord {
          email: "anon@example.edu".into(),
          ..Default::default()
        })
      })
      .await;

    let stored = store.get_all::<SessionRecord>().await;
    assert_eq!(stored.len(), 1);
    assert!(stored[0].id.is_some());
  }
}
