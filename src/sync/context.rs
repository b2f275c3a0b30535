use futures::future::join_all;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::collection::CollectionSync;
use super::notify::Notifier;
use super::session::SessionSync;
use crate::api::{ApiClient, FetchError, Permission, ResourceKey, RolePermission, SessionRecord};
use crate::cache::StoreHandle;
use crate::config::RevalidateConfig;
use crate::fetch::RevalidatePolicy;
use crate::net::{Connectivity, LinkState};

/// The sync engines for every family, bound to the REST client.
pub struct SyncContext {
  pub session: SessionSync,
  pub roles: CollectionSync<RolePermission>,
  pub permissions: CollectionSync<Permission>,
  client: ApiClient,
  connectivity: Connectivity,
}

impl SyncContext {
  pub fn new(
    client: ApiClient,
    store: StoreHandle,
    connectivity: Connectivity,
    notifier: Notifier,
    policies: &RevalidateConfig,
  ) -> Arc<Self> {
    let session = SessionSync::new(store.clone(), connectivity.clone(), notifier.clone())
      .with_policy(policies.session);
    let roles = CollectionSync::new(
      store.clone(),
      connectivity.clone(),
      notifier.clone(),
      ResourceKey::RolePermissions,
      "role",
    )
    .with_policy(policies.role_permissions);
    let permissions = CollectionSync::new(
      store,
      connectivity.clone(),
      notifier,
      ResourceKey::Permissions,
      "permission",
    )
    .with_policy(policies.permissions);

    Arc::new(Self {
      session,
      roles,
      permissions,
      client,
      connectivity,
    })
  }

  pub fn connectivity(&self) -> &Connectivity {
    &self.connectivity
  }

  pub fn client(&self) -> &ApiClient {
    &self.client
  }

  /// Read every family's local snapshot.
  pub async fn hydrate_all(&self) {
    let (has_session, roles, permissions) = tokio::join!(
      self.session.hydrate(),
      self.roles.hydrate(),
      self.permissions.hydrate()
    );
    info!(has_session, roles, permissions, "hydrated from local store");
  }

  pub async fn refresh_session(&self) {
    let client = &self.client;
    self.session.refresh(|| client.current_user()).await;
  }

  pub async fn refresh_roles(&self) {
    let client = &self.client;
    self.roles.refresh(|| client.role_permissions()).await;
  }

  pub async fn refresh_permissions(&self) {
    let client = &self.client;
    self.permissions.refresh(|| client.permissions()).await;
  }

  pub async fn refresh_all(&self) {
    tokio::join!(
      self.refresh_session(),
      self.refresh_roles(),
      self.refresh_permissions()
    );
  }

  pub async fn refresh_role(&self, id: i64) -> Result<RolePermission, FetchError> {
    let client = &self.client;
    self
      .roles
      .refresh_one(&id.to_string(), || client.role_permission(id))
      .await
  }

  pub async fn create_role(&self, role: RolePermission) -> Result<RolePermission, FetchError> {
    let client = &self.client;
    self
      .roles
      .create(|| async move { client.create_role_permission(&role).await })
      .await
  }

  pub async fn update_role(&self, role: RolePermission) -> Result<RolePermission, FetchError> {
    let Some(id) = role.id else {
      return Err(FetchError::Decode("role has no id".into()));
    };
    let client = &self.client;
    self
      .roles
      .update(|| async move { client.update_role_permission(id, &role).await })
      .await
  }

  pub async fn delete_role(&self, id: i64) -> Result<(), FetchError> {
    let client = &self.client;
    self
      .roles
      .delete(&id.to_string(), || client.delete_role_permission(id))
      .await
  }

  pub async fn sign_in(&self, email: &str, password: &str) -> Result<SessionRecord, FetchError> {
    let client = &self.client;
    let session = self.session.sign_in(|| client.login(email, password)).await?;
    // Lists fetched while signed out were rejected; try again with the token
    tokio::join!(self.refresh_roles(), self.refresh_permissions());
    Ok(session)
  }

  pub async fn sign_out(&self) {
    self.client.set_token(None);
    self.session.sign_out().await;
  }

  /// Hydrate, then refresh everything in the background.
  pub fn start(self: &Arc<Self>) -> JoinHandle<()> {
    info!(
      api = %self.client.base_url(),
      has_token = self.client.has_token(),
      online = self.connectivity.is_online(),
      "starting sync"
    );
    let ctx = Arc::clone(self);
    tokio::spawn(async move {
      ctx.hydrate_all().await;
      ctx.refresh_all().await;
    })
  }

  /// Refresh the families that follow terminal focus.
  pub fn on_focus(self: &Arc<Self>) {
    let ctx = Arc::clone(self);
    tokio::spawn(async move {
      let families = ctx.families_where(|p| p.on_focus);
      ctx.refresh_families(&families).await;
    });
  }

  /// Refresh the families that follow connectivity whenever the link comes
  /// back up.
  pub fn spawn_reconnect_watcher(self: &Arc<Self>) -> JoinHandle<()> {
    let ctx = Arc::clone(self);
    let rx = self.connectivity.subscribe();
    on_reconnect(rx, move || {
      let ctx = Arc::clone(&ctx);
      async move {
        let families = ctx.families_where(|p| p.on_reconnect);
        ctx.refresh_families(&families).await;
      }
    })
  }

  fn families_where(&self, wants: impl Fn(&RevalidatePolicy) -> bool) -> Vec<Family> {
    [
      (Family::Session, self.session.policy()),
      (Family::Roles, self.roles.policy()),
      (Family::Permissions, self.permissions.policy()),
    ]
    .into_iter()
    .filter(|(_, policy)| wants(policy))
    .map(|(family, _)| family)
    .collect()
  }

  async fn refresh_families(&self, families: &[Family]) {
    if families.is_empty() {
      return;
    }
    debug!(?families, "revalidating");
    join_all(families.iter().map(|family| async move {
      match family {
        Family::Session => self.refresh_session().await,
        Family::Roles => self.refresh_roles().await,
        Family::Permissions => self.refresh_permissions().await,
      }
    }))
    .await;
  }
}

#[cfg(test)]
impl SyncContext {
  /// Context over an in-memory store and a client pointed at a closed port.
  pub(crate) fn for_tests(
    online: bool,
  ) -> (
    Arc<Self>,
    StoreHandle,
    tokio::sync::mpsc::UnboundedReceiver<super::SyncEvent>,
  ) {
    use crate::cache::{IdGenerator, SqliteStorage};
    use crate::config::ApiConfig;

    let ids = Arc::new(IdGenerator::new());
    let store = StoreHandle::new(SqliteStorage::open_in_memory, Arc::clone(&ids));
    let config = ApiConfig {
      base_url: "http://127.0.0.1:9/api".into(),
      timeout_secs: 1,
      probe_path: String::new(),
    };
    let client = ApiClient::new(&config, None, ids).unwrap();
    let (notifier, events) = Notifier::channel();
    let ctx = Self::new(
      client,
      store.clone(),
      Connectivity::new(online),
      notifier,
      &RevalidateConfig::default(),
    );
    (ctx, store, events)
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Family {
  Session,
  Roles,
  Permissions,
}

/// Run `handler` on every offline -> online transition.
fn on_reconnect<F, Fut>(mut rx: watch::Receiver<LinkState>, handler: F) -> JoinHandle<()>
where
  F: Fn() -> Fut + Send + 'static,
  Fut: Future<Output = ()> + Send + 'static,
{
  tokio::spawn(async move {
    let mut was_online = rx.borrow_and_update().is_online();
    while rx.changed().await.is_ok() {
      let online = rx.borrow_and_update().is_online();
      if online && !was_online {
        info!("connectivity restored, revalidating");
        handler().await;
      }
      was_online = online;
    }
  })
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::sync::slice::SyncPhase;
  use std::sync::atomic::{AtomicUsize, Ordering};
  use std::time::Duration;

  fn role(id: i64, name: &str) -> RolePermission {
    RolePermission {
      id: Some(id),
      role_name: name.to_string(),
      ..Default::default()
    }
  }

  #[tokio::test]
  async fn test_offline_start_shows_cached_roles() {
    let (ctx, store, _events) = SyncContext::for_tests(false);
    store.upsert(role(1, "Admin")).await;
    store.upsert(role(2, "Teacher")).await;

    ctx.start().await.unwrap();

    let roles = ctx.roles.snapshot();
    assert_eq!(roles.phase, SyncPhase::Degraded);
    assert_eq!(roles.data.len(), 2);
    assert_eq!(ctx.session.snapshot().phase, SyncPhase::Degraded);
  }

  #[tokio::test]
  async fn test_offline_mutation_is_rejected() {
    let (ctx, store, _events) = SyncContext::for_tests(false);
    store.upsert(role(1, "Admin")).await;

    let result = ctx.delete_role(1).await;
    assert_eq!(result, Err(FetchError::Offline));
    assert!(store.get::<RolePermission>("1").await.is_some());
  }

  #[tokio::test]
  async fn test_update_without_id_is_rejected() {
    let (ctx, _store, _events) = SyncContext::for_tests(false);
    assert!(ctx.update_role(RolePermission::default()).await.is_err());
  }

  #[tokio::test]
  async fn test_offline_single_fetch_uses_cache() {
    let (ctx, store, _events) = SyncContext::for_tests(false);
    store.upsert(role(4, "Clerk")).await;

    assert_eq!(ctx.refresh_role(4).await, Ok(role(4, "Clerk")));
    assert_eq!(ctx.refresh_role(5).await, Err(FetchError::Offline));
  }

  #[tokio::test]
  async fn test_default_policies_pick_session_only() {
    let (ctx, _store, _events) = SyncContext::for_tests(true);
    assert_eq!(ctx.families_where(|p| p.on_focus), vec![Family::Session]);
    assert_eq!(ctx.families_where(|p| p.on_reconnect), vec![Family::Session]);
  }

  #[tokio::test]
  async fn test_reconnect_handler_fires_on_transition_only() {
    let connectivity = Connectivity::new(false);
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let _watcher = on_reconnect(connectivity.subscribe(), move || {
      let counter = Arc::clone(&counter);
      async move {
        counter.fetch_add(1, Ordering::SeqCst);
      }
    });

    connectivity.set_forced_offline(true);
    connectivity.set_reachable(true);
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    connectivity.set_forced_offline(false);
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    connectivity.set_reachable(false);
    tokio::time::sleep(Duration::from_millis(20)).await;
    connectivity.set_reachable(true);
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 2);
  }
}
