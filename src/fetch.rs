//! Keyed async fetching with revalidation policy.
//!
//! Inspired by SWR: a `Resource<T>` pairs a request key with a fetcher. A
//! `None` key pauses the resource, so no request is made while offline. State
//! follows the `{data, is_loading, error, is_validating}` shape, and an error
//! never wipes data that is already on screen.
//!
//! # Example
//!
//! ```ignore
//! let key = connectivity.gate(ResourceKey::RolePermission { id }.path());
//! let mut role = Resource::new(key, move |_key| {
//!     let client = client.clone();
//!     async move { client.role_permission(id).await }
//! });
//!
//! role.fetch();
//!
//! // In event loop tick
//! if role.poll() {
//!     // State changed, trigger re-render
//! }
//! ```

use serde::Deserialize;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::api::FetchError;

/// When a resource revalidates and how hard it retries.
///
/// Entity families differ on purpose, so every call site states its policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RevalidatePolicy {
  /// Refetch when the terminal regains focus
  #[serde(default)]
  pub on_focus: bool,
  /// Refetch when connectivity comes back
  #[serde(default)]
  pub on_reconnect: bool,
  /// Extra attempts after a retryable failure
  #[serde(default)]
  pub error_retry_count: u32,
  /// Pause between attempts, in milliseconds
  #[serde(default = "default_retry_interval_ms")]
  pub error_retry_interval_ms: u64,
}

fn default_retry_interval_ms() -> u64 {
  2_000
}

impl RevalidatePolicy {
  /// Session fetch: follow focus and reconnects, retry a few times.
  pub fn session() -> Self {
    Self {
      on_focus: true,
      on_reconnect: true,
      error_retry_count: 3,
      error_retry_interval_ms: default_retry_interval_ms(),
    }
  }

  /// List fetches: only fetch when asked to.
  pub fn manual() -> Self {
    Self {
      on_focus: false,
      on_reconnect: false,
      error_retry_count: 0,
      error_retry_interval_ms: default_retry_interval_ms(),
    }
  }

  pub fn retry_interval(&self) -> Duration {
    Duration::from_millis(self.error_retry_interval_ms)
  }
}

/// Run `attempt`, retrying retryable failures up to the policy's limit.
pub async fn with_retry<T, F, Fut>(
  policy: &RevalidatePolicy,
  label: &str,
  mut attempt: F,
) -> Result<T, FetchError>
where
  F: FnMut() -> Fut,
  Fut: Future<Output = Result<T, FetchError>>,
{
  let mut retries_left = policy.error_retry_count;
  loop {
    match attempt().await {
      Ok(value) => return Ok(value),
      Err(e) if e.is_retryable() && retries_left > 0 => {
        retries_left -= 1;
        debug!(label, error = %e, retries_left, "fetch failed, retrying");
        tokio::time::sleep(policy.retry_interval()).await;
      }
      Err(e) => {
        warn!(label, error = %e, "fetch failed");
        return Err(e);
      }
    }
  }
}

/// Observable state of a resource.
#[derive(Debug, Clone)]
pub struct FetchState<T> {
  /// Last successfully fetched value, kept across errors
  pub data: Option<T>,
  /// Last error, cleared by the next success
  pub error: Option<String>,
  /// A request is in flight
  pub is_validating: bool,
}

impl<T> Default for FetchState<T> {
  fn default() -> Self {
    Self {
      data: None,
      error: None,
      is_validating: false,
    }
  }
}

impl<T> FetchState<T> {
  /// In flight with nothing to show yet.
  pub fn is_loading(&self) -> bool {
    self.is_validating && self.data.is_none()
  }
}

/// A boxed future that returns a fetch result
type BoxFuture<T> = Pin<Box<dyn Future<Output = Result<T, FetchError>> + Send>>;

/// A factory function that creates futures for a given key
type FetcherFn<T> = Arc<dyn Fn(String) -> BoxFuture<T> + Send + Sync>;

/// Keyed async resource with SWR-style state.
///
/// Results travel through a channel owned by the resource. Dropping the
/// resource drops the receiver, so a response that lands afterwards is
/// discarded rather than applied.
pub struct Resource<T> {
  key: Option<String>,
  state: FetchState<T>,
  fetcher: FetcherFn<T>,
  policy: RevalidatePolicy,
  receiver: Option<mpsc::UnboundedReceiver<Result<T, FetchError>>>,
  fetched_at: Option<Instant>,
}

impl<T: Send + 'static> Resource<T> {
  /// Create a resource for `key`. A `None` key keeps it paused.
  pub fn new<F, Fut>(key: Option<String>, fetcher: F) -> Self
  where
    F: Fn(String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, FetchError>> + Send + 'static,
  {
    Self {
      key,
      state: FetchState::default(),
      fetcher: Arc::new(move |key| Box::pin(fetcher(key))),
      policy: RevalidatePolicy::manual(),
      receiver: None,
      fetched_at: None,
    }
  }

  pub fn with_policy(mut self, policy: RevalidatePolicy) -> Self {
    self.policy = policy;
    self
  }

  pub fn key(&self) -> Option<&str> {
    self.key.as_deref()
  }

  pub fn state(&self) -> &FetchState<T> {
    &self.state
  }

  pub fn data(&self) -> Option<&T> {
    self.state.data.as_ref()
  }

  pub fn error(&self) -> Option<&str> {
    self.state.error.as_deref()
  }

  pub fn is_loading(&self) -> bool {
    self.state.is_loading()
  }

  pub fn is_validating(&self) -> bool {
    self.state.is_validating
  }

  /// Time since the last successful fetch.
  pub fn age(&self) -> Option<Duration> {
    self.fetched_at.map(|t| t.elapsed())
  }

  /// Change the key. Pausing (`None`) abandons any request in flight but
  /// keeps the data; a new `Some` key starts a fetch.
  pub fn set_key(&mut self, key: Option<String>) {
    if key == self.key {
      return;
    }
    self.key = key;
    if self.key.is_some() {
      self.refetch();
    } else {
      self.receiver = None;
      self.state.is_validating = false;
    }
  }

  /// Start fetching unless paused or already in flight.
  pub fn fetch(&mut self) {
    if self.state.is_validating {
      return;
    }
    self.start_fetch();
  }

  /// Fetch again, abandoning any request in flight.
  pub fn refetch(&mut self) {
    self.receiver = None;
    self.state.is_validating = false;
    self.start_fetch();
  }

  /// Revalidate after the terminal regained focus, if the policy asks for it.
  pub fn on_focus(&mut self) {
    if self.policy.on_focus {
      self.fetch();
    }
  }

  /// Poll for results from a pending fetch.
  ///
  /// Returns `true` if the state changed. Call this in the event loop tick.
  pub fn poll(&mut self) -> bool {
    let receiver = match &mut self.receiver {
      Some(rx) => rx,
      None => return false,
    };

    match receiver.try_recv() {
      Ok(Ok(data)) => {
        self.state.data = Some(data);
        self.state.error = None;
        self.state.is_validating = false;
        self.fetched_at = Some(Instant::now());
        self.receiver = None;
        true
      }
      Ok(Err(error)) => {
        self.state.error = Some(error.to_string());
        self.state.is_validating = false;
        self.receiver = None;
        true
      }
      Err(mpsc::error::TryRecvError::Empty) => false,
      Err(mpsc::error::TryRecvError::Disconnected) => {
        self.state.error = Some("request was cancelled".to_string());
        self.state.is_validating = false;
        self.receiver = None;
        true
      }
    }
  }

  fn start_fetch(&mut self) {
    let Some(key) = self.key.clone() else {
      debug!("resource paused, not fetching");
      return;
    };

    let (tx, rx) = mpsc::unbounded_channel();
    self.receiver = Some(rx);
    self.state.is_validating = true;

    let fetcher = Arc::clone(&self.fetcher);
    let policy = self.policy;
    tokio::spawn(async move {
      let result = with_retry(&policy, &key, || fetcher(key.clone())).await;
      // Ignore send errors - receiver may have been dropped
      let _ = tx.send(result);
    });
  }
}

impl<T: std::fmt::Debug> std::fmt::Debug for Resource<T> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Resource")
      .field("key", &self.key)
      .field("state", &self.state)
      .field("policy", &self.policy)
      .finish_non_exhaustive()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::atomic::{AtomicU32, Ordering};

  fn fast_retries(count: u32) -> RevalidatePolicy {
    RevalidatePolicy {
      error_retry_count: count,
      error_retry_interval_ms: 1,
      ..RevalidatePolicy::manual()
    }
  }

  async fn settle<T: Send + 'static>(resource: &mut Resource<T>) {
    for _ in 0..100 {
      if resource.poll() {
        return;
      }
      tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("resource never settled");
  }

  #[tokio::test]
  async fn test_paused_resource_never_calls_fetcher() {
    let calls = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&calls);
    let mut resource = Resource::new(None, move |_key| {
      counter.fetch_add(1, Ordering::SeqCst);
      async { Ok::<_, FetchError>(1) }
    });

    resource.fetch();
    resource.refetch();
    resource.on_focus();
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert!(!resource.poll());
    assert!(!resource.is_validating());
    assert_eq!(calls.load(Ordering::SeqCst), 0);
  }

  #[tokio::test]
  async fn test_fetch_success() {
    let mut resource = Resource::new(Some("roles".into()), |key| async move {
      Ok::<_, FetchError>(format!("fetched {}", key))
    });

    resource.fetch();
    assert!(resource.is_loading());

    settle(&mut resource).await;
    assert_eq!(resource.data().map(String::as_str), Some("fetched roles"));
    assert!(!resource.is_validating());
    assert!(resource.age().is_some());
  }

  #[tokio::test]
  async fn test_error_keeps_previous_data() {
    let calls = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&calls);
    let mut resource = Resource::new(Some("roles".into()), move |_key| {
      let call = counter.fetch_add(1, Ordering::SeqCst);
      async move {
        if call == 0 {
          Ok(vec![1, 2])
        } else {
          Err(FetchError::Status {
            status: 404,
            message: "gone".into(),
          })
        }
      }
    });

    resource.fetch();
    settle(&mut resource).await;
    resource.refetch();
    assert!(resource.is_validating());
    assert!(!resource.is_loading());
    settle(&mut resource).await;

    assert_eq!(resource.data(), Some(&vec![1, 2]));
    assert!(resource.error().unwrap().contains("gone"));
  }

  #[tokio::test]
  async fn test_set_key_none_pauses_and_keeps_data() {
    let mut resource = Resource::new(Some("me".into()), |_key| async { Ok::<_, FetchError>(5) });
    resource.fetch();
    settle(&mut resource).await;

    resource.set_key(None);
    assert_eq!(resource.data(), Some(&5));
    resource.fetch();
    assert!(!resource.is_validating());
  }

  #[tokio::test]
  async fn test_focus_respects_policy() {
    let mut manual = Resource::new(Some("roles".into()), |_key| async { Ok::<_, FetchError>(1) });
    manual.on_focus();
    assert!(!manual.is_validating());

    let mut session = Resource::new(Some("me".into()), |_key| async { Ok::<_, FetchError>(1) })
      .with_policy(RevalidatePolicy::session());
    session.on_focus();
    assert!(session.is_validating());
  }

  #[tokio::test]
  async fn test_retry_is_bounded() {
    let calls = AtomicU32::new(0);
    let result: Result<(), _> = with_retry(&fast_retries(3), "flaky", || {
      calls.fetch_add(1, Ordering::SeqCst);
      async { Err(FetchError::Transport("reset".into())) }
    })
    .await;

    assert!(result.is_err());
    assert_eq!(calls.load(Ordering::SeqCst), 4);
  }

  #[tokio::test]
  async fn test_retry_skips_non_retryable() {
    let calls = AtomicU32::new(0);
    let result: Result<(), _> = with_retry(&fast_retries(3), "auth", || {
      calls.fetch_add(1, Ordering::SeqCst);
      async { Err(FetchError::Unauthorized) }
    })
    .await;

    assert_eq!(result, Err(FetchError::Unauthorized));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn test_retry_recovers() {
    let calls = AtomicU32::new(0);
    let result = with_retry(&fast_retries(2), "flaky", || {
      let call = calls.fetch_add(1, Ordering::SeqCst);
      async move {
        if call < 2 {
          Err(FetchError::Transport("reset".into()))
        } else {
          Ok(call)
        }
      }
    })
    .await;

    assert_eq!(result, Ok(2));
  }

  #[test]
  fn test_policy_from_yaml() {
    let policy: RevalidatePolicy =
      serde_yaml::from_str("on_reconnect: true\nerror_retry_count: 2").unwrap();
    assert!(policy.on_reconnect);
    assert!(!policy.on_focus);
    assert_eq!(policy.error_retry_count, 2);
    assert_eq!(policy.retry_interval(), Duration::from_secs(2));
  }
}
