//! Connectivity monitor.
//!
//! Tracks whether the backend is reachable and whether the user asked to work
//! offline. The effective "online" flag gates every remote fetch.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::info;

/// Inputs the online flag is derived from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkState {
  /// Last reachability observation
  pub reachable: bool,
  /// User chose to work offline
  pub forced_offline: bool,
}

impl LinkState {
  pub fn is_online(&self) -> bool {
    self.reachable && !self.forced_offline
  }
}

/// Shared online/offline signal.
#[derive(Clone)]
pub struct Connectivity {
  tx: Arc<watch::Sender<LinkState>>,
}

impl Connectivity {
  pub fn new(reachable: bool) -> Self {
    let (tx, _rx) = watch::channel(LinkState {
      reachable,
      forced_offline: false,
    });
    Self { tx: Arc::new(tx) }
  }

  pub fn is_online(&self) -> bool {
    self.tx.borrow().is_online()
  }

  pub fn state(&self) -> LinkState {
    *self.tx.borrow()
  }

  pub fn is_forced_offline(&self) -> bool {
    self.tx.borrow().forced_offline
  }

  /// Subscribe to changes of the online flag.
  ///
  /// Subscribers are only woken when the effective flag flips.
  pub fn subscribe(&self) -> watch::Receiver<LinkState> {
    self.tx.subscribe()
  }

  /// Record a reachability observation.
  pub fn set_reachable(&self, reachable: bool) {
    self.update(|state| state.reachable = reachable);
  }

  /// Switch the "work offline" override.
  pub fn set_forced_offline(&self, forced: bool) {
    self.update(|state| state.forced_offline = forced);
  }

  /// Flip the "work offline" override, returning the new value.
  pub fn toggle_forced_offline(&self) -> bool {
    let forced = !self.is_forced_offline();
    self.set_forced_offline(forced);
    forced
  }

  fn update(&self, change: impl FnOnce(&mut LinkState)) {
    self.tx.send_if_modified(|state| {
      let was_online = state.is_online();
      change(state);
      let online = state.is_online();
      if online != was_online {
        info!(online, "connectivity changed");
      }
      online != was_online
    });
  }

  /// Pass `key` through only while online.
  ///
  /// A `None` result means the request must not be issued at all.
  pub fn gate<K>(&self, key: K) -> Option<K> {
    self.is_online().then_some(key)
  }

  /// Run `probe` every `interval` and feed its answer into the monitor.
  pub fn spawn_probe<F, Fut>(&self, interval: Duration, probe: F) -> JoinHandle<()>
  where
    F: Fn() -> Fut + Send + 'static,
    Fut: Future<Output = bool> + Send,
  {
    let monitor = self.clone();
    tokio::spawn(async move {
      let mut ticker = tokio::time::interval(interval);
      ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
      loop {
        ticker.tick().await;
        monitor.set_reachable(probe().await);
      }
    })
  }
}
