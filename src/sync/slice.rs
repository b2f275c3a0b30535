//! Per-family in-memory state.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::watch;

/// Where a family's displayed data currently comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
  /// Reading the local snapshot
  Hydrating,
  /// Showing data from a successful remote fetch
  Live,
  /// Offline or the last fetch failed; showing the local snapshot
  Degraded,
  /// No session and none cached; sign-in required
  SignedOut,
}

impl SyncPhase {
  pub fn label(self) -> &'static str {
    match self {
      SyncPhase::Hydrating => "loading",
      SyncPhase::Live => "live",
      SyncPhase::Degraded => "cached",
      SyncPhase::SignedOut => "signed out",
    }
  }
}

/// Snapshot of one entity family.
#[derive(Debug, Clone)]
pub struct SliceState<T> {
  pub data: T,
  pub phase: SyncPhase,
  /// A remote fetch is in flight
  pub is_validating: bool,
  /// Last successful remote fetch, possibly from a previous run
  pub synced_at: Option<DateTime<Utc>>,
  pub last_error: Option<String>,
}

/// Shared, observable state for one entity family.
///
/// Reads are open to everyone; writes go through the owning sync engine.
pub struct Slice<T> {
  tx: Arc<watch::Sender<SliceState<T>>>,
}

impl<T> Clone for Slice<T> {
  fn clone(&self) -> Self {
    Self {
      tx: Arc::clone(&self.tx),
    }
  }
}

impl<T: Clone> Slice<T> {
  pub fn new(data: T) -> Self {
    let (tx, _rx) = watch::channel(SliceState {
      data,
      phase: SyncPhase::Hydrating,
      is_validating: false,
      synced_at: None,
      last_error: None,
    });
    Self { tx: Arc::new(tx) }
  }

  /// Clone of the current state.
  pub fn snapshot(&self) -> SliceState<T> {
    self.tx.borrow().clone()
  }

  /// Read the current state without cloning it.
  pub fn read<R>(&self, f: impl FnOnce(&SliceState<T>) -> R) -> R {
    f(&self.tx.borrow())
  }

  pub(super) fn modify(&self, f: impl FnOnce(&mut SliceState<T>)) {
    self.tx.send_modify(f);
  }
}
