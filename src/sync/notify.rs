//! User-facing notices produced by the sync layer.

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
  Info,
  Success,
  Warning,
  Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
  pub level: Level,
  pub message: String,
  pub at: DateTime<Utc>,
}

impl Notification {
  pub fn new(level: Level, message: impl Into<String>) -> Self {
    Self {
      level,
      message: message.into(),
      at: Utc::now(),
    }
  }
}

/// Events the sync layer hands to the UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
  Notice(Notification),
  /// The session is gone; show the sign-in screen
  SignInRequired,
}

/// Sending half of the sync event channel.
#[derive(Clone)]
pub struct Notifier {
  tx: mpsc::UnboundedSender<SyncEvent>,
}

impl Notifier {
  pub fn channel() -> (Self, mpsc::UnboundedReceiver<SyncEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Self { tx }, rx)
  }

  fn send(&self, event: SyncEvent) {
    // The UI may already be gone during shutdown
    if self.tx.send(event).is_err() {
      debug!("sync event dropped, no receiver");
    }
  }

  pub fn notify(&self, level: Level, message: impl Into<String>) {
    self.send(SyncEvent::Notice(Notification::new(level, message)));
  }

  pub fn info(&self, message: impl Into<String>) {
    self.notify(Level::Info, message);
  }

  pub fn success(&self, message: impl Into<String>) {
    self.notify(Level::Success, message);
  }

  pub fn warning(&self, message: impl Into<String>) {
    self.notify(Level::Warning, message);
  }

  pub fn error(&self, message: impl Into<String>) {
    self.notify(Level::Error, message);
  }

  pub fn sign_in_required(&self) {
    self.send(SyncEvent::SignInRequired);
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_notices_arrive_in_order() {
    let (notifier, mut rx) = Notifier::channel();
    notifier.info("offline");
    notifier.sign_in_required();

    match rx.try_recv().unwrap() {
      SyncEvent::Notice(n) => {
        assert_eq!(n.level, Level::Info);
        assert_eq!(n.message, "offline");
      }
      other => panic!("unexpected event {:?}", other),
    }
    assert_eq!(rx.try_recv().unwrap(), SyncEvent::SignInRequired);
  }

  #[test]
  fn test_send_without_receiver_is_silent() {
    let (notifier, rx) = Notifier::channel();
    drop(rx);
    notifier.error("nobody listening");
  }
}
