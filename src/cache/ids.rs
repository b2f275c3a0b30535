//! Local identity synthesis for records the server returned without a key.

use std::sync::atomic::{AtomicI64, Ordering};

use chrono::Utc;

/// Hands out millisecond-timestamp ids that never repeat within a process.
///
/// Ids track wall-clock time while calls are spread out, and step forward by
/// one when several are requested inside the same millisecond, so a batch of
/// keyless items never collapses onto one key.
#[derive(Debug, Default)]
pub struct IdGenerator {
  last: AtomicI64,
}

impl IdGenerator {
  pub fn new() -> Self {
    Self::default()
  }

  /// Next id, strictly greater than every id handed out before.
  pub fn next_id(&self) -> i64 {
    let now = Utc::now().timestamp_millis();
    let mut prev = self.last.load(Ordering::Relaxed);
    loop {
      let candidate = now.max(prev + 1);
      match self
        .last
        .compare_exchange_weak(prev, candidate, Ordering::AcqRel, Ordering::Relaxed)
      {
        Ok(_) => return candidate,
        Err(actual) => prev = actual,
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::collections::HashSet;
  use std::sync::Arc;

  #[test]
  fn test_batch_ids_are_unique() {
    let ids = IdGenerator::new();
    let batch: Vec<i64> = (0..1000).map(|_| ids.next_id()).collect();
    let unique: HashSet<_> = batch.iter().collect();
    assert_eq!(unique.len(), batch.len());
  }

  #[test]
  fn test_ids_are_increasing() {
    let ids = IdGenerator::new();
    let a = ids.next_id();
    let b = ids.next_id();
    assert!(b > a);
  }

  #[test]
  fn test_ids_follow_wall_clock() {
    let ids = IdGenerator::new();
    let before = Utc::now().timestamp_millis();
    assert!(ids.next_id() >= before);
  }

  #[test]
  fn test_unique_across_threads() {
    let ids = Arc::new(IdGenerator::new());
    let handles: Vec<_> = (0..4)
      .map(|_| {
        let ids = Arc::clone(&ids);
        std::thread::spawn(move || (0..250).map(|_| ids.next_id()).collect::<Vec<_>>())
      })
      .collect();

    let mut all = HashSet::new();
    for handle in handles {
      for id in handle.join().unwrap() {
        assert!(all.insert(id));
      }
    }
    assert_eq!(all.len(), 1000);
  }
}
