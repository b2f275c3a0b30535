use ratatui::prelude::Color;

use crate::sync::{Level, SyncPhase};

/// Truncate a string to a maximum number of characters, adding "..." if
/// truncated
pub fn truncate(s: &str, max_len: usize) -> String {
  if s.chars().count() <= max_len {
    s.to_string()
  } else {
    let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
    format!("{}...", kept)
  }
}

pub fn phase_color(phase: SyncPhase) -> Color {
  match phase {
    SyncPhase::Live => Color::Green,
    SyncPhase::Degraded => Color::Yellow,
    SyncPhase::Hydrating => Color::DarkGray,
    SyncPhase::SignedOut => Color::Red,
  }
}

pub fn level_color(level: Level) -> Color {
  match level {
    Level::Info => Color::Cyan,
    Level::Success => Color::Green,
    Level::Warning => Color::Yellow,
    Level::Error => Color::Red,
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_truncate_short_string() {
    assert_eq!(truncate("hello", 10), "hello");
  }

  #[test]
  fn test_truncate_exact_length() {
    assert_eq!(truncate("hello", 5), "hello");
  }

  #[test]
  fn test_truncate_long_string() {
    assert_eq!(truncate("hello world", 8), "hello...");
  }

  #[test]
  fn test_truncate_multibyte() {
    assert_eq!(truncate("Département des études", 10), "Départe...");
  }

  #[test]
  fn test_phase_colors() {
    assert_eq!(phase_color(SyncPhase::Live), Color::Green);
    assert_eq!(phase_color(SyncPhase::Degraded), Color::Yellow);
    assert_eq!(level_color(Level::Error), Color::Red);
  }
}
