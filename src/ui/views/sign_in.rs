use crate::api::{FetchError, SessionRecord};
use crate::sync::SyncContext;
use crate::ui::components::{Form, FormEvent, FormField, KeyResult};
use crate::ui::view::{ShortcutInfo, View, ViewAction};
use crate::ui::views::{poll_reply, spawn_reply};
use crossterm::event::KeyEvent;
use ratatui::prelude::*;
use std::sync::Arc;
use tokio::sync::oneshot;

const EMAIL: &str = "Email";
const PASSWORD: &str = "Password";

/// Email/password sign-in
pub struct SignInView {
  ctx: Arc<SyncContext>,
  form: Form,
  pending: Option<oneshot::Receiver<Result<SessionRecord, FetchError>>>,
}

impl SignInView {
  pub fn new(ctx: Arc<SyncContext>) -> Self {
    Self {
      ctx,
      form: Form::new(vec![
        FormField::text(EMAIL).required(),
        FormField::secret(PASSWORD).required(),
      ]),
      pending: None,
    }
  }
}

impl View for SignInView {
  fn handle_key(&mut self, key: KeyEvent) -> ViewAction {
    match self.form.handle_key(key) {
      KeyResult::Event(FormEvent::Submitted) if self.pending.is_none() => {
        let ctx = Arc::clone(&self.ctx);
        let email = self.form.value(EMAIL).trim().to_string();
        let password = self.form.value(PASSWORD).to_string();
        self.form.set_error(None);
        self.pending = Some(spawn_reply(async move {
          ctx.sign_in(&email, &password).await
        }));
        ViewAction::None
      }
      // Browsing cached data stays possible while signed out
      KeyResult::Event(FormEvent::Cancelled) => ViewAction::Pop,
      _ => ViewAction::None,
    }
  }

  fn render(&mut self, frame: &mut Frame, area: Rect) {
    let title = if self.pending.is_some() {
      "Sign in (checking…)"
    } else {
      "Sign in"
    };
    self.form.render(frame, area, title);
  }

  fn breadcrumb_label(&self) -> String {
    "Sign in".to_string()
  }

  fn tick(&mut self) -> ViewAction {
    match poll_reply(&mut self.pending) {
      Some(Ok(_)) => ViewAction::Pop,
      Some(Err(e)) => {
        self.form.set_error(Some(format!("Sign-in failed: {}", e)));
        ViewAction::None
      }
      None => ViewAction::None,
    }
  }

  fn captures_input(&self) -> bool {
    true
  }

  fn is_sign_in(&self) -> bool {
    true
  }

  fn shortcuts(&self) -> Vec<ShortcutInfo> {
    vec![
      ShortcutInfo::new("enter", "sign in").with_priority(10),
      ShortcutInfo::new("esc", "browse offline").with_priority(20),
    ]
  }
}
