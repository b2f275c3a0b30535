use crate::api::{FetchError, RolePermission};
use crate::sync::SyncContext;
use crate::ui::components::{Form, FormEvent, FormField, KeyResult};
use crate::ui::view::{ShortcutInfo, View, ViewAction};
use crate::ui::views::{poll_reply, spawn_reply};
use crossterm::event::KeyEvent;
use ratatui::prelude::*;
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::oneshot;

const NAME: &str = "Name";
const KEY: &str = "Key";
const DESCRIPTION: &str = "Description";
const DEFAULT: &str = "Default role";

/// `Senior Teacher` -> `senior_teacher`
fn role_key_from_name(name: &str) -> String {
  name
    .split(|c: char| !c.is_alphanumeric())
    .filter(|part| !part.is_empty())
    .map(str::to_lowercase)
    .collect::<Vec<_>>()
    .join("_")
}

/// Create a role
pub struct RoleFormView {
  ctx: Arc<SyncContext>,
  form: Form,
  pending: Option<oneshot::Receiver<Result<RolePermission, FetchError>>>,
}

impl RoleFormView {
  pub fn new(ctx: Arc<SyncContext>) -> Self {
    Self {
      ctx,
      form: Form::new(vec![
        FormField::text(NAME).required(),
        FormField::text(KEY),
        FormField::text(DESCRIPTION),
        FormField::toggle(DEFAULT),
      ]),
      pending: None,
    }
  }

  fn draft(&self) -> RolePermission {
    let name = self.form.value(NAME).trim().to_string();
    let key = match self.form.value(KEY).trim() {
      "" => role_key_from_name(&name),
      key => key.to_string(),
    };
    let description = self.form.value(DESCRIPTION).trim();

    RolePermission {
      id: None,
      role_name: name,
      role_key: key,
      role_description: (!description.is_empty()).then(|| description.to_string()),
      is_default: self.form.checked(DEFAULT),
      permissions: BTreeSet::new(),
    }
  }

  fn submit(&mut self) {
    if self.pending.is_some() {
      return;
    }
    let role = self.draft();
    let ctx = Arc::clone(&self.ctx);
    self.form.set_error(None);
    self.pending = Some(spawn_reply(async move { ctx.create_role(role).await }));
  }
}

impl View for RoleFormView {
  fn handle_key(&mut self, key: KeyEvent) -> ViewAction {
    match self.form.handle_key(key) {
      KeyResult::Event(FormEvent::Submitted) => {
        self.submit();
        ViewAction::None
      }
      KeyResult::Event(FormEvent::Cancelled) => ViewAction::Pop,
      KeyResult::Handled | KeyResult::NotHandled => ViewAction::None,
    }
  }

  fn render(&mut self, frame: &mut Frame, area: Rect) {
    let title = if self.pending.is_some() {
      "New role (creating…)"
    } else {
      "New role"
    };
    self.form.render(frame, area, title);
  }

  fn breadcrumb_label(&self) -> String {
    "New role".to_string()
  }

  fn tick(&mut self) -> ViewAction {
    match poll_reply(&mut self.pending) {
      Some(Ok(_)) => ViewAction::Pop,
      Some(Err(e)) => {
        self.form.set_error(Some(format!("Could not create role: {}", e)));
        ViewAction::None
      }
      None => ViewAction::None,
    }
  }

  fn captures_input(&self) -> bool {
    true
  }

  fn shortcuts(&self) -> Vec<ShortcutInfo> {
    vec![
      ShortcutInfo::new("tab", "next").with_priority(10),
      ShortcutInfo::new("ctrl-s", "create").with_priority(20),
      ShortcutInfo::new("esc", "cancel").with_priority(30),
    ]
  }
}
