use crate::api::FetchError;
use crate::sync::SyncContext;
use crate::ui::view::{ShortcutInfo, View, ViewAction};
use crate::ui::views::{poll_reply, spawn_reply};
use crossterm::event::{KeyCode, KeyEvent};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Paragraph, Wrap};
use std::sync::Arc;
use tokio::sync::oneshot;

/// Asks before deleting a role
pub struct ConfirmDeleteView {
  ctx: Arc<SyncContext>,
  id: i64,
  name: String,
  pending: Option<oneshot::Receiver<Result<(), FetchError>>>,
}

impl ConfirmDeleteView {
  pub fn new(ctx: Arc<SyncContext>, id: i64, name: String) -> Self {
    Self {
      ctx,
      id,
      name,
      pending: None,
    }
  }
}

impl View for ConfirmDeleteView {
  fn handle_key(&mut self, key: KeyEvent) -> ViewAction {
    if self.pending.is_some() {
      return ViewAction::None;
    }
    match key.code {
      KeyCode::Char('y') | KeyCode::Char('Y') => {
        let ctx = Arc::clone(&self.ctx);
        let id = self.id;
        self.pending = Some(spawn_reply(async move { ctx.delete_role(id).await }));
        ViewAction::None
      }
      KeyCode::Char('n') | KeyCode::Char('q') | KeyCode::Esc => ViewAction::Pop,
      _ => ViewAction::None,
    }
  }

  fn render(&mut self, frame: &mut Frame, area: Rect) {
    let width = area.width.min(60);
    let dialog = Rect::new(
      area.x + (area.width - width) / 2,
      area.y + area.height / 3,
      width,
      5.min(area.height),
    );

    let block = Block::default()
      .title(" Delete role ")
      .title_alignment(Alignment::Center)
      .borders(Borders::ALL)
      .border_style(Style::default().fg(Color::Red));

    let text = if self.pending.is_some() {
      Line::styled("Deleting…", Style::default().fg(Color::Yellow))
    } else {
      Line::from(vec![
        Span::raw("Delete "),
        Span::styled(self.name.clone(), Style::default().bold()),
        Span::raw("? "),
        Span::styled("[y/n]", Style::default().fg(Color::Cyan)),
      ])
    };

    frame.render_widget(
      Paragraph::new(text)
        .alignment(Alignment::Center)
        .wrap(Wrap { trim: true })
        .block(block),
      dialog.intersection(area),
    );
  }

  fn breadcrumb_label(&self) -> String {
    format!("Delete {}", self.name)
  }

  fn tick(&mut self) -> ViewAction {
    // The sync layer reports the outcome; either way we are done here
    match poll_reply(&mut self.pending) {
      Some(_) => ViewAction::Pop,
      None => ViewAction::None,
    }
  }

  fn shortcuts(&self) -> Vec<ShortcutInfo> {
    vec![
      ShortcutInfo::new("y", "delete").with_priority(10),
      ShortcutInfo::new("n", "cancel").with_priority(20),
    ]
  }
}
