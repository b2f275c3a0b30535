use crate::sync::{SyncContext, SyncPhase};
use crate::ui::renderfns::phase_color;
use crate::ui::view::{ShortcutInfo, View, ViewAction};
use chrono::Local;
use crossterm::event::{KeyCode, KeyEvent};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Paragraph, Wrap};
use std::sync::Arc;

/// The signed-in user, as cached
pub struct ProfileView {
  ctx: Arc<SyncContext>,
}

impl ProfileView {
  pub fn new(ctx: Arc<SyncContext>) -> Self {
    Self { ctx }
  }
}

fn field<'a>(label: &'a str, value: String) -> Line<'a> {
  Line::from(vec![
    Span::styled(format!("{:<12}", label), Style::default().fg(Color::DarkGray)),
    Span::raw(value),
  ])
}

impl View for ProfileView {
  fn handle_key(&mut self, key: KeyEvent) -> ViewAction {
    match key.code {
      KeyCode::Char('r') => {
        let ctx = Arc::clone(&self.ctx);
        tokio::spawn(async move { ctx.refresh_session().await });
        ViewAction::None
      }
      KeyCode::Char('q') | KeyCode::Esc => ViewAction::Pop,
      _ => ViewAction::None,
    }
  }

  fn render(&mut self, frame: &mut Frame, area: Rect) {
    let snapshot = self.ctx.session.snapshot();

    let block = Block::default()
      .title(Line::from(vec![
        Span::raw(" Profile "),
        Span::styled(
          format!("[{}] ", snapshot.phase.label()),
          Style::default().fg(phase_color(snapshot.phase)),
        ),
      ]))
      .title_alignment(Alignment::Center)
      .borders(Borders::ALL)
      .border_style(Style::default().fg(Color::Blue));

    let Some(session) = snapshot.data else {
      let message = match snapshot.phase {
        SyncPhase::Hydrating => "Loading profile...",
        SyncPhase::SignedOut => "Signed out. Run :signin to sign in.",
        _ => "No cached profile. Sign in once online.",
      };
      frame.render_widget(
        Paragraph::new(message)
          .block(block)
          .style(Style::default().fg(Color::DarkGray)),
        area,
      );
      return;
    };

    let mut lines = vec![
      field("Name", session.display_name().to_string()),
      field("Email", session.email.clone()),
      field("Sign-in", session.auth_type.clone()),
      field("Id", session.id.clone().unwrap_or_default()),
      field(
        "Synced",
        snapshot
          .synced_at
          .map(|t| t.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string())
          .unwrap_or_else(|| "never".to_string()),
      ),
    ];
    if let Some(error) = &snapshot.last_error {
      lines.push(field("Last error", error.clone()));
    }

    if !session.data.is_null() {
      lines.push(Line::raw(""));
      lines.push(Line::styled("Details", Style::default().fg(Color::Cyan).bold()));
      let pretty = serde_json::to_string_pretty(&session.data).unwrap_or_default();
      lines.extend(pretty.lines().map(|l| Line::raw(l.to_string())));
    }

    frame.render_widget(
      Paragraph::new(lines).block(block).wrap(Wrap { trim: false }),
      area,
    );
  }

  fn breadcrumb_label(&self) -> String {
    "Profile".to_string()
  }

  fn shortcuts(&self) -> Vec<ShortcutInfo> {
    vec![
      ShortcutInfo::new(":", "command").with_priority(10),
      ShortcutInfo::new("r", "refresh").with_priority(20),
      ShortcutInfo::new("q", "back").with_priority(90),
    ]
  }
}
