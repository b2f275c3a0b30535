use crate::api::Permission;
use crate::sync::matrix::parse_key;
use crate::sync::{SyncContext, SyncPhase};
use crate::ui::components::SearchInput;
use crate::ui::ensure_valid_selection;
use crate::ui::renderfns::{phase_color, truncate};
use crate::ui::view::{ShortcutInfo, View, ViewAction};
use crossterm::event::{KeyCode, KeyEvent};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, List, ListItem, ListState, Paragraph};
use std::sync::Arc;

/// The permission catalog
pub struct PermissionListView {
  ctx: Arc<SyncContext>,
  list_state: ListState,
  search: SearchInput,
}

impl PermissionListView {
  pub fn new(ctx: Arc<SyncContext>) -> Self {
    Self {
      ctx,
      list_state: ListState::default(),
      search: SearchInput::new(),
    }
  }

  fn visible(&self) -> Vec<Permission> {
    self.ctx.permissions.slice().read(|state| {
      state
        .data
        .iter()
        .filter(|p| {
          self.search.matches(&[
            p.key.as_str(),
            p.name.as_str(),
            p.description.as_deref().unwrap_or(""),
          ])
        })
        .cloned()
        .collect()
    })
  }

  fn render_list(&mut self, frame: &mut Frame, area: Rect) {
    let snapshot = self.ctx.permissions.snapshot();
    let permissions = self.visible();
    ensure_valid_selection(&mut self.list_state, permissions.len());

    let title = Line::from(vec![
      Span::raw(format!(" Permissions ({}) ", permissions.len())),
      Span::styled(
        format!("[{}] ", snapshot.phase.label()),
        Style::default().fg(phase_color(snapshot.phase)),
      ),
    ]);
    let block = Block::default()
      .title(title)
      .title_alignment(Alignment::Center)
      .borders(Borders::ALL)
      .border_style(Style::default().fg(Color::Blue));

    if permissions.is_empty() {
      let content = match (&snapshot.last_error, snapshot.phase) {
        (_, SyncPhase::Hydrating) => "Loading permissions...".to_string(),
        (Some(error), _) => format!("No cached permissions ({}). Press 'r' to retry.", error),
        (None, _) => "No permissions found.".to_string(),
      };
      frame.render_widget(
        Paragraph::new(content)
          .block(block)
          .style(Style::default().fg(Color::DarkGray)),
        area,
      );
      return;
    }

    let items: Vec<ListItem> = permissions
      .iter()
      .map(|p| {
        // Keys outside the CRUD scheme are flagged so they are easy to spot
        let key_style = if parse_key(&p.key).is_some() {
          Style::default().fg(Color::Yellow)
        } else {
          Style::default().fg(Color::Magenta)
        };
        ListItem::new(Line::from(vec![
          Span::styled(
            format!("{:<6}", p.id.map(|id| id.to_string()).unwrap_or_default()),
            Style::default().fg(Color::Cyan),
          ),
          Span::styled(format!("{:<28}", truncate(&p.key, 27)), key_style),
          Span::raw(format!("{:<28}", truncate(&p.name, 27))),
          Span::styled(
            p.description.clone().unwrap_or_default(),
            Style::default().fg(Color::DarkGray),
          ),
        ]))
      })
      .collect();

    let list = List::new(items)
      .block(block)
      .highlight_style(
        Style::default()
          .bg(Color::DarkGray)
          .add_modifier(Modifier::BOLD),
      )
      .highlight_symbol("> ");

    frame.render_stateful_widget(list, area, &mut self.list_state);
  }
}

impl View for PermissionListView {
  fn handle_key(&mut self, key: KeyEvent) -> ViewAction {
    if self.search.handle_key(key).is_consumed() {
      self.list_state.select(Some(0));
      return ViewAction::None;
    }

    match key.code {
      KeyCode::Char('j') | KeyCode::Down => self.list_state.select_next(),
      KeyCode::Char('k') | KeyCode::Up => self.list_state.select_previous(),
      KeyCode::Char('r') => {
        let ctx = Arc::clone(&self.ctx);
        tokio::spawn(async move { ctx.refresh_permissions().await });
      }
      KeyCode::Char('q') | KeyCode::Esc => return ViewAction::Pop,
      _ => {}
    }
    ViewAction::None
  }

  fn render(&mut self, frame: &mut Frame, area: Rect) {
    self.render_list(frame, area);
    self.search.render_overlay(frame, area);
  }

  fn breadcrumb_label(&self) -> String {
    "Permissions".to_string()
  }

  fn captures_input(&self) -> bool {
    self.search.is_active()
  }

  fn shortcuts(&self) -> Vec<ShortcutInfo> {
    vec![
      ShortcutInfo::new(":", "command").with_priority(10),
      ShortcutInfo::new("/", "search").with_priority(20),
      ShortcutInfo::new("r", "refresh").with_priority(30),
    ]
  }
}
