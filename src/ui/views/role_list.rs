use crate::api::RolePermission;
use crate::sync::{SyncContext, SyncPhase};
use crate::ui::components::SearchInput;
use crate::ui::ensure_valid_selection;
use crate::ui::renderfns::{phase_color, truncate};
use crate::ui::view::{ShortcutInfo, View, ViewAction};
use crate::ui::views::{ConfirmDeleteView, RoleDetailView, RoleFormView};
use crossterm::event::{KeyCode, KeyEvent};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, List, ListItem, ListState, Paragraph};
use std::sync::Arc;

/// Roles with their grant counts
pub struct RoleListView {
  ctx: Arc<SyncContext>,
  list_state: ListState,
  search: SearchInput,
}

impl RoleListView {
  pub fn new(ctx: Arc<SyncContext>) -> Self {
    Self {
      ctx,
      list_state: ListState::default(),
      search: SearchInput::new(),
    }
  }

  fn visible(&self) -> Vec<RolePermission> {
    self.ctx.roles.slice().read(|state| {
      state
        .data
        .iter()
        .filter(|r| {
          self.search.matches(&[
            r.role_name.as_str(),
            r.role_key.as_str(),
            r.role_description.as_deref().unwrap_or(""),
          ])
        })
        .cloned()
        .collect()
    })
  }

  fn selected(&self) -> Option<RolePermission> {
    let idx = self.list_state.selected()?;
    self.visible().into_iter().nth(idx)
  }

  fn render_list(&mut self, frame: &mut Frame, area: Rect) {
    let snapshot = self.ctx.roles.snapshot();
    let roles = self.visible();
    ensure_valid_selection(&mut self.list_state, roles.len());

    let mut title = vec![
      Span::raw(format!(" Roles ({}) ", roles.len())),
      Span::styled(
        format!("[{}] ", snapshot.phase.label()),
        Style::default().fg(phase_color(snapshot.phase)),
      ),
    ];
    if snapshot.is_validating {
      title.push(Span::styled("syncing… ", Style::default().fg(Color::DarkGray)));
    }
    if !self.search.query().is_empty() {
      title.push(Span::styled(
        format!("/{} ", self.search.query()),
        Style::default().fg(Color::Yellow),
      ));
    }

    let block = Block::default()
      .title(Line::from(title))
      .title_alignment(Alignment::Center)
      .borders(Borders::ALL)
      .border_style(Style::default().fg(Color::Blue));

    if roles.is_empty() {
      let content = if snapshot.phase == SyncPhase::Hydrating || snapshot.is_validating {
        "Loading roles...".to_string()
      } else if let Some(error) = &snapshot.last_error {
        format!("No cached roles ({}). Press 'r' to retry.", error)
      } else {
        "No roles found.".to_string()
      };
      let paragraph = Paragraph::new(content)
        .block(block)
        .style(Style::default().fg(Color::DarkGray));
      frame.render_widget(paragraph, area);
      return;
    }

    let name_width = (area.width as usize / 3).max(12);
    let items: Vec<ListItem> = roles
      .iter()
      .map(|role| {
        let mut spans = vec![
          Span::styled(
            format!("{:<8}", role.id.map(|id| id.to_string()).unwrap_or_default()),
            Style::default().fg(Color::Cyan),
          ),
          Span::raw(format!(
            "{:<width$}",
            truncate(&role.role_name, name_width),
            width = name_width + 1
          )),
          Span::styled(
            format!("{:<20}", truncate(&role.role_key, 19)),
            Style::default().fg(Color::Yellow),
          ),
          Span::styled(
            format!("{:>3} permissions", role.permissions.len()),
            Style::default().fg(Color::DarkGray),
          ),
        ];
        if role.is_default {
          spans.push(Span::styled("  default", Style::default().fg(Color::Green)));
        }
        ListItem::new(Line::from(spans))
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

  // Key handling helpers for or_else chain pattern
  fn handle_overlays(&mut self, key: KeyEvent) -> Option<ViewAction> {
    if !self.search.handle_key(key).is_consumed() {
      return None;
    }
    self.list_state.select(Some(0));
    Some(ViewAction::None)
  }

  fn handle_navigation(&mut self, key: KeyEvent) -> Option<ViewAction> {
    match key.code {
      KeyCode::Char('j') | KeyCode::Down => {
        self.list_state.select_next();
        Some(ViewAction::None)
      }
      KeyCode::Char('k') | KeyCode::Up => {
        self.list_state.select_previous();
        Some(ViewAction::None)
      }
      _ => None,
    }
  }

  fn handle_actions(&mut self, key: KeyEvent) -> Option<ViewAction> {
    match key.code {
      KeyCode::Char('r') => {
        let ctx = Arc::clone(&self.ctx);
        tokio::spawn(async move { ctx.refresh_roles().await });
        Some(ViewAction::None)
      }
      KeyCode::Char('n') => Some(ViewAction::Push(Box::new(RoleFormView::new(Arc::clone(
        &self.ctx,
      ))))),
      KeyCode::Enter => {
        let role = self.selected()?;
        let id = role.id?;
        Some(ViewAction::Push(Box::new(RoleDetailView::new(
          Arc::clone(&self.ctx),
          id,
        ))))
      }
      KeyCode::Char('d') => {
        let role = self.selected()?;
        let id = role.id?;
        Some(ViewAction::Push(Box::new(ConfirmDeleteView::new(
          Arc::clone(&self.ctx),
          id,
          role.role_name,
        ))))
      }
      KeyCode::Char('q') | KeyCode::Esc => Some(ViewAction::Pop),
      _ => None,
    }
  }
}

impl View for RoleListView {
  fn handle_key(&mut self, key: KeyEvent) -> ViewAction {
    self
      .handle_overlays(key)
      .or_else(|| self.handle_navigation(key))
      .or_else(|| self.handle_actions(key))
      .unwrap_or(ViewAction::None)
  }

  fn render(&mut self, frame: &mut Frame, area: Rect) {
    self.render_list(frame, area);
    self.search.render_overlay(frame, area);
  }

  fn breadcrumb_label(&self) -> String {
    "Roles".to_string()
  }

  fn captures_input(&self) -> bool {
    self.search.is_active()
  }

  fn shortcuts(&self) -> Vec<ShortcutInfo> {
    vec![
      ShortcutInfo::new(":", "command").with_priority(10),
      ShortcutInfo::new("/", "search").with_priority(20),
      ShortcutInfo::new("enter", "open").with_priority(30),
      ShortcutInfo::new("n", "new").with_priority(40),
      ShortcutInfo::new("d", "delete").with_priority(50),
      ShortcutInfo::new("r", "refresh").with_priority(60),
    ]
  }
}
