use crate::api::{FetchError, Permission, ResourceKey, RolePermission};
use crate::fetch::Resource;
use crate::sync::matrix::{Action, PermissionMatrix};
use crate::sync::SyncContext;
use crate::ui::view::{ShortcutInfo, View, ViewAction};
use crate::ui::views::{poll_reply, spawn_reply};
use crossterm::event::{KeyCode, KeyEvent};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Cell, Paragraph, Row, Table, Wrap};
use std::sync::Arc;
use tokio::sync::oneshot;

/// Where the cursor sits: a matrix cell or an entry of the "other" list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Cursor {
  Cell(usize, Action),
  Other(usize),
}

/// Whether the matrix inputs differ from the ones it was built from.
fn needs_rebuild(
  built_from: Option<&(RolePermission, Vec<Permission>)>,
  role: &RolePermission,
  catalog: &[Permission],
) -> bool {
  match built_from {
    Some((built_role, built_catalog)) => built_role != role || built_catalog.as_slice() != catalog,
    None => true,
  }
}

/// One role's grants as a resource × CRUD matrix
pub struct RoleDetailView {
  ctx: Arc<SyncContext>,
  id: i64,
  resource: Resource<RolePermission>,
  matrix: PermissionMatrix,
  /// Role and catalog the matrix was last built from
  built_from: Option<(RolePermission, Vec<Permission>)>,
  row: usize,
  col: usize,
  pending_save: Option<oneshot::Receiver<Result<RolePermission, FetchError>>>,
}

impl RoleDetailView {
  pub fn new(ctx: Arc<SyncContext>, id: i64) -> Self {
    let key = ctx
      .connectivity()
      .gate(ResourceKey::RolePermission { id }.path());
    let fetch_ctx = Arc::clone(&ctx);
    let mut resource = Resource::new(key, move |_key| {
      let ctx = Arc::clone(&fetch_ctx);
      async move { ctx.refresh_role(id).await }
    })
    .with_policy(*ctx.roles.policy());
    resource.fetch();

    Self {
      ctx,
      id,
      resource,
      matrix: PermissionMatrix::default(),
      built_from: None,
      row: 0,
      col: 0,
      pending_save: None,
    }
  }

  /// The roles slice copy (single fetches and saves are merged into it),
  /// else whatever the resource fetched.
  fn role(&self) -> Option<RolePermission> {
    self
      .ctx
      .roles
      .slice()
      .read(|state| state.data.iter().find(|r| r.id == Some(self.id)).cloned())
      .or_else(|| self.resource.data().cloned())
  }

  fn catalog(&self) -> Vec<Permission> {
    self.ctx.permissions.slice().read(|state| state.data.clone())
  }

  /// Rebuild the matrix when its inputs changed, unless there are unsaved
  /// edits.
  fn sync_matrix(&mut self) {
    let Some(role) = self.role() else { return };
    let catalog = self.catalog();
    if !needs_rebuild(self.built_from.as_ref(), &role, &catalog) || self.matrix.is_dirty() {
      return;
    }
    self.matrix = PermissionMatrix::build(&catalog, &role.permissions);
    self.built_from = Some((role, catalog));
    self.clamp_cursor();
  }

  fn line_count(&self) -> usize {
    self.matrix.rows().len() + self.matrix.other().len()
  }

  fn cursor(&self) -> Option<Cursor> {
    let rows = self.matrix.rows().len();
    if self.row < rows {
      Some(Cursor::Cell(self.row, Action::ALL[self.col]))
    } else if self.row < self.line_count() {
      Some(Cursor::Other(self.row - rows))
    } else {
      None
    }
  }

  fn clamp_cursor(&mut self) {
    self.row = self.row.min(self.line_count().saturating_sub(1));
    self.col = self.col.min(Action::ALL.len() - 1);
  }

  fn toggle(&mut self) {
    match self.cursor() {
      Some(Cursor::Cell(row, action)) => {
        self.matrix.toggle(row, action);
      }
      Some(Cursor::Other(idx)) => {
        self.matrix.toggle_other(idx);
      }
      None => {}
    }
  }

  fn toggle_row(&mut self) {
    if let Some(Cursor::Cell(row, _)) = self.cursor() {
      self.matrix.toggle_row(row);
    }
  }

  fn save(&mut self) {
    if self.pending_save.is_some() || !self.matrix.is_dirty() {
      return;
    }
    let Some(mut role) = self.role() else { return };
    role.permissions = self.matrix.granted();
    let ctx = Arc::clone(&self.ctx);
    self.pending_save = Some(spawn_reply(async move { ctx.update_role(role).await }));
  }

  fn render_summary(&self, frame: &mut Frame, area: Rect, role: &RolePermission) {
    let mut lines = vec![Line::from(vec![
      Span::styled("Name: ", Style::default().fg(Color::DarkGray)),
      Span::styled(role.role_name.clone(), Style::default().bold()),
      Span::styled("   Key: ", Style::default().fg(Color::DarkGray)),
      Span::styled(role.role_key.clone(), Style::default().fg(Color::Yellow)),
      Span::styled(
        if role.is_default { "   default" } else { "" },
        Style::default().fg(Color::Green),
      ),
    ])];
    if let Some(description) = &role.role_description {
      lines.push(Line::raw(description.clone()));
    }

    let status = if self.pending_save.is_some() {
      Span::styled("Saving…", Style::default().fg(Color::Yellow))
    } else if self.matrix.is_dirty() {
      Span::styled("Unsaved changes, press 's' to save", Style::default().fg(Color::Yellow))
    } else if let Some(error) = self.resource.error() {
      Span::styled(format!("Showing cached copy ({})", error), Style::default().fg(Color::DarkGray))
    } else if let Some(age) = self.resource.age() {
      Span::styled(
        format!("Fetched {}s ago", age.as_secs()),
        Style::default().fg(Color::DarkGray),
      )
    } else {
      Span::raw("")
    };
    lines.push(Line::from(status));

    frame.render_widget(Paragraph::new(lines).wrap(Wrap { trim: true }), area);
  }

  fn render_matrix(&self, frame: &mut Frame, area: Rect) {
    let cursor = self.cursor();
    let header = Row::new(
      std::iter::once(Cell::from("Resource"))
        .chain(Action::ALL.iter().map(|a| Cell::from(a.label()))),
    )
    .style(Style::default().fg(Color::Cyan).bold());

    let mut rows: Vec<Row> = self
      .matrix
      .rows()
      .iter()
      .enumerate()
      .map(|(i, row)| {
        let cells = Action::ALL.iter().map(|&action| {
          let cell = row.cell(action);
          let text = match (cell.permission, cell.granted) {
            (None, _) => "  -",
            (Some(_), true) => "[x]",
            (Some(_), false) => "[ ]",
          };
          let mut style = if cell.granted {
            Style::default().fg(Color::Green)
          } else {
            Style::default().fg(Color::DarkGray)
          };
          if cursor == Some(Cursor::Cell(i, action)) {
            style = style.bg(Color::DarkGray).fg(Color::White).bold();
          }
          Cell::from(text).style(style)
        });
        Row::new(std::iter::once(Cell::from(row.resource.clone())).chain(cells))
      })
      .collect();

    for (i, other) in self.matrix.other().iter().enumerate() {
      let mut style = if other.granted {
        Style::default().fg(Color::Green)
      } else {
        Style::default().fg(Color::DarkGray)
      };
      if cursor == Some(Cursor::Other(i)) {
        style = style.bg(Color::DarkGray).fg(Color::White).bold();
      }
      let mark = if other.granted { "[x]" } else { "[ ]" };
      rows.push(Row::new(vec![
        Cell::from(other.label.clone()),
        Cell::from(mark).style(style),
      ]));
    }

    let table = Table::new(
      rows,
      [
        Constraint::Min(20),
        Constraint::Length(8),
        Constraint::Length(8),
        Constraint::Length(8),
        Constraint::Length(8),
      ],
    )
    .header(header)
    .block(
      Block::default()
        .borders(Borders::TOP)
        .title(" Permissions ")
        .border_style(Style::default().fg(Color::DarkGray)),
    );

    frame.render_widget(table, area);
  }
}

impl View for RoleDetailView {
  fn handle_key(&mut self, key: KeyEvent) -> ViewAction {
    match key.code {
      KeyCode::Char('j') | KeyCode::Down => {
        self.row = (self.row + 1).min(self.line_count().saturating_sub(1));
      }
      KeyCode::Char('k') | KeyCode::Up => self.row = self.row.saturating_sub(1),
      KeyCode::Char('l') | KeyCode::Right => self.col = (self.col + 1).min(Action::ALL.len() - 1),
      KeyCode::Char('h') | KeyCode::Left => self.col = self.col.saturating_sub(1),
      KeyCode::Char(' ') | KeyCode::Enter => self.toggle(),
      KeyCode::Char('a') => self.toggle_row(),
      KeyCode::Char('s') => self.save(),
      KeyCode::Char('r') => self.resource.refetch(),
      KeyCode::Char('q') | KeyCode::Esc => return ViewAction::Pop,
      _ => {}
    }
    ViewAction::None
  }

  fn render(&mut self, frame: &mut Frame, area: Rect) {
    let title = match self.role() {
      Some(role) => format!(" Role {} ", role.role_name),
      None => format!(" Role #{} ", self.id),
    };
    let title = if self.resource.is_validating() {
      format!("{}(refreshing…) ", title)
    } else {
      title
    };

    let block = Block::default()
      .title(title)
      .title_alignment(Alignment::Center)
      .borders(Borders::ALL)
      .border_style(Style::default().fg(Color::Blue));
    let inner = block.inner(area);
    frame.render_widget(block, area);

    let Some(role) = self.role() else {
      let message = match self.resource.error() {
        Some(error) => format!("Role not available: {}\n\nPress 'r' to retry.", error),
        None => "Loading role...".to_string(),
      };
      frame.render_widget(
        Paragraph::new(message).style(Style::default().fg(Color::DarkGray)),
        inner,
      );
      return;
    };

    let [summary, matrix] =
      Layout::vertical([Constraint::Length(4), Constraint::Min(1)]).areas(inner);
    self.render_summary(frame, summary, &role);

    if self.matrix.is_empty() {
      frame.render_widget(
        Paragraph::new("The permission catalog is empty. Run :permissions to load it.")
          .style(Style::default().fg(Color::DarkGray)),
        matrix,
      );
    } else {
      self.render_matrix(frame, matrix);
    }
  }

  fn breadcrumb_label(&self) -> String {
    self
      .role()
      .map(|r| r.role_name)
      .unwrap_or_else(|| format!("#{}", self.id))
  }

  fn tick(&mut self) -> ViewAction {
    // Follow connectivity: pause while offline, refetch once back
    let key = self
      .ctx
      .connectivity()
      .gate(ResourceKey::RolePermission { id: self.id }.path());
    self.resource.set_key(key);
    self.resource.poll();

    if let Some(Ok(saved)) = poll_reply(&mut self.pending_save) {
      let catalog = self.catalog();
      self.matrix = PermissionMatrix::build(&catalog, &saved.permissions);
      self.built_from = Some((saved, catalog));
    }

    self.sync_matrix();
    ViewAction::None
  }

  fn on_focus(&mut self) {
    self.resource.on_focus();
  }

  fn shortcuts(&self) -> Vec<ShortcutInfo> {
    vec![
      ShortcutInfo::new("space", "toggle").with_priority(10),
      ShortcutInfo::new("a", "row").with_priority(20),
      ShortcutInfo::new("s", "save").with_priority(30),
      ShortcutInfo::new("r", "refresh").with_priority(40),
      ShortcutInfo::new("q", "back").with_priority(90),
    ]
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn perm(id: i64, key: &str) -> Permission {
    Permission {
      id: Some(id),
      key: key.to_string(),
      ..Default::default()
    }
  }

  #[test]
  fn test_rekeyed_catalog_triggers_rebuild() {
    let role = RolePermission {
      id: Some(1),
      ..Default::default()
    };
    let catalog = vec![perm(1, "student.read"), perm(2, "student.create")];
    let built = (role.clone(), catalog.clone());

    assert!(needs_rebuild(None, &role, &catalog));
    assert!(!needs_rebuild(Some(&built), &role, &catalog));

    let rekeyed = vec![perm(1, "course.read"), perm(2, "student.create")];
    assert!(needs_rebuild(Some(&built), &role, &rekeyed));
  }
}
