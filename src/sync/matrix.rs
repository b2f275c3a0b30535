//! CRUD grid over the permission catalog for editing one role's grants.

use std::collections::BTreeSet;

use crate::api::Permission;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Action {
  Create,
  Read,
  Update,
  Delete,
}

impl Action {
  pub const ALL: [Action; 4] = [Action::Create, Action::Read, Action::Update, Action::Delete];

  pub fn label(self) -> &'static str {
    match self {
      Action::Create => "Create",
      Action::Read => "Read",
      Action::Update => "Update",
      Action::Delete => "Delete",
    }
  }

  fn index(self) -> usize {
    self as usize
  }

  fn parse(token: &str) -> Option<Action> {
    match token {
      "create" | "add" | "new" => Some(Action::Create),
      "read" | "view" | "list" | "get" | "show" => Some(Action::Read),
      "update" | "edit" | "modify" => Some(Action::Update),
      "delete" | "remove" | "destroy" => Some(Action::Delete),
      _ => None,
    }
  }
}

/// Split a permission key into resource and action.
///
/// Accepts `.`, `:`, `_` and `-` as separators with the action either first
/// (`create_student`) or last (`student.create`).
pub fn parse_key(key: &str) -> Option<(String, Action)> {
  let lowered = key.trim().to_lowercase();
  let tokens: Vec<&str> = lowered
    .split(['.', ':', '_', '-'])
    .filter(|t| !t.is_empty())
    .collect();
  if tokens.len() < 2 {
    return None;
  }

  let (resource, action) = if let Some(action) = Action::parse(tokens[tokens.len() - 1]) {
    (&tokens[..tokens.len() - 1], action)
  } else if let Some(action) = Action::parse(tokens[0]) {
    (&tokens[1..], action)
  } else {
    return None;
  };
  Some((resource.join("_"), action))
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Cell {
  /// Catalog permission behind this cell, if the catalog has one
  pub permission: Option<i64>,
  pub granted: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatrixRow {
  pub resource: String,
  pub cells: [Cell; 4],
}

impl MatrixRow {
  pub fn cell(&self, action: Action) -> &Cell {
    &self.cells[action.index()]
  }

  fn available(&self) -> impl Iterator<Item = &Cell> {
    self.cells.iter().filter(|c| c.permission.is_some())
  }
}

/// A catalog entry that has no cell of its own: its key has no
/// resource/action shape, or an earlier entry already owns that cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OtherPermission {
  pub id: i64,
  pub label: String,
  pub granted: bool,
}

impl OtherPermission {
  fn new(id: i64, permission: &Permission, granted: bool) -> Self {
    let label = if permission.name.is_empty() {
      permission.key.clone()
    } else {
      permission.name.clone()
    };
    Self { id, label, granted }
  }
}

#[derive(Debug, Clone, Default)]
pub struct PermissionMatrix {
  rows: Vec<MatrixRow>,
  other: Vec<OtherPermission>,
  /// Granted ids the catalog does not know about; kept as-is on save
  unknown: BTreeSet<i64>,
  original: BTreeSet<i64>,
}

impl PermissionMatrix {
  pub fn build(catalog: &[Permission], granted: &BTreeSet<i64>) -> Self {
    let mut rows: Vec<MatrixRow> = Vec::new();
    let mut other = Vec::new();
    let mut known = BTreeSet::new();

    for permission in catalog {
      let Some(id) = permission.id else { continue };
      known.insert(id);
      let is_granted = granted.contains(&id);

      match parse_key(&permission.key) {
        Some((resource, action)) => {
          let pos = match rows.iter().position(|r| r.resource == resource) {
            Some(pos) => pos,
            None => {
              rows.push(MatrixRow {
                resource,
                cells: [Cell::default(); 4],
              });
              rows.len() - 1
            }
          };
          let cell = &mut rows[pos].cells[action.index()];
          // First catalog entry owns the cell; later synonyms are listed apart
          if cell.permission.is_none() {
            *cell = Cell {
              permission: Some(id),
              granted: is_granted,
            };
          } else {
            other.push(OtherPermission::new(id, permission, is_granted));
          }
        }
        None => other.push(OtherPermission::new(id, permission, is_granted)),
      }
    }

    rows.sort_by(|a, b| a.resource.cmp(&b.resource));

    Self {
      rows,
      other,
      unknown: granted.difference(&known).copied().collect(),
      original: granted.clone(),
    }
  }

  pub fn rows(&self) -> &[MatrixRow] {
    &self.rows
  }

  pub fn other(&self) -> &[OtherPermission] {
    &self.other
  }

  pub fn is_empty(&self) -> bool {
    self.rows.is_empty() && self.other.is_empty()
  }

  /// Flip one cell. Returns the new state, or `None` when the cell has no
  /// catalog permission.
  pub fn toggle(&mut self, row: usize, action: Action) -> Option<bool> {
    let cell = self.rows.get_mut(row)?.cells.get_mut(action.index())?;
    cell.permission?;
    cell.granted = !cell.granted;
    Some(cell.granted)
  }

  /// Grant every available cell in the row, or revoke them all if they are
  /// already granted.
  pub fn toggle_row(&mut self, row: usize) -> Option<bool> {
    let row = self.rows.get_mut(row)?;
    if row.available().next().is_none() {
      return None;
    }
    let grant = !row.available().all(|c| c.granted);
    for cell in row.cells.iter_mut().filter(|c| c.permission.is_some()) {
      cell.granted = grant;
    }
    Some(grant)
  }

  pub fn toggle_other(&mut self, index: usize) -> Option<bool> {
    let entry = self.other.get_mut(index)?;
    entry.granted = !entry.granted;
    Some(entry.granted)
  }

  /// The granted set after edits.
  pub fn granted(&self) -> BTreeSet<i64> {
    let cells = self
      .rows
      .iter()
      .flat_map(|r| r.cells.iter())
      .filter(|c| c.granted)
      .filter_map(|c| c.permission);
    let other = self.other.iter().filter(|o| o.granted).map(|o| o.id);
    cells.chain(other).chain(self.unknown.iter().copied()).collect()
  }

  pub fn is_dirty(&self) -> bool {
    self.granted() != self.original
  }
}
