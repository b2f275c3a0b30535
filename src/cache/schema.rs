//! Versioned schema for the local store.
//!
//! The version lives in `PRAGMA user_version`. Migrations are additive only:
//! each one creates tables or indexes that did not exist before and never
//! rewrites existing rows.

use color_eyre::{eyre::eyre, Result};
use rusqlite::Connection;
use tracing::{debug, info, warn};

/// One additive schema step.
#[derive(Debug, Clone, Copy)]
pub struct Migration {
  pub version: i32,
  pub description: &'static str,
  pub sql: &'static str,
}

/// All known migrations, in ascending version order.
pub const MIGRATIONS: &[Migration] = &[
  Migration {
    version: 1,
    description: "session and role permission tables",
    sql: r#"
CREATE TABLE IF NOT EXISTS session (
    record_key TEXT PRIMARY KEY,
    data BLOB NOT NULL,
    cached_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS role_permissions (
    record_key TEXT PRIMARY KEY,
    data BLOB NOT NULL,
    cached_at TEXT NOT NULL DEFAULT (datetime('now'))
);
"#,
  },
  Migration {
    version: 2,
    description: "permission catalog table",
    sql: r#"
CREATE TABLE IF NOT EXISTS permissions (
    record_key TEXT PRIMARY KEY,
    data BLOB NOT NULL,
    cached_at TEXT NOT NULL DEFAULT (datetime('now'))
);
"#,
  },
  Migration {
    version: 3,
    description: "fetch bookkeeping",
    sql: r#"
CREATE TABLE IF NOT EXISTS fetch_meta (
    query_hash TEXT PRIMARY KEY,
    query_description TEXT NOT NULL,
    fetched_at TEXT NOT NULL DEFAULT (datetime('now')),
    result_count INTEGER NOT NULL
);
"#,
  },
];

/// Read the schema version stored in the database.
pub fn current_version(conn: &Connection) -> Result<i32> {
  conn
    .query_row("PRAGMA user_version", [], |row| row.get(0))
    .map_err(|e| eyre!("Failed to read schema version: {}", e))
}

/// Apply every migration newer than the stored version.
///
/// Returns the version the database ends up at. A database written by a newer
/// build is left untouched.
pub fn migrate(conn: &mut Connection, migrations: &[Migration]) -> Result<i32> {
  let mut version = current_version(conn)?;
  let target = migrations.last().map(|m| m.version).unwrap_or(version);

  if version > target {
    warn!(
      stored = version,
      known = target,
      "local store was created by a newer schema, skipping migrations"
    );
    return Ok(version);
  }

  let from = version;
  for migration in migrations.iter().filter(|m| m.version > from) {
    debug!(version = migration.version, "applying {}", migration.description);

    let tx = conn
      .transaction()
      .map_err(|e| eyre!("Failed to begin migration transaction: {}", e))?;
    tx.execute_batch(migration.sql)
      .map_err(|e| eyre!("Failed to apply migration {}: {}", migration.version, e))?;
    // PRAGMA does not accept bound parameters
    tx.execute_batch(&format!("PRAGMA user_version = {}", migration.version))
      .map_err(|e| eyre!("Failed to record schema version: {}", e))?;
    tx.commit()
      .map_err(|e| eyre!("Failed to commit migration {}: {}", migration.version, e))?;

    version = migration.version;
  }

  info!(version, "local store schema ready");
  Ok(version)
}

#[cfg(test)]
mod tests {
  use super::*;

  fn latest_version() -> i32 {
    MIGRATIONS.last().map(|m| m.version).unwrap_or(0)
  }

  fn table_exists(conn: &Connection, name: &str) -> bool {
    conn
      .query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?",
        [name],
        |row| row.get::<_, i64>(0),
      )
      .unwrap()
      > 0
  }

  #[test]
  fn test_fresh_database_gets_all_tables() {
    let mut conn = Connection::open_in_memory().unwrap();
    let version = migrate(&mut conn, MIGRATIONS).unwrap();

    assert_eq!(version, latest_version());
    for table in ["session", "role_permissions", "permissions", "fetch_meta"] {
      assert!(table_exists(&conn, table), "missing table {}", table);
    }
  }

  #[test]
  fn test_migrate_is_idempotent() {
    let mut conn = Connection::open_in_memory().unwrap();
    migrate(&mut conn, MIGRATIONS).unwrap();
    let version = migrate(&mut conn, MIGRATIONS).unwrap();
    assert_eq!(version, latest_version());
  }

  #[test]
  fn test_upgrade_keeps_existing_rows() {
    let mut conn = Connection::open_in_memory().unwrap();
    assert_eq!(migrate(&mut conn, &MIGRATIONS[..1]).unwrap(), 1);
    assert!(!table_exists(&conn, "permissions"));

    conn
      .execute(
        "INSERT INTO role_permissions (record_key, data) VALUES ('7', x'7b7d')",
        [],
      )
      .unwrap();

    assert_eq!(migrate(&mut conn, MIGRATIONS).unwrap(), latest_version());
    assert!(table_exists(&conn, "permissions"));

    let count: i64 = conn
      .query_row("SELECT COUNT(*) FROM role_permissions", [], |row| row.get(0))
      .unwrap();
    assert_eq!(count, 1);
  }

  #[test]
  fn test_newer_database_is_left_alone() {
    let mut conn = Connection::open_in_memory().unwrap();
    conn.execute_batch("PRAGMA user_version = 99").unwrap();
    assert_eq!(migrate(&mut conn, MIGRATIONS).unwrap(), 99);
    assert!(!table_exists(&conn, "session"));
  }
}
