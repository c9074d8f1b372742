//! Process-local cache of "does column X exist on table T".
//!
//! Holds schema facts only, never row data. Concurrent fills may race; the
//! probe is deterministic so the last writer stores the same answer.

use std::collections::HashMap;
use std::sync::RwLock;

use rusqlite::Connection;
use tracing::warn;

use crate::Database;

#[derive(Debug, Default)]
pub struct SchemaCatalog {
    columns: RwLock<HashMap<(String, String), bool>>,
}

impl SchemaCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached answer, if this `(table, column)` was probed before.
    pub fn cached(&self, table: &str, column: &str) -> Option<bool> {
        let map = self.columns.read().ok()?;
        map.get(&(table.to_string(), column.to_string())).copied()
    }

    /// Answers from the cache, probing the live schema on a miss. Probe
    /// failures read as "absent" and are not cached.
    pub fn has_column(&self, conn: &Connection, table: &str, column: &str) -> bool {
        if let Some(hit) = self.cached(table, column) {
            return hit;
        }

        if !is_identifier(table) || !is_identifier(column) {
            warn!("Refusing to probe invalid identifier {}.{}", table, column);
            return false;
        }

        match probe_column(conn, table, column) {
            Ok(exists) => {
                if let Ok(mut map) = self.columns.write() {
                    map.insert((table.to_string(), column.to_string()), exists);
                }
                exists
            }
            Err(e) => {
                warn!("Column probe {}.{} failed, treating as absent: {}", table, column, e);
                false
            }
        }
    }

    pub fn invalidate_table(&self, table: &str) {
        if let Ok(mut map) = self.columns.write() {
            map.retain(|(t, _), _| t != table);
        }
    }
}

impl Database {
    pub fn has_column(&self, table: &str, column: &str) -> bool {
        if let Some(hit) = self.catalog().cached(table, column) {
            return hit;
        }
        match self.lock() {
            Ok(conn) => self.catalog().has_column(&conn, table, column),
            Err(e) => {
                warn!("Column probe {}.{} skipped: {}", table, column, e);
                false
            }
        }
    }

    /// Index lookups are not cached; they only run during evolution.
    pub fn has_index(&self, table: &str, index: &str) -> bool {
        let probed = self
            .lock()
            .and_then(|conn| probe_index(&conn, table, index).map_err(Into::into));
        match probed {
            Ok(exists) => exists,
            Err(e) => {
                warn!("Index probe {} on {} failed, treating as absent: {}", index, table, e);
                false
            }
        }
    }
}

pub fn probe_column(conn: &Connection, table: &str, column: &str) -> rusqlite::Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM pragma_table_info(?1) WHERE name = ?2",
        [table, column],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

pub fn probe_index(conn: &Connection, table: &str, index: &str) -> rusqlite::Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'index' AND tbl_name = ?1 AND name = ?2",
        [table, index],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

/// Plain SQL identifier: ASCII letter or underscore, then letters, digits or
/// underscores. Anything else is never interpolated into DDL.
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
