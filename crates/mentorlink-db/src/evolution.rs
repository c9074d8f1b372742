//! Migrate-on-first-use for optional columns and indexes.
//!
//! Every step is idempotent: DDL only runs when the catalog reports the
//! object missing. Failures are logged and reported as `false`; they never
//! fail the business operation that triggered them.

use tracing::{info, warn};

use crate::Database;
use crate::catalog::{is_identifier, probe_index};

pub struct OptionalColumn {
    pub table: &'static str,
    pub column: &'static str,
    pub definition: &'static str,
}

pub struct OptionalIndex {
    pub table: &'static str,
    pub name: &'static str,
    pub definition: &'static str,
}

pub const OPTIONAL_COLUMNS: &[OptionalColumn] = &[
    OptionalColumn { table: "users", column: "phone", definition: "TEXT" },
    OptionalColumn { table: "users", column: "location", definition: "TEXT" },
    OptionalColumn { table: "users", column: "skills", definition: "TEXT" },
    OptionalColumn { table: "users", column: "interests", definition: "TEXT" },
    OptionalColumn { table: "blogs", column: "approved_at", definition: "TEXT" },
    OptionalColumn { table: "blogs", column: "approved_by", definition: "INTEGER" },
    OptionalColumn { table: "messages", column: "sender_role", definition: "TEXT" },
];

/// Pair index the mentorship throttle's recency lookup runs on.
pub const PAIR_INDEX: OptionalIndex = OptionalIndex {
    table: "mentorship_requests",
    name: "idx_mentorship_requests_pair",
    definition: "(student_id, mentor_id, created_at)",
};

impl Database {
    /// Make sure `table.column` exists, adding it with `definition` if not.
    /// Returns whether the column exists afterwards.
    pub fn ensure_column(&self, table: &str, column: &str, definition: &str) -> bool {
        if self.has_column(table, column) {
            return true;
        }
        if !is_identifier(table) || !is_identifier(column) {
            warn!("Refusing to add column with invalid name {}.{}", table, column);
            return false;
        }

        let ddl = format!("ALTER TABLE {} ADD COLUMN {} {}", table, column, definition);
        let applied = self
            .lock()
            .and_then(|conn| conn.execute_batch(&ddl).map_err(Into::into));

        match applied {
            Ok(()) => {
                self.record_schema_change();
                info!("Added column {}.{}", table, column);
            }
            // Another process may have won the race; the re-check decides.
            Err(e) => warn!("Could not add column {}.{}: {}", table, column, e),
        }

        self.catalog().invalidate_table(table);
        self.has_column(table, column)
    }

    /// Make sure index `name` exists on `table`, creating it from
    /// `definition` (the parenthesized column list) if not.
    pub fn ensure_index(&self, table: &str, name: &str, definition: &str) -> bool {
        if self.has_index(table, name) {
            return true;
        }
        if !is_identifier(table) || !is_identifier(name) {
            warn!("Refusing to create index with invalid name {} on {}", name, table);
            return false;
        }

        let ddl = format!("CREATE INDEX IF NOT EXISTS {} ON {} {}", name, table, definition);
        let applied = self.lock().and_then(|conn| {
            let existed = probe_index(&conn, table, name)?;
            conn.execute_batch(&ddl)?;
            Ok((existed, probe_index(&conn, table, name)?))
        });

        match applied {
            Ok((existed, exists)) => {
                // Only count the index if this handle is the one that made it.
                if exists && !existed {
                    self.record_schema_change();
                    info!("Created index {} on {}", name, table);
                }
                self.catalog().invalidate_table(table);
                exists
            }
            Err(e) => {
                warn!("Could not create index {} on {}: {}", name, table, e);
                false
            }
        }
    }

    /// One pass over every optional column and index. Called once per handle
    /// from [`Database::columns`].
    pub(crate) fn evolve_schema(&self) {
        let mut missing = Vec::new();
        for col in OPTIONAL_COLUMNS {
            if !self.ensure_column(col.table, col.column, col.definition) {
                missing.push(format!("{}.{}", col.table, col.column));
            }
        }
        if !self.ensure_index(PAIR_INDEX.table, PAIR_INDEX.name, PAIR_INDEX.definition) {
            missing.push(PAIR_INDEX.name.to_string());
        }

        if missing.is_empty() {
            info!("Schema evolution complete ({} changes)", self.schema_changes());
        } else {
            warn!("Schema evolution left optional features off: {}", missing.join(", "));
        }
    }
}
