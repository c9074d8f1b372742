pub mod catalog;
pub mod columns;
pub mod config;
pub mod derived;
pub mod error;
pub mod evolution;
pub mod migrations;
pub mod models;
pub mod queries;
pub mod throttle;

#[cfg(test)]
mod test_support;

pub use columns::ColumnSet;
pub use config::DbConfig;
pub use error::{Conflict, DbError};
pub use throttle::{COOLDOWN, RequestOutcome};

use rusqlite::{Connection, Transaction, TransactionBehavior};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, OnceLock};
use tracing::{error, info};

use catalog::SchemaCatalog;

/// Handle to the MentorLink datastore.
///
/// Owns one connection, the schema catalog cache and the column set that is
/// negotiated on first use. Several handles (in one process or many) may point
/// at the same file; cross-handle correctness rests on SQLite's own locking.
pub struct Database {
    conn: Mutex<Connection>,
    catalog: SchemaCatalog,
    columns: OnceLock<ColumnSet>,
    schema_changes: AtomicU64,
    auto_evolve: bool,
}

impl Database {
    pub fn open(config: &DbConfig) -> Result<Self, DbError> {
        if let Some(parent) = config.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    DbError::Unavailable(format!("cannot create {}: {}", parent.display(), e))
                })?;
            }
        }

        let conn = Connection::open(&config.path)?;
        conn.busy_timeout(config.busy_timeout)?;

        // WAL mode for concurrent reads
        let _mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        conn.pragma_update(None, "foreign_keys", "ON")?;

        migrations::run(&conn)?;

        info!("Database opened at {}", config.path.display());
        Ok(Self {
            conn: Mutex::new(conn),
            catalog: SchemaCatalog::new(),
            columns: OnceLock::new(),
            schema_changes: AtomicU64::new(0),
            auto_evolve: config.auto_evolve,
        })
    }

    /// Optional columns available to this handle. The first call runs the
    /// one-shot schema evolution pass (when enabled) and probes the catalog.
    ///
    /// Must not be called while a `with_conn*` closure holds the connection.
    pub fn columns(&self) -> &ColumnSet {
        self.columns.get_or_init(|| {
            if self.auto_evolve {
                self.evolve_schema();
            }
            let set = ColumnSet::probe(self);
            info!("Schema column set negotiated: {:?}", set);
            set
        })
    }

    pub fn catalog(&self) -> &SchemaCatalog {
        &self.catalog
    }

    /// Number of DDL statements this handle has applied.
    pub fn schema_changes(&self) -> u64 {
        self.schema_changes.load(Ordering::Relaxed)
    }

    pub(crate) fn record_schema_change(&self) {
        self.schema_changes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn with_conn<F, T>(&self, f: F) -> Result<T, DbError>
    where
        F: FnOnce(&Connection) -> Result<T, DbError>,
    {
        let conn = self.lock()?;
        f(&conn).inspect_err(log_failure)
    }

    pub fn with_conn_mut<F, T>(&self, f: F) -> Result<T, DbError>
    where
        F: FnOnce(&mut Connection) -> Result<T, DbError>,
    {
        let mut conn = self.lock()?;
        f(&mut conn).inspect_err(log_failure)
    }

    /// Run `f` inside a `BEGIN IMMEDIATE` transaction. Commits on `Ok`,
    /// rolls back (by drop) on `Err`.
    pub fn with_tx<F, T>(&self, f: F) -> Result<T, DbError>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T, DbError>,
    {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let value = f(&tx)?;
            tx.commit()?;
            Ok(value)
        })
    }

    pub(crate) fn lock(&self) -> Result<MutexGuard<'_, Connection>, DbError> {
        self.conn
            .lock()
            .map_err(|e| DbError::Unavailable(format!("DB lock poisoned: {}", e)))
    }
}

fn log_failure(err: &DbError) {
    match err {
        DbError::Database(source) => error!("Database error: {}", source),
        DbError::Unavailable(detail) => error!("Database unavailable: {}", detail),
        DbError::Validation(_) | DbError::Conflict(_) => {}
    }
}
