//! Thread-safe database façade
//!
//! Composes the connection handle, the statement cache, and the record
//! cache behind one exclusive lock. Every public operation holds the lock
//! for its full duration, including nested statement executions and
//! transaction control, so all access to the native connection is
//! serialized per instance.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use rusqlite::config::DbConfig;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info, instrument, warn};

use crate::config::DatabaseConfig;
use crate::connection::ConnectionHandle;
use crate::error::{StorageError, StorageResult};
use crate::metrics::StorageMetrics;
use crate::records::RecordCache;
use crate::statements::StatementCache;
use crate::transaction::run_in_transaction;

const LOCAL_STORAGE_QUERY: &str = "SELECT value FROM local_storage WHERE key = ?";
const ALL_TABLES_QUERY: &str =
    "SELECT name FROM sqlite_master WHERE type IN ('table', 'view')";
const CLEAR_CATALOG_SQL: &str =
    "DELETE FROM sqlite_master WHERE type IN ('table', 'index', 'trigger')";

/// Schema state of an existing database relative to the version the
/// application expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaCompatibility {
    /// Stored version matches the expected version.
    Compatible,
    /// Fresh database, or one too new to use: full schema setup required.
    NeedsSetup,
    /// Older database that can be migrated forward from `from_version`.
    NeedsMigration { from_version: i32 },
}

/// Thread-safe connection manager over one native engine handle.
///
/// A `Database` owns its connection, statement cache, and record cache
/// exclusively; nothing is shared between instances. It is `Send + Sync`
/// and intended to be shared as `Arc<Database>`.
#[derive(Debug)]
pub struct Database {
    inner: Mutex<DatabaseInner>,
    metrics: Arc<StorageMetrics>,
    path: PathBuf,
}

#[derive(Debug)]
struct DatabaseInner {
    handle: ConnectionHandle,
    statements: StatementCache,
    records: RecordCache,
    destroyed: bool,
}

impl Database {
    /// Open the database described by `config`.
    ///
    /// Applies the encryption key (when configured) and the tuning pragma
    /// sequence as one batched setup outside any transaction; pragmas are
    /// not transactional in the engine.
    #[instrument(skip(config), fields(db_path = %config.path.display()))]
    pub fn open(config: DatabaseConfig) -> StorageResult<Self> {
        config.validate()?;

        let handle = ConnectionHandle::open(&config)?;
        handle.apply_pragmas(&config)?;

        let statements = StatementCache::new(config.statement_cache_capacity);
        statements.configure(handle.conn()?);

        info!(
            exclusive_locking = config.exclusive_locking,
            encrypted = config.key_source.is_some(),
            "database opened"
        );

        Ok(Self {
            inner: Mutex::new(DatabaseInner {
                handle,
                statements,
                records: RecordCache::new(),
                destroyed: false,
            }),
            metrics: Arc::new(StorageMetrics::new()),
            path: config.path,
        })
    }

    /// The configured database path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Shared handle to the storage counters.
    pub fn metrics(&self) -> Arc<StorageMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Tear down the instance: finalize all cached statements, then close
    /// the connection. Idempotent: the second and subsequent calls are
    /// no-ops; also runs from `Drop`.
    #[instrument(skip(self))]
    pub fn destroy(&self) -> StorageResult<()> {
        let inner = &mut *self.inner.lock();
        if inner.destroyed {
            debug!("database already destroyed");
            return Ok(());
        }
        inner.destroyed = true;

        // Statements must be finalized before the connection they belong to
        // goes away.
        if let Ok(conn) = inner.handle.conn() {
            inner.statements.clear(conn);
        }
        inner.handle.close()?;

        info!("database destroyed");
        Ok(())
    }

    /// Whether `key` is in the record-existence cache. Advisory only: a
    /// miss never means the record is absent from storage.
    pub fn is_cached(&self, key: &str) -> bool {
        self.inner.lock().records.contains(key)
    }

    /// Mark `key` as known to exist in storage.
    pub fn mark_as_cached(&self, key: impl Into<String>) {
        self.inner.lock().records.insert(key);
    }

    /// Remove `key` from the record-existence cache.
    pub fn remove_from_cache(&self, key: &str) {
        self.inner.lock().records.remove(key);
    }

    /// Read the stored schema-version marker.
    pub fn user_version(&self) -> StorageResult<i32> {
        let inner = &*self.inner.lock();
        read_user_version(inner.handle.conn()?)
    }

    /// Write the schema-version marker.
    pub fn set_user_version(&self, version: i32) -> StorageResult<()> {
        let inner = &*self.inner.lock();
        write_user_version(inner.handle.conn()?, version)
    }

    /// Compare the stored schema-version marker against the version the
    /// application expects.
    ///
    /// A database newer than the application supports cannot be used and
    /// reports [`SchemaCompatibility::NeedsSetup`].
    pub fn schema_compatibility(
        &self,
        expected_version: i32,
    ) -> StorageResult<SchemaCompatibility> {
        let found = self.user_version()?;
        let compatibility = if found == expected_version {
            SchemaCompatibility::Compatible
        } else if found == 0 {
            SchemaCompatibility::NeedsSetup
        } else if found < expected_version {
            SchemaCompatibility::NeedsMigration { from_version: found }
        } else {
            warn!(found, expected_version, "database is newer than the app supports; needs setup");
            SchemaCompatibility::NeedsSetup
        };
        Ok(compatibility)
    }

    /// Single-row lookup in the reserved `local_storage` key/value table.
    ///
    /// Absence is a normal outcome, reported as `Ok(None)`.
    pub fn get_from_local_storage(&self, key: &str) -> StorageResult<Option<String>> {
        let inner = &*self.inner.lock();
        let conn = inner.handle.conn()?;

        let mut stmt = inner.statements.get(conn, LOCAL_STORAGE_QUERY)?;
        self.metrics.record_statement_prepared();
        stmt.query_row(params![key], |row| row.get(0))
            .optional()
            .map_err(|e| StorageError::Query(format!("local storage lookup: {e}")))
    }

    /// Enumerate catalog entries of kind table or view.
    pub fn get_all_tables(&self) -> StorageResult<Vec<String>> {
        let inner = &*self.inner.lock();
        let conn = inner.handle.conn()?;
        list_tables(conn, &inner.statements, &self.metrics)
    }

    /// Destructive structural reset: wipe the file down to an empty
    /// database, then reinstall `schema_sql` and set the version marker to
    /// `schema_version`, all-or-nothing.
    ///
    /// The wipe itself (reset-mode toggle and VACUUM) is not transactional:
    /// the engine forbids VACUUM inside a transaction, and the defensive
    /// reset-mode toggle is connection config, not data. A failure there
    /// is fatal to the instance; the schema reinstall from that point on is
    /// atomic.
    #[instrument(skip(self, schema_sql))]
    pub fn reset_database(&self, schema_sql: &str, schema_version: i32) -> StorageResult<()> {
        let inner = &mut *self.inner.lock();
        let DatabaseInner { handle, records, .. } = inner;
        let conn = handle.conn()?;

        // Deleting catalog rows directly is blocked by the engine's
        // defensive protections on some platforms; reset mode lifts them
        // for the VACUUM.
        set_reset_mode(conn, true)?;
        conn.execute_batch("VACUUM")
            .map_err(|e| StorageError::Query(format!("vacuum: {e}")))?;
        set_reset_mode(conn, false)?;

        transactional(conn, &self.metrics, || {
            records.clear();
            conn.execute_batch(schema_sql)
                .map_err(|e| StorageError::Query(format!("schema setup: {e}")))?;
            write_user_version(conn, schema_version)
        })?;

        self.metrics.record_structural_reset();
        info!(schema_version, "database reset");
        Ok(())
    }

    /// Apply a migration set, moving the version marker from `from_version`
    /// to `to_version`, all-or-nothing.
    ///
    /// # Errors
    /// [`StorageError::SchemaVersionMismatch`] if the stored marker does
    /// not equal `from_version`; the check runs before any migration
    /// statement, so nothing is touched.
    #[instrument(skip(self, migration_sql))]
    pub fn migrate(
        &self,
        migration_sql: &str,
        from_version: i32,
        to_version: i32,
    ) -> StorageResult<()> {
        let inner = &*self.inner.lock();
        let conn = inner.handle.conn()?;

        transactional(conn, &self.metrics, || {
            let found = read_user_version(conn)?;
            if found != from_version {
                return Err(StorageError::SchemaVersionMismatch {
                    expected: from_version,
                    found,
                });
            }

            conn.execute_batch(migration_sql)
                .map_err(|e| StorageError::Query(format!("migration: {e}")))?;
            write_user_version(conn, to_version)
        })?;

        info!(from_version, to_version, "migration applied");
        Ok(())
    }

    /// Drop every table, force-clear the remaining catalog entries, and
    /// reset the version marker to zero, all-or-nothing.
    ///
    /// The writable-schema escape hatch is reverted on every path: the
    /// setting is connection-level and a rollback would not restore it.
    #[instrument(skip(self))]
    pub fn destroy_everything(&self) -> StorageResult<()> {
        let inner = &mut *self.inner.lock();
        let DatabaseInner { handle, statements, records, .. } = inner;
        let conn = handle.conn()?;

        transactional(conn, &self.metrics, || {
            for table in list_tables(conn, statements, &self.metrics)? {
                conn.execute_batch(&format!("DROP TABLE \"{table}\""))
                    .map_err(|e| StorageError::Query(format!("drop table {table}: {e}")))?;
            }

            let schema_guard = WritableSchemaGuard::enable(conn)?;
            conn.execute_batch(CLEAR_CATALOG_SQL)
                .map_err(|e| StorageError::Query(format!("clear catalog: {e}")))?;
            write_user_version(conn, 0)?;
            schema_guard.release()
        })?;

        records.clear();
        self.metrics.record_structural_reset();
        info!("all schema objects destroyed");
        Ok(())
    }
}

impl Drop for Database {
    fn drop(&mut self) {
        if let Err(err) = self.destroy() {
            warn!(error = %err, "failed to destroy database during drop");
        }
    }
}

/// Run `body` in one transaction and count the outcome.
fn transactional<T>(
    conn: &Connection,
    metrics: &StorageMetrics,
    body: impl FnOnce() -> StorageResult<T>,
) -> StorageResult<T> {
    let result = run_in_transaction(conn, body);
    match &result {
        Ok(_) => metrics.record_transaction_committed(),
        Err(_) => metrics.record_transaction_rolled_back(),
    }
    result
}

fn read_user_version(conn: &Connection) -> StorageResult<i32> {
    conn.pragma_query_value(None, "user_version", |row| row.get(0))
        .map_err(StorageError::from)
}

fn write_user_version(conn: &Connection, version: i32) -> StorageResult<()> {
    conn.pragma_update(None, "user_version", version).map_err(StorageError::from)
}

fn list_tables(
    conn: &Connection,
    statements: &StatementCache,
    metrics: &StorageMetrics,
) -> StorageResult<Vec<String>> {
    let mut stmt = statements.get(conn, ALL_TABLES_QUERY)?;
    metrics.record_statement_prepared();
    let rows = stmt
        .query_map([], |row| row.get(0))
        .map_err(|e| StorageError::Query(format!("list tables: {e}")))?;
    rows.collect::<Result<Vec<String>, _>>()
        .map_err(|e| StorageError::Query(format!("list tables: {e}")))
}

fn set_reset_mode(conn: &Connection, enabled: bool) -> StorageResult<()> {
    conn.set_db_config(DbConfig::SQLITE_DBCONFIG_RESET_DATABASE, enabled).map(|_| ()).map_err(
        |e| {
            let action = if enabled { "enable" } else { "disable" };
            StorageError::ResetConfig(format!("{action}: {e}"))
        },
    )
}

/// Holds the writable-schema escape hatch open.
///
/// Release always restores `writable_schema = OFF`: explicitly (surfacing
/// the error) on the success path, from `Drop` on every other path.
struct WritableSchemaGuard<'conn> {
    conn: &'conn Connection,
    released: bool,
}

impl<'conn> WritableSchemaGuard<'conn> {
    fn enable(conn: &'conn Connection) -> StorageResult<Self> {
        conn.pragma_update(None, "writable_schema", true)
            .map_err(|e| StorageError::Query(format!("enable writable_schema: {e}")))?;
        Ok(Self { conn, released: false })
    }

    fn release(mut self) -> StorageResult<()> {
        self.released = true;
        self.conn
            .pragma_update(None, "writable_schema", false)
            .map_err(|e| StorageError::Query(format!("disable writable_schema: {e}")))
    }
}

impl Drop for WritableSchemaGuard<'_> {
    fn drop(&mut self) {
        if !self.released {
            if let Err(err) = self.conn.pragma_update(None, "writable_schema", false) {
                warn!(error = %err, "failed to restore writable_schema");
            }
        }
    }
}
