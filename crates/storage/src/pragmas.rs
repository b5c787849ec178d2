//! Connection tuning pragmas
//!
//! Applies the per-connection tuning sequence after the connection is opened
//! (and keyed, when encryption is on). Pragmas are not transactional; they
//! run as one plain batch.

use rusqlite::Connection;
use tracing::debug;

use crate::config::{DatabaseConfig, Synchronous, TempStore};
use crate::error::{StorageError, StorageResult};

/// Apply connection-level tuning pragmas
///
/// The sequence, in order:
/// - `temp_store = memory` when configured (sandboxed platforms without a
///   usable temp directory)
/// - `journal_mode = WAL`, always
/// - `busy_timeout`, so lock contention is retried by the engine instead of
///   failing immediately with SQLITE_BUSY
/// - `synchronous = FULL` when configured
/// - `locking_mode = EXCLUSIVE` when configured; this improves single-writer
///   throughput but locks out every other connection, readers included
pub fn apply_connection_pragmas(conn: &Connection, config: &DatabaseConfig) -> StorageResult<()> {
    let mut pragma_sql = String::new();

    if config.temp_store == TempStore::Memory {
        pragma_sql.push_str("PRAGMA temp_store = memory;\n");
    }

    pragma_sql.push_str("PRAGMA journal_mode = WAL;\n");

    let busy_timeout_ms = config.busy_timeout.as_millis();
    pragma_sql.push_str(&format!("PRAGMA busy_timeout = {busy_timeout_ms};\n"));

    if config.synchronous == Synchronous::Full {
        pragma_sql.push_str("PRAGMA synchronous = FULL;\n");
    }

    if config.exclusive_locking {
        pragma_sql.push_str("PRAGMA locking_mode = EXCLUSIVE;\n");
    }

    conn.execute_batch(&pragma_sql)
        .map_err(|e| StorageError::Query(format!("Failed to apply pragmas: {e}")))?;

    debug!(
        busy_timeout_ms = busy_timeout_ms as u64,
        exclusive_locking = config.exclusive_locking,
        "connection pragmas applied"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    //! Unit tests for pragmas.
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn test_apply_pragmas() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");

        let conn = Connection::open(&db_path).unwrap();
        let config = DatabaseConfig::new(&db_path);

        apply_connection_pragmas(&conn, &config).unwrap();

        let journal_mode: String =
            conn.pragma_query_value(None, "journal_mode", |row| row.get(0)).unwrap();
        assert_eq!(journal_mode.to_lowercase(), "wal");

        let busy_timeout: i64 =
            conn.pragma_query_value(None, "busy_timeout", |row| row.get(0)).unwrap();
        assert_eq!(busy_timeout, 5000);
    }

    #[test]
    fn test_exclusive_locking_pragma() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");

        let conn = Connection::open(&db_path).unwrap();
        let config = DatabaseConfig::new(&db_path).with_exclusive_locking(true);

        apply_connection_pragmas(&conn, &config).unwrap();

        let locking_mode: String =
            conn.pragma_query_value(None, "locking_mode", |row| row.get(0)).unwrap();
        assert_eq!(locking_mode.to_lowercase(), "exclusive");
    }

    #[test]
    fn test_temp_store_memory() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");

        let conn = Connection::open(&db_path).unwrap();
        let config = DatabaseConfig::new(&db_path).with_temp_store(TempStore::Memory);

        apply_connection_pragmas(&conn, &config).unwrap();

        // 2 = memory
        let temp_store: i32 =
            conn.pragma_query_value(None, "temp_store", |row| row.get(0)).unwrap();
        assert_eq!(temp_store, 2);
    }
}
