//! Prepared-statement cache management
//!
//! Statement preparation is comparatively expensive; caching by exact SQL
//! text avoids re-parsing on every execution of the same query shape. The
//! statements live in the connection's own cache, so they are owned by the
//! connection that prepared them, never shared between instances, and
//! finalized as a unit by [`StatementCache::clear`], which must run before
//! the owning connection closes.

use rusqlite::{CachedStatement, Connection};

use crate::error::{StorageError, StorageResult};

/// Management layer over the connection's prepared-statement cache.
///
/// Not internally synchronized: ownership is exclusive-lock-protected at the
/// [`Database`](crate::Database) layer.
#[derive(Debug)]
pub struct StatementCache {
    capacity: usize,
}

impl StatementCache {
    /// Create a cache manager with the given capacity.
    pub fn new(capacity: usize) -> Self {
        Self { capacity }
    }

    /// Configured capacity in statements.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Apply the configured capacity to the connection's cache.
    pub fn configure(&self, conn: &Connection) {
        conn.set_prepared_statement_cache_capacity(self.capacity);
    }

    /// Return a cached prepared statement for `sql`, preparing and inserting
    /// it on first use.
    ///
    /// # Errors
    /// [`StorageError::Prepare`] when the SQL is malformed or the connection
    /// unusable, carrying the engine's diagnostic.
    pub fn get<'conn>(
        &self,
        conn: &'conn Connection,
        sql: &str,
    ) -> StorageResult<CachedStatement<'conn>> {
        conn.prepare_cached(sql).map_err(|e| StorageError::Prepare(format!("{sql}: {e}")))
    }

    /// Finalize every cached statement and empty the cache.
    pub fn clear(&self, conn: &Connection) {
        conn.flush_prepared_statement_cache();
    }
}
