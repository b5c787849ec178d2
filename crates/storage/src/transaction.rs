//! Scoped transaction control
//!
//! Every multi-statement structural operation wraps its statements in
//! exactly one begin/commit pair. [`TransactionGuard`] tracks the state
//! machine explicitly and rolls back on drop if the transaction is still
//! open; [`run_in_transaction`] adds the rollback-then-rethrow policy so
//! callers never observe partial structural changes.

use rusqlite::Connection;
use tracing::warn;

use crate::error::{StorageError, StorageResult};

/// Transaction lifecycle states.
///
/// `Idle → Open → {Committed, RolledBack}`; no other transition exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Idle,
    Open,
    Committed,
    RolledBack,
}

/// Scoped begin/commit/rollback wrapper over one connection.
///
/// At most one transaction is open at a time per database instance; the
/// façade's exclusive lock enforces that, and [`begin`](Self::begin)
/// defends against it regardless.
#[derive(Debug)]
pub struct TransactionGuard<'conn> {
    conn: &'conn Connection,
    state: TransactionState,
}

impl<'conn> TransactionGuard<'conn> {
    /// Create an idle guard for `conn`.
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn, state: TransactionState::Idle }
    }

    /// Current state.
    pub fn state(&self) -> TransactionState {
        self.state
    }

    /// Transition `Idle → Open`.
    ///
    /// # Errors
    /// [`StorageError::Transaction`] if a transaction is already open on
    /// this guard, if the guard already finished, or if the engine rejects
    /// the BEGIN.
    pub fn begin(&mut self) -> StorageResult<()> {
        match self.state {
            TransactionState::Idle => {}
            TransactionState::Open => {
                return Err(StorageError::Transaction(
                    "a transaction is already open".to_string(),
                ));
            }
            TransactionState::Committed | TransactionState::RolledBack => {
                return Err(StorageError::Transaction(
                    "transaction guard already finished".to_string(),
                ));
            }
        }

        self.conn
            .execute_batch("BEGIN")
            .map_err(|e| StorageError::Transaction(format!("Failed to begin: {e}")))?;
        self.state = TransactionState::Open;
        Ok(())
    }

    /// Transition `Open → Committed`, persisting all effects.
    ///
    /// A commit failure (e.g. a constraint deferred to commit time) triggers
    /// a rollback attempt before the error propagates; afterwards the guard
    /// is in the `RolledBack` state.
    ///
    /// # Errors
    /// [`StorageError::Transaction`] on commit failure; the message reports
    /// the rollback failure instead when that also fails.
    pub fn commit(&mut self) -> StorageResult<()> {
        if self.state != TransactionState::Open {
            return Err(StorageError::Transaction("no transaction is open".to_string()));
        }

        match self.conn.execute_batch("COMMIT") {
            Ok(()) => {
                self.state = TransactionState::Committed;
                Ok(())
            }
            Err(commit_err) => {
                self.state = TransactionState::RolledBack;
                if self.conn.is_autocommit() {
                    // The engine already rolled back as part of the failed
                    // commit; nothing left to undo.
                    return Err(StorageError::Transaction(format!("Commit failed: {commit_err}")));
                }
                match self.conn.execute_batch("ROLLBACK") {
                    Ok(()) => {
                        Err(StorageError::Transaction(format!("Commit failed: {commit_err}")))
                    }
                    Err(rollback_err) => Err(StorageError::Transaction(format!(
                        "Rollback failed after failed commit: {rollback_err} (commit error: {commit_err})"
                    ))),
                }
            }
        }
    }

    /// Transition `Open → RolledBack`, discarding all effects since
    /// [`begin`](Self::begin). Safe to call again after a failed commit.
    ///
    /// # Errors
    /// [`StorageError::Transaction`] if no transaction was begun or the
    /// engine rejects the ROLLBACK.
    pub fn rollback(&mut self) -> StorageResult<()> {
        match self.state {
            TransactionState::RolledBack => Ok(()),
            TransactionState::Open => {
                self.state = TransactionState::RolledBack;
                if self.conn.is_autocommit() {
                    return Ok(());
                }
                self.conn
                    .execute_batch("ROLLBACK")
                    .map_err(|e| StorageError::Transaction(format!("Failed to rollback: {e}")))
            }
            TransactionState::Idle | TransactionState::Committed => {
                Err(StorageError::Transaction("no transaction is open".to_string()))
            }
        }
    }
}

impl Drop for TransactionGuard<'_> {
    fn drop(&mut self) {
        if self.state == TransactionState::Open && !self.conn.is_autocommit() {
            if let Err(err) = self.conn.execute_batch("ROLLBACK") {
                warn!(error = %err, "rollback on drop failed");
            }
        }
    }
}

/// Run `body` inside one transaction: commit on success, roll back on any
/// failure and re-raise the original error unchanged.
///
/// A rollback failure takes precedence over the body's error: it means the
/// connection is in an unknown state, which the caller must see.
pub fn run_in_transaction<T, F>(conn: &Connection, body: F) -> StorageResult<T>
where
    F: FnOnce() -> StorageResult<T>,
{
    let mut tx = TransactionGuard::new(conn);
    tx.begin()?;

    match body() {
        Ok(value) => {
            tx.commit()?;
            Ok(value)
        }
        Err(err) => match tx.rollback() {
            Ok(()) => Err(err),
            Err(rollback_err) => Err(rollback_err),
        },
    }
}
