//! Native connection ownership
//!
//! One [`ConnectionHandle`] owns exactly one engine connection for its whole
//! lifetime. Opening applies the encryption key (when configured) before
//! anything else touches the connection; closing is idempotent and
//! irrevocable.

use rusqlite::Connection;
use tracing::debug;

use crate::cipher::{configure_sqlcipher, verify_encryption, SqlCipherConfig};
use crate::config::DatabaseConfig;
use crate::error::{StorageError, StorageResult};
use crate::pragmas::apply_connection_pragmas;

/// Owner of a single native engine connection.
///
/// Statement cleanup is the caller's concern
/// ([`StatementCache::clear`](crate::StatementCache::clear) must run before
/// [`close`](Self::close)); the handle only opens and releases the
/// connection itself.
#[derive(Debug)]
pub struct ConnectionHandle {
    conn: Option<Connection>,
}

impl ConnectionHandle {
    /// Open the connection at the configured path.
    ///
    /// When a key source is configured, the key and cipher parameters are
    /// applied first and the key is verified with a decrypting read; the
    /// engine rejects any other access on the connection until then.
    ///
    /// # Errors
    /// [`StorageError::Open`] if the underlying open call fails;
    /// [`StorageError::WrongKeyOrNotEncrypted`] if the key is rejected.
    pub fn open(config: &DatabaseConfig) -> StorageResult<Self> {
        let conn = Connection::open(&config.path)
            .map_err(|e| StorageError::Open(format!("{}: {e}", config.path.display())))?;

        if let Some(source) = &config.key_source {
            let key = source.resolve()?;
            let cipher_config = SqlCipherConfig::new(key);
            configure_sqlcipher(&conn, &cipher_config)?;
            verify_encryption(&conn)?;
        }

        Ok(Self { conn: Some(conn) })
    }

    /// Apply the tuning pragma sequence to the open connection.
    pub fn apply_pragmas(&self, config: &DatabaseConfig) -> StorageResult<()> {
        apply_connection_pragmas(self.conn()?, config)
    }

    /// Borrow the open connection.
    ///
    /// # Errors
    /// [`StorageError::ConnectionClosed`] once [`close`](Self::close) has
    /// run.
    pub fn conn(&self) -> StorageResult<&Connection> {
        self.conn.as_ref().ok_or(StorageError::ConnectionClosed)
    }

    /// Whether the connection is still open.
    pub fn is_open(&self) -> bool {
        self.conn.is_some()
    }

    /// Release the native connection. Idempotent: the second and subsequent
    /// calls are no-ops.
    ///
    /// # Errors
    /// [`StorageError::Connection`] if the engine refuses to close (the
    /// handle stays open so the caller can retry).
    pub fn close(&mut self) -> StorageResult<()> {
        let Some(conn) = self.conn.take() else {
            debug!("connection already closed");
            return Ok(());
        };

        match conn.close() {
            Ok(()) => {
                debug!("connection closed");
                Ok(())
            }
            Err((conn, err)) => {
                self.conn = Some(conn);
                Err(StorageError::Connection(format!("Failed to close connection: {err}")))
            }
        }
    }
}
