//! SQLCipher keying
//!
//! Applies the encryption key and the fixed cipher parameters to a freshly
//! opened connection. The engine treats the connection as invalid for any
//! other access until the key is accepted, so this must run before any other
//! statement.

use rusqlite::Connection;
use tracing::{debug, error};
use zeroize::Zeroizing;

use crate::error::{StorageError, StorageResult};

/// SQLCipher configuration
///
/// The parameter values match the databases created by Tidepool's platform
/// drivers; changing them makes existing files unreadable.
#[derive(Clone)]
pub struct SqlCipherConfig {
    /// Encryption key (zeroized on drop)
    key: Zeroizing<String>,

    /// Cipher compatibility version (default: 4 for SQLCipher 4.x)
    cipher_compatibility: i32,

    /// Encrypted page size in bytes (default: 4096)
    cipher_page_size: i32,

    /// KDF iterations for key derivation (default: 64000)
    kdf_iter: i32,
}

// Custom Debug impl to avoid exposing the key
impl std::fmt::Debug for SqlCipherConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqlCipherConfig")
            .field("key", &"***")
            .field("cipher_compatibility", &self.cipher_compatibility)
            .field("cipher_page_size", &self.cipher_page_size)
            .field("kdf_iter", &self.kdf_iter)
            .finish()
    }
}

impl SqlCipherConfig {
    /// HMAC algorithm applied to every encrypted page.
    const HMAC_ALGORITHM: &'static str = "HMAC_SHA512";

    /// Key-derivation algorithm.
    const KDF_ALGORITHM: &'static str = "PBKDF2_HMAC_SHA512";

    /// Create default configuration with the given key
    pub fn new(key: Zeroizing<String>) -> Self {
        Self { key, cipher_compatibility: 4, cipher_page_size: 4096, kdf_iter: 64000 }
    }

    /// Set cipher compatibility version
    pub fn with_cipher_compatibility(mut self, version: i32) -> Self {
        self.cipher_compatibility = version;
        self
    }

    /// Set KDF iterations
    pub fn with_kdf_iter(mut self, iterations: i32) -> Self {
        self.kdf_iter = iterations;
        self
    }
}

/// Configure SQLCipher for a connection
///
/// Applies the key pragma first (the engine rejects any other access until
/// the key is set), then the fixed cipher parameters.
///
/// # Errors
/// Returns [`StorageError::WrongKeyOrNotEncrypted`] when the engine reports
/// the file as unreadable under this key, [`StorageError::Encryption`] for
/// any other pragma failure.
pub fn configure_sqlcipher(conn: &Connection, config: &SqlCipherConfig) -> StorageResult<()> {
    conn.pragma_update(None, "key", config.key.as_str()).map_err(|e| {
        error!(error = %e, "SQLCipher key setup failed");
        classify_cipher_error(&e)
    })?;

    let cipher_sql = format!(
        "PRAGMA cipher_compatibility = {};\n\
         PRAGMA cipher_page_size = {};\n\
         PRAGMA kdf_iter = {};\n\
         PRAGMA cipher_hmac_algorithm = {};\n\
         PRAGMA cipher_kdf_algorithm = {};\n",
        config.cipher_compatibility,
        config.cipher_page_size,
        config.kdf_iter,
        SqlCipherConfig::HMAC_ALGORITHM,
        SqlCipherConfig::KDF_ALGORITHM,
    );
    conn.execute_batch(&cipher_sql).map_err(|e| {
        error!(error = %e, "Failed to apply cipher parameters");
        StorageError::Encryption(format!("Failed to apply cipher parameters: {e}"))
    })?;

    debug!("SQLCipher configuration applied");
    Ok(())
}

/// Verify that the key is accepted by forcing a decrypting read
///
/// `PRAGMA user_version` reads the database header and a `sqlite_master`
/// count reads encrypted pages, so a wrong key fails here rather than on the
/// first real query.
///
/// # Errors
/// Returns [`StorageError::WrongKeyOrNotEncrypted`] if the key is wrong or
/// the file is not an encrypted database.
pub fn verify_encryption(conn: &Connection) -> StorageResult<()> {
    let result = conn
        .query_row("PRAGMA user_version", [], |_| Ok::<(), rusqlite::Error>(()))
        .and_then(|()| conn.query_row("SELECT count(*) FROM sqlite_master", [], |_| Ok(())))
        .map_err(|e| classify_cipher_error(&e));

    match &result {
        Ok(()) => debug!("encryption verified"),
        Err(e) => error!(error = %e, "encryption verification failed"),
    }

    result
}

/// Map an engine error on a keyed connection to the storage taxonomy.
///
/// SQLCipher does not report a dedicated error code for a wrong key; the
/// failure shows up as the file not being readable as a database.
fn classify_cipher_error(err: &rusqlite::Error) -> StorageError {
    let err_str = err.to_string().to_lowercase();
    if err_str.contains("file is not a database")
        || err_str.contains("file is encrypted")
        || err_str.contains("database disk image is malformed")
        || err_str.contains("notadb")
        || err_str.contains("unsupported file format")
        || err_str.contains("unable to open database")
    {
        StorageError::WrongKeyOrNotEncrypted
    } else {
        StorageError::Encryption(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for cipher.
    use rusqlite::Connection;
    use tempfile::TempDir;

    use super::*;

    fn test_config(key: &str) -> SqlCipherConfig {
        SqlCipherConfig::new(Zeroizing::new(key.to_string()))
    }

    #[test]
    fn test_sqlcipher_config_defaults() {
        let config = test_config("test_key");
        assert_eq!(config.cipher_compatibility, 4);
        assert_eq!(config.cipher_page_size, 4096);
        assert_eq!(config.kdf_iter, 64000);
    }

    #[test]
    fn test_sqlcipher_config_builder() {
        let config = test_config("test_key").with_cipher_compatibility(3).with_kdf_iter(256_000);
        assert_eq!(config.cipher_compatibility, 3);
        assert_eq!(config.kdf_iter, 256_000);
    }

    #[test]
    fn test_debug_redacts_key() {
        let debug_str = format!("{:?}", test_config("super_secret"));
        assert!(!debug_str.contains("super_secret"));
    }

    #[test]
    fn test_configure_and_verify() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");

        let conn = Connection::open(&db_path).unwrap();
        configure_sqlcipher(&conn, &test_config("correct_key")).unwrap();
        verify_encryption(&conn).unwrap();
    }

    #[test]
    fn test_wrong_encryption_key() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");

        // Create database with one key
        {
            let conn = Connection::open(&db_path).unwrap();
            configure_sqlcipher(&conn, &test_config("correct_key")).unwrap();
            conn.execute("CREATE TABLE test (id INTEGER PRIMARY KEY)", []).unwrap();
        }

        // Reopen with a different key
        {
            let conn = Connection::open(&db_path).unwrap();
            configure_sqlcipher(&conn, &test_config("wrong_key")).unwrap();

            let result = verify_encryption(&conn);
            assert!(matches!(result, Err(StorageError::WrongKeyOrNotEncrypted)));
        }
    }
}
