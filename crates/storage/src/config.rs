//! Storage configuration
//!
//! All configuration is fixed at construction time and immutable for the
//! lifetime of a [`Database`](crate::Database) instance; reconfiguration
//! means constructing a new instance. Platform-dependent tuning (temp
//! storage, synchronization mode) is resolved by the embedding application
//! and consumed here as plain flags.

use std::path::PathBuf;
use std::time::Duration;

use zeroize::Zeroizing;

use crate::error::{StorageError, StorageResult};

/// Where the engine keeps temporary tables and indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TempStore {
    /// Engine default (usually a temp file).
    #[default]
    Default,
    /// Keep temp storage in memory. Slower on some platforms but avoids
    /// temp-directory lookups that can fail inside app sandboxes.
    Memory,
}

/// Synchronization mode for the engine's write pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Synchronous {
    /// Engine default (NORMAL under WAL).
    #[default]
    Default,
    /// Full fsync on every commit. Slower, used on platforms where partial
    /// syncs have produced corrupted database images.
    Full,
}

/// Source for the encryption key
#[derive(Clone)]
pub enum KeySource {
    /// Use the provided key directly.
    Direct { key: String },

    /// Load from an environment variable (test/dev only).
    Environment { var_name: String },
}

// Custom Debug impl to avoid exposing key material
impl std::fmt::Debug for KeySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Direct { .. } => f.debug_struct("Direct").field("key", &"***").finish(),
            Self::Environment { var_name } => {
                f.debug_struct("Environment").field("var_name", var_name).finish()
            }
        }
    }
}

impl KeySource {
    /// Create a direct key source
    pub fn direct(key: impl Into<String>) -> Self {
        Self::Direct { key: key.into() }
    }

    /// Create an environment variable key source
    pub fn environment(var_name: impl Into<String>) -> Self {
        Self::Environment { var_name: var_name.into() }
    }

    /// Resolve the key material once, at construction time.
    pub(crate) fn resolve(&self) -> StorageResult<Zeroizing<String>> {
        match self {
            Self::Direct { key } => Ok(Zeroizing::new(key.clone())),
            Self::Environment { var_name } => std::env::var(var_name)
                .map(Zeroizing::new)
                .map_err(|_| {
                    StorageError::InvalidConfig(format!(
                        "encryption key variable {var_name} is not set"
                    ))
                }),
        }
    }
}

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Database file path
    pub path: PathBuf,

    /// Switch the connection to exclusive locking mode.
    ///
    /// Improves throughput for a single writer but forbids concurrent
    /// readers from any other connection, including other processes.
    pub exclusive_locking: bool,

    /// Encryption key source (None = encryption disabled)
    pub key_source: Option<KeySource>,

    /// Temp storage placement (resolved by the embedder)
    pub temp_store: TempStore,

    /// Synchronization mode (resolved by the embedder)
    pub synchronous: Synchronous,

    /// Busy timeout before the engine returns SQLITE_BUSY (default: 5000 ms)
    pub busy_timeout: Duration,

    /// Prepared-statement cache capacity (default: 32 entries)
    pub statement_cache_capacity: usize,
}

impl DatabaseConfig {
    /// Create a new configuration with the given path and defaults
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            exclusive_locking: false,
            key_source: None,
            temp_store: TempStore::Default,
            synchronous: Synchronous::Default,
            busy_timeout: Duration::from_millis(5000),
            statement_cache_capacity: 32,
        }
    }

    /// Validate the configuration
    ///
    /// # Errors
    /// Returns an error if any configuration value is invalid.
    pub fn validate(&self) -> StorageResult<()> {
        if self.path.as_os_str().is_empty() {
            return Err(StorageError::InvalidConfig("database path cannot be empty".to_string()));
        }
        if self.busy_timeout.is_zero() {
            return Err(StorageError::InvalidConfig(
                "busy_timeout must be greater than 0".to_string(),
            ));
        }
        if self.statement_cache_capacity == 0 {
            return Err(StorageError::InvalidConfig(
                "statement_cache_capacity must be greater than 0".to_string(),
            ));
        }
        match &self.key_source {
            Some(KeySource::Direct { key }) if key.is_empty() => {
                return Err(StorageError::InvalidConfig(
                    "encryption key cannot be empty (omit key_source to disable encryption)"
                        .to_string(),
                ));
            }
            Some(KeySource::Environment { var_name }) if var_name.is_empty() => {
                return Err(StorageError::InvalidConfig(
                    "encryption key variable name cannot be empty".to_string(),
                ));
            }
            _ => {}
        }
        Ok(())
    }

    /// Enable exclusive locking mode
    pub fn with_exclusive_locking(mut self, exclusive: bool) -> Self {
        self.exclusive_locking = exclusive;
        self
    }

    /// Set the encryption key source
    pub fn with_key_source(mut self, source: KeySource) -> Self {
        self.key_source = Some(source);
        self
    }

    /// Set the encryption key from a raw string; an empty string disables
    /// encryption (the boundary contract of the embedding runtime).
    pub fn with_encryption_key(mut self, key: &str) -> Self {
        self.key_source = if key.is_empty() { None } else { Some(KeySource::direct(key)) };
        self
    }

    /// Set temp storage placement
    pub fn with_temp_store(mut self, temp_store: TempStore) -> Self {
        self.temp_store = temp_store;
        self
    }

    /// Set the synchronization mode
    pub fn with_synchronous(mut self, synchronous: Synchronous) -> Self {
        self.synchronous = synchronous;
        self
    }

    /// Set the busy timeout
    pub fn with_busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    /// Set the prepared-statement cache capacity
    pub fn with_statement_cache_capacity(mut self, capacity: usize) -> Self {
        self.statement_cache_capacity = capacity;
        self
    }

    /// Create a builder for more complex configurations
    pub fn builder(path: impl Into<PathBuf>) -> DatabaseConfigBuilder {
        DatabaseConfigBuilder::new(path)
    }
}

/// Builder for DatabaseConfig with validation
#[derive(Debug)]
pub struct DatabaseConfigBuilder {
    config: DatabaseConfig,
}

impl DatabaseConfigBuilder {
    /// Create a new builder
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { config: DatabaseConfig::new(path) }
    }

    /// Enable exclusive locking mode
    pub fn exclusive_locking(mut self, exclusive: bool) -> Self {
        self.config.exclusive_locking = exclusive;
        self
    }

    /// Set the encryption key source
    pub fn key_source(mut self, source: KeySource) -> Self {
        self.config.key_source = Some(source);
        self
    }

    /// Set temp storage placement
    pub fn temp_store(mut self, temp_store: TempStore) -> Self {
        self.config.temp_store = temp_store;
        self
    }

    /// Set the synchronization mode
    pub fn synchronous(mut self, synchronous: Synchronous) -> Self {
        self.config.synchronous = synchronous;
        self
    }

    /// Set the busy timeout
    pub fn busy_timeout(mut self, timeout: Duration) -> Self {
        self.config.busy_timeout = timeout;
        self
    }

    /// Set the prepared-statement cache capacity
    pub fn statement_cache_capacity(mut self, capacity: usize) -> Self {
        self.config.statement_cache_capacity = capacity;
        self
    }

    /// Build and validate the configuration
    pub fn build(self) -> StorageResult<DatabaseConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
