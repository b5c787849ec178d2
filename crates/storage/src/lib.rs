//! Encrypted storage core for Tidepool.
//!
//! This crate owns the lowest layer of the Tidepool record store: one
//! SQLCipher-capable SQLite connection per [`Database`] instance, a
//! prepared-statement cache, an advisory record-existence cache, and the
//! destructive schema operations (reset, migrate, destroy) that must be
//! all-or-nothing.
//!
//! # Concurrency
//!
//! The core introduces no concurrency of its own. Every public operation on
//! [`Database`] serializes behind one exclusive lock for its full duration,
//! so a `Database` can be shared freely across threads (`Arc<Database>`).
//! Blocking, if any, happens inside the engine itself, bounded by the
//! configured busy timeout.

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::complexity, clippy::suspicious)]

pub mod cipher;
pub mod config;
pub mod connection;
pub mod database;
pub mod error;
pub mod metrics;
pub mod pragmas;
pub mod records;
pub mod statements;
pub mod transaction;

// Re-export commonly used types
pub use cipher::{configure_sqlcipher, verify_encryption, SqlCipherConfig};
pub use config::{DatabaseConfig, DatabaseConfigBuilder, KeySource, Synchronous, TempStore};
pub use connection::ConnectionHandle;
pub use database::{Database, SchemaCompatibility};
pub use error::{StorageError, StorageResult};
pub use metrics::{MetricsSnapshot, StorageMetrics};
pub use pragmas::apply_connection_pragmas;
pub use records::RecordCache;
pub use statements::StatementCache;
pub use transaction::{run_in_transaction, TransactionGuard, TransactionState};
