//! End-to-end coverage for the storage façade.
//!
//! These tests exercise the full lifecycle (construction with and without
//! encryption, structural reset, migration, catalog destruction, and
//! teardown) against isolated databases in temporary directories, asserting
//! the atomicity properties the rest of the system depends on.

use std::sync::Arc;
use std::thread;

use tempfile::TempDir;
use tidepool_storage::{
    Database, DatabaseConfig, SchemaCompatibility, StorageError, TempStore,
};

const TEST_DB_KEY: &str = "test_key_64_chars_long_aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";

const TEST_SCHEMA: &str = "\
    CREATE TABLE local_storage (key TEXT PRIMARY KEY, value TEXT);\n\
    CREATE TABLE posts (id TEXT PRIMARY KEY, title TEXT);\n\
    CREATE INDEX posts_title ON posts (title);\n\
    CREATE TRIGGER posts_touch AFTER DELETE ON posts BEGIN \
        UPDATE posts SET title = title WHERE 0; \
    END;";

struct DbHarness {
    #[allow(dead_code)]
    temp_dir: TempDir,
    db: Database,
}

impl DbHarness {
    fn new() -> Self {
        Self::with_config(|config| config)
    }

    fn with_config(customize: impl FnOnce(DatabaseConfig) -> DatabaseConfig) -> Self {
        let temp_dir = TempDir::new().expect("temporary directory should be created");
        let config = customize(DatabaseConfig::new(temp_dir.path().join("storage-test.db")));
        let db = Database::open(config).expect("database should open");
        Self { temp_dir, db }
    }
}

#[test]
fn construct_and_destroy_is_clean_and_idempotent() {
    let harness = DbHarness::new();
    let path = harness.db.path().to_path_buf();

    harness.db.destroy().expect("first destroy should succeed");
    harness.db.destroy().expect("second destroy should be a no-op");

    // Every operation on the torn-down instance reports the closed state
    assert!(matches!(harness.db.user_version(), Err(StorageError::ConnectionClosed)));
    assert!(matches!(harness.db.get_all_tables(), Err(StorageError::ConnectionClosed)));

    // The native handle is released: a fresh instance can open the same file
    let reopened = Database::open(DatabaseConfig::new(&path)).expect("file should reopen");
    assert_eq!(reopened.user_version().expect("version should read"), 0);
}

#[test]
fn reset_database_installs_schema_and_clears_state() {
    let harness = DbHarness::new();
    let db = &harness.db;

    db.reset_database("CREATE TABLE old_table (id INTEGER)", 1).expect("initial reset");
    db.mark_as_cached("posts#p1");

    db.reset_database(TEST_SCHEMA, 5).expect("reset should replace the schema");

    assert_eq!(db.user_version().expect("version should read"), 5);
    let tables = db.get_all_tables().expect("tables should enumerate");
    assert!(tables.contains(&"posts".to_string()));
    assert!(tables.contains(&"local_storage".to_string()));
    assert!(!tables.contains(&"old_table".to_string()), "prior tables should be gone");

    // The existence cache does not survive a structural reset
    assert!(!db.is_cached("posts#p1"));
}

#[test]
fn reset_database_rolls_back_on_bad_schema() {
    let harness = DbHarness::new();
    let db = &harness.db;

    db.reset_database(TEST_SCHEMA, 3).expect("initial reset");

    let result = db.reset_database("CREATE TABLE broken (;", 9);
    assert!(result.is_err(), "malformed schema should fail");

    // The wipe itself is non-transactional, but the failed reinstall left no
    // half-applied schema behind.
    assert!(!db
        .get_all_tables()
        .expect("tables should enumerate")
        .contains(&"broken".to_string()));
    assert_ne!(db.user_version().expect("version should read"), 9);

    // The instance is still usable: a good reset completes normally
    db.reset_database(TEST_SCHEMA, 4).expect("subsequent reset should succeed");
    assert_eq!(db.user_version().expect("version should read"), 4);
}

#[test]
fn migrate_applies_sql_and_advances_version() {
    let harness = DbHarness::new();
    let db = &harness.db;

    db.migrate("CREATE TABLE t (id INTEGER)", 0, 1).expect("migration should apply");

    assert_eq!(db.user_version().expect("version should read"), 1);
    assert!(db.get_all_tables().expect("tables should enumerate").contains(&"t".to_string()));

    // Wrong fromVersion: precondition violation, state untouched
    let result = db.migrate("CREATE TABLE t2 (id INTEGER)", 0, 2);
    match result {
        Err(StorageError::SchemaVersionMismatch { expected, found }) => {
            assert_eq!(expected, 0);
            assert_eq!(found, 1);
        }
        other => panic!("expected SchemaVersionMismatch, got {other:?}"),
    }
    assert_eq!(db.user_version().expect("version should read"), 1);
    assert!(!db.get_all_tables().expect("tables should enumerate").contains(&"t2".to_string()));
}

#[test]
fn migrate_failure_mid_sequence_leaves_no_trace() {
    let harness = DbHarness::new();
    let db = &harness.db;

    db.migrate("CREATE TABLE base (id INTEGER)", 0, 1).expect("setup migration");

    // The first statement succeeds, the second is malformed; the whole set
    // must roll back.
    let result = db.migrate(
        "CREATE TABLE halfway (id INTEGER);\nCREATE TABLE broken (;",
        1,
        2,
    );
    assert!(result.is_err(), "malformed migration should fail");

    assert_eq!(db.user_version().expect("version should read"), 1);
    let tables = db.get_all_tables().expect("tables should enumerate");
    assert!(!tables.contains(&"halfway".to_string()), "partial DDL must not persist");
    assert!(tables.contains(&"base".to_string()));
}

#[test]
fn destroy_everything_empties_catalog_and_version() {
    let harness = DbHarness::new();
    let db = &harness.db;

    db.reset_database(TEST_SCHEMA, 4).expect("schema setup");
    db.mark_as_cached("posts#p1");

    db.destroy_everything().expect("catalog wipe should succeed");

    assert!(db.get_all_tables().expect("tables should enumerate").is_empty());
    assert_eq!(db.user_version().expect("version should read"), 0);
    assert!(!db.is_cached("posts#p1"));

    // The instance stays usable for a fresh setup afterwards
    db.reset_database(TEST_SCHEMA, 1).expect("schema reinstalls after wipe");
    assert_eq!(db.user_version().expect("version should read"), 1);
}

#[test]
fn local_storage_reads_present_and_absent_keys() {
    let harness = DbHarness::new();
    let db = &harness.db;

    db.reset_database(TEST_SCHEMA, 1).expect("schema setup");

    assert_eq!(
        db.get_from_local_storage("missing").expect("absent key should not error"),
        None
    );

    db.migrate(
        "INSERT INTO local_storage (key, value) VALUES ('last_sync', '1736000000')",
        1,
        2,
    )
    .expect("seed row");

    assert_eq!(
        db.get_from_local_storage("last_sync").expect("present key should read"),
        Some("1736000000".to_string())
    );
}

#[test]
fn schema_compatibility_tracks_lifecycle() {
    let harness = DbHarness::new();
    let db = &harness.db;

    assert_eq!(
        db.schema_compatibility(3).expect("fresh database should report"),
        SchemaCompatibility::NeedsSetup
    );

    db.reset_database(TEST_SCHEMA, 3).expect("schema setup");
    assert_eq!(
        db.schema_compatibility(3).expect("matching version should report"),
        SchemaCompatibility::Compatible
    );
    assert_eq!(
        db.schema_compatibility(5).expect("older database should report"),
        SchemaCompatibility::NeedsMigration { from_version: 3 }
    );
}

#[test]
fn encrypted_database_requires_matching_key() {
    let temp_dir = TempDir::new().expect("temporary directory should be created");
    let db_path = temp_dir.path().join("encrypted.db");

    {
        let db = Database::open(
            DatabaseConfig::new(&db_path).with_encryption_key(TEST_DB_KEY),
        )
        .expect("encrypted database should open");
        db.reset_database(TEST_SCHEMA, 2).expect("schema setup");
        db.destroy().expect("teardown");
    }

    // Same key: data is readable
    {
        let db = Database::open(
            DatabaseConfig::new(&db_path).with_encryption_key(TEST_DB_KEY),
        )
        .expect("reopen with the same key");
        assert_eq!(db.user_version().expect("version should read"), 2);
    }

    // Wrong key: construction fails, nothing is readable
    let result = Database::open(
        DatabaseConfig::new(&db_path).with_encryption_key("wrong_key_aaaaaaaaaaaaaaaa"),
    );
    assert!(matches!(result, Err(StorageError::WrongKeyOrNotEncrypted)));
}

#[test]
fn exclusive_locking_and_temp_store_apply() {
    let harness = DbHarness::with_config(|config| {
        config.with_exclusive_locking(true).with_temp_store(TempStore::Memory)
    });

    // A structural operation under exclusive locking exercises the write path
    harness.db.reset_database(TEST_SCHEMA, 1).expect("reset under exclusive locking");
    assert_eq!(harness.db.user_version().expect("version should read"), 1);
}

#[test]
fn concurrent_callers_serialize_on_the_facade_lock() {
    let harness = DbHarness::new();
    harness.db.reset_database(TEST_SCHEMA, 1).expect("schema setup");

    let db = Arc::new(harness.db);
    let mut handles = Vec::new();

    for i in 0..8 {
        let db = Arc::clone(&db);
        handles.push(thread::spawn(move || {
            let key = format!("posts#{i}");
            db.mark_as_cached(&key);
            assert!(db.is_cached(&key));
            let _ = db.get_from_local_storage("missing").expect("lookup should succeed");
            db.get_all_tables().expect("enumeration should succeed")
        }));
    }

    for handle in handles {
        let tables = handle.join().expect("worker thread should finish");
        assert!(tables.contains(&"posts".to_string()));
    }
}

#[test]
fn metrics_track_transaction_outcomes() {
    let harness = DbHarness::new();
    let db = &harness.db;

    db.migrate("CREATE TABLE t (id INTEGER)", 0, 1).expect("migration should apply");
    db.migrate("CREATE TABLE t2 (id INTEGER)", 0, 2).expect_err("mismatch should fail");

    let snapshot = db.metrics().snapshot();
    assert!(snapshot.transactions_committed >= 1);
    assert!(snapshot.transactions_rolled_back >= 1);
}
