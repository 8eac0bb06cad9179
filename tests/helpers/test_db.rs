use oxilock::infrastructure::persistence::{Database, SqlConfiguration, SqlStorageAccessor};
use tempfile::TempDir;

/// File-based SQLite database living as long as the value.
pub struct TestDb {
    db: Database,
    _dir: TempDir,
}

impl TestDb {
    pub fn db(&self) -> Database {
        self.db.clone()
    }
}

pub async fn setup_test_db() -> TestDb {
    // Install drivers for AnyPool (required for tests)
    sqlx::any::install_default_drivers();

    // One file per test so tests can run in parallel
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let db_url = format!("sqlite://{}?mode=rwc", dir.path().join("locks.db").display());

    let db = Database::connect_with_max_connections(&db_url, 10)
        .await
        .expect("Failed to connect to test database");

    TestDb { db, _dir: dir }
}

/// SQL accessor over the default `shedlock` table, creating it if needed.
pub async fn sql_accessor(test_db: &TestDb, use_db_time: bool, locked_by: &str) -> SqlStorageAccessor {
    let config = SqlConfiguration::new()
        .with_use_db_time(use_db_time)
        .with_locked_by(locked_by);
    let accessor =
        SqlStorageAccessor::new(test_db.db(), config).expect("Failed to build SQL accessor");
    accessor
        .create_table_if_missing()
        .await
        .expect("Failed to create lock table");
    accessor
}
