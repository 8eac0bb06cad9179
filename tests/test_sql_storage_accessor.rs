mod helpers;

use helpers::test_db::{setup_test_db, sql_accessor};
use oxilock::infrastructure::persistence::{ColumnNames, SqlConfiguration, SqlStorageAccessor};
use oxilock::{ClockProvider, LockConfiguration, LockError, StorageAccessor};
use std::time::Duration;

const MY_LOCK: &str = "my-lock";
const OTHER_LOCK: &str = "other-lock";

fn lock_config(name: &str, lock_at_most_for: Duration) -> LockConfiguration {
    LockConfiguration::starting_now(name, lock_at_most_for, Duration::ZERO).unwrap()
}

async fn lock_until(accessor: &SqlStorageAccessor, name: &str) -> chrono::DateTime<chrono::Utc> {
    accessor
        .find_record(name)
        .await
        .unwrap()
        .expect("Lock record should exist")
        .lock_until
}

async fn should_not_update_on_insert_if_previous_did_not_end(use_db_time: bool) {
    let test_db = setup_test_db().await;
    let accessor = sql_accessor(&test_db, use_db_time, "host-a").await;

    assert!(accessor
        .insert_record(&lock_config(MY_LOCK, Duration::from_secs(10)))
        .await
        .unwrap());
    let original = lock_until(&accessor, MY_LOCK).await;

    assert!(!accessor
        .insert_record(&lock_config(MY_LOCK, Duration::from_secs(10)))
        .await
        .unwrap());
    assert_eq!(lock_until(&accessor, MY_LOCK).await, original);
}

#[tokio::test]
async fn test_insert_keeps_existing_record() {
    should_not_update_on_insert_if_previous_did_not_end(false).await;
}

#[tokio::test]
async fn test_insert_keeps_existing_record_using_db_time() {
    should_not_update_on_insert_if_previous_did_not_end(true).await;
}

async fn should_not_update_other_locks(use_db_time: bool) {
    let test_db = setup_test_db().await;
    let accessor = sql_accessor(&test_db, use_db_time, "host-a").await;

    let lock_at_most_for = Duration::from_millis(10);
    assert!(accessor
        .insert_record(&lock_config(MY_LOCK, lock_at_most_for))
        .await
        .unwrap());
    assert!(accessor
        .insert_record(&lock_config(OTHER_LOCK, lock_at_most_for))
        .await
        .unwrap());

    let my_lock_until = lock_until(&accessor, MY_LOCK).await;
    let other_lock_until = lock_until(&accessor, OTHER_LOCK).await;

    // Timestamps have millisecond precision
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(accessor
        .update_record(&lock_config(MY_LOCK, lock_at_most_for))
        .await
        .unwrap());

    assert!(lock_until(&accessor, MY_LOCK).await > my_lock_until);
    assert_eq!(lock_until(&accessor, OTHER_LOCK).await, other_lock_until);
}

#[tokio::test]
async fn test_update_leaves_other_locks_alone() {
    should_not_update_other_locks(false).await;
}

#[tokio::test]
async fn test_update_leaves_other_locks_alone_using_db_time() {
    should_not_update_other_locks(true).await;
}

async fn should_not_take_over_held_lock(use_db_time: bool) {
    let test_db = setup_test_db().await;
    let host_a = sql_accessor(&test_db, use_db_time, "host-a").await;
    let host_b = sql_accessor(&test_db, use_db_time, "host-b").await;

    let config = lock_config(MY_LOCK, Duration::from_secs(10));
    assert!(host_a.insert_record(&config).await.unwrap());

    assert!(!host_b.update_record(&lock_config(MY_LOCK, Duration::from_secs(10))).await.unwrap());

    let record = host_a.find_record(MY_LOCK).await.unwrap().unwrap();
    assert_eq!(record.locked_by, "host-a");
}

#[tokio::test]
async fn test_update_refuses_held_lock() {
    should_not_take_over_held_lock(false).await;
}

#[tokio::test]
async fn test_update_refuses_held_lock_using_db_time() {
    should_not_take_over_held_lock(true).await;
}

async fn should_take_over_expired_lock(use_db_time: bool) {
    let test_db = setup_test_db().await;
    let host_a = sql_accessor(&test_db, use_db_time, "host-a").await;
    let host_b = sql_accessor(&test_db, use_db_time, "host-b").await;

    assert!(host_a
        .insert_record(&lock_config(MY_LOCK, Duration::from_millis(10)))
        .await
        .unwrap());
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(host_b
        .update_record(&lock_config(MY_LOCK, Duration::from_secs(10)))
        .await
        .unwrap());

    let record = host_b.find_record(MY_LOCK).await.unwrap().unwrap();
    assert_eq!(record.locked_by, "host-b");
    assert!(record.is_held_at(ClockProvider::now()));
}

#[tokio::test]
async fn test_update_takes_over_expired_lock() {
    should_take_over_expired_lock(false).await;
}

#[tokio::test]
async fn test_update_takes_over_expired_lock_using_db_time() {
    should_take_over_expired_lock(true).await;
}

async fn should_extend_only_own_live_lock(use_db_time: bool) {
    let test_db = setup_test_db().await;
    let host_a = sql_accessor(&test_db, use_db_time, "host-a").await;
    let host_b = sql_accessor(&test_db, use_db_time, "host-b").await;

    assert!(host_a
        .insert_record(&lock_config(MY_LOCK, Duration::from_secs(10)))
        .await
        .unwrap());
    let record = host_a.find_record(MY_LOCK).await.unwrap().unwrap();

    let longer = lock_config(MY_LOCK, Duration::from_secs(60));
    assert!(!host_b.extend(&longer).await.unwrap());
    assert_eq!(host_a.find_record(MY_LOCK).await.unwrap().unwrap(), record);

    assert!(host_a.extend(&longer).await.unwrap());
    assert!(lock_until(&host_a, MY_LOCK).await > record.lock_until);
}

#[tokio::test]
async fn test_extend_requires_holder() {
    should_extend_only_own_live_lock(false).await;
}

#[tokio::test]
async fn test_extend_requires_holder_using_db_time() {
    should_extend_only_own_live_lock(true).await;
}

async fn should_not_extend_expired_lock(use_db_time: bool) {
    let test_db = setup_test_db().await;
    let accessor = sql_accessor(&test_db, use_db_time, "host-a").await;

    assert!(accessor
        .insert_record(&lock_config(MY_LOCK, Duration::from_millis(10)))
        .await
        .unwrap());
    tokio::time::sleep(Duration::from_millis(50)).await;
    let before = accessor.find_record(MY_LOCK).await.unwrap().unwrap();

    assert!(!accessor
        .extend(&lock_config(MY_LOCK, Duration::from_secs(10)))
        .await
        .unwrap());

    let after = accessor.find_record(MY_LOCK).await.unwrap().unwrap();
    assert_eq!(after, before);
}

#[tokio::test]
async fn test_extend_fails_after_expiry() {
    should_not_extend_expired_lock(false).await;
}

#[tokio::test]
async fn test_extend_fails_after_expiry_using_db_time() {
    should_not_extend_expired_lock(true).await;
}

async fn should_keep_lock_until_at_least_for(use_db_time: bool) {
    let test_db = setup_test_db().await;
    let host_a = sql_accessor(&test_db, use_db_time, "host-a").await;
    let host_b = sql_accessor(&test_db, use_db_time, "host-b").await;

    let config =
        LockConfiguration::starting_now(MY_LOCK, Duration::from_secs(10), Duration::from_secs(2))
            .unwrap();
    assert!(host_a.insert_record(&config).await.unwrap());

    host_a.unlock(&config).await.unwrap();

    let until = lock_until(&host_a, MY_LOCK).await;
    assert!(until > ClockProvider::now());
    assert!(until < config.lock_at_most_until());
    assert!(!host_b
        .update_record(&lock_config(MY_LOCK, Duration::from_secs(10)))
        .await
        .unwrap());
}

#[tokio::test]
async fn test_unlock_honours_at_least_for() {
    should_keep_lock_until_at_least_for(false).await;
}

#[tokio::test]
async fn test_unlock_honours_at_least_for_using_db_time() {
    should_keep_lock_until_at_least_for(true).await;
}

async fn should_release_immediately(use_db_time: bool) {
    let test_db = setup_test_db().await;
    let host_a = sql_accessor(&test_db, use_db_time, "host-a").await;
    let host_b = sql_accessor(&test_db, use_db_time, "host-b").await;

    let config = lock_config(MY_LOCK, Duration::from_secs(10));
    assert!(host_a.insert_record(&config).await.unwrap());
    host_a.unlock(&config).await.unwrap();

    assert!(host_b
        .update_record(&lock_config(MY_LOCK, Duration::from_secs(10)))
        .await
        .unwrap());
}

#[tokio::test]
async fn test_unlock_without_at_least_for_frees_lock() {
    should_release_immediately(false).await;
}

#[tokio::test]
async fn test_unlock_without_at_least_for_frees_lock_using_db_time() {
    should_release_immediately(true).await;
}

#[tokio::test]
async fn test_find_record_of_unknown_lock() {
    let test_db = setup_test_db().await;
    let accessor = sql_accessor(&test_db, false, "host-a").await;

    assert!(accessor.find_record("never-locked").await.unwrap().is_none());
}

#[tokio::test]
async fn test_custom_table_and_columns() {
    let test_db = setup_test_db().await;
    let config = SqlConfiguration::new()
        .with_table_name("job_locks")
        .with_column_names(ColumnNames {
            name: "lock_name".to_string(),
            lock_until: "held_until".to_string(),
            locked_at: "held_since".to_string(),
            locked_by: "held_by".to_string(),
        })
        .with_locked_by("host-a");
    let accessor = SqlStorageAccessor::new(test_db.db(), config).unwrap();
    accessor.create_table_if_missing().await.unwrap();

    let lock = lock_config(MY_LOCK, Duration::from_secs(10));
    assert!(accessor.insert_record(&lock).await.unwrap());

    let row: (String,) = sqlx::query_as("SELECT held_by FROM job_locks WHERE lock_name = ?")
        .bind(MY_LOCK)
        .fetch_one(test_db.db().pool())
        .await
        .unwrap();
    assert_eq!(row.0, "host-a");
}

#[tokio::test]
async fn test_missing_table_is_storage_error() {
    let test_db = setup_test_db().await;
    let config = SqlConfiguration::new().with_locked_by("host-a");
    let accessor = SqlStorageAccessor::new(test_db.db(), config).unwrap();

    let result = accessor
        .update_record(&lock_config(MY_LOCK, Duration::from_secs(10)))
        .await;
    assert!(matches!(result, Err(LockError::Storage { .. })));
}

#[tokio::test]
async fn test_rejects_empty_locked_by() {
    let test_db = setup_test_db().await;
    let config = SqlConfiguration::new().with_locked_by("");

    assert!(matches!(
        SqlStorageAccessor::new(test_db.db(), config),
        Err(LockError::InvalidConfiguration(_))
    ));
}
