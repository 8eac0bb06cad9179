use async_trait::async_trait;
use regex::Regex;
use sqlx::Row;
use std::sync::OnceLock;
use std::time::Duration;
use tracing::debug;

use crate::domain::entities::{LockConfiguration, LockRecord};
use crate::domain::errors::{LockError, LockResult};
use crate::domain::ports::clock::ClockProvider;
use crate::domain::ports::storage_accessor::StorageAccessor;
use crate::infrastructure::persistence::Database;
use crate::shared::utils::{format_timestamp, get_hostname, parse_timestamp};

/// Database "now" in the same text layout as `format_timestamp`.
const DB_NOW: &str = "strftime('%Y-%m-%dT%H:%M:%fZ', 'now')";
const DB_NOW_PLUS: &str = "strftime('%Y-%m-%dT%H:%M:%fZ', 'now', ?)";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnNames {
    pub name: String,
    pub lock_until: String,
    pub locked_at: String,
    pub locked_by: String,
}

impl Default for ColumnNames {
    fn default() -> Self {
        Self {
            name: "name".to_string(),
            lock_until: "lock_until".to_string(),
            locked_at: "locked_at".to_string(),
            locked_by: "locked_by".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SqlConfiguration {
    table_name: String,
    column_names: ColumnNames,
    use_db_time: bool,
    locked_by: String,
}

impl Default for SqlConfiguration {
    fn default() -> Self {
        Self {
            table_name: "shedlock".to_string(),
            column_names: ColumnNames::default(),
            use_db_time: false,
            locked_by: get_hostname(),
        }
    }
}

impl SqlConfiguration {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table_name(mut self, table_name: impl Into<String>) -> Self {
        self.table_name = table_name.into();
        self
    }

    pub fn with_column_names(mut self, column_names: ColumnNames) -> Self {
        self.column_names = column_names;
        self
    }

    /// Evaluate `now` on the database instead of the caller's clock.
    pub fn using_db_time(self) -> Self {
        self.with_use_db_time(true)
    }

    pub fn with_use_db_time(mut self, use_db_time: bool) -> Self {
        self.use_db_time = use_db_time;
        self
    }

    pub fn with_locked_by(mut self, locked_by: impl Into<String>) -> Self {
        self.locked_by = locked_by.into();
        self
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    pub fn column_names(&self) -> &ColumnNames {
        &self.column_names
    }

    pub fn use_db_time(&self) -> bool {
        self.use_db_time
    }

    pub fn locked_by(&self) -> &str {
        &self.locked_by
    }

    fn validate(&self) -> LockResult<()> {
        static IDENTIFIER: OnceLock<Regex> = OnceLock::new();
        let re = IDENTIFIER.get_or_init(|| {
            Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)?$")
                .expect("Invalid identifier regex")
        });

        let columns = &self.column_names;
        for identifier in [
            &self.table_name,
            &columns.name,
            &columns.lock_until,
            &columns.locked_at,
            &columns.locked_by,
        ] {
            if !re.is_match(identifier) {
                return Err(LockError::InvalidConfiguration(format!(
                    "'{}' is not a valid SQL identifier",
                    identifier
                )));
            }
        }
        if self.locked_by.is_empty() {
            return Err(LockError::InvalidConfiguration(
                "lockedBy can not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

struct Statements {
    insert: String,
    update: String,
    extend: String,
    unlock: String,
    select: String,
    create_table: String,
}

impl Statements {
    fn new(config: &SqlConfiguration) -> Self {
        let t = &config.table_name;
        let ColumnNames {
            name,
            lock_until,
            locked_at,
            locked_by,
        } = &config.column_names;

        let (insert, update, extend, unlock) = if config.use_db_time {
            (
                format!(
                    "INSERT INTO {t} ({name}, {lock_until}, {locked_at}, {locked_by}) \
                     VALUES (?, {DB_NOW_PLUS}, {DB_NOW}, ?) ON CONFLICT ({name}) DO NOTHING"
                ),
                format!(
                    "UPDATE {t} SET {lock_until} = {DB_NOW_PLUS}, {locked_at} = {DB_NOW}, {locked_by} = ? \
                     WHERE {name} = ? AND {lock_until} <= {DB_NOW}"
                ),
                format!(
                    "UPDATE {t} SET {lock_until} = {DB_NOW_PLUS} \
                     WHERE {name} = ? AND {locked_by} = ? AND {lock_until} > {DB_NOW}"
                ),
                format!(
                    "UPDATE {t} SET {lock_until} = \
                     MAX({DB_NOW}, strftime('%Y-%m-%dT%H:%M:%fZ', {locked_at}, ?)) \
                     WHERE {name} = ?"
                ),
            )
        } else {
            (
                format!(
                    "INSERT INTO {t} ({name}, {lock_until}, {locked_at}, {locked_by}) \
                     VALUES (?, ?, ?, ?) ON CONFLICT ({name}) DO NOTHING"
                ),
                format!(
                    "UPDATE {t} SET {lock_until} = ?, {locked_at} = ?, {locked_by} = ? \
                     WHERE {name} = ? AND {lock_until} <= ?"
                ),
                format!(
                    "UPDATE {t} SET {lock_until} = ? \
                     WHERE {name} = ? AND {locked_by} = ? AND {lock_until} > ?"
                ),
                format!("UPDATE {t} SET {lock_until} = ? WHERE {name} = ?"),
            )
        };

        let select = format!(
            "SELECT {name} AS name, {lock_until} AS lock_until, {locked_at} AS locked_at, \
             {locked_by} AS locked_by FROM {t} WHERE {name} = ?"
        );
        let create_table = format!(
            "CREATE TABLE IF NOT EXISTS {t} (\
             {name} VARCHAR(64) NOT NULL, \
             {lock_until} TEXT NOT NULL, \
             {locked_at} TEXT NOT NULL, \
             {locked_by} VARCHAR(255) NOT NULL, \
             PRIMARY KEY ({name}))"
        );

        Self {
            insert,
            update,
            extend,
            unlock,
            select,
            create_table,
        }
    }
}

/// Relational accessor for SQLite through the sqlx `Any` driver.
///
/// Timestamps are stored as fixed-width UTC text so that `<=`/`>` compare in
/// time order. With `use_db_time` every predicate and write uses the database
/// clock inside the statement.
pub struct SqlStorageAccessor {
    db: Database,
    config: SqlConfiguration,
    statements: Statements,
}

impl SqlStorageAccessor {
    pub fn new(db: Database, config: SqlConfiguration) -> LockResult<Self> {
        config.validate()?;
        let statements = Statements::new(&config);
        Ok(Self {
            db,
            config,
            statements,
        })
    }

    pub fn configuration(&self) -> &SqlConfiguration {
        &self.config
    }

    /// Create the lock table with `name` as primary key if it is missing.
    pub async fn create_table_if_missing(&self) -> LockResult<()> {
        sqlx::query(&self.statements.create_table)
            .execute(self.db.pool())
            .await?;
        Ok(())
    }

    /// Read the current record for `name`.
    pub async fn find_record(&self, name: &str) -> LockResult<Option<LockRecord>> {
        let row = sqlx::query(&self.statements.select)
            .bind(name)
            .fetch_optional(self.db.pool())
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let lock_until: String = row.try_get("lock_until")?;
        let locked_at: String = row.try_get("locked_at")?;

        Ok(Some(LockRecord {
            name: row.try_get("name")?,
            lock_until: parse_column(&lock_until)?,
            locked_at: parse_column(&locked_at)?,
            locked_by: row.try_get("locked_by")?,
        }))
    }
}

#[async_trait]
impl StorageAccessor for SqlStorageAccessor {
    async fn insert_record(&self, lock_configuration: &LockConfiguration) -> LockResult<bool> {
        let query = sqlx::query(&self.statements.insert).bind(lock_configuration.name());
        let query = if self.config.use_db_time {
            query
                .bind(sqlite_modifier(lock_configuration.lock_at_most_for()))
                .bind(self.config.locked_by.as_str())
        } else {
            query
                .bind(format_timestamp(lock_configuration.lock_at_most_until()))
                .bind(format_timestamp(ClockProvider::now()))
                .bind(self.config.locked_by.as_str())
        };

        match query.execute(self.db.pool()).await {
            Ok(result) => Ok(result.rows_affected() > 0),
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                debug!(
                    "Lock record '{}' already exists",
                    lock_configuration.name()
                );
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn update_record(&self, lock_configuration: &LockConfiguration) -> LockResult<bool> {
        let query = sqlx::query(&self.statements.update);
        let query = if self.config.use_db_time {
            query
                .bind(sqlite_modifier(lock_configuration.lock_at_most_for()))
                .bind(self.config.locked_by.as_str())
                .bind(lock_configuration.name())
        } else {
            let now = format_timestamp(ClockProvider::now());
            query
                .bind(format_timestamp(lock_configuration.lock_at_most_until()))
                .bind(now.clone())
                .bind(self.config.locked_by.as_str())
                .bind(lock_configuration.name())
                .bind(now)
        };

        let result = query.execute(self.db.pool()).await.map_err(|e| {
            LockError::storage_with_source(
                format!("Unexpected exception when locking '{}'", lock_configuration.name()),
                e,
            )
        })?;
        Ok(result.rows_affected() > 0)
    }

    async fn extend(&self, lock_configuration: &LockConfiguration) -> LockResult<bool> {
        let query = sqlx::query(&self.statements.extend);
        let query = if self.config.use_db_time {
            query
                .bind(sqlite_modifier(lock_configuration.lock_at_most_for()))
                .bind(lock_configuration.name())
                .bind(self.config.locked_by.as_str())
        } else {
            query
                .bind(format_timestamp(lock_configuration.lock_at_most_until()))
                .bind(lock_configuration.name())
                .bind(self.config.locked_by.as_str())
                .bind(format_timestamp(ClockProvider::now()))
        };

        let result = query.execute(self.db.pool()).await.map_err(|e| {
            LockError::storage_with_source(
                format!("Unexpected exception when extending '{}'", lock_configuration.name()),
                e,
            )
        })?;
        Ok(result.rows_affected() > 0)
    }

    async fn unlock(&self, lock_configuration: &LockConfiguration) -> LockResult<()> {
        let query = sqlx::query(&self.statements.unlock);
        let query = if self.config.use_db_time {
            query
                .bind(sqlite_modifier(lock_configuration.lock_at_least_for()))
                .bind(lock_configuration.name())
        } else {
            query
                .bind(format_timestamp(lock_configuration.unlock_time()))
                .bind(lock_configuration.name())
        };

        query.execute(self.db.pool()).await.map_err(|e| {
            LockError::storage_with_source(
                format!("Unexpected exception when unlocking '{}'", lock_configuration.name()),
                e,
            )
        })?;
        Ok(())
    }
}

/// SQLite date modifier shifting a time value forward by `duration`.
fn sqlite_modifier(duration: Duration) -> String {
    format!("+{:.3} seconds", duration.as_secs_f64())
}

fn parse_column(value: &str) -> LockResult<chrono::DateTime<chrono::Utc>> {
    parse_timestamp(value).map_err(|e| {
        LockError::storage_with_source(format!("Invalid timestamp '{}' in lock table", value), e)
    })
}
