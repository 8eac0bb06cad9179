//! Redis lock backend
//!
//! Key-value flavour of the lock protocol. The whole record is one value
//! stored under `<key_prefix>:<env>:<name>` and the lease is the key's expiry.
//!
//! ## Commands
//!
//! - acquire: `SET key value NX PX lock_at_most_for`
//! - extend: Lua script, `SET key value XX PX` only if the value belongs to this holder
//! - release: Lua script, `DEL` or shorten to the remaining at-least-for, only
//!   for this holder
//!
//! Expiry is tracked by the Redis server, so the server clock decides when a
//! lease ends regardless of the caller's clock.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::aio::ConnectionManager;
use redis::Script;
use serde::Serialize;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tracing::debug;

use crate::domain::entities::LockConfiguration;
use crate::domain::errors::{LockError, LockResult};
use crate::domain::ports::clock::ClockProvider;
use crate::domain::ports::storage_accessor::StorageAccessor;
use crate::shared::utils::{format_timestamp, get_hostname};

pub const DEFAULT_KEY_PREFIX: &str = "job-lock";
pub const DEFAULT_ENV: &str = "default";

// ARGV[1] is the holder prefix; the rest of an owned value has no '@'.
const EXTEND_SCRIPT: &str = r#"
local value = redis.call('GET', KEYS[1])
local len = string.len(ARGV[1])
if value and string.sub(value, 1, len) == ARGV[1]
    and not string.find(value, '@', len + 1, true) then
    redis.call('SET', KEYS[1], ARGV[2], 'XX', 'PX', ARGV[3])
    return 1
end
return 0
"#;

const UNLOCK_SCRIPT: &str = r#"
local value = redis.call('GET', KEYS[1])
local len = string.len(ARGV[1])
if value and string.sub(value, 1, len) == ARGV[1]
    and not string.find(value, '@', len + 1, true) then
    if tonumber(ARGV[2]) > 0 then
        redis.call('SET', KEYS[1], value, 'XX', 'PX', ARGV[2])
    else
        redis.call('DEL', KEYS[1])
    end
    return 1
end
return 0
"#;

/// Encodes the lock value. A value written for a holder is
/// `holder_prefix(holder)` followed by a suffix without `@`, so holder `a`
/// never matches a value written by holder `a@b`.
pub trait ValueSerializer: Send + Sync {
    fn serialize(&self, holder: &str, lock_until: DateTime<Utc>) -> String;

    fn holder_prefix(&self, holder: &str) -> String;

    /// Same ownership test the extend and unlock scripts run on the server.
    fn is_held_by(&self, value: &str, holder: &str) -> bool {
        value
            .strip_prefix(self.holder_prefix(holder).as_str())
            .is_some_and(|rest| !rest.contains('@'))
    }
}

/// `holder@lock_until`
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultValueSerializer;

impl ValueSerializer for DefaultValueSerializer {
    fn serialize(&self, holder: &str, lock_until: DateTime<Utc>) -> String {
        format!("{}{}", self.holder_prefix(holder), format_timestamp(lock_until))
    }

    fn holder_prefix(&self, holder: &str) -> String {
        format!("{}@", holder)
    }
}

#[derive(Serialize)]
struct LockValue<'a> {
    locked_by: &'a str,
    lock_until: String,
}

/// `{"locked_by":"holder","lock_until":"..."}`
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonValueSerializer;

impl ValueSerializer for JsonValueSerializer {
    fn serialize(&self, holder: &str, lock_until: DateTime<Utc>) -> String {
        let value = LockValue {
            locked_by: holder,
            lock_until: format_timestamp(lock_until),
        };
        serde_json::to_string(&value).unwrap_or_else(|_| self.holder_prefix(holder))
    }

    fn holder_prefix(&self, holder: &str) -> String {
        let holder = serde_json::to_string(holder).unwrap_or_default();
        format!("{{\"locked_by\":{},", holder)
    }
}

pub struct RedisStorageAccessor {
    connection: ConnectionManager,
    env: String,
    key_prefix: String,
    locked_by: String,
    serializer: Arc<dyn ValueSerializer>,
}

impl RedisStorageAccessor {
    /// Accessor on an already configured connection, holder = hostname.
    pub fn new(connection: ConnectionManager, env: impl Into<String>) -> Self {
        Self {
            connection,
            env: env.into(),
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            locked_by: get_hostname(),
            serializer: Arc::new(DefaultValueSerializer),
        }
    }

    /// Connect to `redis_url` and build an accessor on a managed connection.
    pub async fn connect(redis_url: &str, env: impl Into<String>) -> LockResult<Self> {
        let client = redis::Client::open(redis_url).map_err(|e| {
            LockError::storage_with_source(format!("Failed to create Redis client: {}", e), e)
        })?;
        let connection = ConnectionManager::new(client).await?;
        Ok(Self::new(connection, env))
    }

    pub fn with_key_prefix(mut self, key_prefix: impl Into<String>) -> Self {
        self.key_prefix = key_prefix.into();
        self
    }

    pub fn with_locked_by(mut self, locked_by: impl Into<String>) -> Self {
        self.locked_by = locked_by.into();
        self
    }

    pub fn with_serializer(mut self, serializer: Arc<dyn ValueSerializer>) -> Self {
        self.serializer = serializer;
        self
    }

    pub fn key(&self, name: &str) -> String {
        build_key(&self.key_prefix, &self.env, name)
    }

    /// Raw value currently stored for `name`.
    pub async fn find_value(&self, name: &str) -> LockResult<Option<String>> {
        let mut connection = self.connection.clone();
        let value: Option<String> = redis::cmd("GET")
            .arg(self.key(name))
            .query_async(&mut connection)
            .await?;
        Ok(value)
    }

    /// Whether the stored value for `name` belongs to this holder.
    pub async fn is_held_by_me(&self, name: &str) -> LockResult<bool> {
        Ok(self
            .find_value(name)
            .await?
            .is_some_and(|value| self.serializer.is_held_by(&value, &self.locked_by)))
    }

    async fn set_if_absent(&self, lock_configuration: &LockConfiguration) -> LockResult<bool> {
        let key = self.key(lock_configuration.name());
        let value = self
            .serializer
            .serialize(&self.locked_by, lock_configuration.lock_at_most_until());

        let mut connection = self.connection.clone();
        let reply: Option<String> = redis::cmd("SET")
            .arg(&key)
            .arg(value)
            .arg("NX")
            .arg("PX")
            .arg(expiry_millis(lock_configuration.lock_at_most_for()))
            .query_async(&mut connection)
            .await?;

        debug!("SET NX on '{}' returned {:?}", key, reply);
        Ok(reply.is_some())
    }
}

pub fn build_key(key_prefix: &str, env: &str, name: &str) -> String {
    format!("{}:{}:{}", key_prefix, env, name)
}

/// `PX` must be positive.
fn expiry_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX).max(1)
}

fn extend_script() -> &'static Script {
    static SCRIPT: OnceLock<Script> = OnceLock::new();
    SCRIPT.get_or_init(|| Script::new(EXTEND_SCRIPT))
}

fn unlock_script() -> &'static Script {
    static SCRIPT: OnceLock<Script> = OnceLock::new();
    SCRIPT.get_or_init(|| Script::new(UNLOCK_SCRIPT))
}

#[async_trait]
impl StorageAccessor for RedisStorageAccessor {
    async fn insert_record(&self, lock_configuration: &LockConfiguration) -> LockResult<bool> {
        self.set_if_absent(lock_configuration).await
    }

    // An expired lease has no key any more, so taking it over is the same
    // conditional SET as creating it.
    async fn update_record(&self, lock_configuration: &LockConfiguration) -> LockResult<bool> {
        self.set_if_absent(lock_configuration).await
    }

    async fn extend(&self, lock_configuration: &LockConfiguration) -> LockResult<bool> {
        let value = self
            .serializer
            .serialize(&self.locked_by, lock_configuration.lock_at_most_until());

        let mut connection = self.connection.clone();
        let extended: i64 = extend_script()
            .key(self.key(lock_configuration.name()))
            .arg(self.serializer.holder_prefix(&self.locked_by))
            .arg(value)
            .arg(expiry_millis(lock_configuration.lock_at_most_for()))
            .invoke_async(&mut connection)
            .await?;
        Ok(extended == 1)
    }

    async fn unlock(&self, lock_configuration: &LockConfiguration) -> LockResult<()> {
        let keep_for = lock_configuration.lock_at_least_until() - ClockProvider::now();
        let keep_for_millis = keep_for.num_milliseconds().max(0);

        let mut connection = self.connection.clone();
        let _released: i64 = unlock_script()
            .key(self.key(lock_configuration.name()))
            .arg(self.serializer.holder_prefix(&self.locked_by))
            .arg(keep_for_millis)
            .invoke_async(&mut connection)
            .await?;
        Ok(())
    }
}
