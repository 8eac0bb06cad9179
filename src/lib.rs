pub mod application;
pub mod bootstrap;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod shared;

pub use application::services::{
    LockRecordRegistry, LockingTaskExecutor, StorageLockProvider, TaskResult,
};
pub use config::{Backend, Config, ConfigError};
pub use domain::entities::{HandleState, LockConfiguration, LockRecord, SimpleLock};
pub use domain::errors::{LockError, LockResult};
pub use domain::ports::clock::{Clock, ClockProvider};
pub use domain::ports::lock_provider::LockProvider;
pub use domain::ports::storage_accessor::StorageAccessor;
