pub mod locking_task_executor;
pub mod storage_lock_provider;

pub use locking_task_executor::{LockingTaskExecutor, TaskResult};
pub use storage_lock_provider::{LockRecordRegistry, StorageLockProvider};
