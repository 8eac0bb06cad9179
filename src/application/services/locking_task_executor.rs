use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::domain::entities::{LockConfiguration, SimpleLock};
use crate::domain::errors::{LockError, LockResult};
use crate::domain::ports::lock_provider::LockProvider;

/// Outcome of `execute_with_lock`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskResult<T> {
    executed: bool,
    result: Option<T>,
}

impl<T> TaskResult<T> {
    pub fn executed(result: T) -> Self {
        Self {
            executed: true,
            result: Some(result),
        }
    }

    pub fn not_executed() -> Self {
        Self {
            executed: false,
            result: None,
        }
    }

    pub fn was_executed(&self) -> bool {
        self.executed
    }

    pub fn result(&self) -> Option<&T> {
        self.result.as_ref()
    }

    pub fn into_result(self) -> Option<T> {
        self.result
    }
}

#[derive(Clone)]
struct ActiveLock {
    name: String,
    // Swapped by `extend_active_lock`; `None` once the lease is lost.
    handle: Arc<Mutex<Option<SimpleLock>>>,
}

/// Runs tasks under a named lock.
///
/// Each executor value carries the stack of locks held by the logical task
/// it was handed to. The task closure receives a child executor with the new
/// lock pushed; nested calls through that child for a name already on the
/// stack run without acquiring again. The stack travels with the value, so it
/// survives `.await` points and task migration between threads.
#[derive(Clone)]
pub struct LockingTaskExecutor {
    provider: Arc<dyn LockProvider>,
    active: Arc<Vec<ActiveLock>>,
}

impl LockingTaskExecutor {
    pub fn new(provider: Arc<dyn LockProvider>) -> Self {
        Self {
            provider,
            active: Arc::new(Vec::new()),
        }
    }

    /// Acquire the lock, run `task`, release the lock.
    ///
    /// Returns `TaskResult::not_executed()` without running the task when the
    /// lock is held elsewhere. The lock is released on every exit path,
    /// including a panic inside the task, which is resumed afterwards.
    pub async fn execute_with_lock<F, Fut, T>(
        &self,
        lock_configuration: LockConfiguration,
        task: F,
    ) -> LockResult<TaskResult<T>>
    where
        F: FnOnce(LockingTaskExecutor) -> Fut,
        Fut: Future<Output = T>,
    {
        let name = lock_configuration.name().to_string();

        if self.is_locked(&name) {
            debug!("Reentrant call, lock '{}' is already held", name);
            record_execution(&name, "reentrant");
            return Ok(TaskResult::executed(task(self.clone()).await));
        }

        let Some(lock) = self.provider.lock(&lock_configuration).await? else {
            info!("Not executing '{}'. It's locked.", name);
            record_execution(&name, "skipped");
            return Ok(TaskResult::not_executed());
        };

        let handle = Arc::new(Mutex::new(Some(lock)));
        let child = self.push(ActiveLock {
            name: name.clone(),
            handle: handle.clone(),
        });

        debug!("Executing task under lock '{}'", name);
        let outcome = AssertUnwindSafe(task(child)).catch_unwind().await;

        let held = handle.lock().await.take();
        match held {
            Some(mut lock) => {
                if let Err(e) = lock.unlock().await {
                    warn!("Lock '{}' was not released: {}", name, e);
                }
            }
            None => debug!("Lock '{}' was lost during execution", name),
        }
        record_execution(&name, "executed");

        match outcome {
            Ok(result) => Ok(TaskResult::executed(result)),
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }

    /// Whether the current context holds `name`.
    pub fn is_locked(&self, name: &str) -> bool {
        self.active.iter().any(|active| active.name == name)
    }

    /// Fails unless called from inside a task executed under a lock.
    pub fn assert_locked(&self) -> LockResult<()> {
        if self.active.is_empty() {
            return Err(LockError::NotLocked(
                "no lock is held by the current context".to_string(),
            ));
        }
        Ok(())
    }

    /// Extend the innermost lock held by this context. Durations are measured
    /// from now. The extended lease is the one released when the task ends.
    pub async fn extend_active_lock(
        &self,
        lock_at_most_for: Duration,
        lock_at_least_for: Duration,
    ) -> LockResult<()> {
        let active = self.active.last().ok_or_else(|| {
            LockError::NotLocked("no active lock to extend".to_string())
        })?;

        let mut slot = active.handle.lock().await;
        let Some(current) = slot.as_mut() else {
            return Err(LockError::ExtensionFailed(active.name.clone()));
        };

        match current.extend(lock_at_most_for, lock_at_least_for).await? {
            Some(extended) => {
                *slot = Some(extended);
                Ok(())
            }
            None => {
                *slot = None;
                Err(LockError::ExtensionFailed(active.name.clone()))
            }
        }
    }

    fn push(&self, lock: ActiveLock) -> LockingTaskExecutor {
        let mut active = Vec::with_capacity(self.active.len() + 1);
        active.extend(self.active.iter().cloned());
        active.push(lock);
        LockingTaskExecutor {
            provider: self.provider.clone(),
            active: Arc::new(active),
        }
    }
}

fn record_execution(name: &str, outcome: &'static str) {
    metrics::counter!(
        "oxilock_task_executions_total",
        "lock" => name.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}
