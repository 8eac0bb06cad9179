use oxilock::{ClockProvider, LockConfiguration, LockProvider, LockingTaskExecutor};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

const WORKERS: usize = 8;
pub const SHORT_ITERATIONS: i64 = 10;

/// Increments shared counters from several workers coordinating through the
/// provider under test. A broken lock lets two workers read the same value and
/// one increment is lost.
pub struct FuzzTester {
    executor: LockingTaskExecutor,
    sleep_for: Duration,
    lock_at_most_for: Duration,
    iterations: i64,
}

#[derive(Clone)]
struct Job {
    lock_name: &'static str,
    lock_at_most_for: Duration,
    counter: Arc<AtomicI64>,
}

impl Job {
    fn new(lock_name: &'static str, lock_at_most_for: Duration) -> Self {
        Self {
            lock_name,
            lock_at_most_for,
            counter: Arc::new(AtomicI64::new(0)),
        }
    }

    fn lock_configuration(&self) -> LockConfiguration {
        LockConfiguration::new(
            ClockProvider::now(),
            self.lock_name,
            self.lock_at_most_for,
            Duration::from_millis(5),
        )
        .unwrap()
    }
}

impl FuzzTester {
    pub fn new(provider: Arc<dyn LockProvider>) -> Self {
        Self::with_settings(provider, Duration::from_millis(1), Duration::from_secs(300), 100)
    }

    pub fn with_settings(
        provider: Arc<dyn LockProvider>,
        sleep_for: Duration,
        lock_at_most_for: Duration,
        iterations: i64,
    ) -> Self {
        Self {
            executor: LockingTaskExecutor::new(provider),
            sleep_for,
            lock_at_most_for,
            iterations,
        }
    }

    pub async fn run(&self) {
        let job1 = Job::new("lock1", self.lock_at_most_for);
        let job2 = Job::new("lock2", self.lock_at_most_for);

        let mut handles = Vec::with_capacity(WORKERS);
        for worker in 0..WORKERS {
            // Worker 0 finishes early while the others keep competing
            let iterations = if worker == 0 {
                SHORT_ITERATIONS
            } else {
                self.iterations
            };
            let job = if worker % 2 == 0 { job1.clone() } else { job2.clone() };
            let executor = self.executor.clone();
            let sleep_for = self.sleep_for;

            handles.push(tokio::spawn(async move {
                run_worker(executor, job, iterations, sleep_for).await;
            }));
        }

        for handle in handles {
            handle.await.expect("Fuzz worker failed");
        }

        let half = (WORKERS / 2) as i64;
        assert_eq!(job2.counter.load(Ordering::SeqCst), half * self.iterations);
        assert_eq!(
            job1.counter.load(Ordering::SeqCst),
            (half - 1) * self.iterations + SHORT_ITERATIONS
        );

        // Let the last at-least-for window pass
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

async fn run_worker(executor: LockingTaskExecutor, job: Job, iterations: i64, sleep_for: Duration) {
    let mut done = 0;
    while done < iterations {
        let counter = job.counter.clone();
        let result = executor
            .execute_with_lock(job.lock_configuration(), |_| async move {
                let n = counter.load(Ordering::SeqCst);
                tokio::time::sleep(sleep_for).await;
                // Overwrites another worker's increment if locking is broken
                counter.store(n + 1, Ordering::SeqCst);
            })
            .await
            .expect("Lock attempt failed");

        if result.was_executed() {
            done += 1;
        } else {
            tokio::task::yield_now().await;
        }
    }
}
