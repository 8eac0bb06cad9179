use anyhow::Context;
use oxilock::bootstrap;
use oxilock::config::Config;
use oxilock::infrastructure::observability;
use oxilock::{ClockProvider, LockConfiguration, LockingTaskExecutor};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = Config::from_env().context("Failed to load configuration")?;

    // Initialize tracing and metrics
    let _guard = observability::init(&config)
        .map_err(|e| anyhow::anyhow!("Failed to initialize observability: {}", e))?;
    tracing::info!("Configuration loaded (backend: {})", config.backend);

    let provider = bootstrap::build_lock_provider(&config)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to build lock provider: {}", e))?;
    let executor = LockingTaskExecutor::new(provider);

    let mut ticker = tokio::time::interval(config.run_interval);
    tracing::info!(
        "Running '{}' every {:?} (at most for {:?}, at least for {:?})",
        config.task_name,
        config.run_interval,
        config.lock_at_most_for,
        config.lock_at_least_for
    );

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let lock_configuration = LockConfiguration::starting_now(
                    config.task_name.clone(),
                    config.lock_at_most_for,
                    config.lock_at_least_for,
                )?;

                let locked_by = config.locked_by.clone();
                let result = executor
                    .execute_with_lock(lock_configuration, |_| async move {
                        tracing::info!("'{}' ran at {}", locked_by, ClockProvider::now());
                    })
                    .await;

                match result {
                    Ok(outcome) if outcome.was_executed() => {}
                    Ok(_) => tracing::debug!("Skipped '{}', held elsewhere", config.task_name),
                    Err(e) => tracing::error!("Lock attempt for '{}' failed: {}", config.task_name, e),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutdown signal received");
                break;
            }
        }
    }

    Ok(())
}
