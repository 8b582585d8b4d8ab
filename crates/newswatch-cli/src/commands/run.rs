use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use newswatch_core::{storage::Database, AppConfig};

/// Run the poller until Ctrl+C or SIGTERM
pub async fn run(db: Arc<Database>, config: &AppConfig, dry_run: bool) -> Result<()> {
    let scheduler = super::build_scheduler(config, db, dry_run).await?;
    scheduler.run()?;

    println!("Poller started. Press Ctrl+C to stop.");
    println!("  Interval: {} seconds", config.worker.interval_secs);
    println!("  Job timeout: {} ms", config.worker.job_timeout_ms);
    println!("  Workers: {}", config.worker.worker_count);

    wait_for_shutdown_signal().await?;
    info!("Received shutdown signal");

    // Let in-flight cycles deliver before the process exits
    scheduler.shutdown().await;
    println!("Poller stopped.");

    Ok(())
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() -> Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        res = tokio::signal::ctrl_c() => res?,
        _ = terminate.recv() => {}
    }
    Ok(())
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() -> Result<()> {
    tokio::signal::ctrl_c().await?;
    Ok(())
}
