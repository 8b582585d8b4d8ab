use std::sync::Arc;

use anyhow::Result;

use newswatch_core::{storage::Database, AppConfig};

/// Execute a single tick-cycle and print what happened
pub async fn run(db: Arc<Database>, config: &AppConfig, dry_run: bool) -> Result<()> {
    let scheduler = super::build_scheduler(config, db, dry_run).await?;
    let report = scheduler.run_cycle_now().await?;

    println!("Entities processed: {}", report.entities);
    if report.failed_jobs > 0 {
        println!(
            "Failed jobs: {} ({} timed out)",
            report.failed_jobs, report.timed_out_jobs
        );
    }
    println!("Fake news events: {}", report.events);
    if !report.delivered {
        println!("Warning: events were not delivered, see the log for details.");
    }

    Ok(())
}
