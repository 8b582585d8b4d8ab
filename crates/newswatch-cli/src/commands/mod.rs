pub mod entity;
pub mod once;
pub mod run;

use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use newswatch_core::{
    event::{LogEventSink, SqsEventSink},
    processor::{PredictorClient, Processor, TwitterClient},
    scheduler::{EventSink, Scheduler},
    storage::{Database, SqlEntityDirectory},
    AppConfig,
};

/// Wire the production collaborators into a stopped scheduler
pub async fn build_scheduler(config: &AppConfig, db: Arc<Database>, dry_run: bool) -> Result<Scheduler> {
    config.validate_for_daemon(dry_run)?;

    let fetcher = Arc::new(TwitterClient::new(&config.twitter)?);
    let classifier = Arc::new(PredictorClient::new(&config.predictor)?);
    let processor = Processor::new(fetcher, classifier).with_fetch_count(config.twitter.max_results);

    let sink: Arc<dyn EventSink> = if dry_run {
        info!("Dry run: events will be logged, not published");
        Arc::new(LogEventSink)
    } else {
        Arc::new(SqsEventSink::new(&config.queue).await?)
    };

    Ok(Scheduler::new(config.worker_settings())
        .with_directory(Arc::new(SqlEntityDirectory::new(db)))
        .with_job(Arc::new(processor))
        .with_event_sink(sink))
}
