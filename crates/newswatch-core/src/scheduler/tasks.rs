use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, error, info};

use super::pool::TaskPool;
use super::types::{EntityDirectory, Event, EventSink, JobRequest, JobResult};

/// Summary of one tick-cycle
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub entities: usize,
    pub failed_jobs: usize,
    pub timed_out_jobs: usize,
    pub events: usize,
    /// Whether the event batch reached the sink
    pub delivered: bool,
}

/// Everything one tick-cycle needs, cheap to clone into a spawned task
#[derive(Clone)]
pub(crate) struct TickCycle {
    pub(crate) directory: Arc<dyn EntityDirectory>,
    pub(crate) sink: Arc<dyn EventSink>,
    pub(crate) pool: TaskPool,
    pub(crate) tick_interval: Duration,
}

impl TickCycle {
    /// Run the full pipeline for a window ending now
    ///
    /// Failures never escape: a listing error ends the cycle early, job errors are
    /// skipped, and a sink error drops the batch.
    pub(crate) async fn run(self) -> CycleReport {
        let (window_start, window_end) = fetch_window(Utc::now(), self.tick_interval);
        info!(
            "Processing window {} - {}",
            window_start.to_rfc3339(),
            window_end.to_rfc3339()
        );

        let entities = match self.directory.list_entities().await {
            Ok(entities) => entities,
            Err(e) => {
                error!("Failed to list entities, skipping tick: {}", e);
                return CycleReport::default();
            }
        };

        let requests = build_requests(
            entities.iter().map(|e| e.external_id.as_str()),
            window_start,
            window_end,
        );
        let results = self.pool.run_batch(requests).await;
        info!("Tick done, got {} results", results.len());

        let mut report = CycleReport {
            entities: entities.len(),
            ..CycleReport::default()
        };
        for result in &results {
            if let Some(ref err) = result.error {
                report.failed_jobs += 1;
                if err.is_timeout() {
                    report.timed_out_jobs += 1;
                }
            }
        }

        let events = post_process(&results);
        report.events = events.len();

        match self.sink.send(events).await {
            Ok(()) => {
                report.delivered = true;
                if report.events > 0 {
                    info!("Delivered {} fake news events", report.events);
                }
            }
            Err(e) => {
                error!("Failed to deliver {} events: {}", report.events, e);
            }
        }

        report
    }
}

/// Window of width `tick_interval` ending at `now`
pub fn fetch_window(now: DateTime<Utc>, tick_interval: Duration) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = chrono::Duration::from_std(tick_interval)
        .ok()
        .and_then(|width| now.checked_sub_signed(width))
        .unwrap_or(DateTime::<Utc>::MIN_UTC);
    (start, now)
}

/// One request per entity, all sharing the same window
pub fn build_requests<'a>(
    external_ids: impl IntoIterator<Item = &'a str>,
    window_start: DateTime<Utc>,
    window_end: DateTime<Utc>,
) -> Vec<JobRequest> {
    external_ids
        .into_iter()
        .map(|id| JobRequest {
            entity_external_id: id.to_string(),
            window_start,
            window_end,
        })
        .collect()
}

/// Turn the derived items of every error-free result into events
///
/// Order follows the results, then the items within each result.
pub fn post_process(results: &[JobResult]) -> Vec<Event> {
    let mut events = Vec::new();

    for result in results {
        if let Some(ref err) = result.error {
            debug!(entity = %result.entity_external_id, "Skipping error result: {}", err);
            continue;
        }

        events.extend(result.derived_items.iter().map(|item| Event {
            entity_external_id: result.entity_external_id.clone(),
            timestamp: item.timestamp,
            content: item.content.clone(),
        }));
    }

    events
}
