use async_trait::async_trait;
use tracing::info;

use crate::scheduler::{Event, EventSink};
use crate::Result;

/// Sink that only logs events; used for dry runs
#[derive(Debug, Default, Clone, Copy)]
pub struct LogEventSink;

#[async_trait]
impl EventSink for LogEventSink {
    async fn send(&self, events: Vec<Event>) -> Result<()> {
        for event in &events {
            info!(
                entity = %event.entity_external_id,
                timestamp = %event.timestamp,
                "Fake news: {}",
                event.content
            );
        }
        if !events.is_empty() {
            info!("Dry run: {} events not delivered", events.len());
        }
        Ok(())
    }
}
