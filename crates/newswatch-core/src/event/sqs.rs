//! AWS SQS event sink.

use async_trait::async_trait;
use aws_credential_types::Credentials;
use aws_sdk_sqs::config::{BehaviorVersion, Region};
use aws_sdk_sqs::types::{BatchResultErrorEntry, SendMessageBatchRequestEntry};
use aws_sdk_sqs::Client;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::QueueConfig;
use crate::scheduler::{Event, EventSink};
use crate::{Error, Result};

/// SQS accepts at most this many entries per batch request.
pub const SQS_MAX_BATCH: usize = 10;

/// Message body as read by downstream consumers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FakeNewsMessage {
    pub entity_id: String,
    pub tweet_content: String,
    pub tweet_timestamp: DateTime<Utc>,
}

impl From<&Event> for FakeNewsMessage {
    fn from(event: &Event) -> Self {
        Self {
            entity_id: event.entity_external_id.clone(),
            tweet_content: event.content.clone(),
            tweet_timestamp: event.timestamp,
        }
    }
}

/// Publishes events to an SQS queue
pub struct SqsEventSink {
    client: Client,
    queue_url: String,
}

impl SqsEventSink {
    pub async fn new(config: &QueueConfig) -> Result<Self> {
        let queue_url = config
            .queue_url
            .clone()
            .ok_or_else(|| Error::Config("queue.queue_url is required".into()))?;
        let region = config
            .region
            .clone()
            .ok_or_else(|| Error::Config("queue.region is required".into()))?;

        // Default credential chain (env, profile, instance role)
        let shared = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(region.clone()))
            .load()
            .await;
        let mut sqs_config = aws_sdk_sqs::config::Builder::from(&shared);

        if let (Some(key_id), Some(secret)) = (&config.access_key_id, &config.secret_access_key) {
            let creds = Credentials::new(
                key_id,
                secret,
                config.session_token.clone(),
                None,
                "newswatch-static",
            );
            sqs_config = sqs_config.credentials_provider(creds);
        }

        if let Some(endpoint) = config.endpoint_url.as_deref().filter(|e| !e.is_empty()) {
            let url = if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
                endpoint.to_string()
            } else {
                format!("https://{endpoint}")
            };
            sqs_config = sqs_config.endpoint_url(url);
        }

        let client = Client::from_conf(sqs_config.build());

        info!(queue_url = %queue_url, region = %region, "SQS event sink initialized");

        Ok(Self { client, queue_url })
    }
}

/// Encode events into SQS batch entries, at most `SQS_MAX_BATCH` per batch.
/// Entry ids are unique within a batch.
fn build_batches(events: &[Event]) -> Result<Vec<Vec<SendMessageBatchRequestEntry>>> {
    events
        .chunks(SQS_MAX_BATCH)
        .map(|chunk| {
            chunk
                .iter()
                .enumerate()
                .map(|(i, event)| {
                    let body = serde_json::to_string(&FakeNewsMessage::from(event))?;
                    SendMessageBatchRequestEntry::builder()
                        .id(i.to_string())
                        .message_body(body)
                        .build()
                        .map_err(|e| Error::Queue(format!("invalid batch entry: {e}")))
                })
                .collect()
        })
        .collect()
}

/// Fail the send if SQS rejected any entry of a batch
fn check_rejected(failed: &[BatchResultErrorEntry], sent: usize) -> Result<()> {
    match failed.first() {
        None => Ok(()),
        Some(first) => Err(Error::Queue(format!(
            "{} of {} messages rejected (first: {} {})",
            failed.len(),
            sent,
            first.code(),
            first.message().unwrap_or("no message")
        ))),
    }
}

#[async_trait]
impl EventSink for SqsEventSink {
    async fn send(&self, events: Vec<Event>) -> Result<()> {
        if events.is_empty() {
            return Ok(());
        }

        for entries in build_batches(&events)? {
            let count = entries.len();
            let resp = self
                .client
                .send_message_batch()
                .queue_url(&self.queue_url)
                .set_entries(Some(entries))
                .send()
                .await
                .map_err(|e| Error::Queue(format!("SQS send failed: {e:?}")))?;

            check_rejected(resp.failed(), count)?;
            debug!(count, "Sent SQS message batch");
        }

        info!("Published {} fake news events", events.len());
        Ok(())
    }
}
