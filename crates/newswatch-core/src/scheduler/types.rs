use std::future::Future;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::entity::Entity;
use crate::Result;

/// Work for one entity over one tick window
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobRequest {
    pub entity_external_id: String,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
}

/// A flagged post produced by a successful job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivedItem {
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

/// Why a job produced no usable items
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JobError {
    #[error("job deadline exceeded")]
    DeadlineExceeded,

    #[error("job panicked: {0}")]
    Panicked(String),

    /// No result reached the collector, e.g. the worker task itself died
    #[error("job result was lost before collection")]
    Lost,

    #[error("{0}")]
    Failed(String),
}

impl JobError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, JobError::DeadlineExceeded)
    }
}

/// Outcome of one job; exactly one is produced per submitted request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobResult {
    pub entity_external_id: String,
    pub error: Option<JobError>,
    pub derived_items: Vec<DerivedItem>,
}

impl JobResult {
    pub fn success(entity_external_id: impl Into<String>, derived_items: Vec<DerivedItem>) -> Self {
        Self {
            entity_external_id: entity_external_id.into(),
            error: None,
            derived_items,
        }
    }

    pub fn failed(entity_external_id: impl Into<String>, error: JobError) -> Self {
        Self {
            entity_external_id: entity_external_id.into(),
            error: Some(error),
            derived_items: Vec::new(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// A fake news event ready for delivery
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub entity_external_id: String,
    pub timestamp: DateTime<Utc>,
    pub content: String,
}

/// Source of the entities tracked on each tick
#[async_trait]
pub trait EntityDirectory: Send + Sync {
    /// Return the full set of tracked entities
    async fn list_entities(&self) -> Result<Vec<Entity>>;
}

/// Per-entity job. Never fails outright; failures are carried in `JobResult::error`.
///
/// Called concurrently from several pool workers with different requests.
#[async_trait]
pub trait JobFunction: Send + Sync {
    async fn run(&self, request: JobRequest) -> JobResult;
}

#[async_trait]
impl<F, Fut> JobFunction for F
where
    F: Fn(JobRequest) -> Fut + Send + Sync,
    Fut: Future<Output = JobResult> + Send + 'static,
{
    async fn run(&self, request: JobRequest) -> JobResult {
        (self)(request).await
    }
}

/// Delivery target for the events of one tick
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Deliver a batch. An empty batch must succeed without side effects.
    async fn send(&self, events: Vec<Event>) -> Result<()>;
}
