//! The production job: fetch an entity's recent posts and keep the ones the
//! predictor flags as fake.

mod predictor;
mod twitter;

pub use predictor::{Classification, FakeNewsClassifier, PredictorClient};
pub use twitter::{FetchTweetsRequest, Tweet, TweetsFetcher, TwitterClient};

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::config::MAX_FETCH_RESULTS;
use crate::scheduler::{DerivedItem, JobError, JobFunction, JobRequest, JobResult};

pub const DEFAULT_FETCH_COUNT: u32 = MAX_FETCH_RESULTS;

/// Fetch-then-classify job for one entity
pub struct Processor {
    fetcher: Arc<dyn TweetsFetcher>,
    classifier: Arc<dyn FakeNewsClassifier>,
    fetch_count: u32,
}

impl Processor {
    pub fn new(fetcher: Arc<dyn TweetsFetcher>, classifier: Arc<dyn FakeNewsClassifier>) -> Self {
        Self {
            fetcher,
            classifier,
            fetch_count: DEFAULT_FETCH_COUNT,
        }
    }

    /// Page size used for timeline requests
    pub fn with_fetch_count(mut self, fetch_count: u32) -> Self {
        self.fetch_count = fetch_count;
        self
    }
}

#[async_trait]
impl JobFunction for Processor {
    async fn run(&self, request: JobRequest) -> JobResult {
        let entity_id = request.entity_external_id;
        let fetch = FetchTweetsRequest {
            max_results: self.fetch_count,
            entity_id: entity_id.clone(),
            start_time: request.window_start,
            end_time: request.window_end,
        };

        let tweets = match self.fetcher.fetch_tweets(&fetch).await {
            Ok(tweets) => tweets,
            Err(e) => {
                return JobResult::failed(entity_id, JobError::Failed(format!("failed fetching tweets: {}", e)))
            }
        };

        if tweets.is_empty() {
            debug!(entity = %entity_id, "No tweets in window");
            return JobResult::success(entity_id, Vec::new());
        }

        let texts: Vec<String> = tweets.iter().map(|t| t.text.clone()).collect();
        let verdicts = match self.classifier.classify(&texts).await {
            Ok(verdicts) => verdicts,
            Err(e) => {
                return JobResult::failed(entity_id, JobError::Failed(format!("failed classifying tweets: {}", e)))
            }
        };

        if verdicts.len() != tweets.len() {
            return JobResult::failed(
                entity_id,
                JobError::Failed(format!(
                    "classifier returned {} verdicts for {} tweets",
                    verdicts.len(),
                    tweets.len()
                )),
            );
        }

        let flagged: Vec<DerivedItem> = tweets
            .into_iter()
            .zip(verdicts)
            .filter(|(_, verdict)| *verdict == Classification::Fake)
            .map(|(tweet, _)| DerivedItem {
                content: tweet.text,
                timestamp: tweet.created_at,
            })
            .collect();

        debug!(entity = %entity_id, flagged = flagged.len(), "Classified {} tweets", texts.len());
        JobResult::success(entity_id, flagged)
    }
}
