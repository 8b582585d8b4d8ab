use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::config::PredictorConfig;
use crate::{Error, Result};

/// Verdict for a single post
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Real,
    Fake,
}

impl TryFrom<i64> for Classification {
    type Error = Error;

    fn try_from(value: i64) -> Result<Self> {
        match value {
            0 => Ok(Classification::Real),
            1 => Ok(Classification::Fake),
            other => Err(Error::Predictor(format!("unknown prediction value: {}", other))),
        }
    }
}

/// Classifies a batch of post texts; one verdict per text, same order
#[async_trait]
pub trait FakeNewsClassifier: Send + Sync {
    async fn classify(&self, texts: &[String]) -> Result<Vec<Classification>>;
}

#[derive(Debug, Serialize)]
struct PredictRequest<'a> {
    tweet: &'a str,
}

#[derive(Debug, Deserialize)]
struct PredictResponse {
    prediction: Vec<i64>,
}

/// HTTP client for the prediction service
#[derive(Debug)]
pub struct PredictorClient {
    client: Client,
    base_url: String,
}

impl PredictorClient {
    pub fn new(config: &PredictorConfig) -> Result<Self> {
        let base_url = config
            .base_url
            .clone()
            .ok_or_else(|| Error::Config("predictor.base_url is required".into()))?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self { client, base_url })
    }
}

fn build_body(texts: &[String]) -> Vec<PredictRequest<'_>> {
    texts.iter().map(|t| PredictRequest { tweet: t }).collect()
}

fn parse_predictions(body: &str) -> Result<Vec<Classification>> {
    let response: PredictResponse = serde_json::from_str(body)
        .map_err(|e| Error::Predictor(format!("error unmarshalling response: {}", e)))?;

    response
        .prediction
        .into_iter()
        .map(Classification::try_from)
        .collect()
}

#[async_trait]
impl FakeNewsClassifier for PredictorClient {
    async fn classify(&self, texts: &[String]) -> Result<Vec<Classification>> {
        let response = self
            .client
            .post(&self.base_url)
            .json(&build_body(texts))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Predictor(format!("request failed with: {}", status)));
        }

        let body = response.text().await?;
        parse_predictions(&body)
    }
}
