use std::collections::HashSet;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use reqwest::Client;
use serde::Deserialize;
use url::Url;

use crate::config::{TwitterConfig, MAX_FETCH_RESULTS, MIN_FETCH_RESULTS};
use crate::{Error, Result};

/// Upper bound on timeline pages followed for one request
pub const MAX_PAGES: usize = 20;

/// Timeline query for one user over one window
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchTweetsRequest {
    pub max_results: u32,
    pub entity_id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

impl FetchTweetsRequest {
    pub fn validate(&self) -> Result<()> {
        if !(MIN_FETCH_RESULTS..=MAX_FETCH_RESULTS).contains(&self.max_results) {
            return Err(Error::Twitter(format!(
                "invalid max results parameter - can range from {} to {}",
                MIN_FETCH_RESULTS, MAX_FETCH_RESULTS
            )));
        }
        if self.start_time > self.end_time {
            return Err(Error::Twitter("start time is after end time".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tweet {
    pub id: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

/// Source of posts for an entity
#[async_trait]
pub trait TweetsFetcher: Send + Sync {
    async fn fetch_tweets(&self, request: &FetchTweetsRequest) -> Result<Vec<Tweet>>;
}

#[derive(Debug, Deserialize)]
struct TimelinePage {
    #[serde(default)]
    data: Vec<TweetPayload>,
    #[serde(default)]
    meta: PageMeta,
}

#[derive(Debug, Deserialize)]
struct TweetPayload {
    id: String,
    text: String,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Default, Deserialize)]
struct PageMeta {
    #[serde(default)]
    next_token: Option<String>,
}

impl From<TweetPayload> for Tweet {
    fn from(payload: TweetPayload) -> Self {
        Tweet {
            id: payload.id,
            text: payload.text,
            created_at: payload.created_at,
        }
    }
}

/// Twitter API v2 client for user timelines
#[derive(Debug)]
pub struct TwitterClient {
    client: Client,
    base_url: String,
}

impl TwitterClient {
    pub fn new(config: &TwitterConfig) -> Result<Self> {
        let bearer_token = config
            .bearer_token
            .clone()
            .ok_or_else(|| Error::Config("twitter.bearer_token is required".into()))?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .default_headers(Self::build_headers(&bearer_token)?)
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.clone(),
        })
    }

    fn build_headers(bearer_token: &str) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        let auth = HeaderValue::from_str(&format!("Bearer {}", bearer_token))
            .map_err(|e| Error::Config(format!("Invalid bearer token: {}", e)))?;
        headers.insert(AUTHORIZATION, auth);
        Ok(headers)
    }

    /// Build the timeline URL for one page
    fn timeline_url(&self, request: &FetchTweetsRequest, pagination_token: Option<&str>) -> Result<Url> {
        let base = self.base_url.trim_end_matches('/');
        let mut url = Url::parse(&format!("{}/users/{}/tweets", base, request.entity_id))?;

        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("max_results", &request.max_results.to_string())
                .append_pair("tweet.fields", "id,text,created_at")
                .append_pair(
                    "start_time",
                    &request.start_time.to_rfc3339_opts(SecondsFormat::Secs, true),
                )
                .append_pair(
                    "end_time",
                    &request.end_time.to_rfc3339_opts(SecondsFormat::Secs, true),
                );
            if let Some(token) = pagination_token {
                query.append_pair("pagination_token", token);
            }
        }

        Ok(url)
    }

    async fn fetch_page(&self, request: &FetchTweetsRequest, pagination_token: Option<&str>) -> Result<TimelinePage> {
        let url = self.timeline_url(request, pagination_token)?;
        tracing::debug!("Calling Twitter API with: {}", url);

        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::Twitter(format!("request failed with: {}", status)));
        }

        let body = response.text().await?;
        parse_page(&body)
    }
}

fn parse_page(body: &str) -> Result<TimelinePage> {
    Ok(serde_json::from_str(body)?)
}

/// Follow `next_token` across pages, concatenating tweets in page order.
///
/// Stops after `MAX_PAGES` pages or when the API hands back a token it already gave.
async fn collect_pages<F, Fut>(mut fetch_page: F) -> Result<Vec<Tweet>>
where
    F: FnMut(Option<String>) -> Fut,
    Fut: Future<Output = Result<TimelinePage>>,
{
    let mut tweets = Vec::new();
    let mut seen_tokens = HashSet::new();
    let mut next_token: Option<String> = None;

    for _ in 0..MAX_PAGES {
        let page = fetch_page(next_token.take()).await?;
        tweets.extend(page.data.into_iter().map(Tweet::from));

        match page.meta.next_token {
            Some(token) if token.is_empty() => return Ok(tweets),
            Some(token) => {
                if !seen_tokens.insert(token.clone()) {
                    tracing::warn!("Twitter API repeated pagination token {}, stopping", token);
                    return Ok(tweets);
                }
                next_token = Some(token);
            }
            None => return Ok(tweets),
        }
    }

    tracing::warn!("Stopped paging after {} pages", MAX_PAGES);
    Ok(tweets)
}

#[async_trait]
impl TweetsFetcher for TwitterClient {
    async fn fetch_tweets(&self, request: &FetchTweetsRequest) -> Result<Vec<Tweet>> {
        request.validate()?;

        let tweets = collect_pages(|token| async move {
            self.fetch_page(request, token.as_deref()).await
        })
        .await?;

        tracing::info!(
            entity = %request.entity_id,
            "Received response from Twitter API with {} tweets",
            tweets.len()
        );
        Ok(tweets)
    }
}
