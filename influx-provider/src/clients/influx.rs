//! Client for the InfluxDB v2 HTTP API.

use std::collections::BTreeSet;
use std::error::Error as _;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use super::{ApiError, Bucket, BucketApi, CreateBucketRequest, Label, UpdateBucketRequest};

/// Bounded retries for idempotent requests (GET, DELETE).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(200),
        }
    }
}

impl RetryPolicy {
    /// Single attempt, no retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff: Duration::ZERO,
        }
    }

    /// Delay before the attempt following `attempt` (1-based). Doubles each time.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        self.initial_backoff.saturating_mul(1 << exp)
    }
}

/// Error body returned by InfluxDB.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct LabelsResponse {
    #[serde(default)]
    labels: Vec<Label>,
}

/// Client for interacting with an InfluxDB v2 server.
#[derive(Debug, Clone)]
pub struct InfluxClient {
    http: reqwest::Client,
    base: Url,
    base_url: String,
    token: Option<String>,
    retry: RetryPolicy,
}

impl InfluxClient {
    pub fn new(
        base_url: &str,
        token: Option<String>,
        timeout: Duration,
        retry: RetryPolicy,
    ) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(transport_error)?;
        let base = Url::parse(base_url)
            .map_err(|e| ApiError::InvalidUrl(format!("{}: {}", base_url, e)))?;
        if base.cannot_be_a_base() {
            return Err(ApiError::InvalidUrl(base_url.to_string()));
        }
        Ok(Self {
            http,
            base,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.filter(|t| !t.is_empty()),
            retry,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// `/api/v2/` URL under the base. Each segment is percent-encoded.
    fn api_url(&self, segments: &[&str]) -> Result<Url, ApiError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| ApiError::InvalidUrl(self.base_url.clone()))?
            .pop_if_empty()
            .extend(["api", "v2"])
            .extend(segments);
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let mut req = self.http.request(method, url);
        if let Some(token) = &self.token {
            req = req.header("Authorization", format!("Token {}", token));
        }
        req.header("Accept", "application/json")
    }

    /// Send a request, retrying idempotent methods per the retry policy.
    async fn execute(
        &self,
        method: Method,
        url: &Url,
        body: Option<&Value>,
    ) -> Result<Response, ApiError> {
        let idempotent = method == Method::GET || method == Method::DELETE;
        let max_attempts = if idempotent {
            self.retry.max_attempts.max(1)
        } else {
            1
        };

        let mut attempt = 1;
        loop {
            let mut req = self.request(method.clone(), url.clone());
            if let Some(body) = body {
                req = req.json(body);
            }

            let result = match req.send().await {
                Ok(resp) => check_status(resp).await,
                Err(e) => Err(transport_error(e)),
            };

            match result {
                Err(e) if attempt < max_attempts && e.is_retryable() => {
                    let delay = self.retry.backoff(attempt);
                    warn!(
                        %method,
                        %url,
                        attempt,
                        error = %e,
                        "Request failed, retrying in {:?}",
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    async fn list_labels(&self, bucket_id: &str) -> Result<Vec<Label>, ApiError> {
        let url = self.api_url(&["buckets", bucket_id, "labels"])?;
        let resp = self.execute(Method::GET, &url, None).await?;
        let body: LabelsResponse = decode(resp).await?;
        Ok(body.labels)
    }

    /// Make the bucket's labels exactly `desired`.
    async fn sync_labels(&self, bucket_id: &str, desired: &[String]) -> Result<(), ApiError> {
        let current: BTreeSet<String> = self
            .list_labels(bucket_id)
            .await?
            .into_iter()
            .map(|l| l.id)
            .collect();
        let desired: BTreeSet<String> = desired.iter().cloned().collect();

        for label_id in desired.difference(&current) {
            debug!("Adding label {} to bucket {}", label_id, bucket_id);
            let url = self.api_url(&["buckets", bucket_id, "labels"])?;
            self.execute(Method::POST, &url, Some(&json!({ "labelID": label_id })))
                .await?;
        }

        for label_id in current.difference(&desired) {
            debug!("Removing label {} from bucket {}", label_id, bucket_id);
            let url = self.api_url(&["buckets", bucket_id, "labels", label_id.as_str()])?;
            self.execute(Method::DELETE, &url, None).await?;
        }

        Ok(())
    }
}

#[async_trait]
impl BucketApi for InfluxClient {
    async fn create_bucket(&self, req: &CreateBucketRequest) -> Result<Bucket, ApiError> {
        info!("Creating bucket {} at {}", req.name, self.base_url);
        let body = serde_json::to_value(req).map_err(|e| ApiError::Decode(e.to_string()))?;
        let url = self.api_url(&["buckets"])?;
        let resp = self.execute(Method::POST, &url, Some(&body)).await?;
        decode(resp).await
    }

    async fn get_bucket_by_id(&self, id: &str) -> Result<Bucket, ApiError> {
        debug!("Getting bucket {} from {}", id, self.base_url);
        let url = self.api_url(&["buckets", id])?;
        let resp = self.execute(Method::GET, &url, None).await?;
        decode(resp).await
    }

    async fn update_bucket(
        &self,
        id: &str,
        req: &UpdateBucketRequest,
    ) -> Result<Bucket, ApiError> {
        info!("Updating bucket {} ({}) at {}", req.name, id, self.base_url);
        let body = serde_json::to_value(req).map_err(|e| ApiError::Decode(e.to_string()))?;
        let url = self.api_url(&["buckets", id])?;
        let resp = self.execute(Method::PATCH, &url, Some(&body)).await?;
        let bucket = decode(resp).await?;

        self.sync_labels(id, &req.labels).await?;
        Ok(bucket)
    }

    async fn delete_bucket(&self, id: &str) -> Result<(), ApiError> {
        info!("Deleting bucket {} at {}", id, self.base_url);
        let url = self.api_url(&["buckets", id])?;
        self.execute(Method::DELETE, &url, None).await?;
        Ok(())
    }

    async fn set_bucket_labels(&self, id: &str, labels: &[String]) -> Result<(), ApiError> {
        info!("Setting {} labels on bucket {}", labels.len(), id);
        self.sync_labels(id, labels).await
    }
}

/// Map non-success statuses to [`ApiError`].
async fn check_status(resp: Response) -> Result<Response, ApiError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    let body = resp.text().await.unwrap_or_default();
    let message = match serde_json::from_str::<ErrorBody>(&body) {
        Ok(err) if !err.message.is_empty() => err.message,
        _ => body,
    };

    if status == StatusCode::NOT_FOUND {
        Err(ApiError::NotFound(message))
    } else {
        Err(ApiError::Status {
            status: status.as_u16(),
            message,
        })
    }
}

async fn decode<T: DeserializeOwned>(resp: Response) -> Result<T, ApiError> {
    let body = resp.bytes().await.map_err(transport_error)?;
    serde_json::from_slice(&body).map_err(|e| ApiError::Decode(e.to_string()))
}

/// Flatten a reqwest error and its sources into one message.
fn transport_error(e: reqwest::Error) -> ApiError {
    let mut message = e.to_string();
    let mut source = e.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    ApiError::Transport(message)
}
