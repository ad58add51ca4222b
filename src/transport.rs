use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};

use crate::error::BoxError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: StatusCode,
    pub body: String,
}

/// GET capability used by sources.
///
/// Implementations own their retry behaviour. A response with a failing status
/// is still an `Ok`; only a request that never produced a response is an `Err`.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(&self, url: &str) -> Result<HttpResponse, BoxError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff_factor: Duration,
    pub retry_statuses: Vec<StatusCode>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_factor: Duration::from_millis(100),
            retry_statuses: vec![
                StatusCode::TOO_MANY_REQUESTS,
                StatusCode::INTERNAL_SERVER_ERROR,
                StatusCode::BAD_GATEWAY,
                StatusCode::GATEWAY_TIMEOUT,
            ],
        }
    }
}

impl RetryPolicy {
    pub fn should_retry(&self, status: StatusCode) -> bool {
        self.retry_statuses.contains(&status)
    }

    /// Delay before retry number `attempt` (zero based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.backoff_factor
            .saturating_mul(2u32.saturating_pow(attempt))
    }
}

#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
    policy: RetryPolicy,
}

impl ReqwestTransport {
    pub fn new(policy: RetryPolicy) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self::with_client(client, policy))
    }

    pub fn with_client(client: Client, policy: RetryPolicy) -> Self {
        Self { client, policy }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn get(&self, url: &str) -> Result<HttpResponse, BoxError> {
        let mut attempt = 0;

        loop {
            match self.client.get(url).send().await {
                Ok(resp) => {
                    let status = resp.status();
                    if attempt < self.policy.max_retries && self.policy.should_retry(status) {
                        let delay = self.policy.backoff(attempt);
                        log::warn!("GET {} returned {}, retrying in {:?}", url, status, delay);
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                        continue;
                    }

                    let body = resp.text().await?;
                    return Ok(HttpResponse { status, body });
                }
                Err(err)
                    if attempt < self.policy.max_retries && (err.is_connect() || err.is_timeout()) =>
                {
                    let delay = self.policy.backoff(attempt);
                    log::warn!("GET {} failed: {}, retrying in {:?}", url, err, delay);
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err.into()),
            }
        }
    }
}
