//! Fetching through the ScrapingAnt rendering proxy, with fixed retry/backoff.

use crate::config::{ScraperConfig, PROXY_COUNTRY, PROXY_TYPE, SCRAPINGANT_API_URL};
use crate::error::{ConfigError, FetchError};
use async_trait::async_trait;
use reqwest::Client;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<String, FetchError>;
}

/// Waits `base * 2^attempt + floor` after each failed attempt except the last.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base: Duration,
    pub floor: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base: Duration::from_secs(1),
            floor: Duration::from_secs(5),
        }
    }

    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base: Duration::ZERO,
            floor: Duration::ZERO,
        }
    }

    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.base * 2u32.saturating_pow(attempt) + self.floor
    }
}

/// Runs `operation` until it succeeds or the policy's attempts are spent.
/// Every error is considered transient.
pub async fn retry<T, F, Fut>(
    policy: &RetryPolicy,
    url: &str,
    mut operation: F,
) -> Result<T, FetchError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, FetchError>>,
{
    let attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        match operation().await {
            Ok(value) => {
                if attempt > 0 {
                    debug!(url, "succeeded after {} retries", attempt);
                }
                return Ok(value);
            }
            Err(e) => {
                warn!(url, "Request failed (attempt {}/{}): {}", attempt + 1, attempts, e);
                if attempt + 1 >= attempts {
                    error!("Failed to fetch {} after {} attempts", url, attempts);
                    return Err(FetchError::Exhausted {
                        url: url.to_string(),
                        attempts,
                        last: Box::new(e),
                    });
                }
                let wait = policy.delay_for_attempt(attempt);
                info!("Waiting {:?} before retry...", wait);
                sleep(wait).await;
                attempt += 1;
            }
        }
    }
}

/// Client for the ScrapingAnt "general" endpoint with browser rendering and
/// French residential proxies.
pub struct ScrapingAntClient {
    client: Client,
    api_key: String,
    timeout: Duration,
    retry: RetryPolicy,
}

impl ScrapingAntClient {
    pub fn new(config: &ScraperConfig) -> Result<Self, ConfigError> {
        if config.api_key.trim().is_empty() {
            return Err(ConfigError::MissingApiKey {
                env: crate::config::API_KEY_ENV,
            });
        }

        let client = Client::builder()
            .build()
            .map_err(ConfigError::InvalidClient)?;

        Ok(Self {
            client,
            api_key: config.api_key.clone(),
            timeout: config.timeout,
            retry: RetryPolicy::new(config.max_retries),
        })
    }

    pub fn request_url(&self, target: &str) -> String {
        format!(
            "{}?url={}&x-api-key={}&browser=true&proxy_country={}&proxy_type={}",
            SCRAPINGANT_API_URL,
            urlencoding::encode(target),
            urlencoding::encode(&self.api_key),
            PROXY_COUNTRY,
            PROXY_TYPE,
        )
    }

    async fn fetch_once(&self, request_url: &str) -> Result<String, FetchError> {
        let response = self
            .client
            .get(request_url)
            .timeout(self.timeout)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        Ok(response.text().await?)
    }
}

#[async_trait]
impl PageFetcher for ScrapingAntClient {
    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        let request_url = self.request_url(url);
        retry(&self.retry, url, || self.fetch_once(&request_url)).await
    }
}
