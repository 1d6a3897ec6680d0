//! Talking-video provider HTTP client.

use std::time::Duration;

use reqwest::{Client, RequestBuilder};
use tracing::{debug, info, warn};

use crate::error::{AvatarError, AvatarResult};
use crate::types::{decode, GenerateRequest, JobHandle, JobPoll, StatusResponse, Submission, SubmitResponse};

/// Configuration for the provider client.
#[derive(Debug, Clone)]
pub struct AvatarConfig {
    /// Base URL of the provider API
    pub base_url: String,
    /// Bearer token, if the provider requires one
    pub api_key: Option<String>,
    /// Upstream WebSocket URL for streaming sessions
    pub stream_url: Option<String>,
    /// Request timeout
    pub timeout: Duration,
    /// Max retries for status requests
    pub max_retries: u32,
    /// First retry delay, doubled per attempt
    pub retry_base_delay: Duration,
}

impl Default for AvatarConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8010".to_string(),
            api_key: None,
            stream_url: None,
            timeout: Duration::from_secs(120),
            max_retries: 2,
            retry_base_delay: Duration::from_millis(500),
        }
    }
}

impl AvatarConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            base_url: std::env::var("AVATAR_API_URL")
                .map(|s| s.trim_end_matches('/').to_string())
                .unwrap_or(defaults.base_url),
            api_key: std::env::var("AVATAR_API_KEY").ok().filter(|k| !k.is_empty()),
            stream_url: std::env::var("AVATAR_STREAM_URL").ok().filter(|u| !u.is_empty()),
            timeout: Duration::from_secs(
                std::env::var("AVATAR_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(120),
            ),
            max_retries: std::env::var("AVATAR_RETRIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(2),
            retry_base_delay: defaults.retry_base_delay,
        }
    }
}

/// Client for the talking-video provider.
#[derive(Clone)]
pub struct AvatarClient {
    http: Client,
    config: AvatarConfig,
}

impl AvatarClient {
    /// Create a new client.
    pub fn new(config: AvatarConfig) -> AvatarResult<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("parley-avatar/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(AvatarError::Network)?;

        Ok(Self { http, config })
    }

    /// Create from environment variables.
    pub fn from_env() -> AvatarResult<Self> {
        Self::new(AvatarConfig::from_env())
    }

    pub fn config(&self) -> &AvatarConfig {
        &self.config
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.config.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }

    /// Submit a generation job.
    ///
    /// Only connection failures are retried: once the provider has seen the
    /// request, a second submission could start the same job twice.
    pub async fn submit(&self, request: &GenerateRequest) -> AvatarResult<Submission> {
        let url = format!("{}/v1/talking-video", self.config.base_url);
        debug!("Submitting talking-video job to {}", url);

        let body = self
            .with_retry(AvatarError::is_connect_failure, || async {
                let response = self
                    .authorized(self.http.post(&url))
                    .json(request)
                    .send()
                    .await?;

                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                if !status.is_success() {
                    return Err(AvatarError::from_status(status.as_u16(), body));
                }
                Ok(body)
            })
            .await?;

        let submission = decode::<SubmitResponse>(&body)?.into_submission()?;
        match &submission {
            Submission::Immediate { .. } => info!("Provider returned video immediately"),
            Submission::Pending { handle } => info!(handle = %handle, "Provider accepted job"),
        }
        Ok(submission)
    }

    /// Query the status of an async job.
    pub async fn status(&self, handle: &JobHandle) -> AvatarResult<JobPoll> {
        let url = format!(
            "{}/v1/talking-video/{}",
            self.config.base_url,
            urlencoding::encode(handle.as_str())
        );

        self.with_retry(AvatarError::is_retryable, || async {
            let response = self.authorized(self.http.get(&url)).send().await?;
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            if !status.is_success() {
                return Err(AvatarError::from_status(status.as_u16(), body));
            }
            Ok(decode::<StatusResponse>(&body)?.into())
        })
        .await
    }

    /// Check if the provider is reachable.
    pub async fn health_check(&self) -> bool {
        let url = format!("{}/health", self.config.base_url);
        match self.http.get(&url).send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                warn!("Avatar provider health check error: {}", e);
                false
            }
        }
    }

    /// Execute with retry logic, retrying errors accepted by `retryable`.
    async fn with_retry<F, Fut, T>(
        &self,
        retryable: fn(&AvatarError) -> bool,
        operation: F,
    ) -> AvatarResult<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = AvatarResult<T>>,
    {
        let mut attempt = 0u32;
        loop {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(e) if retryable(&e) && attempt < self.config.max_retries => {
                    let delay = self.config.retry_base_delay * 2u32.pow(attempt);
                    warn!(
                        "Provider request failed (attempt {}), retrying in {:?}: {}",
                        attempt + 1,
                        delay,
                        e
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
