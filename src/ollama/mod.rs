//! Blocking HTTP plumbing shared by the Ollama embedding and chat clients.


use anyhow::{Context, Result, anyhow};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, warn};
use url::Url;

use crate::config::OllamaConfig;

const DEFAULT_BACKOFF_BASE: Duration = Duration::from_secs(1);

/// How often, and how patiently, a failed request is repeated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles on each further attempt
    pub backoff_base: Duration,
}

impl RetryPolicy {
    /// Single attempt, no retries
    #[inline]
    pub const fn none() -> Self {
        Self {
            max_attempts: 1,
            backoff_base: DEFAULT_BACKOFF_BASE,
        }
    }

    #[inline]
    pub const fn exponential(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            backoff_base: DEFAULT_BACKOFF_BASE,
        }
    }

    #[inline]
    pub const fn with_backoff_base(mut self, backoff_base: Duration) -> Self {
        self.backoff_base = backoff_base;
        self
    }

    /// Delay to wait after the given (1-based) failed attempt
    #[inline]
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.backoff_base
            .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
    }
}

impl Default for RetryPolicy {
    #[inline]
    fn default() -> Self {
        Self::none()
    }
}

#[derive(Debug, Deserialize)]
pub struct ModelInfo {
    pub name: String,
    pub size: Option<u64>,
    pub digest: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ModelsResponse {
    models: Vec<ModelInfo>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: String,
}

/// Failure of a single HTTP attempt
#[derive(Debug)]
enum AttemptError {
    Status { status: u16, body: String },
    Transport(ureq::Error),
}

impl AttemptError {
    fn is_retryable(&self) -> bool {
        match self {
            Self::Status { status, .. } => *status >= 500,
            Self::Transport(
                ureq::Error::ConnectionFailed
                | ureq::Error::HostNotFound
                | ureq::Error::Timeout(_)
                | ureq::Error::Io(_),
            ) => true,
            Self::Transport(_) => false,
        }
    }

    fn into_error(self) -> anyhow::Error {
        match self {
            Self::Status { status, body } => {
                let message = serde_json::from_str::<ErrorResponse>(&body)
                    .map_or(body, |parsed| parsed.error);
                anyhow!("HTTP {}: {}", status, message)
            }
            Self::Transport(error) => anyhow!("Request error: {}", error),
        }
    }
}

/// Connection to one Ollama server
#[derive(Debug, Clone)]
pub struct OllamaTransport {
    base_url: Url,
    agent: ureq::Agent,
    retry: RetryPolicy,
}

impl OllamaTransport {
    #[inline]
    pub fn new(config: &OllamaConfig) -> Result<Self> {
        let base_url = config
            .ollama_url()
            .context("Failed to generate Ollama URL from config")?;

        Ok(Self {
            base_url,
            agent: build_agent(config.timeout()),
            retry: RetryPolicy::none(),
        })
    }

    #[inline]
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.agent = build_agent(timeout);
        self
    }

    #[inline]
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    #[inline]
    pub const fn base_url(&self) -> &Url {
        &self.base_url
    }

    #[inline]
    pub const fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// Check that the server answers at all
    #[inline]
    pub fn ping(&self) -> Result<()> {
        self.get_text("/api/version")
            .context("Failed to ping Ollama server")?;
        debug!("Server ping successful");
        Ok(())
    }

    /// List all models installed on the server
    #[inline]
    pub fn list_models(&self) -> Result<Vec<ModelInfo>> {
        let response: ModelsResponse = self.get_json("/api/tags").context("Failed to fetch models")?;
        debug!("Found {} models", response.models.len());
        Ok(response.models)
    }

    /// Fail unless `model` is installed; accepts names with or without the `:latest` tag
    #[inline]
    pub fn validate_model(&self, model: &str) -> Result<()> {
        let models = self.list_models().context("Failed to list models")?;
        let tagged = format!("{model}:latest");

        if models.iter().any(|m| m.name == model || m.name == tagged) {
            debug!("Model {} is available", model);
            return Ok(());
        }

        let available: Vec<&str> = models.iter().map(|m| m.name.as_str()).collect();
        warn!(
            "Model {} not found. Available models: {:?}",
            model, available
        );
        Err(anyhow!(
            "Model '{}' is not available. Available models: {:?}",
            model,
            available
        ))
    }

    #[inline]
    pub fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let text = self.get_text(path)?;
        serde_json::from_str(&text).with_context(|| format!("Failed to parse response from {path}"))
    }

    #[inline]
    pub fn post_json<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T> {
        let url = self.endpoint(path)?;
        let request_json = serde_json::to_string(body)
            .with_context(|| format!("Failed to serialize request for {path}"))?;

        let text = self.send_with_retry(|| {
            self.agent
                .post(url.as_str())
                .header("Content-Type", "application/json")
                .send(&request_json)
        })?;

        serde_json::from_str(&text).with_context(|| format!("Failed to parse response from {path}"))
    }

    fn get_text(&self, path: &str) -> Result<String> {
        let url = self.endpoint(path)?;
        debug!("GET {}", url);
        self.send_with_retry(|| self.agent.get(url.as_str()).call())
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .with_context(|| format!("Failed to build URL for {path}"))
    }

    fn send_with_retry<F>(&self, mut request_fn: F) -> Result<String>
    where
        F: FnMut() -> Result<ureq::http::Response<ureq::Body>, ureq::Error>,
    {
        let attempts = self.retry.max_attempts.max(1);
        let mut last_error = None;

        for attempt in 1..=attempts {
            debug!("HTTP request attempt {}/{}", attempt, attempts);

            let error = match Self::read_response(request_fn()) {
                Ok(text) => {
                    debug!("Request succeeded on attempt {}", attempt);
                    return Ok(text);
                }
                Err(error) => error,
            };

            if !error.is_retryable() {
                warn!("Non-retryable failure: {:?}", error);
                return Err(error.into_error());
            }

            warn!(
                "Retryable failure on attempt {}/{}: {:?}",
                attempt, attempts, error
            );
            last_error = Some(error);

            if attempt < attempts {
                let delay = self.retry.delay_after(attempt);
                debug!("Waiting {:?} before retry", delay);
                std::thread::sleep(delay);
            }
        }

        error!("All retry attempts failed for request to {}", self.base_url);

        Err(last_error.map_or_else(
            || anyhow!("Request failed after retries"),
            AttemptError::into_error,
        ))
    }

    fn read_response(
        response: Result<ureq::http::Response<ureq::Body>, ureq::Error>,
    ) -> Result<String, AttemptError> {
        let mut response = response.map_err(AttemptError::Transport)?;
        let status = response.status().as_u16();
        let body = response
            .body_mut()
            .read_to_string()
            .map_err(AttemptError::Transport)?;

        if (200..300).contains(&status) {
            Ok(body)
        } else {
            Err(AttemptError::Status { status, body })
        }
    }
}

fn build_agent(timeout: Duration) -> ureq::Agent {
    ureq::Agent::config_builder()
        .timeout_global(Some(timeout))
        .http_status_as_error(false)
        .build()
        .into()
}
