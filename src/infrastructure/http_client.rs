//! HTTP session for vendor clients
//!
//! Wraps a `reqwest` client with a cookie store for login sessions and a
//! `governor` limiter that caps bursts independently of the adaptive engine
//! rate. Responses are classified into per-item [`FetchError`]s or run-fatal
//! [`VendorError`]s.

use std::num::NonZeroU32;
use std::time::Duration;

use anyhow::{Context, Result};
use governor::{
    Quota, RateLimiter,
    clock::DefaultClock,
    state::{InMemoryState, direct::NotKeyed},
};
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::infrastructure::config::defaults;
use crate::vendor::client::{FetchError, VendorError};

/// HTTP client configuration for vendor sessions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpClientConfig {
    pub user_agent: String,
    pub timeout_seconds: u64,
    /// Hard ceiling on request bursts
    pub max_requests_per_second: u32,
    pub follow_redirects: bool,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            user_agent: format!("vendor-price-sync/{}", env!("CARGO_PKG_VERSION")),
            timeout_seconds: defaults::REQUEST_TIMEOUT_SECONDS,
            max_requests_per_second: 5,
            follow_redirects: true,
        }
    }
}

impl HttpClientConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.timeout_seconds == 0 {
            return Err("http.timeout_seconds must be positive".to_string());
        }
        if self.max_requests_per_second == 0 {
            return Err("http.max_requests_per_second must be positive".to_string());
        }
        if HeaderValue::from_str(&self.user_agent).is_err() {
            return Err("http.user_agent is not a valid header value".to_string());
        }
        Ok(())
    }
}

/// Failure of a single vendor HTTP exchange
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HttpFailure {
    /// Affects only the item being fetched
    #[error(transparent)]
    Item(#[from] FetchError),

    /// Affects the whole run
    #[error(transparent)]
    Fatal(#[from] VendorError),
}

/// Maps an HTTP status to the engine's error taxonomy
pub fn classify_status(status: StatusCode) -> Result<(), HttpFailure> {
    if status.is_success() {
        return Ok(());
    }
    let failure: HttpFailure = match status {
        StatusCode::TOO_MANY_REQUESTS | StatusCode::SERVICE_UNAVAILABLE => FetchError::RateLimited.into(),
        StatusCode::NOT_FOUND | StatusCode::GONE => FetchError::EmptyResult.into(),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            VendorError::AuthenticationFailed(format!("vendor rejected session with {status}")).into()
        }
        other => FetchError::Unclassified(format!("unexpected HTTP status {other}")).into(),
    };
    Err(failure)
}

fn transport_failure(error: &reqwest::Error) -> HttpFailure {
    if error.is_timeout() {
        FetchError::Unclassified(format!("request timed out: {error}")).into()
    } else if error.is_decode() {
        FetchError::Unclassified(format!("malformed response body: {error}")).into()
    } else {
        FetchError::Unclassified(format!("request failed: {error}")).into()
    }
}

pub struct VendorHttpClient {
    client: Client,
    rate_limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
    config: HttpClientConfig,
}

impl VendorHttpClient {
    pub fn new(config: HttpClientConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&config.user_agent).context("Invalid user agent")?,
        );

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .default_headers(headers)
            .cookie_store(true)
            .redirect(if config.follow_redirects {
                reqwest::redirect::Policy::limited(10)
            } else {
                reqwest::redirect::Policy::none()
            })
            .build()
            .context("Failed to create HTTP client")?;

        let quota = Quota::per_second(
            NonZeroU32::new(config.max_requests_per_second).context("Rate limit must be greater than 0")?,
        );

        Ok(Self {
            client,
            rate_limiter: RateLimiter::direct(quota),
            config,
        })
    }

    /// Underlying client for building requests
    #[must_use]
    pub const fn client(&self) -> &Client {
        &self.client
    }

    #[must_use]
    pub const fn config(&self) -> &HttpClientConfig {
        &self.config
    }

    /// Sends a request after the burst guard admits it, classifying the status
    pub async fn send(&self, request: RequestBuilder) -> Result<Response, HttpFailure> {
        self.rate_limiter.until_ready().await;

        let response = request.send().await.map_err(|e| transport_failure(&e))?;
        let status = response.status();
        tracing::debug!(url = %response.url(), %status, "vendor response");
        classify_status(status)?;
        Ok(response)
    }

    pub async fn get_text(&self, url: &str) -> Result<String, HttpFailure> {
        let response = self.send(self.client.get(url)).await?;
        response.text().await.map_err(|e| transport_failure(&e))
    }

    pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, HttpFailure> {
        let response = self.send(self.client.get(url)).await?;
        response.json::<T>().await.map_err(|e| transport_failure(&e))
    }

    /// Submits a login form; any failure is fatal for the run
    pub async fn login_form(&self, url: &str, fields: &[(&str, &str)]) -> Result<Response, VendorError> {
        match self.send(self.client.post(url).form(fields)).await {
            Ok(response) => Ok(response),
            Err(HttpFailure::Fatal(error)) => Err(error),
            Err(HttpFailure::Item(FetchError::Unclassified(message))) => Err(VendorError::Transport(message)),
            Err(HttpFailure::Item(other)) => Err(VendorError::Transport(format!("login failed: {other}"))),
        }
    }
}
