//! Phone-number lookup client
//!
//! Wraps the external lookup API with retry and backoff. The client never
//! returns an error for a runtime failure; every call resolves to a
//! [`LookupOutcome`].

pub mod format;

pub use format::{format_records, interpret_body, LookupRecord};

use crate::config::ApiConfig;
use crate::error::{LookupBotError, Result};
use crate::number::mask_number;
use async_trait::async_trait;
use reqwest::header::ACCEPT;
use reqwest::{Client, StatusCode};
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;
use url::form_urlencoded;

/// Reply text for a successful lookup that found nothing
pub const NO_DATA_MESSAGE: &str = "No data found for this number";

/// Reply text when the API rejects the configured key
pub const AUTH_FAILED_MESSAGE: &str =
    "Invalid API key! The lookup service rejected the configured credentials.";

/// Longest error description carried into a failure message
const ERROR_PREVIEW_CHARS: usize = 100;

/// Result of one lookup, after all retries
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupOutcome {
    /// Structured records, already formatted
    Found { text: String, records: usize },
    /// Plain-text body returned verbatim
    Text(String),
    /// The API answered but had nothing for the number
    NoData,
    /// HTTP 401; not retried
    AuthFailed,
    /// Retries exhausted or a terminal HTTP status
    Failed(String),
}

impl LookupOutcome {
    /// Whether the API answered (with or without data)
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Found { .. } | Self::Text(_) | Self::NoData)
    }

    /// Whether the answer carries a result worth showing
    pub fn has_result(&self) -> bool {
        matches!(self, Self::Found { .. } | Self::Text(_))
    }

    /// Text to show the user
    pub fn text(&self) -> &str {
        match self {
            Self::Found { text, .. } => text,
            Self::Text(text) => text,
            Self::NoData => NO_DATA_MESSAGE,
            Self::AuthFailed => AUTH_FAILED_MESSAGE,
            Self::Failed(message) => message,
        }
    }
}

/// Source of backoff delays
#[async_trait]
pub trait Sleeper: Send + Sync + Debug {
    async fn sleep(&self, duration: Duration);
}

/// Sleeps on the tokio timer
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// HTTP client for the lookup API
#[derive(Debug, Clone)]
pub struct LookupClient {
    client: Client,
    config: ApiConfig,
    sleeper: Arc<dyn Sleeper>,
}

impl LookupClient {
    /// Create a client from API configuration
    ///
    /// # Errors
    ///
    /// Returns an error if no API key is configured or the HTTP client cannot
    /// be built.
    ///
    /// # Examples
    ///
    /// ```
    /// use lookup_bot::config::ApiConfig;
    /// use lookup_bot::lookup::LookupClient;
    ///
    /// let config = ApiConfig {
    ///     api_key: "secret".to_string(),
    ///     ..ApiConfig::default()
    /// };
    /// assert!(LookupClient::new(config).is_ok());
    /// assert!(LookupClient::new(ApiConfig::default()).is_err());
    /// ```
    pub fn new(config: ApiConfig) -> Result<Self> {
        if config.api_key.trim().is_empty() {
            return Err(LookupBotError::Config(
                "API key is not configured (set api.api_key or LOOKUP_BOT_API_KEY)".to_string(),
            )
            .into());
        }

        let client = Client::builder()
            .timeout(config.timeout())
            .user_agent(concat!("lookup-bot/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(LookupBotError::Http)?;

        tracing::info!(
            "Initialized lookup client: max_retries={}, timeout={}s",
            config.max_retries,
            config.timeout_seconds
        );

        Ok(Self {
            client,
            config,
            sleeper: Arc::new(TokioSleeper),
        })
    }

    /// Replace the backoff sleeper
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Request URL for a number, with number and key percent-encoded
    pub fn request_url(&self, number: &str) -> String {
        let number: String = form_urlencoded::byte_serialize(number.as_bytes()).collect();
        let api_key: String =
            form_urlencoded::byte_serialize(self.config.api_key.as_bytes()).collect();
        self.config
            .endpoint_template
            .replace("{api_key}", &api_key)
            .replace("{number}", &number)
    }

    /// Look up a normalized number
    ///
    /// Makes up to `max_retries` attempts:
    ///
    /// - 200 is interpreted and returned.
    /// - 401 returns [`LookupOutcome::AuthFailed`] at once.
    /// - 429 backs off `retry_delay * 2^attempt` and retries.
    /// - Any other status retries, failing with the status on the last attempt.
    /// - Timeouts and connection errors back off `retry_delay * attempt`.
    pub async fn lookup(&self, number: &str) -> LookupOutcome {
        let url = self.request_url(number);
        let masked = mask_number(number);
        let max_attempts = self.config.max_retries.max(1);
        let base = self.config.retry_delay();
        let mut last_error = String::from("no response received");

        for attempt in 1..=max_attempts {
            let is_last = attempt == max_attempts;
            tracing::info!(
                "Lookup attempt {}/{} for number {}",
                attempt,
                max_attempts,
                masked
            );

            let response = match self
                .client
                .get(&url)
                .header(ACCEPT, "application/json, text/plain, */*")
                .send()
                .await
            {
                Ok(response) => response,
                Err(e) => {
                    let delay = if e.is_timeout() || e.is_connect() {
                        base.saturating_mul(attempt)
                    } else {
                        base
                    };
                    // The URL carries the API key and the queried number
                    let e = e.without_url();
                    tracing::warn!("Lookup request failed on attempt {}: {}", attempt, e);
                    last_error = e.to_string();
                    if !is_last {
                        self.sleeper.sleep(delay).await;
                    }
                    continue;
                }
            };

            let status = response.status();
            match status {
                StatusCode::OK => {
                    let body = match response.text().await {
                        Ok(body) => body,
                        Err(e) => {
                            let e = e.without_url();
                            tracing::warn!("Failed to read lookup response body: {}", e);
                            last_error = e.to_string();
                            if !is_last {
                                self.sleeper.sleep(base).await;
                            }
                            continue;
                        }
                    };
                    let outcome = interpret_body(&body);
                    match &outcome {
                        LookupOutcome::Found { records, .. } => {
                            tracing::info!("Lookup succeeded: found {} record(s)", records)
                        }
                        LookupOutcome::Text(_) => {
                            tracing::info!("Lookup succeeded: text response received")
                        }
                        _ => tracing::warn!("Lookup returned no usable data"),
                    }
                    return outcome;
                }
                StatusCode::UNAUTHORIZED => {
                    tracing::error!("Lookup API authentication failed (HTTP 401)");
                    return LookupOutcome::AuthFailed;
                }
                StatusCode::TOO_MANY_REQUESTS => {
                    last_error = format!("API returned HTTP {}", status.as_u16());
                    if !is_last {
                        let delay = base.saturating_mul(2u32.saturating_pow(attempt));
                        tracing::warn!("Rate limited, waiting {:?} before retry", delay);
                        self.sleeper.sleep(delay).await;
                    }
                }
                _ => {
                    tracing::warn!("Lookup API returned HTTP {}", status.as_u16());
                    if is_last {
                        return LookupOutcome::Failed(format!(
                            "API returned HTTP {}",
                            status.as_u16()
                        ));
                    }
                }
            }
        }

        LookupOutcome::Failed(format!(
            "Request failed after {} attempts. Last error: {}",
            max_attempts,
            truncate(&last_error, ERROR_PREVIEW_CHARS)
        ))
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}
