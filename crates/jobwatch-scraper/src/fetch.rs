//! Shared HTTP client for listing pages.

use std::time::Duration;

use reqwest::Client;
use url::Url;

use crate::error::ExtractError;
use crate::retry::retry_with_backoff;

/// HTTP client shared by every configured extractor.
///
/// Non-2xx responses become typed errors. Transient failures (429, 5xx,
/// network errors) are retried with exponential backoff up to `max_retries`
/// additional attempts.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    max_retries: u32,
    backoff_base_secs: u64,
}

impl HttpFetcher {
    /// Creates an `HttpFetcher` with the configured timeout, `User-Agent`, and
    /// retry policy. Set `max_retries` to `0` to disable retries.
    ///
    /// # Errors
    ///
    /// Returns [`reqwest::Error`] if the underlying client cannot be built.
    pub fn new(
        timeout_secs: u64,
        user_agent: &str,
        max_retries: u32,
        backoff_base_secs: u64,
    ) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .user_agent(user_agent)
            .build()?;
        Ok(Self {
            client,
            max_retries,
            backoff_base_secs,
        })
    }

    /// Fetches `url` and returns the response body as text.
    ///
    /// # Errors
    ///
    /// - [`ExtractError::RateLimited`] on HTTP 429 after retries are exhausted.
    /// - [`ExtractError::UnexpectedStatus`] on any other non-2xx status.
    /// - [`ExtractError::Http`] on network or TLS failure.
    pub async fn get_text(&self, url: &Url, accept: &str) -> Result<String, ExtractError> {
        retry_with_backoff(self.max_retries, self.backoff_base_secs, || async move {
            let response = self
                .client
                .get(url.clone())
                .header(reqwest::header::ACCEPT, accept)
                .header(reqwest::header::CACHE_CONTROL, "no-cache")
                .send()
                .await?;
            let status = response.status();

            if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                let retry_after_secs = response
                    .headers()
                    .get(reqwest::header::RETRY_AFTER)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|s| s.parse::<u64>().ok())
                    .unwrap_or(60);
                return Err(ExtractError::RateLimited {
                    url: url.to_string(),
                    retry_after_secs,
                });
            }

            if !status.is_success() {
                return Err(ExtractError::UnexpectedStatus {
                    status: status.as_u16(),
                    url: url.to_string(),
                });
            }

            Ok(response.text().await?)
        })
        .await
    }

    /// Fetches `url` and decodes the body as JSON.
    ///
    /// # Errors
    ///
    /// Everything [`Self::get_text`] returns, plus
    /// [`ExtractError::Deserialize`] if the body is not valid JSON.
    pub async fn get_json(&self, url: &Url) -> Result<serde_json::Value, ExtractError> {
        let body = self.get_text(url, "application/json").await?;
        serde_json::from_str(&body).map_err(|source| ExtractError::Deserialize {
            url: url.to_string(),
            source,
        })
    }
}
