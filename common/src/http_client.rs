use crate::errors::AppError;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, instrument, warn};

pub const DEFAULT_USER_AGENT: &str = concat!("weather-service/", env!("CARGO_PKG_VERSION"));

/// Shared outbound HTTP client with a per-request timeout.
///
/// Upstream calls are made exactly once; failures are reported to the caller
/// rather than retried.
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    timeout: Duration,
}

impl HttpClient {
    pub fn new(timeout_secs: u64, user_agent: &str) -> Result<Self, AppError> {
        let timeout = Duration::from_secs(timeout_secs);
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .map_err(|e| AppError::internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client, timeout })
    }

    /// Fetch and decode a JSON document
    #[instrument(skip(self), fields(url = %url))]
    pub async fn get_json<T>(&self, url: &str) -> Result<T, AppError>
    where
        T: serde::de::DeserializeOwned,
    {
        let response = tokio::time::timeout(self.timeout, self.client.get(url).send())
            .await
            .map_err(|_| AppError::timeout(format!("Request to {} timed out", url)))?
            .map_err(|e| {
                if e.is_timeout() {
                    AppError::timeout(format!("Request to {} timed out", url))
                } else {
                    AppError::NetworkError(e)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            warn!(url = %url, status = status.as_u16(), "Upstream returned error status");
            return Err(AppError::http(
                status.as_u16(),
                format!("HTTP error: {}", status),
            ));
        }

        let text = response.text().await.map_err(AppError::NetworkError)?;
        let json: T = serde_json::from_str(&text).map_err(AppError::ParseError)?;

        debug!(url = %url, bytes = text.len(), "Request successful");
        Ok(json)
    }
}
