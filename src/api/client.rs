//! reqwest-backed gateway to the attendance backend
//!
//! Each call runs under its own timeout. When the timeout fires the request
//! future is dropped, which aborts the connection, and the caller gets a
//! `Timeout` error instead of whatever the transport would have produced.

use super::types::{
    QrToken, RecentScan, RecentScansResponse, SessionCodeBody, SessionEndResult, SessionStats,
    ValidateResponse,
};
use super::DisplayApi;
use crate::config::Config;
use crate::error::{ApiError, ApiErrorKind, DisplayError};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Url};
use serde::de::DeserializeOwned;
use std::time::Duration;

/// HTTP implementation of [`DisplayApi`]
#[derive(Clone)]
pub struct HttpGateway {
    client: Client,
    base_url: Url,
    timeout: Duration,
}

impl HttpGateway {
    pub fn new(base_url: &str, timeout: Duration) -> crate::error::Result<Self> {
        let base_url = Url::parse(base_url.trim_end_matches('/')).map_err(|e| {
            DisplayError::Config(format!("Invalid API base URL '{}': {}", base_url, e))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(DisplayError::Config(format!(
                "API base URL cannot carry paths: {}",
                base_url
            )));
        }

        let client = Client::builder()
            .user_agent(concat!("attend-display/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| DisplayError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(HttpGateway {
            client,
            base_url,
            timeout,
        })
    }

    pub fn from_config(config: &Config) -> crate::error::Result<Self> {
        Self::new(config.base_url(), config.api.timeout())
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Append path segments to the base URL, percent-encoding each one
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        request: RequestBuilder,
    ) -> Result<T, ApiError> {
        let call = async {
            let response = request.send().await?;
            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(ApiError::from_response(status.as_u16(), &body));
            }
            let bytes = response.bytes().await?;
            serde_json::from_slice::<T>(&bytes).map_err(|e| {
                ApiError::new(ApiErrorKind::Decode, format!("Invalid response: {}", e))
            })
        };

        match tokio::time::timeout(self.timeout, call).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                tracing::debug!("{} failed: {}", operation, e);
                Err(e)
            }
            Err(_) => {
                tracing::warn!(
                    "{} timed out after {}s, request aborted",
                    operation,
                    self.timeout.as_secs()
                );
                Err(ApiError::timeout())
            }
        }
    }
}

#[async_trait]
impl DisplayApi for HttpGateway {
    async fn validate_code(&self, code: &str) -> Result<ValidateResponse, ApiError> {
        let request = self
            .client
            .post(self.endpoint(&["display", "validate"]))
            .json(&SessionCodeBody { session_code: code });
        self.execute("validate_code", request).await
    }

    async fn fetch_token(&self, session_id: &str) -> Result<QrToken, ApiError> {
        let request = self
            .client
            .get(self.endpoint(&["display", session_id, "qr-token"]));
        self.execute("fetch_token", request).await
    }

    async fn fetch_recent_scans(&self, session_id: &str) -> Result<Vec<RecentScan>, ApiError> {
        let request = self
            .client
            .get(self.endpoint(&["display", session_id, "recent-scans"]));
        let response: RecentScansResponse = self.execute("fetch_recent_scans", request).await?;
        Ok(response.recent_scans)
    }

    async fn fetch_stats(&self, session_id: &str) -> Result<SessionStats, ApiError> {
        let request = self
            .client
            .get(self.endpoint(&["display", session_id, "stats"]));
        self.execute("fetch_stats", request).await
    }

    async fn end_session(
        &self,
        session_id: &str,
        code: &str,
    ) -> Result<SessionEndResult, ApiError> {
        let request = self
            .client
            .post(self.endpoint(&["display", session_id, "end"]))
            .json(&SessionCodeBody { session_code: code });
        self.execute("end_session", request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_joins_segments() {
        let gateway =
            HttpGateway::new("https://attend.example.edu/api/", Duration::from_secs(15)).unwrap();
        assert_eq!(
            gateway.endpoint(&["display", "s1", "qr-token"]).as_str(),
            "https://attend.example.edu/api/display/s1/qr-token"
        );
    }

    #[test]
    fn test_endpoint_encodes_session_id() {
        let gateway = HttpGateway::new("http://127.0.0.1:5000/api", Duration::from_secs(15)).unwrap();
        assert_eq!(
            gateway.endpoint(&["display", "a/b c", "end"]).as_str(),
            "http://127.0.0.1:5000/api/display/a%2Fb%20c/end"
        );
    }

    #[test]
    fn test_rejects_invalid_base_url() {
        assert!(HttpGateway::new("not a url", Duration::from_secs(1)).is_err());
        assert!(HttpGateway::new("mailto:ops@example.edu", Duration::from_secs(1)).is_err());
    }
}
