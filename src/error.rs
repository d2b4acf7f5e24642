//! Error types for the attendance display

use thiserror::Error;

/// Display error type
#[derive(Error, Debug)]
pub enum DisplayError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Operator input that cannot be sent to the backend
    #[error("{0}")]
    InvalidCode(String),

    /// Backend call failed (already normalized by the gateway)
    #[error("{0}")]
    Api(#[from] ApiError),

    /// Session store holds no usable session record
    #[error("No active session, enter a session code to start")]
    NoActiveSession,

    /// The display session already reached its terminal state
    #[error("Session has already ended")]
    SessionEnded,

    /// An end-session request is still waiting for the backend
    #[error("Session is already ending")]
    EndInProgress,

    /// QR rendering error
    #[error("Render error: {0}")]
    Render(String),
}

/// Result type alias for display operations
pub type Result<T> = std::result::Result<T, DisplayError>;

/// Category of a failed backend call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorKind {
    /// The call did not finish within the configured timeout
    Timeout,
    /// The backend answered with a non-2xx status
    Http(u16),
    /// Connection-level failure
    Network,
    /// A success body that could not be decoded
    Decode,
}

/// The single error shape callers of the gateway ever see.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct ApiError {
    pub kind: ApiErrorKind,
    pub message: String,
}

const TERMINAL_MESSAGES: [&str; 2] = ["session has ended", "session has expired"];

impl ApiError {
    pub fn new(kind: ApiErrorKind, message: impl Into<String>) -> Self {
        ApiError {
            kind,
            message: message.into(),
        }
    }

    pub fn timeout() -> Self {
        ApiError::new(ApiErrorKind::Timeout, "Request timed out, please retry")
    }

    /// Build an HTTP error from a status and the raw response body.
    ///
    /// Uses the server's `{message}` when present, otherwise `HTTP <status>`.
    pub fn from_response(status: u16, body: &str) -> Self {
        let message = serde_json::from_str::<serde_json::Value>(body)
            .ok()
            .and_then(|v| {
                v.get("message")
                    .and_then(|m| m.as_str())
                    .map(|m| m.trim().to_string())
            })
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| format!("HTTP {}", status));
        ApiError::new(ApiErrorKind::Http(status), message)
    }

    /// Whether the backend reported the session as ended or expired
    pub fn is_session_over(&self) -> bool {
        let message = self.message.trim().to_ascii_lowercase();
        TERMINAL_MESSAGES.iter().any(|m| message == *m)
    }

    pub fn is_timeout(&self) -> bool {
        self.kind == ApiErrorKind::Timeout
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ApiError::timeout()
        } else if e.is_decode() {
            ApiError::new(ApiErrorKind::Decode, format!("Invalid response: {}", e))
        } else {
            ApiError::new(ApiErrorKind::Network, format!("Network error: {}", e))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_message_is_used() {
        let err = ApiError::from_response(404, r#"{"message":"Invalid session code"}"#);
        assert_eq!(err.kind, ApiErrorKind::Http(404));
        assert_eq!(err.to_string(), "Invalid session code");
    }

    #[test]
    fn test_malformed_body_falls_back_to_status() {
        assert_eq!(ApiError::from_response(502, "<html>bad gateway</html>").message, "HTTP 502");
        assert_eq!(ApiError::from_response(500, "").message, "HTTP 500");
        assert_eq!(ApiError::from_response(400, r#"{"message":""}"#).message, "HTTP 400");
        assert_eq!(ApiError::from_response(400, r#"{"error":"x"}"#).message, "HTTP 400");
    }

    #[test]
    fn test_session_over_detection() {
        assert!(ApiError::from_response(410, r#"{"message":"Session has ended"}"#).is_session_over());
        assert!(ApiError::from_response(410, r#"{"message":"Session has expired"}"#).is_session_over());
        assert!(!ApiError::from_response(500, r#"{"message":"Database unavailable"}"#).is_session_over());
        assert!(!ApiError::timeout().is_session_over());
    }

    #[test]
    fn test_timeout_message() {
        let err = ApiError::timeout();
        assert!(err.is_timeout());
        assert!(err.to_string().contains("timed out"));
    }
}
