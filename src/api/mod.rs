//! Gateway to the attendance backend
//!
//! Every operation is a single bounded request/response. Callers only ever
//! see a typed payload or an [`ApiError`]; transport errors never leak out.

mod client;
pub mod types;

pub use client::HttpGateway;
pub use types::{
    DisplayOptions, QrToken, RecentScan, Session, SessionEndResult, SessionStats,
    ValidateResponse,
};

use crate::error::ApiError;
use async_trait::async_trait;

/// Backend operations used by the display
#[async_trait]
pub trait DisplayApi: Send + Sync {
    /// `POST /display/validate`
    async fn validate_code(&self, code: &str) -> Result<ValidateResponse, ApiError>;

    /// `GET /display/{id}/qr-token`
    async fn fetch_token(&self, session_id: &str) -> Result<QrToken, ApiError>;

    /// `GET /display/{id}/recent-scans`, newest first
    async fn fetch_recent_scans(&self, session_id: &str) -> Result<Vec<RecentScan>, ApiError>;

    /// `GET /display/{id}/stats`
    async fn fetch_stats(&self, session_id: &str) -> Result<SessionStats, ApiError>;

    /// `POST /display/{id}/end`
    async fn end_session(&self, session_id: &str, code: &str)
        -> Result<SessionEndResult, ApiError>;
}
