//! Attend display - shows rotating attendance QR tokens for a classroom session
//!
//! This crate provides:
//! - A bounded-timeout gateway to the attendance backend
//! - Tab-scoped session storage for the active session
//! - The live-display controller (token rotation, countdown, duration ceiling)
//! - Pure text rendering of the active and ended display
//!
//! # Usage
//!
//! As a library:
//! ```ignore
//! use attend_display::{Config, DisplayCore};
//!
//! let core = DisplayCore::new(Config::default())?;
//! core.setup("CS-101-2023-A").await?;
//! let controller = core.start()?;
//! ```
//!
//! As a CLI:
//! ```text
//! attend-display --code CS-101-2023-A
//! ```

pub mod api;
pub mod config;
pub mod controller;
pub mod error;
pub mod store;
pub mod view;

// Re-export main types for convenience
pub use config::Config;
pub use controller::{DisplayController, DisplayPolicy, DisplayState};
pub use error::{ApiError, DisplayError, Result};

use api::{DisplayApi, HttpGateway, SessionStats};
use std::sync::Arc;
use store::{SessionStore, StoredSession, TabStorage};

/// Canonical form of an operator-entered session code
pub fn normalize_code(raw: &str) -> String {
    raw.trim().to_uppercase()
}

/// Wires configuration, backend gateway and session storage together
pub struct DisplayCore {
    pub config: Config,
    api: Arc<dyn DisplayApi>,
    store: SessionStore,
}

impl DisplayCore {
    /// Create a core talking to the configured backend over HTTP
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let api = Arc::new(HttpGateway::from_config(&config)?);
        Ok(Self::with_api(config, api))
    }

    /// Create a core with a custom backend implementation
    pub fn with_api(config: Config, api: Arc<dyn DisplayApi>) -> Self {
        let store = SessionStore::new(Arc::new(TabStorage::new(&config.storage)));
        DisplayCore { config, api, store }
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    /// Validate a session code and record it as the active session.
    ///
    /// Any previously active session is replaced.
    pub async fn setup(&self, raw_code: &str) -> Result<StoredSession> {
        let code = normalize_code(raw_code);
        if code.is_empty() {
            return Err(DisplayError::InvalidCode("Session code is required".into()));
        }

        let validated = self.api.validate_code(&code).await?;
        tracing::info!(
            "Session code accepted: {} ({})",
            validated.session.id,
            validated.session.title()
        );

        let record = StoredSession {
            session: validated.session,
            session_code: code,
            total_enrolled: validated.total_enrolled,
            students_scanned: validated.students_scanned,
            config: validated.config,
        };
        self.store.store(&record);
        Ok(record)
    }

    /// Start the live display for the stored session
    pub fn start(&self) -> Result<DisplayController> {
        DisplayController::start(
            self.api.clone(),
            self.store.clone(),
            DisplayPolicy::from_config(&self.config.display),
        )
    }

    /// Live counters for a session
    pub async fn stats(&self, session_id: &str) -> Result<SessionStats> {
        Ok(self.api.fetch_stats(session_id).await?)
    }

    /// Forget the active session without ending it on the backend
    pub fn reset(&self) {
        self.store.clear();
    }
}
