//! Observable display state, events and policy

use super::timing::Countdown;
use crate::api::{DisplayOptions, RecentScan, SessionEndResult};
use crate::config::DisplayConfig;
use crate::store::StoredSession;
use std::time::Duration;

/// Why the display left the Active state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    /// The backend reported the session as ended or expired
    SessionOver,
    /// The display stayed open past the maximum duration
    DurationExceeded,
    /// The operator ended the session
    Operator,
}

impl EndReason {
    pub fn describe(&self) -> &'static str {
        match self {
            EndReason::SessionOver => "Session ended by the server",
            EndReason::DurationExceeded => "Maximum session duration reached",
            EndReason::Operator => "Session ended",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Active,
    Ended(EndReason),
}

impl Phase {
    pub fn is_active(&self) -> bool {
        matches!(self, Phase::Active)
    }
}

/// Final counts shown once the session is over
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndedSummary {
    pub present: u32,
    pub absent: Option<u32>,
    pub duration_minutes: u64,
    /// True when the counts came from the server's end-session result
    pub from_server: bool,
}

impl EndedSummary {
    /// Prefer the server's breakdown; fill gaps from what the display last saw
    pub fn compute(
        result: Option<&SessionEndResult>,
        last_scanned: u32,
        total_enrolled: Option<u32>,
        elapsed: Duration,
    ) -> Self {
        let present = result
            .and_then(|r| r.marked_present)
            .unwrap_or(last_scanned);
        let absent = result
            .and_then(|r| r.marked_absent)
            .or_else(|| total_enrolled.map(|total| total.saturating_sub(present)));
        let duration_minutes = result
            .and_then(|r| r.duration_minutes)
            .unwrap_or(elapsed.as_secs() / 60);

        EndedSummary {
            present,
            absent,
            duration_minutes,
            from_server: result.is_some_and(|r| r.marked_present.is_some()),
        }
    }
}

/// Everything the view needs, published on every change
#[derive(Debug, Clone)]
pub struct DisplayState {
    pub phase: Phase,
    pub qr_data: Option<String>,
    pub students_scanned: u32,
    pub total_enrolled: Option<u32>,
    pub countdown: Countdown,
    pub recent_scans: Vec<RecentScan>,
    pub elapsed: Duration,
    /// Latest transient error, cleared by the next successful token fetch
    pub notice: Option<String>,
    /// An end-session request is waiting for the backend
    pub ending: bool,
    pub summary: Option<EndedSummary>,
}

impl DisplayState {
    pub fn new(record: &StoredSession, refresh_interval: u32) -> Self {
        DisplayState {
            phase: Phase::Active,
            qr_data: None,
            students_scanned: record.students_scanned,
            total_enrolled: record.total_enrolled,
            countdown: Countdown::new(refresh_interval),
            recent_scans: Vec::new(),
            elapsed: Duration::ZERO,
            notice: None,
            ending: false,
            summary: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.phase.is_active()
    }

    /// Scanned share of enrollment, rounded down, when enrollment is known
    pub fn scanned_percent(&self) -> Option<u32> {
        match self.total_enrolled {
            Some(total) if total > 0 => {
                Some((self.students_scanned as u64 * 100 / total as u64) as u32)
            }
            _ => None,
        }
    }
}

/// Discrete controller events
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisplayEvent {
    TokenRefreshed { students_scanned: u32 },
    ScansUpdated { count: usize },
    Notice { message: String },
    Ended { reason: EndReason },
}

/// Timing and behaviour for one display session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayPolicy {
    /// Seconds between token refreshes, also the countdown length
    pub refresh_interval: u32,
    pub scans_interval: Duration,
    pub max_duration: Duration,
    pub confirm_end: bool,
}

impl DisplayPolicy {
    pub fn from_config(config: &DisplayConfig) -> Self {
        DisplayPolicy {
            refresh_interval: config.refresh_interval_secs.max(1),
            scans_interval: Duration::from_secs(config.scans_interval_secs.max(1) as u64),
            max_duration: Duration::from_secs(config.max_duration_minutes as u64 * 60),
            confirm_end: config.confirm_end,
        }
    }

    /// Apply server-provided variant options on top of local configuration
    pub fn with_options(mut self, options: Option<&DisplayOptions>) -> Self {
        let Some(options) = options else {
            return self;
        };
        match options.interval {
            Some(interval) if (1..=60).contains(&interval) => self.refresh_interval = interval,
            Some(interval) => {
                tracing::warn!("Ignoring server refresh interval of {}s", interval)
            }
            None => {}
        }
        if let Some(confirm_end) = options.confirm_end {
            self.confirm_end = confirm_end;
        }
        self
    }

    pub fn refresh_period(&self) -> Duration {
        Duration::from_secs(self.refresh_interval as u64)
    }
}

impl Default for DisplayPolicy {
    fn default() -> Self {
        Self::from_config(&DisplayConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_prefers_server_counts() {
        let result = SessionEndResult {
            marked_present: Some(42),
            marked_absent: Some(8),
            duration_minutes: Some(55),
        };
        let summary = EndedSummary::compute(Some(&result), 40, Some(50), Duration::from_secs(60));
        assert_eq!(summary.present, 42);
        assert_eq!(summary.absent, Some(8));
        assert_eq!(summary.duration_minutes, 55);
        assert!(summary.from_server);
    }

    #[test]
    fn test_summary_falls_back_to_last_known_count() {
        let summary = EndedSummary::compute(None, 37, Some(50), Duration::from_secs(125 * 60));
        assert_eq!(summary.present, 37);
        assert_eq!(summary.absent, Some(13));
        assert_eq!(summary.duration_minutes, 125);
        assert!(!summary.from_server);

        let summary = EndedSummary::compute(None, 37, None, Duration::ZERO);
        assert_eq!(summary.absent, None);
    }

    #[test]
    fn test_policy_options_override() {
        let policy = DisplayPolicy::default().with_options(Some(&DisplayOptions {
            interval: Some(5),
            confirm_end: Some(false),
        }));
        assert_eq!(policy.refresh_interval, 5);
        assert!(!policy.confirm_end);

        let policy = DisplayPolicy::default().with_options(Some(&DisplayOptions {
            interval: Some(0),
            confirm_end: None,
        }));
        assert_eq!(policy.refresh_interval, 10);
        assert!(policy.confirm_end);
    }

    #[test]
    fn test_default_policy() {
        let policy = DisplayPolicy::default();
        assert_eq!(policy.refresh_period(), Duration::from_secs(10));
        assert_eq!(policy.scans_interval, Duration::from_secs(8));
        assert_eq!(policy.max_duration, Duration::from_secs(3 * 3600));
    }
}
