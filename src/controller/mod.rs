//! Live-display session controller
//!
//! Owns four independent periodic tasks while the session is Active:
//! - **Refresh**: fetch a new QR token every `refresh_interval` seconds
//! - **Scans**: fetch the recent-scan feed on its own, longer cadence
//! - **Countdown**: one-second visual countdown, reset by every fresh token
//! - **Clock**: session duration, ends the session past `max_duration`
//!
//! The first token and scan fetch happen immediately. Each task catches and
//! reports its own errors and keeps its schedule; no error stops a timer.
//!
//! Active → Ended happens when the backend reports the session over, when
//! the duration ceiling is crossed, or when an operator end request
//! succeeds. Ended is terminal: every task is aborted (in-flight requests
//! are dropped with them), the session store is cleared, and results that
//! resolve afterwards are discarded.

mod state;
mod timing;

pub use state::{DisplayEvent, DisplayPolicy, DisplayState, EndReason, EndedSummary, Phase};
pub use timing::{format_elapsed, Countdown, SessionClock};

use crate::api::{DisplayApi, Session, SessionEndResult};
use crate::error::{DisplayError, Result};
use crate::normalize_code;
use crate::store::SessionStore;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, watch, Notify};
use tokio::task::AbortHandle;
use tokio::time::{interval, interval_at, Instant, MissedTickBehavior};

const TICK: Duration = Duration::from_secs(1);

/// State shared between the controller handle and its tasks
struct Shared {
    api: Arc<dyn DisplayApi>,
    store: SessionStore,
    session: Session,
    code: String,
    policy: DisplayPolicy,
    clock: SessionClock,
    state: watch::Sender<DisplayState>,
    events: broadcast::Sender<DisplayEvent>,
    /// Re-phases the countdown ticker when a fresh token lands
    countdown_reset: Notify,
    tasks: Mutex<Vec<AbortHandle>>,
}

/// Handle to a running display session. Dropping it tears everything down.
pub struct DisplayController {
    shared: Arc<Shared>,
}

impl DisplayController {
    /// Read the active session from the store and start all timers.
    ///
    /// Must be called from within a tokio runtime. Returns
    /// [`DisplayError::NoActiveSession`] when the store holds no session.
    pub fn start(
        api: Arc<dyn DisplayApi>,
        store: SessionStore,
        policy: DisplayPolicy,
    ) -> Result<Self> {
        let record = store.retrieve().ok_or(DisplayError::NoActiveSession)?;
        let policy = policy.with_options(record.config.as_ref());
        let clock = SessionClock::new(
            record.session.start_time,
            chrono::Utc::now(),
            policy.max_duration,
        );

        let (state, _) = watch::channel(DisplayState::new(&record, policy.refresh_interval));
        let (events, _) = broadcast::channel(64);

        tracing::info!(
            "Display started for session {} (refresh every {}s, scans every {}s, max {} min)",
            record.session.id,
            policy.refresh_interval,
            policy.scans_interval.as_secs(),
            policy.max_duration.as_secs() / 60
        );

        let shared = Arc::new(Shared {
            api,
            store,
            session: record.session,
            code: record.session_code,
            policy,
            clock,
            state,
            events,
            countdown_reset: Notify::new(),
            tasks: Mutex::new(Vec::new()),
        });

        let handles = vec![
            tokio::spawn(refresh_loop(shared.clone())).abort_handle(),
            tokio::spawn(scans_loop(shared.clone())).abort_handle(),
            tokio::spawn(countdown_loop(shared.clone())).abort_handle(),
            tokio::spawn(clock_loop(shared.clone())).abort_handle(),
        ];
        shared.register_tasks(handles);

        Ok(DisplayController { shared })
    }

    /// Snapshot of the current state
    pub fn state(&self) -> DisplayState {
        self.shared.state.borrow().clone()
    }

    /// Receiver notified on every state change
    pub fn subscribe(&self) -> watch::Receiver<DisplayState> {
        self.shared.state.subscribe()
    }

    pub fn events(&self) -> broadcast::Receiver<DisplayEvent> {
        self.shared.events.subscribe()
    }

    pub fn session(&self) -> &Session {
        &self.shared.session
    }

    pub fn policy(&self) -> &DisplayPolicy {
        &self.shared.policy
    }

    pub fn is_active(&self) -> bool {
        self.shared.is_active()
    }

    /// The session code with everything but the last two characters hidden
    pub fn masked_code(&self) -> String {
        mask_code(&self.shared.code)
    }

    /// End the session on the backend.
    ///
    /// Uses `credential` when given, otherwise the code the session was
    /// opened with. Refused once the session has ended or while another end
    /// request is in flight. On failure the session stays Active and the
    /// error is also published as the current notice.
    pub async fn end_session(&self, credential: Option<&str>) -> Result<SessionEndResult> {
        let code = credential
            .map(normalize_code)
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| self.shared.code.clone());

        let mut refused = None;
        self.shared.state.send_if_modified(|s| {
            if !s.phase.is_active() {
                refused = Some(DisplayError::SessionEnded);
                return false;
            }
            if s.ending {
                refused = Some(DisplayError::EndInProgress);
                return false;
            }
            s.ending = true;
            true
        });
        if let Some(e) = refused {
            return Err(e);
        }

        // clears `ending` if this future is dropped before the backend answers
        let guard = EndingGuard {
            shared: &self.shared,
        };

        tracing::info!("Ending session {}", self.shared.session.id);
        let outcome = self
            .shared
            .api
            .end_session(&self.shared.session.id, &code)
            .await;
        std::mem::forget(guard);

        match outcome {
            Ok(result) => {
                self.shared.finish(EndReason::Operator, Some(&result));
                Ok(result)
            }
            Err(e) => {
                tracing::warn!("End session failed: {}", e);
                let message = e.message.clone();
                self.shared.state.send_if_modified(|s| {
                    if !s.phase.is_active() {
                        return false;
                    }
                    s.ending = false;
                    s.notice = Some(message.clone());
                    true
                });
                let _ = self.shared.events.send(DisplayEvent::Notice { message });
                Err(e.into())
            }
        }
    }

    /// Abort every outstanding task. Safe to call repeatedly.
    pub fn teardown(&self) {
        self.shared.teardown();
    }
}

impl Drop for DisplayController {
    fn drop(&mut self) {
        self.shared.teardown();
    }
}

/// Releases the in-flight end request flag of an abandoned `end_session`
struct EndingGuard<'a> {
    shared: &'a Shared,
}

impl Drop for EndingGuard<'_> {
    fn drop(&mut self) {
        let released = self.shared.state.send_if_modified(|s| {
            if !s.phase.is_active() || !s.ending {
                return false;
            }
            s.ending = false;
            true
        });
        if released {
            tracing::debug!("End session request abandoned before completion");
        }
    }
}

impl Shared {
    fn is_active(&self) -> bool {
        self.state.borrow().phase.is_active()
    }

    fn register_tasks(&self, handles: Vec<AbortHandle>) {
        let mut tasks = self.tasks.lock().unwrap_or_else(|e| e.into_inner());
        if self.is_active() {
            tasks.extend(handles);
        } else {
            handles.iter().for_each(AbortHandle::abort);
        }
    }

    fn teardown(&self) {
        let handles = std::mem::take(&mut *self.tasks.lock().unwrap_or_else(|e| e.into_inner()));
        if !handles.is_empty() {
            tracing::debug!("Aborting {} display tasks", handles.len());
        }
        for handle in handles {
            handle.abort();
        }
    }

    fn set_notice(&self, message: String) {
        let applied = self.state.send_if_modified(|s| {
            if !s.phase.is_active() {
                return false;
            }
            s.notice = Some(message.clone());
            true
        });
        if applied {
            let _ = self.events.send(DisplayEvent::Notice { message });
        }
    }

    /// Move to Ended. Returns true only for the call that made the transition.
    ///
    /// A successful operator end result arriving after another terminal
    /// transition still replaces the summary, but never reopens the session.
    fn finish(&self, reason: EndReason, result: Option<&SessionEndResult>) -> bool {
        let elapsed = self.clock.elapsed();
        let mut first = false;

        self.state.send_if_modified(|s| match s.phase {
            Phase::Active => {
                s.phase = Phase::Ended(reason);
                s.elapsed = elapsed;
                s.ending = false;
                s.summary = Some(EndedSummary::compute(
                    result,
                    s.students_scanned,
                    s.total_enrolled,
                    elapsed,
                ));
                first = true;
                true
            }
            Phase::Ended(_) => match (reason, result) {
                (EndReason::Operator, Some(result)) => {
                    s.phase = Phase::Ended(EndReason::Operator);
                    s.ending = false;
                    s.summary = Some(EndedSummary::compute(
                        Some(result),
                        s.students_scanned,
                        s.total_enrolled,
                        s.elapsed,
                    ));
                    true
                }
                _ => false,
            },
        });

        if first {
            self.teardown();
            self.store.clear();
            tracing::info!(
                "Session {} ended: {}",
                self.session.id,
                reason.describe()
            );
            let _ = self.events.send(DisplayEvent::Ended { reason });
        }
        first
    }

    async fn refresh_token(&self) {
        match self.api.fetch_token(&self.session.id).await {
            Ok(token) => {
                let students_scanned = token.students_scanned;
                let applied = self.state.send_if_modified(|s| {
                    if !s.phase.is_active() {
                        return false;
                    }
                    s.qr_data = Some(token.qr_data);
                    s.students_scanned = students_scanned;
                    s.countdown.reset();
                    s.notice = None;
                    true
                });
                if applied {
                    self.countdown_reset.notify_one();
                    tracing::debug!("QR token refreshed ({} scanned)", students_scanned);
                    let _ = self
                        .events
                        .send(DisplayEvent::TokenRefreshed { students_scanned });
                }
            }
            Err(e) if e.is_session_over() => {
                tracing::info!("Backend reports session over: {}", e);
                self.finish(EndReason::SessionOver, None);
            }
            Err(e) => {
                tracing::warn!("QR token refresh failed: {}", e);
                self.set_notice(e.message);
            }
        }
    }

    async fn refresh_scans(&self) {
        match self.api.fetch_recent_scans(&self.session.id).await {
            Ok(scans) => {
                let count = scans.len();
                let applied = self.state.send_if_modified(|s| {
                    if !s.phase.is_active() {
                        return false;
                    }
                    s.recent_scans = scans;
                    true
                });
                if applied {
                    let _ = self.events.send(DisplayEvent::ScansUpdated { count });
                }
            }
            // Non-critical: keep showing the previous feed
            Err(e) => tracing::debug!("Recent scans unavailable: {}", e),
        }
    }
}

async fn refresh_loop(shared: Arc<Shared>) {
    let mut ticker = interval(shared.policy.refresh_period());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        if !shared.is_active() {
            break;
        }
        shared.refresh_token().await;
    }
}

async fn scans_loop(shared: Arc<Shared>) {
    let mut ticker = interval(shared.policy.scans_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        if !shared.is_active() {
            break;
        }
        shared.refresh_scans().await;
    }
}

async fn countdown_loop(shared: Arc<Shared>) {
    let mut ticker = interval_at(Instant::now() + TICK, TICK);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            _ = shared.countdown_reset.notified() => {
                // the value was already reset; next tick is a full second away
                ticker.reset();
                continue;
            }
            _ = ticker.tick() => {}
        }
        let still_active = shared.state.send_if_modified(|s| {
            if !s.phase.is_active() {
                return false;
            }
            s.countdown.tick();
            true
        });
        if !still_active {
            break;
        }
    }
}

async fn clock_loop(shared: Arc<Shared>) {
    let mut ticker = interval_at(Instant::now() + TICK, TICK);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;
        let elapsed = shared.clock.elapsed();
        let still_active = shared.state.send_if_modified(|s| {
            if !s.phase.is_active() {
                return false;
            }
            s.elapsed = elapsed;
            true
        });
        if !still_active {
            break;
        }
        if shared.clock.is_exceeded() {
            tracing::warn!(
                "Session {} open for {}, ending display",
                shared.session.id,
                format_elapsed(elapsed)
            );
            shared.finish(EndReason::DurationExceeded, None);
            break;
        }
    }
}

/// Hide all but the last two characters of a session code
pub fn mask_code(code: &str) -> String {
    let chars: Vec<char> = code.chars().collect();
    if chars.len() <= 2 {
        return "*".repeat(chars.len());
    }
    let visible = chars.len() - 2;
    let mut masked = "*".repeat(visible);
    masked.extend(&chars[visible..]);
    masked
}
