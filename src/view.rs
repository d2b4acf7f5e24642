//! Text rendering of the display
//!
//! Rendering is a pure function of [`DisplayState`] and [`Presentation`]; the
//! terminal driver only writes the returned lines. Presentation state
//! (fullscreen, end confirmation) never feeds back into the controller.

use crate::api::Session;
use crate::controller::{format_elapsed, DisplayState, EndedSummary, Phase};
use crate::error::{DisplayError, Result};
use qrcode::render::unicode;
use qrcode::{EcLevel, QrCode};
use ratatui::layout::Alignment;
use ratatui::text::{Line, Text};
use ratatui::widgets::Paragraph;

const BAR_WIDTH: usize = 20;
const MAX_FEED_ROWS: usize = 8;
const RULE: &str = "────────────────────────────────────────────────";

/// What a request to end the session should do next
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndAction {
    /// Send the end request now
    Proceed,
    /// Show the confirmation prompt first
    AwaitConfirmation,
}

/// Presentation-only state owned by the terminal driver
#[derive(Debug, Default)]
pub struct Presentation {
    fullscreen: bool,
    confirming_end: bool,
}

impl Presentation {
    pub fn is_fullscreen(&self) -> bool {
        self.fullscreen
    }

    /// The fullscreen state a toggle should request.
    ///
    /// The flag itself only changes through [`Presentation::sync_fullscreen`],
    /// so it always mirrors what the terminal actually did.
    pub fn toggle_target(&self) -> bool {
        !self.fullscreen
    }

    /// Record the actual fullscreen state. Returns true when it changed.
    pub fn sync_fullscreen(&mut self, actual: bool) -> bool {
        let changed = self.fullscreen != actual;
        self.fullscreen = actual;
        changed
    }

    pub fn request_end(&mut self, confirm_end: bool) -> EndAction {
        if confirm_end {
            self.confirming_end = true;
            EndAction::AwaitConfirmation
        } else {
            EndAction::Proceed
        }
    }

    pub fn is_confirming_end(&self) -> bool {
        self.confirming_end
    }

    /// Accept the pending prompt. Returns false when nothing was pending.
    pub fn confirm_end(&mut self) -> bool {
        std::mem::take(&mut self.confirming_end)
    }

    pub fn cancel_end(&mut self) {
        self.confirming_end = false;
    }
}

/// Render the QR payload with unicode half blocks at error-correction level H
pub fn render_qr(payload: &str) -> Result<Vec<String>> {
    let code = QrCode::with_error_correction_level(payload.as_bytes(), EcLevel::H)
        .map_err(|e| DisplayError::Render(format!("QR encoding failed: {}", e)))?;
    let image = code
        .render::<unicode::Dense1x2>()
        .dark_color(unicode::Dense1x2::Light)
        .light_color(unicode::Dense1x2::Dark)
        .quiet_zone(true)
        .build();
    Ok(image.lines().map(str::to_string).collect())
}

/// Render whichever frame matches the current phase
pub fn render(
    session: &Session,
    masked_code: &str,
    state: &DisplayState,
    presentation: &Presentation,
) -> Vec<String> {
    match state.phase {
        Phase::Active => render_active(session, masked_code, state, presentation),
        Phase::Ended(_) => render_ended(state),
    }
}

pub fn render_active(
    session: &Session,
    masked_code: &str,
    state: &DisplayState,
    presentation: &Presentation,
) -> Vec<String> {
    let mut lines = Vec::new();

    lines.push(format!("{}    ● LIVE", session.title().to_uppercase()));
    lines.push(format!(
        "{} • {}",
        session.class_info.as_deref().unwrap_or(""),
        session.faculty_name.as_deref().unwrap_or("")
    ));
    lines.push(RULE.to_string());

    let mut scanned = format!("STUDENTS SCANNED  {:03}", state.students_scanned);
    if let (Some(percent), Some(total)) = (state.scanned_percent(), state.total_enrolled) {
        scanned.push_str(&format!("  ({}% of {})", percent, total));
    }
    lines.push(scanned);
    lines.push(String::new());

    match state.qr_data.as_deref() {
        Some(payload) => match render_qr(payload) {
            Ok(qr) => lines.extend(qr),
            Err(e) => lines.push(format!("> ERROR: {}", e)),
        },
        None => lines.push("  … waiting for QR token".to_string()),
    }
    lines.push(String::new());

    lines.push(format!(
        "NEXT REFRESH  {}  {}s",
        countdown_bar(state.countdown.fraction()),
        state.countdown.remaining()
    ));
    if let Some(notice) = &state.notice {
        lines.push(format!("> ERROR: {}", notice));
    }
    lines.push(format!(
        "KEY {}    ELAPSED {}",
        masked_code,
        format_elapsed(state.elapsed)
    ));

    if !state.recent_scans.is_empty() {
        lines.push(RULE.to_string());
        lines.push("RECENT SCANS".to_string());
        for scan in state.recent_scans.iter().take(MAX_FEED_ROWS) {
            lines.push(format!("  {:<28} {}", scan.student_name, scan.roll_number));
        }
    }

    lines.push(RULE.to_string());
    if state.ending {
        lines.push("Ending...".to_string());
    } else if presentation.is_confirming_end() {
        lines.push("End this session? This cannot be undone. [y/N]".to_string());
    } else {
        let fullscreen_hint = if presentation.is_fullscreen() {
            "[F11] exit fullscreen"
        } else {
            "[F11] fullscreen"
        };
        lines.push(format!("[e] end session  {}  [q] quit", fullscreen_hint));
    }

    lines
}

pub fn render_ended(state: &DisplayState) -> Vec<String> {
    let reason = match state.phase {
        Phase::Ended(reason) => reason.describe(),
        Phase::Active => "",
    };
    let summary = state.summary.clone().unwrap_or_else(|| {
        EndedSummary::compute(None, state.students_scanned, state.total_enrolled, state.elapsed)
    });

    let mut lines = vec![
        "■ SESSION ENDED".to_string(),
        reason.to_string(),
        RULE.to_string(),
        format!("Final count: {} students marked present", summary.present),
    ];
    if let Some(absent) = summary.absent {
        lines.push(format!("Absent: {}", absent));
    }
    lines.push(format!("Duration: {} min", summary.duration_minutes));
    lines.push(RULE.to_string());
    lines.push("[n] new session  [q] quit".to_string());
    lines
}

/// Wrap a rendered frame for `Terminal::draw`.
///
/// Lines are centred and never wrapped, so a narrow terminal clips the QR
/// code instead of breaking its rows apart.
pub fn widget(lines: Vec<String>) -> Paragraph<'static> {
    let text: Text<'static> = lines.into_iter().map(Line::from).collect();
    Paragraph::new(text).alignment(Alignment::Center)
}

fn countdown_bar(fraction: f64) -> String {
    let filled = ((fraction.clamp(0.0, 1.0) * BAR_WIDTH as f64).round() as usize).min(BAR_WIDTH);
    format!("[{}{}]", "█".repeat(filled), "░".repeat(BAR_WIDTH - filled))
}
