//! Attend display CLI - terminal display for rotating attendance QR codes

use attend_display::api::SessionEndResult;
use attend_display::view::{self, EndAction, Presentation};
use attend_display::{Config, DisplayController, DisplayCore, DisplayError};
use clap::{Parser, Subcommand};
use crossterm::event::{Event, EventStream, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::{cursor, execute, terminal};
use futures::future::LocalBoxFuture;
use futures::{FutureExt, StreamExt};
use ratatui::backend::CrosstermBackend;
use std::io::{self, BufRead, Stdout, Write};
use std::panic;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "attend-display")]
#[command(author = "Attend Karo Team")]
#[command(version)]
#[command(about = "Attend display - shows rotating attendance QR codes", long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "~/.attend-display/config.toml")]
    config: PathBuf,

    /// Session code (prompted for when omitted)
    #[arg(long)]
    code: Option<String>,

    /// Override the backend base URL
    #[arg(long)]
    api_url: Option<String>,

    /// Override the QR refresh interval in seconds
    #[arg(long)]
    interval: Option<u32>,

    /// Ask before ending the session (true/false)
    #[arg(long)]
    confirm_end: Option<bool>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Initialize a new config file with defaults
    #[arg(long)]
    init: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print live counters for a session as JSON
    Stats {
        /// Session id returned by code validation
        session_id: String,
    },
}

/// How a display run finished
enum Outcome {
    Quit,
    NewSession,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config_path = attend_display::config::expand_path(&args.config);

    // Handle --init flag
    if args.init {
        if config_path.exists() {
            println!("Config file already exists: {}", config_path.display());
            return Ok(());
        }
        Config::create_default(&config_path)?;
        println!("Created default config at: {}", config_path.display());
        return Ok(());
    }

    // Load configuration
    let config_found = config_path.exists();
    let mut config = if config_found {
        Config::from_file(&config_path)?
    } else {
        Config::default()
    };
    config.apply_env_overrides();

    // Apply CLI overrides
    if let Some(url) = args.api_url {
        config.api.base_url = url;
    }
    if let Some(interval) = args.interval {
        config.display.refresh_interval_secs = interval;
    }
    if let Some(confirm_end) = args.confirm_end {
        config.display.confirm_end = confirm_end;
    }
    config.validate()?;

    // Logs go to a file; the terminal belongs to the display
    let _log_guard = init_logging(&config, args.verbose)?;
    if config_found {
        tracing::info!("Loaded config from {}", config_path.display());
    } else {
        tracing::warn!(
            "Config file not found at {}, using defaults",
            config_path.display()
        );
    }

    let core = DisplayCore::new(config)?;

    if let Some(Command::Stats { session_id }) = args.command {
        let stats = core.stats(&session_id).await?;
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    let mut code = args.code;
    loop {
        let raw_code = match code.take() {
            Some(code) => code,
            None => match prompt_code()? {
                Some(code) => code,
                None => return Ok(()),
            },
        };

        match core.setup(&raw_code).await {
            Ok(record) => {
                println!(
                    "Session {} ({}) ready",
                    record.session.title(),
                    record.session.id
                );
            }
            Err(e) if returns_to_setup(&e) => {
                println!("> Error: {}", e);
                continue;
            }
            Err(e) => return Err(e.into()),
        }

        let controller = match core.start() {
            Ok(controller) => controller,
            Err(e) if returns_to_setup(&e) => {
                // storage refused the record
                println!("> Error: session could not be stored, check [storage] settings");
                continue;
            }
            Err(e) => return Err(e.into()),
        };

        match run_display(controller).await? {
            Outcome::Quit => break,
            Outcome::NewSession => continue,
        }
    }

    Ok(())
}

fn init_logging(
    config: &Config,
    verbose: bool,
) -> anyhow::Result<tracing_appender::non_blocking::WorkerGuard> {
    let log_dir = config.log_dir();
    std::fs::create_dir_all(&log_dir)?;
    let file_appender = tracing_appender::rolling::daily(&log_dir, "attend-display.log");
    let (writer, guard) = tracing_appender::non_blocking(file_appender);

    let log_level = if verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("attend_display={}", log_level).into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false),
        )
        .init();

    Ok(guard)
}

/// Errors the operator recovers from by entering a code again
fn returns_to_setup(error: &DisplayError) -> bool {
    matches!(
        error,
        DisplayError::Api(_) | DisplayError::InvalidCode(_) | DisplayError::NoActiveSession
    )
}

/// Read a session code from stdin. `None` on end of input.
fn prompt_code() -> io::Result<Option<String>> {
    let stdin = io::stdin();
    loop {
        print!("Session code: ");
        io::stdout().flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            return Ok(None);
        }
        if !line.trim().is_empty() {
            return Ok(Some(line));
        }
    }
}

type Terminal = ratatui::Terminal<CrosstermBackend<Stdout>>;

/// Raw-mode ratatui terminal; restored on drop and on panic
struct TerminalGuard {
    terminal: Terminal,
    fullscreen: bool,
}

impl TerminalGuard {
    fn enter() -> io::Result<Self> {
        let original_hook = panic::take_hook();
        panic::set_hook(Box::new(move |panic_info| {
            restore_terminal();
            original_hook(panic_info);
        }));

        terminal::enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(stdout, cursor::Hide)?;
        let mut terminal = Terminal::new(CrosstermBackend::new(stdout))?;
        terminal.clear()?;
        Ok(TerminalGuard {
            terminal,
            fullscreen: false,
        })
    }

    /// Switch to or from the alternate screen; returns the resulting state
    fn set_fullscreen(&mut self, fullscreen: bool) -> io::Result<bool> {
        if fullscreen == self.fullscreen {
            return Ok(self.fullscreen);
        }
        if fullscreen {
            execute!(self.terminal.backend_mut(), terminal::EnterAlternateScreen)?;
        } else {
            execute!(self.terminal.backend_mut(), terminal::LeaveAlternateScreen)?;
        }
        self.fullscreen = fullscreen;
        // the other screen holds stale content; force a full repaint
        self.terminal.clear()?;
        Ok(self.fullscreen)
    }

    /// Draw a frame; only cells that changed since the last frame are written
    fn draw(&mut self, lines: Vec<String>) -> io::Result<()> {
        self.terminal
            .draw(|frame| frame.render_widget(view::widget(lines), frame.area()))?;
        Ok(())
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        if self.fullscreen {
            let _ = execute!(self.terminal.backend_mut(), terminal::LeaveAlternateScreen);
        }
        let _ = self.terminal.clear();
        restore_terminal();
        let _ = panic::take_hook();
    }
}

fn restore_terminal() {
    let _ = terminal::disable_raw_mode();
    let _ = execute!(io::stdout(), cursor::Show);
}

fn is_quit(key: &KeyEvent) -> bool {
    matches!(key.code, KeyCode::Char('q'))
        || (key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL))
}

async fn run_display(controller: DisplayController) -> anyhow::Result<Outcome> {
    let mut term = TerminalGuard::enter()?;
    let mut presentation = Presentation::default();
    let mut state_rx = controller.subscribe();
    let mut keys = EventStream::new();
    let mut pending_end: Option<LocalBoxFuture<'_, attend_display::Result<SessionEndResult>>> =
        None;
    let masked_code = controller.masked_code();

    loop {
        let state = state_rx.borrow_and_update().clone();
        term.draw(view::render(
            controller.session(),
            &masked_code,
            &state,
            &presentation,
        ))?;

        tokio::select! {
            changed = state_rx.changed() => {
                if changed.is_err() {
                    return Ok(Outcome::Quit);
                }
            }
            result = async {
                match pending_end.as_mut() {
                    Some(end) => end.await,
                    None => std::future::pending().await,
                }
            } => {
                pending_end = None;
                match result {
                    Ok(_) => tracing::info!("Session ended by operator"),
                    // already published as the on-screen notice
                    Err(DisplayError::Api(e)) => tracing::debug!("End session refused: {}", e),
                    Err(e) => tracing::debug!("End session not sent: {}", e),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                return Ok(Outcome::Quit);
            }
            event = keys.next() => {
                let key = match event {
                    Some(Ok(Event::Key(key))) if key.kind == KeyEventKind::Press => key,
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => return Err(e.into()),
                    None => return Ok(Outcome::Quit),
                };

                if key.code == KeyCode::F(11) {
                    let target = presentation.toggle_target();
                    let actual = term.set_fullscreen(target)?;
                    presentation.sync_fullscreen(actual);
                    continue;
                }

                if !state.is_active() {
                    match key.code {
                        KeyCode::Char('n') => return Ok(Outcome::NewSession),
                        _ if is_quit(&key) => return Ok(Outcome::Quit),
                        _ => {}
                    }
                    continue;
                }

                if presentation.is_confirming_end() {
                    match key.code {
                        KeyCode::Char('y') | KeyCode::Char('Y') => {
                            if presentation.confirm_end() && pending_end.is_none() {
                                pending_end = Some(controller.end_session(None).boxed_local());
                            }
                        }
                        _ => presentation.cancel_end(),
                    }
                    continue;
                }

                match key.code {
                    KeyCode::Char('e') if pending_end.is_none() => {
                        if presentation.request_end(controller.policy().confirm_end)
                            == EndAction::Proceed
                        {
                            pending_end = Some(controller.end_session(None).boxed_local());
                        }
                    }
                    _ if is_quit(&key) => return Ok(Outcome::Quit),
                    _ => {}
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use attend_display::error::{ApiError, ApiErrorKind};

    #[test]
    fn test_code_and_storage_errors_return_to_setup() {
        let rejected = ApiError::new(ApiErrorKind::Http(404), "Invalid session code");
        assert!(returns_to_setup(&DisplayError::Api(rejected)));
        assert!(returns_to_setup(&DisplayError::Api(ApiError::timeout())));
        assert!(returns_to_setup(&DisplayError::InvalidCode(
            "Session code is required".into()
        )));
        assert!(returns_to_setup(&DisplayError::NoActiveSession));
    }

    #[test]
    fn test_local_failures_are_fatal() {
        assert!(!returns_to_setup(&DisplayError::Config("bad".into())));
        assert!(!returns_to_setup(&DisplayError::Io(io::Error::other("tty gone"))));
    }
}
