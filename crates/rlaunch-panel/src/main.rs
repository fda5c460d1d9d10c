mod agent_link;
mod app;
mod config;
mod theme;
mod ui;

use agent_link::{agent_loop, COMMAND_QUEUE_CAPACITY};
use anyhow::Result;
use crossterm::{
    event::{DisableMouseCapture, EnableMouseCapture, Event, EventStream, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use futures_util::StreamExt;
use ratatui::{backend::CrosstermBackend, Terminal};
use rlaunch_core::runtime::env_true;
use std::fs::OpenOptions;
use std::io;
use std::sync::Mutex;
use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();
    let config = config::load_config()?;
    info!(
        event = "panel_start",
        session_id = %config.session_id,
        socket = %config.socket_path.display()
    );

    let (command_tx, command_rx) = mpsc::channel(COMMAND_QUEUE_CAPACITY);
    let (agent_tx, agent_rx) = mpsc::channel(256);
    let link = tokio::spawn(agent_loop(config.clone(), agent_tx, command_rx));
    let mut app = app::App::new(config, command_tx);

    let mut terminal = setup_terminal()?;
    let result = run_app(&mut terminal, &mut app, agent_rx).await;
    restore_terminal(&mut terminal)?;
    link.abort();
    result
}

async fn run_app(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut app::App,
    mut agent_rx: mpsc::Receiver<agent_link::AgentEvent>,
) -> Result<()> {
    let mut events = EventStream::new();
    loop {
        terminal.draw(|frame| ui::render(frame, app))?;
        tokio::select! {
            Some(event) = agent_rx.recv() => {
                app.apply_agent_event(event);
            }
            maybe_event = events.next() => {
                match maybe_event {
                    Some(Ok(Event::Key(key))) => {
                        if matches!(key.kind, KeyEventKind::Press | KeyEventKind::Repeat)
                            && app.handle_key(key)
                        {
                            break;
                        }
                    }
                    Some(Ok(Event::Mouse(mouse))) => app.handle_mouse(mouse),
                    Some(Ok(_)) => {}
                    Some(Err(err)) => return Err(err.into()),
                    None => break,
                }
            }
        }
    }
    info!(event = "panel_quit");
    Ok(())
}

fn setup_terminal() -> Result<Terminal<CrosstermBackend<io::Stdout>>> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;
    terminal.clear()?;
    Ok(terminal)
}

fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<io::Stdout>>) -> Result<()> {
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;
    Ok(())
}

/// The panel owns the terminal, so logs go nowhere unless
/// `RLAUNCH_LOG_STDOUT` is set or `RLAUNCH_LOG_FILE` names a file.
fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if env_true("RLAUNCH_LOG_STDOUT") {
        let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
        return;
    }
    let log_file = std::env::var("RLAUNCH_LOG_FILE")
        .ok()
        .filter(|path| !path.trim().is_empty())
        .and_then(|path| {
            OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .ok()
        });
    match log_file {
        Some(file) => {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .try_init();
        }
        None => {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(io::sink)
                .try_init();
        }
    }
}
