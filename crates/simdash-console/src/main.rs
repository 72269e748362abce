mod app;
mod commands;
mod form;
mod theme;
mod ui;

use anyhow::{Context, Result};
use app::{App, KeyOutcome, Request};
use clap::{Parser, Subcommand};
use commands::CreateArgs;
use crossterm::{
    cursor::Show,
    event::EventStream,
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use futures_util::StreamExt;
use ratatui::{backend::CrosstermBackend, Terminal};
use simdash_core::SimulationId;
use simdash_sync::engine::SyncEvent;
use simdash_sync::{
    ClientConfig, ConfigOverrides, Dispatcher, EventStream as SimulationEvents, HttpSimulationApi,
    StreamOptions,
};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::EnvFilter;

const SYNC_QUEUE_CAPACITY: usize = 256;

#[derive(Parser)]
#[command(name = "simdash")]
#[command(about = "Simulation dashboard client", long_about = None)]
struct Cli {
    /// Backend base URL
    #[arg(long, global = true)]
    api_url: Option<String>,
    /// Socket.IO websocket URL; derived from the API URL when omitted
    #[arg(long, global = true)]
    events_url: Option<String>,
    #[arg(long, global = true)]
    timeout_secs: Option<u64>,
    #[arg(long, global = true)]
    download_dir: Option<PathBuf>,
    /// Reconnect the live stream after it drops
    #[arg(long, global = true)]
    reconnect: bool,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Live dashboard
    Watch,
    /// Print all simulations
    List,
    /// Create a simulation
    Create(CreateArgs),
    /// Start a simulation that has not run yet
    Run { id: SimulationId },
    /// Delete one simulation
    Delete { id: SimulationId },
    /// Delete every simulation
    DeleteAll {
        #[arg(long)]
        yes: bool,
    },
    /// Save the result file of a finished simulation
    Download {
        id: SimulationId,
        /// Directory to save into
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

impl Cli {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            api_url: self.api_url.clone(),
            events_url: self.events_url.clone(),
            request_timeout_secs: self.timeout_secs,
            download_dir: self.download_dir.clone(),
            stream_reconnect: self.reconnect.then_some(true),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = ClientConfig::load(&cli.overrides()).context("Invalid configuration")?;
    let command = cli.command.unwrap_or(Commands::Watch);
    init_logging(config.log_stdout, matches!(command, Commands::Watch));

    match command {
        Commands::Watch => watch(config).await,
        Commands::List => commands::list(&config).await,
        Commands::Create(args) => commands::create(&config, args).await,
        Commands::Run { id } => commands::run(&config, id).await,
        Commands::Delete { id } => commands::delete(&config, id).await,
        Commands::DeleteAll { yes } => commands::delete_all(&config, yes).await,
        Commands::Download { id, out } => commands::download(&config, id, out).await,
    }
}

async fn watch(config: ClientConfig) -> Result<()> {
    let (sync_tx, mut sync_rx) = mpsc::channel::<SyncEvent>(SYNC_QUEUE_CAPACITY);
    let api = Arc::new(
        HttpSimulationApi::from_config(&config).context("Failed to build HTTP client")?,
    );
    let dispatcher = Dispatcher::new(api, sync_tx.clone(), config.download_dir.clone());

    // Subscribe before the snapshot so no announcement falls in between.
    let stream = SimulationEvents::connect(StreamOptions::from_config(&config));
    tokio::spawn(stream.subscribe().forward(sync_tx));
    info!(event = "watch_started", api = %config.api_url, events = %config.events_url);

    let mut app = App::new();
    let request = app.start();
    dispatch(&dispatcher, request);

    let result = {
        let mut guard = TerminalGuard::new(io::stdout());
        match guard.enter() {
            Ok(()) => match Terminal::new(CrosstermBackend::new(io::stdout())) {
                Ok(mut terminal) => {
                    run_loop(&mut terminal, &mut app, &dispatcher, &mut sync_rx).await
                }
                Err(err) => Err(err).context("Failed to initialize terminal"),
            },
            Err(err) => Err(err).context("Failed to enter raw mode"),
        }
    };
    stream.shutdown().await;
    result
}

/// Restores the terminal on every exit path, including setup failures and
/// panics inside the loop.
struct TerminalGuard<W: Write> {
    out: W,
    raw_mode: bool,
}

impl<W: Write> TerminalGuard<W> {
    fn new(out: W) -> Self {
        Self {
            out,
            raw_mode: false,
        }
    }

    fn enter(&mut self) -> io::Result<()> {
        enable_raw_mode()?;
        self.raw_mode = true;
        execute!(self.out, EnterAlternateScreen)
    }
}

impl<W: Write> Drop for TerminalGuard<W> {
    fn drop(&mut self) {
        if self.raw_mode {
            let _ = disable_raw_mode();
        }
        let _ = execute!(self.out, LeaveAlternateScreen, Show);
    }
}

async fn run_loop(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut App,
    dispatcher: &Dispatcher,
    sync_rx: &mut mpsc::Receiver<SyncEvent>,
) -> Result<()> {
    let mut events = EventStream::new();
    loop {
        app.observe_viewport(ui::table_area(terminal.size()?).height);
        app.layout();
        terminal.draw(|frame| ui::render(frame, app))?;

        tokio::select! {
            Some(event) = sync_rx.recv() => {
                app.apply_sync_event(event);
            }
            maybe_event = events.next() => {
                match maybe_event {
                    Some(Ok(event)) => match app.handle_input(event) {
                        KeyOutcome::Quit => break,
                        KeyOutcome::Request(request) => dispatch(dispatcher, request),
                        KeyOutcome::Continue => {}
                    },
                    Some(Err(err)) => return Err(err).context("Failed to read terminal input"),
                    None => break,
                }
            }
        }
    }
    Ok(())
}

fn dispatch(dispatcher: &Dispatcher, request: Request) {
    match request {
        Request::Reload => dispatcher.fetch_snapshot(),
        Request::Create(new_sim) => dispatcher.create(new_sim),
        Request::Execute(record) => dispatcher.execute(&record),
        Request::Delete(id) => dispatcher.delete(id),
        Request::DeleteAll => dispatcher.delete_all(),
        Request::Download(id) => dispatcher.download(id),
    }
}

fn init_logging(log_stdout: bool, watch_mode: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if log_stdout || !watch_mode {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(io::stderr)
            .try_init();
    } else {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(io::sink)
            .try_init();
    }
}
