//! QuantPrep CLI
//!
//! Interactive quant-interview practice in the terminal, or the HTTP and
//! WebSocket API with `quantprep serve`.

mod repl;

use std::net::SocketAddr;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use quantprep_core::{
    create_router, AppState, BatchMode, Config, Difficulty, GeminiService, GenerateStart,
    GenerationRequest, Language, ModelTier, Orchestrator, QuantError, SessionEvent, SettingsPatch,
    SlotStatus, Topic,
};
use quantprep_render::{json::JsonGenerator, MarkdownGenerator, Reveal};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpListener;
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::EnvFilter;

use crate::repl::{ReplCommand, HELP};

/// Default port for the HTTP API server.
const DEFAULT_PORT: u16 = 3000;

/// QuantPrep - Quant Interview Practice
///
/// Streams sets of interview questions from Gemini and keeps the next set
/// pre-loaded in the background.
#[derive(Parser, Debug)]
#[command(name = "quantprep")]
#[command(version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to configuration file (default: quantprep.json in current directory)
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<String>,

    /// Enable verbose output (sets log level to debug)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Question topic (probability, statistics, brain_teasers, stochastic_calculus, linear_algebra)
    #[arg(long, global = true)]
    topic: Option<Topic>,

    /// Free-text topic that overrides --topic
    #[arg(long, value_name = "TEXT", global = true)]
    custom_topic: Option<String>,

    /// Difficulty (easy, medium, hard, super_hard)
    #[arg(long, global = true)]
    difficulty: Option<Difficulty>,

    /// Output language (english, chinese)
    #[arg(long, global = true)]
    language: Option<Language>,

    /// Model tier (flash, pro, lite)
    #[arg(long, global = true)]
    model: Option<ModelTier>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the HTTP and WebSocket API
    Serve {
        /// Port for the HTTP API server
        #[arg(short, long, default_value_t = DEFAULT_PORT)]
        port: u16,
    },
}

impl Args {
    /// Settings overrides given on the command line.
    fn settings_patch(&self) -> SettingsPatch {
        SettingsPatch {
            topic: self.topic,
            custom_topic: self.custom_topic.clone(),
            difficulty: self.difficulty,
            language: self.language,
            model: self.model,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if args.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    tracing::debug!(config = ?args.config, "Config file");

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            // Setup problems (config, credentials) exit with 2
            let fatal = e
                .downcast_ref::<QuantError>()
                .is_some_and(QuantError::is_fatal);
            ExitCode::from(if fatal { 2 } else { 1 })
        }
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    let mut config = load_config(args.config.as_deref())?;

    let overrides = args.settings_patch();
    if !overrides.is_empty() {
        config.defaults = overrides.applied_to(&config.defaults);
    }
    config.validate()?;

    let service = Arc::new(GeminiService::from_env(&config)?);
    let orchestrator = Orchestrator::from_config(&config, service);

    match args.command {
        Some(Command::Serve { port }) => serve(orchestrator, port).await,
        None => run_session(&orchestrator).await,
    }
}

/// Loads configuration from the specified path or default location.
fn load_config(config_path: Option<&str>) -> anyhow::Result<Config> {
    match config_path {
        Some(path_str) => {
            let path = Path::new(path_str);
            if !path.exists() {
                anyhow::bail!(
                    "Config file not found: '{}'\n\nSuggestion: Check the path or remove the --config flag to use defaults",
                    path.display()
                );
            }
            Ok(Config::load_from_file(path)?)
        }
        None => Ok(Config::load()?),
    }
}

// ============================================================================
// API Server
// ============================================================================

async fn serve(orchestrator: Orchestrator, port: u16) -> anyhow::Result<()> {
    let addr: SocketAddr = ([127, 0, 0, 1], port).into();
    let router = create_router(AppState::new(orchestrator));

    let listener = TcpListener::bind(addr).await.map_err(|e| {
        anyhow::anyhow!(
            "Failed to bind to {addr}: {e}\n\nSuggestion: Try a different port with --port"
        )
    })?;

    println!("QuantPrep API running on http://{addr}");
    println!("Press Ctrl+C to stop");

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Received Ctrl+C, shutting down");
        })
        .await?;

    Ok(())
}

// ============================================================================
// Interactive Session
// ============================================================================

/// Runs the terminal session until `quit`, end of input or Ctrl+C.
async fn run_session(orchestrator: &Orchestrator) -> anyhow::Result<()> {
    let mut events = orchestrator.subscribe();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut reveals = vec![Reveal::default(); orchestrator.batch_size()];

    print_settings(&orchestrator.settings());
    println!("{HELP}");
    println!();
    next_set(orchestrator, &mut reveals);

    loop {
        tokio::select! {
            Ok(()) = tokio::signal::ctrl_c() => {
                tracing::info!("Received Ctrl+C, shutting down");
                break;
            }
            event = events.recv() => match event {
                Ok(event) => print_event(orchestrator, &event, &reveals),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Session events lagged");
                }
                Err(RecvError::Closed) => break,
            },
            line = lines.next_line() => {
                let Some(line) = line? else {
                    break;
                };
                match ReplCommand::parse(&line) {
                    Ok(ReplCommand::Quit) => break,
                    Ok(command) => execute(orchestrator, command, &mut reveals),
                    Err(e) => eprintln!("{e}"),
                }
            }
        }
    }

    Ok(())
}

fn execute(orchestrator: &Orchestrator, command: ReplCommand, reveals: &mut [Reveal]) {
    match command {
        ReplCommand::Next => next_set(orchestrator, reveals),
        ReplCommand::Hint(number) => {
            toggle_card(orchestrator, reveals, number, Reveal::toggle_hint);
        }
        ReplCommand::Solution(number) => {
            toggle_card(orchestrator, reveals, number, Reveal::toggle_solution);
        }
        ReplCommand::Set(patch) => {
            if !orchestrator.update_settings(&patch) {
                println!("Settings unchanged");
            }
        }
        ReplCommand::Status => {
            let snapshot = orchestrator.snapshot();
            print_settings(&snapshot.request);
            let generator = MarkdownGenerator::new(snapshot.request.language);
            println!("{}", generator.session(&snapshot, reveals));
        }
        ReplCommand::Save(path) => {
            let snapshot = orchestrator.snapshot();
            match JsonGenerator::new(&snapshot.active).write_to_file(&path, true) {
                Ok(()) => println!(
                    "Saved {} questions to {}",
                    snapshot.active.slots.len(),
                    path.display()
                ),
                Err(e) => eprintln!("Failed to save {}: {e}", path.display()),
            }
        }
        ReplCommand::Help => println!("{HELP}"),
        ReplCommand::Quit => {}
    }
}

/// Shows the next set and resets the reveal toggles.
fn next_set(orchestrator: &Orchestrator, reveals: &mut [Reveal]) {
    let labels = MarkdownGenerator::new(orchestrator.settings().language).labels();

    match orchestrator.begin_generate() {
        Ok(GenerateStart::Swapped { token }) => {
            reveals.fill(Reveal::default());
            tracing::debug!(token, "Showing pre-loaded set");
            print_session(orchestrator, reveals);
        }
        // The batch keeps running after the handle is dropped.
        Ok(GenerateStart::Started { token, .. }) => {
            reveals.fill(Reveal::default());
            tracing::debug!(token, "Started foreground set");
            println!("{}", labels.generating);
        }
        Err(e) => eprintln!("{e}"),
    }
}

fn toggle_card(
    orchestrator: &Orchestrator,
    reveals: &mut [Reveal],
    number: usize,
    toggle: fn(&mut Reveal),
) {
    let snapshot = orchestrator.snapshot();
    let (Some(slot), Some(reveal)) = (
        snapshot.active.slots.get(number - 1),
        reveals.get_mut(number - 1),
    ) else {
        eprintln!(
            "No question {number}; the current set has {}",
            snapshot.active.slots.len()
        );
        return;
    };

    toggle(reveal);
    let generator = MarkdownGenerator::new(snapshot.request.language);
    println!("{}", generator.card(number, slot, *reveal));
}

// ============================================================================
// Output
// ============================================================================

fn print_event(orchestrator: &Orchestrator, event: &SessionEvent, reveals: &[Reveal]) {
    let labels = MarkdownGenerator::new(orchestrator.settings().language).labels();

    match event {
        SessionEvent::SlotSettled(settled) if settled.mode == BatchMode::Foreground => {
            let snapshot = orchestrator.snapshot();
            let total = snapshot.active.slots.len();
            let number = settled.slot + 1;
            match &settled.status {
                SlotStatus::Failed(reason) => println!("  [{number}/{total}] failed: {reason}"),
                _ => {
                    let title = snapshot
                        .active
                        .slots
                        .get(settled.slot)
                        .and_then(|slot| slot.data.title.clone())
                        .unwrap_or_default();
                    println!("  [{number}/{total}] {title}");
                }
            }
        }
        SessionEvent::BatchCompleted(completed) if completed.mode == BatchMode::Foreground => {
            tracing::info!(
                token = completed.token,
                succeeded = completed.report.succeeded,
                failed = completed.report.failed,
                "Set complete"
            );
            print_session(orchestrator, reveals);
        }
        SessionEvent::BatchStarted(started) if started.mode == BatchMode::Background => {
            println!("{}", labels.preloading);
        }
        SessionEvent::BufferReady(_) => println!("{}", labels.show_next),
        SessionEvent::SettingsChanged(changed) => print_settings(&changed.request),
        SessionEvent::Error(error) => eprintln!("Error: {}", error.message),
        _ => {}
    }
}

fn print_session(orchestrator: &Orchestrator, reveals: &[Reveal]) {
    let snapshot = orchestrator.snapshot();
    let generator = MarkdownGenerator::new(snapshot.request.language);
    println!();
    println!("{}", generator.session(&snapshot, reveals));
}

fn print_settings(request: &GenerationRequest) {
    println!(
        "Topic: {} | Difficulty: {} | Language: {} | Model: {}",
        request.effective_topic(),
        request.difficulty,
        request.language,
        request.model
    );
}
