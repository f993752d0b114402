use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use log::{info, warn};
use std::fs;
use std::future::Future;
use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

mod cli;
mod config;

use cli::{Cli, ControlCommand, Renderer};
use config::Config;
use ralphloop::domain::Signal;
use ralphloop::monitor::{Observation, RunMonitor};
use ralphloop::process::ClaudeSpawner;
use ralphloop::runner::Engine;
use ralphloop::storage::StatsStore;

fn setup_logging(level: Option<&str>) -> Result<()> {
    // Create log directory
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("ralphloop")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    let log_file = log_dir.join("ralphloop.log");

    // Setup env_logger with file output
    let target = Box::new(
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .context("Failed to open log file")?,
    );

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level.unwrap_or("info")))
        .target(env_logger::Target::Pipe(target))
        .init();

    info!("Logging initialized, writing to: {}", log_file.display());
    Ok(())
}

/// Forward stdin lines as control commands.
///
/// Runs on a plain thread: a blocking stdin read cannot be cancelled and
/// would otherwise hold up runtime shutdown.
fn spawn_control_reader(tx: mpsc::Sender<ControlCommand>) {
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else {
                break;
            };
            match ControlCommand::parse(&line) {
                Some(command) => {
                    if tx.blocking_send(command).is_err() {
                        return;
                    }
                }
                None if line.trim().is_empty() => {}
                None => eprintln!("{}", format!("unknown command: {}", line.trim()).red()),
            }
        }
        // Dropping tx tells the run loop stdin is gone
    });
}

/// Apply one control command. Returns false when the run should end.
fn handle_control(command: ControlCommand, monitor: &RunMonitor, renderer: &Renderer) -> bool {
    let engine = monitor.engine();
    match command {
        ControlCommand::Pause => {
            engine.pause();
            println!("{}", "pausing...".yellow());
        }
        ControlCommand::Resume => engine.resume(),
        ControlCommand::Wake => engine.wake(),
        ControlCommand::Status => println!("{}", renderer.status(monitor)),
        ControlCommand::Quit => return false,
        resize => {
            let current = engine.iterations();
            let floor = monitor.resize_floor();
            if let Some(target) = resize.resize(current, floor) {
                engine.set_iterations(target);
                info!("Resized run from {} to {} iterations", current, target);
                println!("{}", format!("iterations: {} -> {}", current, target).yellow());
                if engine.is_completed_waiting() {
                    engine.resume();
                }
            }
        }
    }
    true
}

/// Pump signals, control commands and interrupts until the signal queue closes.
///
/// `interrupts` makes one interrupt listener; a new one is made only after the
/// current one fires.
async fn drive_run<I, F>(
    monitor: &mut RunMonitor,
    renderer: &Renderer,
    signals: &mut mpsc::Receiver<Signal>,
    mut control_rx: mpsc::Receiver<ControlCommand>,
    cancel: &CancellationToken,
    mut interrupts: I,
) where
    I: FnMut() -> F,
    F: Future<Output = std::io::Result<()>>,
{
    let mut interactive = true;
    let mut listening = true;
    let interrupt = interrupts();
    tokio::pin!(interrupt);

    loop {
        tokio::select! {
            signal = signals.recv() => {
                let Some(signal) = signal else {
                    break;
                };
                let observation = monitor.observe(&signal);
                for line in renderer.render(&observation) {
                    println!("{}", line);
                }
                if matches!(observation, Observation::Complete(_)) {
                    if interactive {
                        println!("{}", "type +N to run more iterations, q to quit".dimmed());
                    } else {
                        cancel.cancel();
                    }
                }
            }
            command = control_rx.recv(), if interactive => {
                match command {
                    Some(command) => {
                        if !handle_control(command, monitor, renderer) {
                            cancel.cancel();
                        }
                    }
                    None => {
                        info!("stdin closed, run ends after the target is reached");
                        interactive = false;
                        if monitor.engine().is_completed_waiting() {
                            cancel.cancel();
                        }
                    }
                }
            }
            result = &mut interrupt, if listening => {
                match result {
                    Ok(()) => {
                        warn!("Interrupted");
                        cancel.cancel();
                        interrupt.set(interrupts());
                    }
                    Err(e) => {
                        warn!("Failed to listen for interrupts: {}", e);
                        listening = false;
                    }
                }
            }
        }
    }
}

async fn run_application(cli: &Cli, config: &Config) -> Result<()> {
    info!("Starting application");

    if cli.is_verbose() {
        println!("{}", "Verbose mode enabled".yellow());
    }

    let prompt = cli.read_prompt()?;
    let spawner = Arc::new(ClaudeSpawner::new(config.agent_command()));
    let engine = Engine::with_config(config.engine.iterations, prompt, spawner, config.engine_config());
    let mut monitor = RunMonitor::new(engine.clone(), config.rate_limit.default_backoff());
    let renderer = Renderer::new(cli.is_verbose());

    let cancel = CancellationToken::new();
    let mut signals = engine.start(cancel.clone()).context("Failed to start run")?;

    let (control_tx, control_rx) = mpsc::channel(16);
    spawn_control_reader(control_tx);

    drive_run(
        &mut monitor,
        &renderer,
        &mut signals,
        control_rx,
        &cancel,
        tokio::signal::ctrl_c,
    )
    .await;

    let stats = monitor.stats();
    println!(
        "{}",
        format!(
            "done: {} iterations, {} tokens, ${:.4}, {}s",
            stats.iterations,
            stats.total_tokens(),
            stats.total_cost_usd,
            stats.elapsed_secs
        )
        .green()
    );

    if config.stats.enabled {
        let store = StatsStore::new(config.stats_path());
        match store.accumulate(&stats) {
            Ok(totals) => info!(
                "Saved stats to {} (lifetime ${:.4}, {} iterations)",
                store.path().display(),
                totals.total_cost_usd,
                totals.iterations
            ),
            Err(e) => warn!("Failed to save stats to {}: {}", store.path().display(), e),
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Load configuration
    let mut config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    cli.apply_overrides(&mut config);
    config.validate().context("Invalid configuration")?;

    // Setup logging
    setup_logging(config.log_level.as_deref()).context("Failed to setup logging")?;

    info!("Starting with config from: {:?}", cli.config);

    // Run the main application logic
    run_application(&cli, &config).await.context("Application failed")?;

    Ok(())
}
