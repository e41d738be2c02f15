use std::{
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
    time::{Duration, Instant},
};

use clap::{Parser, Subcommand};
use looper_clock_core::{ClockConfig, ClockError, LooperBank, MasterClock, Tempo};
use tracing_subscriber::EnvFilter;

fn main() -> looper_clock_core::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Run {
            config,
            bpm,
            divisions,
            seconds,
        } => run_clock(config.as_ref(), bpm, divisions, seconds),
        Commands::Tempo { bpm, divisions } => print_tempo(bpm, divisions),
        Commands::CheckConfig { path } => check_config(&path),
    }
}

fn run_clock(
    config: Option<&PathBuf>,
    bpm: Option<f64>,
    divisions: Option<u32>,
    seconds: f64,
) -> looper_clock_core::Result<()> {
    let mut config = match config {
        Some(path) => ClockConfig::load(path)?,
        None => ClockConfig::default(),
    };
    if let Some(bpm) = bpm {
        config.bpm = bpm;
    }
    if let Some(divisions) = divisions {
        config.beat_divisions = divisions;
    }
    config.validate()?;

    let run_for = Duration::try_from_secs_f64(seconds)
        .map_err(|err| ClockError::msg(format!("invalid --seconds: {err}")))?;

    tracing::info!(
        bpm = config.bpm,
        beat_divisions = config.beat_divisions,
        loops = config.loops.len(),
        "starting master clock"
    );

    let clock = Arc::new(MasterClock::from_config(&config)?);
    let slots = config.loop_slots();
    for name in slots.names() {
        slots.set_active(&name, true);
    }

    clock.start()?;

    let mut bank = LooperBank::new(clock.clone());
    bank.sync(&slots, |slot| {
        let slot = slot.to_string();
        move || tracing::info!(slot = %slot, "loop iteration")
    })?;

    let done = Arc::new(AtomicBool::new(false));
    let consumer = {
        let clock = clock.clone();
        let done = done.clone();
        thread::Builder::new()
            .name("division-consumer".to_string())
            .spawn(move || consume_divisions(&clock, &done))?
    };

    thread::sleep(run_for);
    done.store(true, Ordering::Release);
    if consumer.join().is_err() {
        tracing::error!("division consumer terminated abnormally");
    }

    bank.clear();
    clock.stop();
    tracing::info!(divisions = clock.division_count(), "master clock finished");
    Ok(())
}

/// Follows the lookahead buffer the way a sequencer would.
fn consume_divisions(clock: &MasterClock, done: &AtomicBool) {
    let timeout = clock.division_duration() * 2;
    while !done.load(Ordering::Acquire) {
        if !clock.wait_for_buffer_update_timeout(timeout) {
            continue;
        }
        let Some(next) = clock.division_timestamp(-1) else {
            continue;
        };
        tracing::debug!(
            division = clock.division_count(),
            division_of_beat = clock.current_division_of_beat(),
            next_in_us = next.saturating_duration_since(Instant::now()).as_micros() as u64,
            "division"
        );
    }
}

fn print_tempo(bpm: f64, divisions: u32) -> looper_clock_core::Result<()> {
    let tempo = Tempo::new(bpm, divisions)?;
    println!(
        "{bpm} bpm / {divisions} divisions: beat {:?}, division {:?}",
        tempo.beat_duration(),
        tempo.division_duration()
    );
    Ok(())
}

fn check_config(path: &PathBuf) -> looper_clock_core::Result<()> {
    let config = ClockConfig::load(path)?;
    tracing::info!(?path, "configuration is valid");
    println!(
        "{} bpm, {} divisions, {} loop(s)",
        config.bpm,
        config.beat_divisions,
        config.loops.len()
    );
    Ok(())
}

fn init_tracing(verbose: bool) {
    let fallback = if verbose { "debug" } else { "info" };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback)),
        )
        .try_init();
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Beat-synchronised clock for a looping instrument", long_about = None)]
struct Cli {
    /// Log scheduler lifecycle and every division.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the clock and every configured loop for a while.
    Run {
        /// JSON configuration file.
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Override the configured tempo.
        #[arg(long)]
        bpm: Option<f64>,
        /// Override the configured subdivisions per beat.
        #[arg(long)]
        divisions: Option<u32>,
        /// How long to run before stopping.
        #[arg(long, default_value_t = 4.0)]
        seconds: f64,
    },
    /// Print beat and division durations for a tempo.
    Tempo {
        #[arg(long)]
        bpm: f64,
        #[arg(long, default_value_t = 8)]
        divisions: u32,
    },
    /// Load and validate a configuration file.
    CheckConfig {
        /// Path to the JSON configuration.
        path: PathBuf,
    },
}
