//! songloom CLI - The `songloom` command.
//!
//! Reads TOML song descriptions and drives the songloom-core engine:
//!
//! - `timeline` prints every trigger of one or more loops
//! - `play` runs the transport in real time against logging voices
//! - `settings` prints the song's settings summary
//! - `init` / `config-path` manage the configuration file

mod config;
mod songfile;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use songloom_core::{
    BeatTime, ChannelHook, Instrument, InstrumentSpec, LogVoice, RunReport, VisualPayload,
    VisualizationHook,
};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::config::Config;
use crate::songfile::SongFile;

/// songloom - pattern expansion and event scheduling for generated songs
#[derive(Parser, Debug)]
#[command(name = "songloom")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Expand song descriptions into precisely timed trigger streams", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,

    /// Config file path (default: ~/.config/songloom/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print every trigger of a song without waiting for the clock
    Timeline {
        /// Path to the song file
        #[arg(value_name = "FILE")]
        song: PathBuf,

        /// Number of loops to print
        #[arg(short, long)]
        loops: Option<u32>,
    },

    /// Play a song in real time (Ctrl+C stops)
    Play {
        /// Path to the song file
        #[arg(value_name = "FILE")]
        song: PathBuf,

        /// Stop after this long, e.g. `30s` or `2m`
        #[arg(long = "for", value_name = "DURATION", value_parser = humantime::parse_duration)]
        duration: Option<Duration>,

        /// Override the song's tempo
        #[arg(long)]
        bpm: Option<f64>,
    },

    /// Show the settings summary of a song
    Settings {
        /// Path to the song file
        #[arg(value_name = "FILE")]
        song: PathBuf,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Create a default configuration file
    Init,

    /// Show the configuration file path
    ConfigPath,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp(None)
        .init();

    let args = Args::parse();

    match args.command {
        Commands::Init => {
            let path = Config::create_default_config_file()?;
            println!("Created default config at: {}", path.display());
            Ok(())
        }
        Commands::ConfigPath => {
            let path = Config::config_path()?;
            println!("{}", path.display());
            Ok(())
        }
        Commands::Timeline { song, loops } => {
            let config = load_config(args.config.as_deref())?;
            print_timeline(&song, loops, &config)
        }
        Commands::Play { song, duration, bpm } => {
            let config = load_config(args.config.as_deref())?;
            play(&song, duration, bpm, &config)
        }
        Commands::Settings { song, json } => {
            let config = load_config(args.config.as_deref())?;
            print_settings(&song, json, &config)
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => Config::load_from(path),
        None => Ok(Config::load_or_default()),
    }
}

fn log_voice(spec: &InstrumentSpec) -> Box<dyn Instrument> {
    Box::new(LogVoice::new(spec.clone()))
}

fn format_payload(payload: &VisualPayload) -> String {
    let pitches = payload
        .pitches
        .as_ref()
        .map(|p| p.to_string())
        .unwrap_or_else(|| "-".to_string());
    let duration = payload
        .duration
        .map(|d| d.to_string())
        .unwrap_or_default();
    format!(
        "{:>9.3}s  {:<10} {:<16} {}",
        payload.time, payload.track, pitches, duration
    )
}

fn report_failures(report: &RunReport) {
    for failure in &report.failures {
        eprintln!(
            "failed: {} at beat {}: {}",
            failure.track, failure.beat, failure.message
        );
    }
}

fn print_timeline(path: &Path, loops: Option<u32>, config: &Config) -> Result<()> {
    let file = SongFile::load(path)?;
    let ctx = file.context(&config.song)?;
    let (tx, rx) = crossbeam_channel::unbounded();

    let mut hooks = |_: &str| -> Option<Box<dyn VisualizationHook>> {
        Some(Box::new(ChannelHook::new(tx.clone())))
    };
    let mut song = file.build(ctx, &mut log_voice, &mut hooks)?;
    drop(hooks);
    drop(tx);

    let loops = loops.unwrap_or(config.timeline.loops).max(1);
    let loop_bars = song.loop_bars().unwrap_or(1);
    let end = BeatTime::from_bars(
        u64::from(loop_bars) * u64::from(loops),
        song.context().signature(),
    );

    song.play()?;
    let report = song.advance_to(end)?;
    song.stop();

    for payload in rx.try_iter() {
        println!("{}", format_payload(&payload));
    }
    report_failures(&report);
    log::info!(
        "{} triggers over {} loop(s) of {} bar(s)",
        report.fired,
        loops,
        loop_bars
    );
    Ok(())
}

fn play(path: &Path, duration: Option<Duration>, bpm: Option<f64>, config: &Config) -> Result<()> {
    let mut file = SongFile::load(path)?;
    if bpm.is_some() {
        file.bpm = bpm;
    }
    let ctx = file.context(&config.song)?;

    let mut hooks = |_: &str| -> Option<Box<dyn VisualizationHook>> {
        Some(Box::new(|payload: &VisualPayload| println!("{}", format_payload(payload))))
    };
    let mut song = file.build(ctx, &mut log_voice, &mut hooks)?;

    let stop = song.stop_handle();
    for signal in [signal_hook::consts::SIGINT, signal_hook::consts::SIGTERM] {
        signal_hook::flag::register(signal, stop.flag())
            .context("Failed to install signal handler")?;
    }

    print!("{}", song.settings());
    log::info!("Playing {} (Ctrl+C to stop)", path.display());

    song.play()?;
    let report = song.run_realtime(duration, config.transport.poll_interval())?;
    song.stop();

    report_failures(&report);
    log::info!(
        "{} triggers, {} failure(s){}",
        report.fired,
        report.failures.len(),
        if report.stopped { ", interrupted" } else { "" }
    );
    Ok(())
}

fn print_settings(path: &Path, json: bool, config: &Config) -> Result<()> {
    let file = SongFile::load(path)?;
    let ctx = file.context(&config.song)?;
    let mut hooks = |_: &str| -> Option<Box<dyn VisualizationHook>> { None };
    let song = file.build(ctx, &mut log_voice, &mut hooks)?;

    if json {
        println!("{}", serde_json::to_string_pretty(song.settings())?);
    } else {
        print!("{}", song.settings());
    }
    Ok(())
}
