use std::path::PathBuf;
use std::process::ExitCode;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tokio::sync::broadcast::error::TryRecvError;
use ugen_audio::audio::{default_platform, plan_buffers};
use ugen_audio::driver::{AudioDriver, DriverEvent, DriverOutcome, ShutdownPolicy};
use ugen_audio::engine::{ToneEngine, ToneParam, STATUS_OK};
use ugen_audio::AppConfig;

#[derive(Parser, Debug)]
#[command(
    name = "ugen_cli",
    about = "Drive the UGen audio loop against the default sound device"
)]
struct Cli {
    /// JSON configuration file (defaults to assets/driver_config.json)
    #[arg(long)]
    config: Option<PathBuf>,
    /// Log at debug level
    #[arg(long, short)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Play enveloped sine voices through the driver loop
    Play {
        #[arg(long, default_value_t = 440.0)]
        frequency: f32,
        #[arg(long, default_value_t = 0.3)]
        amplitude: f32,
        /// Seconds to keep the loop running
        #[arg(long, default_value_t = 3.0)]
        seconds: f64,
        /// Capture channel count; 0 runs output-only
        #[arg(long)]
        input_channels: Option<u16>,
        /// Abandon shutdown after this many milliseconds
        #[arg(long)]
        shutdown_timeout_ms: Option<u64>,
    },
    /// Report the negotiated buffer sizes without running the loop
    Probe {
        #[arg(long)]
        input_channels: Option<u16>,
    },
    /// Print the default configuration as JSON
    DumpConfig,
}

#[derive(Serialize)]
struct PlayReport {
    outcome: Option<DriverOutcome>,
    blocks: u64,
    short_reads: u64,
    duplex: bool,
    events_seen: usize,
}

fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {err:?}");
            ExitCode::from(1)
        }
    }
}

fn run() -> Result<ExitCode> {
    let cli = Cli::parse();
    ugen_audio::init_logging(cli.verbose);

    let config = match &cli.config {
        Some(path) => AppConfig::load_from_file(path),
        None => AppConfig::load(),
    };

    match cli.command {
        Commands::Play {
            frequency,
            amplitude,
            seconds,
            input_channels,
            shutdown_timeout_ms,
        } => run_play(
            config,
            frequency,
            amplitude,
            seconds,
            input_channels,
            shutdown_timeout_ms,
        ),
        Commands::Probe { input_channels } => run_probe(config, input_channels),
        Commands::DumpConfig => run_dump(),
    }
}

fn run_play(
    mut config: AppConfig,
    frequency: f32,
    amplitude: f32,
    seconds: f64,
    input_channels: Option<u16>,
    shutdown_timeout_ms: Option<u64>,
) -> Result<ExitCode> {
    if let Some(channels) = input_channels {
        config.driver.input_channels = channels;
    }
    if shutdown_timeout_ms.is_some() {
        config.shutdown.timeout_ms = shutdown_timeout_ms;
    }
    let policy: ShutdownPolicy = config.shutdown.clone().into();

    let factory = ToneEngine::factory(config.tone.clone());
    let driver = AudioDriver::new(config.driver.clone(), default_platform(), &factory)
        .context("failed to create audio driver")?;
    let mut events = driver.subscribe_events();

    check_status(driver.set_parameter(ToneParam::Frequency as i32, frequency), "frequency")?;
    check_status(driver.set_parameter(ToneParam::Amplitude as i32, amplitude), "amplitude")?;

    driver.start().context("failed to start audio driver")?;
    check_status(driver.set_parameter(ToneParam::Enable as i32, 1.0), "enable")?;

    let mut seen = 0;
    let deadline = Instant::now() + Duration::from_secs_f64(seconds.max(0.0));
    while Instant::now() < deadline && !driver.has_ended() {
        drain_events(&mut events, &mut seen);
        thread::sleep(policy.poll_interval);
    }

    let outcome = driver
        .shutdown(&policy)
        .context("audio driver did not shut down")?;
    drain_events(&mut events, &mut seen);

    let status = driver.status();
    let report = PlayReport {
        outcome,
        blocks: status.blocks_processed(),
        short_reads: status.short_reads(),
        duplex: status.is_duplex(),
        events_seen: seen,
    };
    println!("{}", serde_json::to_string_pretty(&report)?);

    Ok(match outcome {
        Some(DriverOutcome::Stopped) => ExitCode::SUCCESS,
        _ => ExitCode::from(2),
    })
}

fn run_probe(mut config: AppConfig, input_channels: Option<u16>) -> Result<ExitCode> {
    if let Some(channels) = input_channels {
        config.driver.input_channels = channels;
    }
    config.driver.validate()?;

    let platform = default_platform();
    let plan = plan_buffers(platform.as_ref(), &config.driver)
        .context("platform buffer query failed")?;
    println!("{}", serde_json::to_string_pretty(&plan)?);
    Ok(ExitCode::SUCCESS)
}

fn run_dump() -> Result<ExitCode> {
    println!("{}", serde_json::to_string_pretty(&AppConfig::default())?);
    Ok(ExitCode::SUCCESS)
}

fn check_status(status: i32, what: &str) -> Result<()> {
    if status != STATUS_OK {
        anyhow::bail!("engine rejected {} (status {})", what, status);
    }
    Ok(())
}

/// Print pending driver events as JSON lines
fn drain_events(events: &mut tokio::sync::broadcast::Receiver<DriverEvent>, seen: &mut usize) {
    loop {
        match events.try_recv() {
            Ok(event) => {
                *seen += 1;
                match serde_json::to_string(&event) {
                    Ok(line) => println!("{}", line),
                    Err(e) => log::warn!("could not encode driver event: {}", e),
                }
            }
            Err(TryRecvError::Lagged(skipped)) => {
                log::warn!("missed {} driver events", skipped);
            }
            Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
        }
    }
}
