//! Minimal outer loop for `fimcore`: loads a TOML config describing roots
//! and global options, runs a baseline scan, then loops `scan_once` on a
//! fixed interval, printing emitted events to stdout. Everything this
//! binary does beyond that (configuration format, scheduling, wiring up
//! real OS notification sources) is scaffolding to demonstrate the
//! library, not part of the monitored core itself.

use clap::Parser;
use fimcore::config::EngineConfig;
use fimcore::event::{Event, EventSink};
use fimcore::Engine;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::filter::EnvFilter;

/// A minimal scheduler-driven file integrity monitor.
#[derive(Parser)]
struct Cli {
    /// Path to a TOML configuration file describing roots and options.
    config: PathBuf,

    /// Seconds between scheduled scans.
    #[arg(long, default_value_t = 60)]
    interval_secs: u64,

    /// Run a single scan and exit instead of looping.
    #[arg(long)]
    once: bool,

    /// Increase log verbosity (-v info, -vv debug).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

struct StdoutSink;

impl EventSink for StdoutSink {
    fn send(&self, event: &Event) {
        println!("{}", event.to_compact_json());
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config_text = match std::fs::read_to_string(&cli.config) {
        Ok(text) => text,
        Err(e) => {
            error!("failed to read config {}: {e}", cli.config.display());
            return ExitCode::FAILURE;
        }
    };

    let config: EngineConfig = match toml::from_str(&config_text) {
        Ok(c) => c,
        Err(e) => {
            error!("invalid config: {e}");
            return ExitCode::FAILURE;
        }
    };

    let engine = match Engine::new(config, Box::new(StdoutSink)) {
        Ok(engine) => engine,
        Err(e) => {
            error!("failed to build engine: {e}");
            return ExitCode::FAILURE;
        }
    };

    info!("running baseline scan");
    engine.scan_once();

    if cli.once {
        return ExitCode::SUCCESS;
    }

    loop {
        std::thread::sleep(Duration::from_secs(cli.interval_secs));
        info!("running scheduled scan");
        engine.scan_once();
    }
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
