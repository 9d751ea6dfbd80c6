//! Operational harness: load the configuration, bring the engine up, and
//! run until terminated.
//!
//! Exit codes: 0 success, 1 startup failure, 2 invalid configuration.

use clap::Parser;
use ostinato::prelude::*;
use std::path::PathBuf;
use std::process::ExitCode;
use std::thread;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "ostinatod", about = "MIDI routing engine daemon")]
struct Args {
    /// Path to the configuration document.
    #[arg(long, default_value = "ostinato.json")]
    config: PathBuf,

    /// Where user-managed loopback endpoints are persisted.
    #[arg(long, default_value = "loopbacks.json")]
    loopbacks: PathBuf,

    /// Run headless; any UI collaborator startup is suppressed. The core
    /// daemon is headless either way, so this is accepted and ignored.
    #[arg(long)]
    background: bool,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();

    let config = match AppConfig::load(&args.config) {
        Ok(config) => config,
        Err(e) => {
            error!(path = %args.config.display(), error = %e, "configuration invalid");
            return ExitCode::from(2);
        }
    };

    let engine = OstinatoEngine::builder()
        .with_loopback_store(&args.loopbacks)
        .with_log_capacity(config.log_buffer_size)
        .build();

    if let Err(e) = engine.apply_config(&config) {
        error!(error = %e, "configuration invalid");
        return ExitCode::from(2);
    }

    let cancel = CancellationToken::new();
    if let Err(e) = engine.start(&cancel) {
        error!(error = %e, "engine failed to start");
        return ExitCode::from(1);
    }

    info!(
        profile = config.active_profile_name,
        background = args.background,
        "ostinatod running"
    );

    // Runs until the process is terminated.
    loop {
        thread::sleep(Duration::from_secs(60));
    }
}
