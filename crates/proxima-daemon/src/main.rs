//! # proxima-daemon
//!
//! Runs the proximity core against a scan source and writes a status file
//! for the external reporter.
//!
//! ## Environment
//!
//! - `PROXIMA_CONFIG` - configuration file (default `/etc/proxima/config.toml`)
//! - `PROXIMA_REPLAY` - replay a recorded JSON-lines trace instead of
//!   reading live sightings from stdin
//! - `PROXIMA_STATUS_PATH` - status file (default `/run/proxima/status.json`)
//! - `PROXIMA_ENV=production` - JSON file logging, with actuator commands
//!   in a separate `actuator` file
//! - `PROXIMA_LOG_LEVEL` - log filter when `RUST_LOG` is unset
//! - `PROXIMA_LOG_DIR` - production log directory (default `/var/log/proxima`)
//!
//! ## Running
//!
//! ```bash
//! # Replay a recorded walk past the front door
//! PROXIMA_REPLAY=walk.jsonl cargo run --package proxima-daemon
//!
//! # On the device, fed by the scanner
//! proxima-scan | ./proxima-daemon
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]

use std::path::PathBuf;

use anyhow::Context;
use proxima_core::{Config, ScanSource};
use proxima_daemon::driver::LoggingDriver;
use proxima_daemon::runtime::{self, Clock, RuntimeOptions};
use proxima_daemon::scan::{self, ReplaySource};
use proxima_daemon::logging::{self, LogSettings};
use proxima_daemon::state::AppState;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init(&LogSettings::from_env())?;

    info!(version = env!("CARGO_PKG_VERSION"), "Starting proxima-daemon");

    let config_path = match std::env::var_os("PROXIMA_CONFIG") {
        Some(path) => PathBuf::from(path),
        None => Config::default_path()?,
    };
    let config = Config::load_or_default(&config_path)
        .with_context(|| format!("Invalid configuration at {}", config_path.display()))?;

    let state = AppState::new(&config, Box::new(LoggingDriver::new()))?;
    let clock = Clock::start();
    let options = RuntimeOptions::from_settings(&config.scan, Some(status_path()));

    #[cfg(unix)]
    spawn_reload_on_hangup(state.clone(), clock, config_path.clone());

    let source: Box<dyn ScanSource + Send> = match std::env::var_os("PROXIMA_REPLAY") {
        Some(trace) => Box::new(ReplaySource::from_path(PathBuf::from(trace))?),
        None => {
            let (sender, source) = scan::channel(scan::queue_capacity(&config.scan));
            tokio::spawn(scan::feed_lines(tokio::io::stdin(), sender, clock));
            info!("Reading sightings from stdin");
            Box::new(source)
        }
    };

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    let summary = runtime::run(state, source, clock, options, shutdown).await?;
    info!(
        observations = summary.observations,
        activations = summary.activations,
        "proxima-daemon stopped"
    );
    Ok(())
}

fn status_path() -> PathBuf {
    if let Some(path) = std::env::var_os("PROXIMA_STATUS_PATH") {
        return PathBuf::from(path);
    }
    #[cfg(target_os = "linux")]
    {
        PathBuf::from("/run/proxima/status.json")
    }
    #[cfg(not(target_os = "linux"))]
    {
        directories::ProjectDirs::from("", "", "proxima")
            .map(|dirs| dirs.data_dir().join("status.json"))
            .unwrap_or_else(|| PathBuf::from("./status.json"))
    }
}

/// Reload beacon configuration on SIGHUP.
#[cfg(unix)]
fn spawn_reload_on_hangup(state: AppState, clock: Clock, path: PathBuf) {
    use tokio::signal::unix::{signal, SignalKind};

    tokio::spawn(async move {
        let mut hangup = match signal(SignalKind::hangup()) {
            Ok(stream) => stream,
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGHUP");
                return;
            }
        };
        while hangup.recv().await.is_some() {
            info!(path = %path.display(), "Reloading configuration");
            match Config::load(&path) {
                Ok(config) => {
                    if let Err(e) = state.reload(&config, clock.now()).await {
                        error!(error = %e, "Configuration rejected");
                    }
                }
                Err(e) => error!(error = %e, "Configuration reload failed"),
            }
        }
    });
}
