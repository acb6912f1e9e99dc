//! Logging setup for the daemon.
//!
//! Two profiles, picked by `PROXIMA_ENV`:
//!
//! - **Production**: JSON to a daily rolling `proxima` file plus compact,
//!   ANSI-free stdout for the journal. Actuator commands are also written
//!   to their own `actuator` file so the alert history can be followed
//!   without the rest of the log.
//! - **Development**: pretty stdout with span events.
//!
//! Actuator output (target [`ACTUATOR_TARGET`]) is kept at `info` in both
//! profiles unless the filter names that target explicitly.

use std::path::PathBuf;
use std::sync::OnceLock;

use anyhow::Context;
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::filter::{Directive, Targets};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Target the alert driver logs actuator commands under.
pub const ACTUATOR_TARGET: &str = "proxima::actuator";

/// Keeps the non-blocking writers flushing until exit.
static GUARDS: OnceLock<Vec<WorkerGuard>> = OnceLock::new();

/// Output profile.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogProfile {
    /// Files plus journal-friendly stdout.
    Production,
    /// Pretty stdout only.
    #[default]
    Development,
}

/// Resolved logging settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSettings {
    /// Output profile.
    pub profile: LogProfile,
    /// Filter directives, `EnvFilter` syntax.
    pub filter: String,
    /// Directory for production log files.
    pub directory: PathBuf,
}

impl LogSettings {
    /// Settings from the process environment.
    ///
    /// - `PROXIMA_ENV=production` selects [`LogProfile::Production`]
    /// - `RUST_LOG`, else `PROXIMA_LOG_LEVEL`, else `info`
    /// - `PROXIMA_LOG_DIR` overrides the platform log directory
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let profile = match lookup("PROXIMA_ENV") {
            Some(env) if env.eq_ignore_ascii_case("production") => LogProfile::Production,
            _ => LogProfile::Development,
        };
        let filter = lookup("RUST_LOG")
            .or_else(|| lookup("PROXIMA_LOG_LEVEL"))
            .filter(|f| !f.trim().is_empty())
            .unwrap_or_else(|| "info".to_string());
        let directory = lookup("PROXIMA_LOG_DIR").map_or_else(log_directory, PathBuf::from);

        Self {
            profile,
            filter,
            directory,
        }
    }

    /// The configured filter with actuator output kept at `info`.
    ///
    /// # Errors
    ///
    /// Returns an error if the directives do not parse.
    pub fn env_filter(&self) -> anyhow::Result<EnvFilter> {
        let filter = EnvFilter::try_new(&self.filter)
            .with_context(|| format!("Invalid log filter '{}'", self.filter))?;
        if self.filter.contains(ACTUATOR_TARGET) {
            return Ok(filter);
        }
        let actuator: Directive = format!("{ACTUATOR_TARGET}=info").parse()?;
        Ok(filter.add_directive(actuator))
    }
}

/// Install the global subscriber.
///
/// # Errors
///
/// Returns an error if the filter is invalid or the production log
/// directory cannot be created.
pub fn init(settings: &LogSettings) -> anyhow::Result<()> {
    match settings.profile {
        LogProfile::Production => init_production(settings),
        LogProfile::Development => init_development(settings),
    }
}

fn init_production(settings: &LogSettings) -> anyhow::Result<()> {
    std::fs::create_dir_all(&settings.directory)
        .with_context(|| format!("Failed to create {}", settings.directory.display()))?;

    let (main_file, main_guard) = tracing_appender::non_blocking(RollingFileAppender::new(
        Rotation::DAILY,
        &settings.directory,
        "proxima",
    ));
    let (actuator_file, actuator_guard) = tracing_appender::non_blocking(
        RollingFileAppender::new(Rotation::DAILY, &settings.directory, "actuator"),
    );
    let (stdout, stdout_guard) = tracing_appender::non_blocking(std::io::stdout());

    let main_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(main_file)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_filter(settings.env_filter()?);

    let actuator_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(actuator_file)
        .with_target(false)
        .with_current_span(false)
        .with_filter(Targets::new().with_target(ACTUATOR_TARGET, Level::INFO));

    // journald adds its own timestamps and does not render ANSI
    let stdout_layer = tracing_subscriber::fmt::layer()
        .compact()
        .with_writer(stdout)
        .with_target(true)
        .with_ansi(false)
        .with_filter(settings.env_filter()?);

    tracing_subscriber::registry()
        .with(main_layer)
        .with(actuator_layer)
        .with(stdout_layer)
        .try_init()?;

    let _ = GUARDS.set(vec![main_guard, actuator_guard, stdout_guard]);
    Ok(())
}

fn init_development(settings: &LogSettings) -> anyhow::Result<()> {
    let stdout_layer = tracing_subscriber::fmt::layer()
        .pretty()
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(FmtSpan::NEW | FmtSpan::CLOSE)
        .with_filter(settings.env_filter()?);

    tracing_subscriber::registry().with(stdout_layer).try_init()?;
    Ok(())
}

fn log_directory() -> PathBuf {
    #[cfg(target_os = "linux")]
    {
        PathBuf::from("/var/log/proxima")
    }
    #[cfg(not(target_os = "linux"))]
    {
        directories::ProjectDirs::from("", "", "proxima")
            .map(|dirs| dirs.data_dir().join("logs"))
            .unwrap_or_else(|| PathBuf::from("./logs"))
    }
}
