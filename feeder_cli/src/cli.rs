//! CLI argument definitions and logging setup.

use clap::{ArgAction, Parser};
use std::path::PathBuf;
use std::sync::OnceLock;

use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;

pub static FILE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();

#[derive(Parser, Debug)]
#[command(name = "feeder", version, about = "Cat feeder sequencing daemon")]
pub struct Cli {
    /// Path to config TOML
    #[arg(long, value_name = "FILE", default_value = "etc/feeder.toml")]
    pub config: PathBuf,

    /// Path to the persisted machine state
    #[arg(long, value_name = "FILE", default_value = "feeder_state.json")]
    pub state_file: PathBuf,

    /// Directory polled for operator command files
    #[arg(long, value_name = "DIR")]
    pub inbox: Option<PathBuf>,

    /// Run against the simulated controller instead of real hardware
    #[arg(long, action = ArgAction::SetTrue)]
    pub simulate: bool,

    /// Log as JSON lines instead of pretty
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Console log level (error|warn|info|debug|trace)
    #[arg(long = "log-level", value_name = "LEVEL", default_value = "info")]
    pub log_level: String,
}

/// Console subscriber plus an optional non-blocking file layer. The file
/// worker guard lives in [`FILE_GUARD`] for the life of the process.
pub fn init_logging(level: &str, json: bool, log_file: Option<&str>) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.to_string()));

    let file_layer = log_file.and_then(|path| {
        let p = std::path::Path::new(path);
        let dir = p.parent().filter(|d| !d.as_os_str().is_empty())?;
        let name = p.file_name()?;
        let appender = tracing_appender::rolling::never(dir, name);
        let (writer, guard) = tracing_appender::non_blocking(appender);
        let _ = FILE_GUARD.set(guard);
        Some(fmt::layer().with_writer(writer).with_ansi(false).json())
    });

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(file_layer)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(file_layer)
            .with(fmt::layer().with_target(true).with_level(true))
            .init();
    }
}
