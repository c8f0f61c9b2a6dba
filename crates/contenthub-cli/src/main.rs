//! ContentHub CLI - read, write and manage ContentHub posts from the terminal.

mod app;
mod cli;
mod commands;
mod render;

use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use contenthub_core::{ApiError, Config};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use app::App;
use cli::Cli;

/// Log file name inside the cache directory
const LOG_FILE: &str = "contenthub.log";

const SESSION_EXPIRED: &str = "Your session has expired. Run `contenthub login` to sign in again.";

/// Initialize the tracing subscriber for logging.
///
/// `RUST_LOG` controls the level (default `warn`). Besides stderr, events go
/// to a log file in the cache directory; the returned guard flushes it.
fn init_tracing(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match log_dir.filter(|dir| std::fs::create_dir_all(dir).is_ok()) {
        Some(dir) => {
            let (writer, guard) =
                tracing_appender::non_blocking(tracing_appender::rolling::never(dir, LOG_FILE));
            (Some(fmt::layer().with_ansi(false).with_writer(writer)), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();
    guard
}

fn report_error(err: &anyhow::Error) {
    match err.downcast_ref::<ApiError>() {
        Some(ApiError::SessionEnded { .. }) => eprintln!("{}", SESSION_EXPIRED),
        Some(ApiError::Validation { message, errors, .. }) => {
            eprintln!("Error: {}", message);
            eprint!("{}", render::field_errors(errors));
        }
        Some(api) => eprintln!("Error: {}", api.message()),
        None => eprintln!("Error: {:#}", err),
    }
}

async fn run(cli: Cli, config: Config, cache_dir: PathBuf) -> Result<()> {
    let mut app = App::new(config, cache_dir, cli.json)?;
    let result = app.run(cli.command).await;
    let ended = app.check_session_events();
    if announce_session_end(ended, &result) {
        eprintln!("{}", SESSION_EXPIRED);
    }
    result
}

/// A session that ended mid-command is announced here unless the command
/// failed with the session end itself, which `report_error` explains.
fn announce_session_end(ended: bool, result: &Result<()>) -> bool {
    let failed_on_it = matches!(
        result,
        Err(e) if matches!(e.downcast_ref::<ApiError>(), Some(ApiError::SessionEnded { .. }))
    );
    ended && !failed_on_it
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let loaded = Config::load();
    let mut config = loaded.as_ref().cloned().unwrap_or_default();
    let cache_dir = config.cache_dir().unwrap_or_else(|_| PathBuf::from("./cache"));

    let _log_guard = init_tracing(Some(&cache_dir));
    info!("ContentHub CLI starting");
    if let Err(ref e) = loaded {
        warn!(error = %e, "Failed to load config, using defaults");
    }
    if let Some(ref url) = cli.api_url {
        config.api_base_url = Some(url.clone());
    }

    match run(cli, config, cache_dir).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            report_error(&e);
            ExitCode::FAILURE
        }
    }
}
