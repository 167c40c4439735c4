pub mod types;
pub mod error;
pub mod config;
pub mod roster;
pub mod schedule;
pub mod bracket;
pub mod rating;
pub mod judging;
pub mod event;
pub mod tournament;
pub mod store;
pub mod commands;

use config::*;
use commands::{execute, Cli};
use error::EventError;
use store::{with_store, JsonFileStore};
use types::SharedStore;

use chrono::Utc;
use clap::Parser;
use std::{
    fs,
    path::Path,
    sync::{Arc, Mutex},
};
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

/// Daily rolling log file in `logs_dir`; keep the guard alive until exit.
pub fn init_tracing(logs_dir: &Path) -> WorkerGuard {
    fs::create_dir_all(logs_dir).ok();
    let file_appender = tracing_appender::rolling::daily(logs_dir, "fight-night.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(non_blocking)
        .with_ansi(false)
        .init();
    guard
}

pub fn run() -> Result<(), EventError> {
    let cli = Cli::parse();
    load_env_file();
    let config = load_config_inner()?;

    let _guard = init_tracing(&config.log_path());
    info!(data_dir = %config.data_path().display(), "Fight night starting");
    log_config_warnings(&config);

    let store: SharedStore<JsonFileStore> = Arc::new(Mutex::new(JsonFileStore::new(config.data_path())));
    let output = match with_store(&store, |store| execute(cli.command, &config, store, Utc::now())) {
        Ok(output) => output,
        Err(err) => {
            error!(error = %err, "command failed");
            return Err(err);
        }
    };
    let rendered = serde_json::to_string_pretty(&output).map_err(|e| EventError::Config(e.to_string()))?;
    println!("{rendered}");
    Ok(())
}
