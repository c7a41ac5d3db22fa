mod auth;
mod cli;
mod commands;
mod config;
mod error;
mod event;
mod response;
mod storage;
mod store;
mod timestamp;

use std::{io, process::ExitCode};

use anyhow::{Result, anyhow};
use chrono::Utc;
use clap::Parser;
use tracing::debug;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use crate::{
    auth::AuthorizationGate,
    cli::Cli,
    commands::Invocation,
    config::{load_config, resolve_database_path},
    error::BridgeError,
    response::write_response,
    storage::SqliteStore,
};

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("calendar-bridge: {err:#}");
            let code = err
                .downcast_ref::<BridgeError>()
                .map_or(1, BridgeError::exit_code);
            ExitCode::from(code)
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = load_config(cli.config.as_deref())?;
    init_logging(config.log_filter.as_deref())?;

    let invocation = Invocation::resolve(&cli, io::stdin().lock())?;
    let db_path = resolve_database_path(cli.database.or(config.database.clone()))?;
    debug!(path = %db_path.display(), "opening calendar database");
    let mut store = SqliteStore::new(&db_path, config.store_options())?;
    let gate = AuthorizationGate::new(config.access_timeout()?);

    let response = commands::dispatch(invocation, &mut store, &gate, Utc::now())?;
    write_response(&mut io::stdout().lock(), &response)
}

/// Logs go to stderr; stdout carries nothing but the JSON response.
fn init_logging(default_filter: Option<&str>) -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(default_filter.unwrap_or("warn"))),
        )
        .with_writer(io::stderr)
        .with_target(false)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|err| anyhow!("failed to set up logging: {err}"))
}
