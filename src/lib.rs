pub mod commands;
pub mod config;
pub mod core;
pub mod db;
pub mod error;
pub mod exec;
pub mod firewall;

use std::process::ExitCode;

use clap::error::ErrorKind;
use clap::Parser;

use commands::{AppState, Cli};

pub fn run() -> ExitCode {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        tracing::error!("PANIC in ts-relay-control: {info}");
        default_hook(info);
    }));

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ts_relay_control=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return match e.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => ExitCode::SUCCESS,
                _ => ExitCode::from(1),
            };
        }
    };

    let state = AppState::system(cli.config());
    tracing::debug!("Mapping file: {}", state.store.path().display());

    match commands::dispatch(&state, cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e}");
            ExitCode::from(e.exit_code())
        }
    }
}
