//! Command-line modes and their handlers.
//!
//! - `cli`: clap definitions and config overrides
//! - `relay`: force / cancel / list / default-mode handlers
//! - `logic`: pure helpers (unit-testable)
//! - `state`: `AppState` definition

mod cli;
mod logic;
pub(crate) mod relay;
mod state;

pub use cli::{Cli, Command};
pub use state::AppState;

use crate::core::{PingClient, Sleeper};
use crate::error::AppError;
use crate::firewall::{self, Firewall};

/// Run one mode. Address arguments are validated first, then the nftables
/// scaffolding is ensured, then the mode's handler runs.
pub fn dispatch<F: Firewall, P: PingClient, S: Sleeper>(
    state: &AppState<F, P, S>,
    command: Option<Command>,
) -> Result<(), AppError> {
    if let Some(Command::Force { addresses } | Command::Cancel { addresses }) = &command {
        logic::validate_addresses(addresses)?;
    }

    firewall::ensure_scaffolding(&state.firewall, &state.config);

    match command {
        Some(Command::Force { addresses }) => relay::force(state, &addresses),
        Some(Command::Cancel { addresses }) => relay::cancel(state, &addresses),
        Some(Command::List) => {
            println!("{}", relay::list(state));
            Ok(())
        }
        None => relay::force_defaults(state),
    }
}
