//! Handlers for each mode. Each one loads the mapping, reconciles the
//! firewall, and writes the mapping back only if something was applied.

use crate::core::{PingClient, Prober, ReconcileReport, Reconciler, Sleeper};
use crate::error::AppError;
use crate::firewall::Firewall;

use super::logic;
use super::state::AppState;

/// Probe `addresses` and block the direct path of every one that resolves.
pub fn force<F: Firewall, P: PingClient, S: Sleeper>(
    state: &AppState<F, P, S>,
    addresses: &[String],
) -> Result<(), AppError> {
    tracing::info!("Forcing {} peer(s) through the relay", addresses.len());
    let mut mapping = state.store.load();
    tracing::info!("Loaded {} existing mapping(s)", mapping.len());

    let prober = Prober::new(
        &state.pinger,
        &state.sleeper,
        state.config.max_probe_attempts,
        state.config.probe_retry_delay,
    );
    let probed = prober.resolve_all(addresses);

    let reconciler = Reconciler::new(&state.firewall, &state.config.names);
    let report = reconciler.apply_force(&probed, &mut mapping)?;
    persist(state, &mapping, report)
}

/// Unblock the physical addresses recorded for `addresses`. No probing.
pub fn cancel<F: Firewall, P: PingClient, S: Sleeper>(
    state: &AppState<F, P, S>,
    addresses: &[String],
) -> Result<(), AppError> {
    tracing::info!("Cancelling relay forcing for {} peer(s)", addresses.len());
    let mut mapping = state.store.load();

    let reconciler = Reconciler::new(&state.firewall, &state.config.names);
    let report = reconciler.apply_cancel(addresses, &mut mapping)?;
    persist(state, &mapping, report)
}

/// Force the configured default targets, if there are any.
pub fn force_defaults<F: Firewall, P: PingClient, S: Sleeper>(
    state: &AppState<F, P, S>,
) -> Result<(), AppError> {
    let targets = &state.config.default_targets;
    if targets.is_empty() {
        tracing::info!("No default targets configured, nothing to do");
        return Ok(());
    }
    force(state, targets)
}

/// The mapping as printed by `list`.
pub fn list<F, P, S>(state: &AppState<F, P, S>) -> String {
    logic::render_mapping(&state.store.load())
}

fn persist<F, P, S>(
    state: &AppState<F, P, S>,
    mapping: &crate::db::AddressMap,
    report: Option<ReconcileReport>,
) -> Result<(), AppError> {
    match report {
        Some(report) => {
            tracing::info!("{}", logic::summarize(&report));
            state.store.save(mapping)
        }
        None => Ok(()),
    }
}
