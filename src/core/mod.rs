//! Core logic: probing peers and reconciling the firewall.
//!
//! - [`probe`]: parses `tailscale ping` output, retries until a direct path shows up
//! - [`reconcile`]: turns the mapping into deny-set elements and drop rules

pub mod probe;
pub mod reconcile;

pub use probe::{parse_pong, PingClient, Prober, Sleeper, TailscaleCli, ThreadSleeper};
pub use reconcile::{ReconcileReport, Reconciler};
