//! Everything one invocation works with.

use crate::config::RelayConfig;
use crate::core::{TailscaleCli, ThreadSleeper};
use crate::db::MappingStore;
use crate::firewall::NftFirewall;

/// Configuration plus the firewall, probe client, sleeper, and store built
/// from it. Tests swap in fakes through the type parameters.
pub struct AppState<F = NftFirewall, P = TailscaleCli, S = ThreadSleeper> {
    pub config: RelayConfig,
    pub store: MappingStore,
    pub firewall: F,
    pub pinger: P,
    pub sleeper: S,
}

impl AppState {
    /// State backed by the real `nft` and `tailscale` binaries.
    pub fn system(config: RelayConfig) -> Self {
        Self {
            store: MappingStore::new(config.mapping_path.clone()),
            firewall: NftFirewall::new(config.nft_bin.clone()),
            pinger: TailscaleCli::new(config.tailscale_bin.clone()),
            sleeper: ThreadSleeper,
            config,
        }
    }
}
