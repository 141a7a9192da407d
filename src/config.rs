//! Centralized runtime constants and the configuration value built from them.
//!
//! Every tunable port, path, name, and retry count has a default here so it
//! can be found and adjusted in a single place. [`RelayConfig`] carries the
//! effective values (defaults plus command-line overrides) into each component.

use std::path::PathBuf;
use std::time::Duration;

/// Port the relay server answers STUN on. Always allowed through the drop rules.
pub const STUN_PORT: u16 = 3478;

/// Port of the self-hosted relay (DERP) server. Always allowed through the drop rules.
pub const RELAY_PORT: u16 = 33445;

/// Where the virtual → physical address mapping is persisted.
pub const MAPPING_FILE_PATH: &str = "/root/ts_relay_mapping.json";

/// Dedicated nftables table, created once per address family.
pub const TABLE_NAME: &str = "ts_relay_control";

/// Set of physical addresses whose direct UDP traffic is dropped.
pub const DENY_SET_NAME: &str = "ts_ws_deny_list";

/// Set holding the STUN and relay ports.
pub const ALLOW_PORTS_SET_NAME: &str = "ts_stunport";

/// Chain hooked at prerouting that holds the drop rules.
pub const CHAIN_NAME: &str = "ts_block_direct_udp";

/// Priority of the hooked chain (between raw and mangle).
pub const CHAIN_PRIORITY: i32 = -150;

/// Number of probes sent to one virtual address before giving up on it.
pub const MAX_PROBE_ATTEMPTS: u32 = 3;

/// Wait between two probes of the same virtual address (seconds).
pub const PROBE_RETRY_DELAY_SECS: u64 = 5;

/// Virtual addresses forced when the tool runs without a subcommand.
pub const DEFAULT_FORCE_TARGETS: &[&str] = &[];

/// Firewall CLI binary.
pub const NFT_BIN: &str = "nft";

/// Overlay network client binary.
pub const TAILSCALE_BIN: &str = "tailscale";

/// nftables object names shared by the scaffolding, the inspector, and the reconciler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NftNames {
    pub table: String,
    pub deny_set: String,
    pub allow_ports_set: String,
    pub chain: String,
    pub chain_priority: i32,
}

impl Default for NftNames {
    fn default() -> Self {
        Self {
            table: TABLE_NAME.to_string(),
            deny_set: DENY_SET_NAME.to_string(),
            allow_ports_set: ALLOW_PORTS_SET_NAME.to_string(),
            chain: CHAIN_NAME.to_string(),
            chain_priority: CHAIN_PRIORITY,
        }
    }
}

/// Effective configuration for one invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayConfig {
    pub stun_port: u16,
    pub relay_port: u16,
    pub mapping_path: PathBuf,
    pub names: NftNames,
    pub max_probe_attempts: u32,
    pub probe_retry_delay: Duration,
    pub default_targets: Vec<String>,
    pub nft_bin: String,
    pub tailscale_bin: String,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            stun_port: STUN_PORT,
            relay_port: RELAY_PORT,
            mapping_path: PathBuf::from(MAPPING_FILE_PATH),
            names: NftNames::default(),
            max_probe_attempts: MAX_PROBE_ATTEMPTS,
            probe_retry_delay: Duration::from_secs(PROBE_RETRY_DELAY_SECS),
            default_targets: DEFAULT_FORCE_TARGETS.iter().map(|s| s.to_string()).collect(),
            nft_bin: NFT_BIN.to_string(),
            tailscale_bin: TAILSCALE_BIN.to_string(),
        }
    }
}

impl RelayConfig {
    /// Ports that must stay reachable so the peer can still talk to the relay.
    pub fn allowed_ports(&self) -> Vec<u16> {
        let mut ports = vec![self.stun_port, self.relay_port];
        ports.dedup();
        ports
    }
}
