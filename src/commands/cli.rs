//! Command-line surface.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};

use crate::config::RelayConfig;

#[derive(Parser, Debug)]
#[command(
    name = "ts-relay-control",
    version,
    about = "Force tailnet peers through the relay by blocking their direct UDP path"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Mapping document location
    #[arg(long, global = true, env = "TS_RELAY_MAPPING_FILE", value_name = "PATH")]
    pub mapping_file: Option<PathBuf>,

    /// STUN port kept open towards blocked peers
    #[arg(long, global = true, value_name = "PORT")]
    pub stun_port: Option<u16>,

    /// Relay port kept open towards blocked peers
    #[arg(long, global = true, value_name = "PORT")]
    pub relay_port: Option<u16>,

    /// Probe attempts per address
    #[arg(
        long,
        global = true,
        value_name = "N",
        value_parser = clap::value_parser!(u32).range(1..)
    )]
    pub retries: Option<u32>,

    /// Seconds to wait between probe attempts
    #[arg(long, global = true, value_name = "SECS")]
    pub retry_delay: Option<u64>,

    /// nftables table name
    #[arg(long, global = true, value_name = "NAME")]
    pub table: Option<String>,

    /// nftables deny-address set name
    #[arg(long, global = true, value_name = "NAME")]
    pub deny_set: Option<String>,

    /// nftables chain name
    #[arg(long, global = true, value_name = "NAME")]
    pub chain: Option<String>,

    /// Extra address forced when no subcommand is given (repeatable)
    #[arg(long = "target", global = true, value_name = "VADDR")]
    pub targets: Vec<String>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Block direct UDP to the given peers so they go through the relay
    Force {
        #[arg(required = true, value_name = "VADDR")]
        addresses: Vec<String>,
    },
    /// Stop forcing the given peers
    Cancel {
        #[arg(required = true, value_name = "VADDR")]
        addresses: Vec<String>,
    },
    /// Print the current mapping
    List,
}

impl Cli {
    /// Defaults with the command-line overrides applied.
    pub fn config(&self) -> RelayConfig {
        let mut config = RelayConfig::default();
        if let Some(path) = &self.mapping_file {
            config.mapping_path = path.clone();
        }
        if let Some(port) = self.stun_port {
            config.stun_port = port;
        }
        if let Some(port) = self.relay_port {
            config.relay_port = port;
        }
        if let Some(retries) = self.retries {
            config.max_probe_attempts = retries;
        }
        if let Some(secs) = self.retry_delay {
            config.probe_retry_delay = Duration::from_secs(secs);
        }
        if let Some(table) = &self.table {
            config.names.table = table.clone();
        }
        if let Some(set) = &self.deny_set {
            config.names.deny_set = set.clone();
        }
        if let Some(chain) = &self.chain {
            config.names.chain = chain.clone();
        }
        for target in &self.targets {
            if !config.default_targets.contains(target) {
                config.default_targets.push(target.clone());
            }
        }
        config
    }
}
