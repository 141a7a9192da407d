//! Discovers the physical (underlay) address a peer is reached through.
//!
//! `tailscale ping` prints `pong from <name> (<vaddr>) via <ip>:<port> in <t>`
//! once a direct path exists. A pong that arrives through a relay names the
//! relay instead of an endpoint and does not count; the address is retried.

use std::collections::BTreeMap;
use std::net::IpAddr;
use std::time::Duration;

use regex::Regex;

use crate::exec;

/// Physical address from one probe response, if the peer answered over a
/// direct path.
pub fn parse_pong(output: &str, virtual_addr: &str) -> Option<IpAddr> {
    let pattern = format!(
        r"pong from .+\({}\) via (?:\[([0-9a-fA-F:]+)\]|(\d{{1,3}}\.\d{{1,3}}\.\d{{1,3}}\.\d{{1,3}})):\d+",
        regex::escape(virtual_addr)
    );
    let re = match Regex::new(&pattern) {
        Ok(re) => re,
        Err(e) => {
            tracing::warn!("Cannot build pong pattern for {virtual_addr}: {e}");
            return None;
        }
    };

    let caps = re.captures(output)?;
    let endpoint = caps.get(1).or_else(|| caps.get(2))?.as_str();
    endpoint.parse().ok()
}

/// Issues one connectivity probe and returns its raw output.
pub trait PingClient {
    /// `None` when the probe produced nothing usable (failed or empty).
    fn ping(&self, virtual_addr: &str) -> Option<String>;
}

/// `tailscale ping <vaddr>` with the client's default attempt count, which
/// keeps pinging until a direct path is established or it gives up.
pub struct TailscaleCli {
    program: String,
}

impl TailscaleCli {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl PingClient for TailscaleCli {
    fn ping(&self, virtual_addr: &str) -> Option<String> {
        let args = vec!["ping".to_string(), virtual_addr.to_string()];
        match exec::run(&self.program, &args) {
            Ok(output) if output.success() && !output.stdout.is_empty() => Some(output.stdout),
            Ok(output) => {
                tracing::debug!(
                    "{} exited with {:?}: {}",
                    exec::render(&self.program, &args),
                    output.status,
                    output.stderr
                );
                None
            }
            Err(e) => {
                tracing::warn!("{e}");
                None
            }
        }
    }
}

/// Blocking wait between probe attempts.
pub trait Sleeper {
    fn sleep(&self, duration: Duration);
}

pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Probes virtual addresses one at a time with a bounded retry loop.
pub struct Prober<'a, P: PingClient, S: Sleeper> {
    client: &'a P,
    sleeper: &'a S,
    max_attempts: u32,
    retry_delay: Duration,
}

impl<'a, P: PingClient, S: Sleeper> Prober<'a, P, S> {
    pub fn new(client: &'a P, sleeper: &'a S, max_attempts: u32, retry_delay: Duration) -> Self {
        Self {
            client,
            sleeper,
            max_attempts: max_attempts.max(1),
            retry_delay,
        }
    }

    /// Physical address of one virtual address, or `None` after all attempts.
    pub fn resolve(&self, virtual_addr: &str) -> Option<IpAddr> {
        tracing::info!("Probing {virtual_addr}");
        for attempt in 1..=self.max_attempts {
            tracing::info!("  attempt {attempt}/{}", self.max_attempts);
            if let Some(output) = self.client.ping(virtual_addr) {
                tracing::debug!("ping output:\n{output}");
                if let Some(physical) = parse_pong(&output, virtual_addr) {
                    tracing::info!("{virtual_addr} is reached directly via {physical}");
                    return Some(physical);
                }
            }
            if attempt < self.max_attempts {
                tracing::info!(
                    "  no direct path yet, retrying in {}s",
                    self.retry_delay.as_secs_f64()
                );
                self.sleeper.sleep(self.retry_delay);
            }
        }
        tracing::error!(
            "No physical address found for {virtual_addr} after {} attempt(s)",
            self.max_attempts
        );
        None
    }

    /// Resolve each address in order. Unresolved addresses are left out.
    pub fn resolve_all(&self, virtual_addrs: &[String]) -> BTreeMap<String, IpAddr> {
        virtual_addrs
            .iter()
            .filter_map(|v| self.resolve(v).map(|p| (v.clone(), p)))
            .collect()
    }
}
