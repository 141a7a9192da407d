//! Firewall port and the logic that only needs its typed operations.
//!
//! - [`Firewall`]: narrow interface over the firewall subsystem
//! - [`nft_backend`]: the `nft` CLI implementation
//! - [`set_elements`] / [`parse_set_elements`]: reading the live deny set
//! - [`ensure_scaffolding`]: idempotent table/set/chain bootstrap

pub mod nft_backend;

#[cfg(test)]
pub(crate) mod fake;

use std::collections::BTreeSet;
use std::fmt;
use std::net::IpAddr;

use crate::config::{NftNames, RelayConfig};
use crate::error::AppError;

pub use nft_backend::NftFirewall;

/// Address family of a table, set, or chain. Each family gets its own copy
/// of the scaffolding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Family {
    Ipv4,
    Ipv6,
}

impl Family {
    pub const ALL: [Family; 2] = [Family::Ipv4, Family::Ipv6];

    /// nftables family keyword.
    pub fn nft_name(self) -> &'static str {
        match self {
            Family::Ipv4 => "ip",
            Family::Ipv6 => "ip6",
        }
    }

    /// nftables element type for an address set of this family.
    pub fn addr_type(self) -> &'static str {
        match self {
            Family::Ipv4 => "ipv4_addr",
            Family::Ipv6 => "ipv6_addr",
        }
    }

    pub fn of(addr: &IpAddr) -> Self {
        match addr {
            IpAddr::V4(_) => Family::Ipv4,
            IpAddr::V6(_) => Family::Ipv6,
        }
    }
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Family::Ipv4 => f.write_str("IPv4"),
            Family::Ipv6 => f.write_str("IPv6"),
        }
    }
}

/// Element type of a set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetType {
    /// Addresses of the set's family.
    Address,
    /// Transport ports (`inet_service`).
    Service,
}

/// Base chain definition: filter hook at prerouting with accept policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainHook {
    pub priority: i32,
}

impl ChainHook {
    pub fn definition(&self) -> String {
        format!(
            "{{ type filter hook prerouting priority {} ; policy accept ; }}",
            self.priority
        )
    }
}

/// Traffic direction relative to the blocked peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// UDP coming from a denied address to a non-relay port.
    Inbound,
    /// UDP going to a denied address from a non-relay port.
    Outbound,
}

/// UDP drop rule: traffic to/from the deny set is dropped unless it uses a
/// port from the allow-ports set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DropRule {
    pub family: Family,
    pub direction: Direction,
    pub deny_set: String,
    pub allow_ports_set: String,
}

impl DropRule {
    /// The inbound and outbound rule pair installed for one family.
    pub fn pair(family: Family, names: &NftNames) -> [DropRule; 2] {
        [Direction::Inbound, Direction::Outbound].map(|direction| DropRule {
            family,
            direction,
            deny_set: names.deny_set.clone(),
            allow_ports_set: names.allow_ports_set.clone(),
        })
    }

    /// Rule expression as `nft add rule` arguments.
    pub fn expression(&self) -> Vec<String> {
        let (port_field, addr_field) = match self.direction {
            Direction::Inbound => ("dport", "saddr"),
            Direction::Outbound => ("sport", "daddr"),
        };
        vec![
            "udp".to_string(),
            port_field.to_string(),
            "!=".to_string(),
            format!("@{}", self.allow_ports_set),
            self.family.nft_name().to_string(),
            addr_field.to_string(),
            format!("@{}", self.deny_set),
            "drop".to_string(),
        ]
    }
}

/// Typed operations on the firewall subsystem.
///
/// Every method reports failure as `Err`; callers decide whether a failure is
/// tolerable (object already exists, element absent) or fatal.
pub trait Firewall {
    fn create_table(&self, family: Family, table: &str) -> Result<(), AppError>;

    fn create_set(
        &self,
        family: Family,
        table: &str,
        set: &str,
        set_type: SetType,
    ) -> Result<(), AppError>;

    fn add_elements(
        &self,
        family: Family,
        table: &str,
        set: &str,
        elements: &[String],
    ) -> Result<(), AppError>;

    fn delete_element(
        &self,
        family: Family,
        table: &str,
        set: &str,
        element: &str,
    ) -> Result<(), AppError>;

    /// Textual description of a set, including its element list.
    fn describe_set(&self, family: Family, table: &str, set: &str) -> Result<String, AppError>;

    fn create_chain(
        &self,
        family: Family,
        table: &str,
        chain: &str,
        hook: ChainHook,
    ) -> Result<(), AppError>;

    fn flush_chain(&self, family: Family, table: &str, chain: &str) -> Result<(), AppError>;

    fn add_rule(
        &self,
        family: Family,
        table: &str,
        chain: &str,
        rule: &DropRule,
    ) -> Result<(), AppError>;
}

/// Extract the elements from `nft list set` output.
///
/// nft prints short element lists on a single brace-delimited line
/// (`elements = { 1.2.3.4, 5.6.7.8 }`) and wraps long ones across lines, so
/// everything between the brace after `elements` and its closing brace is
/// collected.
pub fn parse_set_elements(output: &str) -> BTreeSet<String> {
    let mut elements = BTreeSet::new();
    let Some(start) = output.find("elements") else {
        return elements;
    };
    let rest = &output[start..];
    let Some(open) = rest.find('{') else {
        return elements;
    };
    let body = &rest[open + 1..];
    let body = match body.find('}') {
        Some(close) => &body[..close],
        None => body,
    };

    for element in body.split(|c: char| c == ',' || c == '\n') {
        let element = element.trim();
        if !element.is_empty() {
            elements.insert(element.to_string());
        }
    }
    elements
}

/// Current contents of a set. Unreadable or empty sets yield an empty set.
pub fn set_elements<F: Firewall + ?Sized>(
    firewall: &F,
    family: Family,
    table: &str,
    set: &str,
) -> BTreeSet<String> {
    match firewall.describe_set(family, table, set) {
        Ok(output) => parse_set_elements(&output),
        Err(e) => {
            tracing::debug!("Could not read {family} set {table}/{set}: {e}");
            BTreeSet::new()
        }
    }
}

/// Create tables, sets, and hooked chains for both families.
///
/// Creating an object that already exists fails in nft; such failures are
/// expected and only logged at debug level.
pub fn ensure_scaffolding<F: Firewall + ?Sized>(firewall: &F, config: &RelayConfig) {
    let names = &config.names;
    let ports: Vec<String> = config.allowed_ports().iter().map(u16::to_string).collect();
    let hook = ChainHook {
        priority: names.chain_priority,
    };

    tracing::info!("Ensuring nftables table '{}' is set up", names.table);
    for family in Family::ALL {
        let steps = [
            firewall.create_table(family, &names.table),
            firewall.create_set(family, &names.table, &names.deny_set, SetType::Address),
            firewall.create_set(family, &names.table, &names.allow_ports_set, SetType::Service),
            firewall.add_elements(family, &names.table, &names.allow_ports_set, &ports),
            firewall.create_chain(family, &names.table, &names.chain, hook),
        ];
        for result in steps {
            if let Err(e) = result {
                tracing::debug!("{family} scaffolding step skipped: {e}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fake::{FakeFirewall, Op};
    use super::*;

    #[test]
    fn test_parse_single_line_elements() {
        let out = "table ip ts_relay_control {\n\tset ts_ws_deny_list {\n\t\ttype ipv4_addr\n\t\telements = { 203.0.113.5, 198.51.100.7 }\n\t}\n}";
        let elements = parse_set_elements(out);
        assert_eq!(elements.len(), 2);
        assert!(elements.contains("203.0.113.5"));
        assert!(elements.contains("198.51.100.7"));
    }

    #[test]
    fn test_parse_wrapped_elements() {
        let out = "table ip6 t {\n\tset s {\n\t\ttype ipv6_addr\n\t\telements = { 2001:db8::1,\n\t\t\t     2001:db8::2 }\n\t}\n}";
        let elements = parse_set_elements(out);
        assert_eq!(
            elements.into_iter().collect::<Vec<_>>(),
            vec!["2001:db8::1".to_string(), "2001:db8::2".to_string()]
        );
    }

    #[test]
    fn test_parse_set_without_elements() {
        let out = "table ip t {\n\tset s {\n\t\ttype ipv4_addr\n\t}\n}";
        assert!(parse_set_elements(out).is_empty());
        assert!(parse_set_elements("").is_empty());
    }

    #[test]
    fn test_set_elements_tolerates_describe_failure() {
        let fw = FakeFirewall::new().failing_describe();
        assert!(set_elements(&fw, Family::Ipv4, "t", "s").is_empty());
    }

    #[test]
    fn test_family_of_address() {
        assert_eq!(Family::of(&"203.0.113.5".parse().unwrap()), Family::Ipv4);
        assert_eq!(Family::of(&"2001:db8::1".parse().unwrap()), Family::Ipv6);
    }

    #[test]
    fn test_drop_rule_expressions() {
        let names = NftNames::default();
        let [inbound, outbound] = DropRule::pair(Family::Ipv4, &names);
        assert_eq!(
            inbound.expression().join(" "),
            "udp dport != @ts_stunport ip saddr @ts_ws_deny_list drop"
        );
        assert_eq!(
            outbound.expression().join(" "),
            "udp sport != @ts_stunport ip daddr @ts_ws_deny_list drop"
        );
        let [inbound6, _] = DropRule::pair(Family::Ipv6, &names);
        assert!(inbound6.expression().join(" ").contains("ip6 saddr"));
    }

    #[test]
    fn test_chain_hook_definition() {
        assert_eq!(
            ChainHook { priority: -150 }.definition(),
            "{ type filter hook prerouting priority -150 ; policy accept ; }"
        );
    }

    #[test]
    fn test_scaffolding_covers_both_families() {
        let fw = FakeFirewall::new();
        let config = RelayConfig::default();
        ensure_scaffolding(&fw, &config);

        for family in Family::ALL {
            assert!(fw.ops().contains(&Op::CreateTable(family)));
            assert!(fw.ops().contains(&Op::CreateChain(family)));
            assert_eq!(
                fw.elements(family, &config.names.allow_ports_set),
                ["3478", "33445"]
                    .iter()
                    .map(|s| s.to_string())
                    .collect::<BTreeSet<String>>()
            );
        }
    }

    #[test]
    fn test_scaffolding_is_idempotent() {
        let fw = FakeFirewall::new();
        let config = RelayConfig::default();
        ensure_scaffolding(&fw, &config);
        ensure_scaffolding(&fw, &config);
        assert_eq!(fw.elements(Family::Ipv4, &config.names.allow_ports_set).len(), 2);
    }
}
