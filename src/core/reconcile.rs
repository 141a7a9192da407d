//! Brings the nftables deny sets and drop rules in line with the mapping.
//!
//! After every applied run, each family's deny set holds exactly the
//! physical addresses of that family recorded in the mapping, and the hooked
//! chain holds the inbound/outbound drop pair only if that set is non-empty.
//! The live sets are read fresh on every run; nothing is cached.

use std::collections::{BTreeMap, BTreeSet};
use std::net::IpAddr;

use crate::config::NftNames;
use crate::db::AddressMap;
use crate::error::AppError;
use crate::firewall::{self, DropRule, Family, Firewall};

/// Addresses grouped by family.
pub type FamilySets = BTreeMap<Family, BTreeSet<String>>;

/// What one reconciliation changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Elements added to each deny set.
    pub added: FamilySets,
    /// Elements a delete was issued for, per deny set.
    pub deleted: FamilySets,
    /// Families whose chain ended up with the drop pair.
    pub ruled: BTreeSet<Family>,
}

/// Group address literals by family, in the canonical text form nft prints
/// (`2001:DB8::5` becomes `2001:db8::5`). Text that is not an IP address is
/// skipped with a warning.
pub fn partition<'s>(addrs: impl IntoIterator<Item = &'s str>) -> FamilySets {
    let mut sets = FamilySets::new();
    for addr in addrs {
        match addr.parse::<IpAddr>() {
            Ok(ip) => {
                sets.entry(Family::of(&ip)).or_default().insert(ip.to_string());
            }
            Err(_) => tracing::warn!("Ignoring '{addr}': not an IP address"),
        }
    }
    sets
}

fn family_set(sets: &FamilySets, family: Family) -> BTreeSet<String> {
    sets.get(&family).cloned().unwrap_or_default()
}

/// Applies force/cancel requests against a [`Firewall`].
pub struct Reconciler<'a, F: Firewall + ?Sized> {
    firewall: &'a F,
    names: &'a NftNames,
}

impl<'a, F: Firewall + ?Sized> Reconciler<'a, F> {
    pub fn new(firewall: &'a F, names: &'a NftNames) -> Self {
        Self { firewall, names }
    }

    /// Merge newly probed addresses into `mapping` and update the firewall.
    ///
    /// Returns `Ok(None)` when nothing was probed: neither the firewall nor
    /// the mapping is touched. A failed element or rule addition is fatal.
    pub fn apply_force(
        &self,
        probed: &BTreeMap<String, IpAddr>,
        mapping: &mut AddressMap,
    ) -> Result<Option<ReconcileReport>, AppError> {
        if probed.is_empty() {
            tracing::info!("No physical addresses resolved, nothing to force");
            return Ok(None);
        }

        let mut stale = Vec::new();
        for (virtual_addr, physical) in probed {
            let physical = physical.to_string();
            if let Some(old) = mapping.insert(virtual_addr.clone(), physical.clone()) {
                if old != physical {
                    tracing::info!(
                        "{virtual_addr} moved from {old} to {physical}, dropping the old address"
                    );
                    stale.push(old);
                }
            }
        }

        let desired = partition(mapping.physical_addrs());
        let stale = partition(stale.iter().map(String::as_str));
        let mut report = ReconcileReport::default();

        for family in Family::ALL {
            let current = firewall::set_elements(
                self.firewall,
                family,
                &self.names.table,
                &self.names.deny_set,
            );
            let wanted = family_set(&desired, family);
            // An old address still claimed by another peer stays in the set.
            let to_delete: BTreeSet<String> = family_set(&stale, family)
                .intersection(&current)
                .filter(|addr| !wanted.contains(*addr))
                .cloned()
                .collect();
            let to_add: BTreeSet<String> = wanted.difference(&current).cloned().collect();

            self.delete_elements(family, &to_delete);
            self.add_elements(family, &to_add)?;

            if !to_delete.is_empty() {
                report.deleted.insert(family, to_delete);
            }
            if !to_add.is_empty() {
                report.added.insert(family, to_add);
            }
        }

        for family in Family::ALL {
            self.flush_chain(family);
            if desired.get(&family).is_some_and(|set| !set.is_empty()) {
                self.install_rules(family)?;
                report.ruled.insert(family);
            }
        }

        Ok(Some(report))
    }

    /// Remove the requested virtual addresses from `mapping` and unblock
    /// their physical addresses.
    ///
    /// Returns `Ok(None)` when none of them is mapped. Both chains are
    /// flushed, then the drop pair is reinstalled for every family that still
    /// has forced peers.
    pub fn apply_cancel(
        &self,
        virtual_addrs: &[String],
        mapping: &mut AddressMap,
    ) -> Result<Option<ReconcileReport>, AppError> {
        let mut released = Vec::new();
        for virtual_addr in virtual_addrs {
            match mapping.remove(virtual_addr) {
                Some(physical) => {
                    tracing::info!("{virtual_addr} was forced via {physical}");
                    released.push(physical);
                }
                None => tracing::warn!("{virtual_addr} is not in the mapping, skipping"),
            }
        }
        if released.is_empty() {
            tracing::info!("No mapped addresses to cancel");
            return Ok(None);
        }

        let remaining = partition(mapping.physical_addrs());
        let released = partition(released.iter().map(String::as_str));
        let mut report = ReconcileReport::default();

        for (family, addrs) in released {
            let still_wanted = family_set(&remaining, family);
            let to_delete: BTreeSet<String> = addrs
                .into_iter()
                .filter(|addr| !still_wanted.contains(addr))
                .collect();
            self.delete_elements(family, &to_delete);
            if !to_delete.is_empty() {
                report.deleted.insert(family, to_delete);
            }
        }

        tracing::info!("Removing drop rules");
        for family in Family::ALL {
            self.flush_chain(family);
        }
        for family in Family::ALL {
            if remaining.get(&family).is_some_and(|set| !set.is_empty()) {
                tracing::info!("Restoring {family} drop rules for the remaining forced peers");
                self.install_rules(family)?;
                report.ruled.insert(family);
            }
        }

        Ok(Some(report))
    }

    fn delete_elements(&self, family: Family, addrs: &BTreeSet<String>) {
        if addrs.is_empty() {
            return;
        }
        tracing::info!("Removing from {family} deny set: {addrs:?}");
        for addr in addrs {
            if let Err(e) =
                self.firewall
                    .delete_element(family, &self.names.table, &self.names.deny_set, addr)
            {
                tracing::warn!("Failed to remove {addr} from the {family} deny set: {e}");
            }
        }
    }

    fn add_elements(&self, family: Family, addrs: &BTreeSet<String>) -> Result<(), AppError> {
        if addrs.is_empty() {
            return Ok(());
        }
        tracing::info!("Adding to {family} deny set: {addrs:?}");
        for addr in addrs {
            self.firewall.add_elements(
                family,
                &self.names.table,
                &self.names.deny_set,
                std::slice::from_ref(addr),
            )?;
        }
        Ok(())
    }

    fn flush_chain(&self, family: Family) {
        if let Err(e) = self
            .firewall
            .flush_chain(family, &self.names.table, &self.names.chain)
        {
            tracing::warn!("Failed to flush the {family} chain: {e}");
        }
    }

    fn install_rules(&self, family: Family) -> Result<(), AppError> {
        tracing::info!("Installing {family} UDP drop rules");
        for rule in DropRule::pair(family, self.names) {
            self.firewall
                .add_rule(family, &self.names.table, &self.names.chain, &rule)?;
        }
        Ok(())
    }
}
