//! Pure helpers used by the command handlers.

use std::net::IpAddr;

use crate::core::ReconcileReport;
use crate::db::AddressMap;
use crate::error::AppError;

pub const EMPTY_LIST_NOTICE: &str = "No peers are currently forced through the relay.";

/// Every argument must be an IPv4 or IPv6 literal.
pub fn validate_addresses(addresses: &[String]) -> Result<(), AppError> {
    match addresses.iter().find(|a| a.parse::<IpAddr>().is_err()) {
        Some(bad) => Err(AppError::InvalidInput(format!(
            "'{bad}' is not a valid IP address"
        ))),
        None => Ok(()),
    }
}

/// Text printed by `list`.
pub fn render_mapping(mapping: &AddressMap) -> String {
    if mapping.is_empty() {
        EMPTY_LIST_NOTICE.to_string()
    } else {
        mapping.to_pretty_json()
    }
}

/// One-line summary of a reconciliation for the log.
pub fn summarize(report: &ReconcileReport) -> String {
    let count = |sets: &crate::core::reconcile::FamilySets| -> usize {
        sets.values().map(|s| s.len()).sum()
    };
    let ruled = if report.ruled.is_empty() {
        "none".to_string()
    } else {
        report
            .ruled
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ")
    };
    format!(
        "{} address(es) added, {} removed, drop rules active for: {ruled}",
        count(&report.added),
        count(&report.deleted)
    )
}
