//! Run summary.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::{info, warn};

use super::GroupKey;
use crate::models::display_name;

/// Counts for one split run. Every input record is accounted for exactly
/// once; see [`is_balanced`](Self::is_balanced).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SplitReport {
    /// Records read from the source, including skipped ones
    pub processed: u64,
    /// Writes per group, keyed by the group's display form (`11/AB`)
    pub groups: BTreeMap<String, u64>,
    pub unresolved_zone: u64,
    pub malformed: u64,
    /// Rejected by the observation-date filter
    pub filtered: u64,
    /// Records routed to an `unclassified/{zone}` group
    pub unclassified: u64,
    /// Records that matched more than one jurisdiction
    pub duplicated: u64,
    /// Copies written beyond the first for duplicated records
    pub extra_writes: u64,
    /// Records whose jurisdiction hint is not among the resolved codes
    pub hint_mismatches: u64,
}

impl SplitReport {
    pub(crate) fn record_write(&mut self, key: &GroupKey) {
        *self.groups.entry(key.to_string()).or_insert(0) += 1;
    }

    pub fn group_count(&self, key: &GroupKey) -> u64 {
        self.groups.get(&key.to_string()).copied().unwrap_or(0)
    }

    /// Total writes across all groups
    pub fn written(&self) -> u64 {
        self.groups.values().sum()
    }

    /// `processed == written - extra_writes + unresolved_zone + malformed + filtered`
    pub fn is_balanced(&self) -> bool {
        self.processed + self.extra_writes
            == self.written() + self.unresolved_zone + self.malformed + self.filtered
    }

    /// Records skipped without being written anywhere
    pub fn skipped(&self) -> u64 {
        self.unresolved_zone + self.malformed + self.filtered
    }

    pub fn log_summary(&self) {
        info!("Records processed: {}", self.processed);
        for (group, count) in &self.groups {
            let label = group
                .split_once('/')
                .filter(|(zone, _)| *zone != "unclassified")
                .map(|(_, code)| display_name(code))
                .unwrap_or("unclassified");
            info!("  {:<18} {:>8}  ({})", group, count, label);
        }
        info!(
            "Unclassified: {}, duplicated: {} (+{} writes), skipped: {} (filtered: {})",
            self.unclassified,
            self.duplicated,
            self.extra_writes,
            self.skipped(),
            self.filtered
        );
        if self.unresolved_zone > 0 || self.malformed > 0 {
            warn!(
                "Skipped {} record(s) with unresolved zone and {} malformed record(s)",
                self.unresolved_zone, self.malformed
            );
        }
        if self.hint_mismatches > 0 {
            warn!(
                "{} record(s) carry a jurisdiction hint that disagrees with their coordinates",
                self.hint_mismatches
            );
        }
    }

    /// Fold another run into this one (batch totals)
    pub fn merge(&mut self, other: &SplitReport) {
        self.processed += other.processed;
        for (group, count) in &other.groups {
            *self.groups.entry(group.clone()).or_insert(0) += count;
        }
        self.unresolved_zone += other.unresolved_zone;
        self.malformed += other.malformed;
        self.filtered += other.filtered;
        self.unclassified += other.unclassified;
        self.duplicated += other.duplicated;
        self.extra_writes += other.extra_writes;
        self.hint_mismatches += other.hint_mismatches;
    }
}
