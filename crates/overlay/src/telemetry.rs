//! Engine counters, emitted as one JSON line.

use serde::Serialize;

/// Snapshot of what the engine has done since it started.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EngineCounters {
    /// Full scans executed.
    pub scans: u64,
    /// Scan requests folded into an already scheduled trailing scan.
    pub scans_coalesced: u64,
    /// Mutation batches that led to a dispatch.
    pub mutation_dispatches: u64,
    /// Mutation records dropped because they touched an overlay.
    pub self_mutations_ignored: u64,
    /// Navigation rebuilds executed.
    pub rebuilds: u64,
    /// Navigation rebuilds that hit the watchdog.
    pub rebuild_timeouts: u64,
    /// Calls made to the card data service.
    pub lookups: u64,
    pub overlays_inserted: u64,
    pub overlays_removed: u64,
    /// Live overlays at snapshot time.
    pub overlays_live: u64,
    /// Finished overlays discarded because the element changed meanwhile.
    pub discarded_races: u64,
    /// Elements rejected without an overlay.
    pub rejected: u64,
    /// Elements parked while the user was inactive.
    pub queued_while_inactive: u64,
    /// Dataset update notifications handled.
    pub dataset_updates: u64,
}

impl EngineCounters {
    /// Render the counters as a single JSON object.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| String::from("{}"))
    }
}
