//! Scan throttling, the user activity gate and viewport admission.

use core::time::Duration;
use dom::{Document, NodeId};
use tokio::time::Instant;

/// What a scan request should do right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanDecision {
    /// Run the scan immediately.
    RunNow,
    /// Schedule one trailing scan after the given delay.
    ScheduleIn(Duration),
    /// A trailing scan is already scheduled; this request is folded into it.
    Coalesced,
}

/// Enforces a minimum spacing between scans. Requests inside the window coalesce into a
/// single trailing scan instead of being dropped.
#[derive(Debug)]
pub struct ScanThrottle {
    /// The minimum time interval between two scans.
    spacing: Duration,
    /// Start of the most recent scan.
    last_scan: Option<Instant>,
    /// Whether a trailing scan is scheduled.
    trailing: bool,
    /// Number of requests folded into an already scheduled scan.
    coalesced_count: u64,
}

impl ScanThrottle {
    #[must_use]
    pub const fn new(spacing: Duration) -> Self {
        Self {
            spacing,
            last_scan: None,
            trailing: false,
            coalesced_count: 0,
        }
    }

    #[must_use]
    pub const fn spacing(&self) -> Duration {
        self.spacing
    }

    /// Decide how to serve a scan request at `now`.
    pub fn request(&mut self, now: Instant) -> ScanDecision {
        if self.trailing {
            self.coalesced_count = self.coalesced_count.saturating_add(1);
            return ScanDecision::Coalesced;
        }
        match self.last_scan {
            Some(start) if now.saturating_duration_since(start) < self.spacing => {
                self.trailing = true;
                ScanDecision::ScheduleIn(self.spacing - now.saturating_duration_since(start))
            }
            _ => {
                self.last_scan = Some(now);
                ScanDecision::RunNow
            }
        }
    }

    /// The trailing scan is starting.
    pub fn trailing_started(&mut self, now: Instant) {
        self.trailing = false;
        self.last_scan = Some(now);
    }

    /// Forget a scheduled trailing scan (its task was aborted).
    pub fn cancel(&mut self) {
        self.trailing = false;
    }

    #[must_use]
    pub const fn coalesced(&self) -> u64 {
        self.coalesced_count
    }
}

/// Tracks user activity and tab visibility.
#[derive(Debug)]
pub struct ActivityGate {
    threshold: Duration,
    last_interaction: Instant,
    hidden: bool,
}

impl ActivityGate {
    pub const fn new(threshold: Duration, now: Instant, hidden: bool) -> Self {
        Self {
            threshold,
            last_interaction: now,
            hidden,
        }
    }

    /// Active when the tab is visible and the user interacted within the threshold.
    pub fn is_active(&self, now: Instant) -> bool {
        !self.hidden && now.saturating_duration_since(self.last_interaction) < self.threshold
    }

    /// Record user input. Returns `true` when this wakes an inactive gate.
    pub fn interact(&mut self, now: Instant) -> bool {
        let was_active = self.is_active(now);
        self.last_interaction = now;
        !was_active && self.is_active(now)
    }

    /// Record a visibility change. Returns `true` when this wakes an inactive gate.
    ///
    /// Showing the tab counts as an interaction.
    pub fn set_hidden(&mut self, hidden: bool, now: Instant) -> bool {
        let was_active = self.is_active(now);
        self.hidden = hidden;
        if !hidden {
            self.last_interaction = now;
        }
        !was_active && self.is_active(now)
    }
}

/// Elements of `candidates` whose box intersects the viewport grown by `margin`.
///
/// Detached elements and elements that have not been laid out are never visible.
pub fn visible_elements(doc: &Document, candidates: &[NodeId], margin: f64) -> Vec<NodeId> {
    let admission = doc.viewport().inflate(margin);
    candidates
        .iter()
        .copied()
        .filter(|&node| {
            doc.is_connected(node)
                && doc
                    .rect(node)
                    .is_some_and(|rect| admission.intersects(&rect))
        })
        .collect()
}
