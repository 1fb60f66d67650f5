//! Per-element processing state and the dedup guards.
//!
//! The registry is the single source of truth for "has this element been seen". Every state
//! change happens synchronously on the engine thread, so a `begin_resolving` that returns a
//! ticket is an exclusive claim on the element until the ticket is settled or revoked.

use dom::NodeId;
use indexmap::IndexMap;
use std::collections::HashMap;
use tokio::time::{Duration, Instant};

/// Identifies one resolution attempt. A reset element gets a new ticket on its next attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ticket(u64);

/// Processing state of a card element. Elements without an entry are unseen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CardState {
    /// Registered with the visibility scheduler.
    Observing,
    /// Became visible while the user was inactive.
    Queued,
    /// Id and stats lookups are in flight.
    Resolving { ticket: Ticket },
    /// Owns the given overlay node.
    Overlaid { overlay: NodeId },
    /// Terminal: no overlay and no retry until reset.
    Rejected,
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    state: CardState,
    descriptor: usize,
}

/// Registry of card elements keyed by node.
#[derive(Debug, Default)]
pub struct CardRegistry {
    entries: IndexMap<NodeId, Entry>,
    next_ticket: u64,
}

impl CardRegistry {
    pub fn state(&self, node: NodeId) -> Option<CardState> {
        self.entries.get(&node).map(|entry| entry.state)
    }

    pub fn descriptor(&self, node: NodeId) -> Option<usize> {
        self.entries.get(&node).map(|entry| entry.descriptor)
    }

    pub fn contains(&self, node: NodeId) -> bool {
        self.entries.contains_key(&node)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Register an unseen element with the visibility scheduler.
    ///
    /// Returns `false` (and changes nothing) when the element already has an entry.
    pub fn observe(&mut self, node: NodeId, descriptor: usize) -> bool {
        if self.entries.contains_key(&node) {
            return false;
        }
        self.entries.insert(
            node,
            Entry {
                state: CardState::Observing,
                descriptor,
            },
        );
        true
    }

    /// Park an observed element until the user is active again.
    pub fn queue(&mut self, node: NodeId) -> bool {
        match self.entries.get_mut(&node) {
            Some(entry) if entry.state == CardState::Observing => {
                entry.state = CardState::Queued;
                true
            }
            _ => false,
        }
    }

    /// Claim an observed or queued element for resolution.
    pub fn begin_resolving(&mut self, node: NodeId) -> Option<Ticket> {
        let entry = self.entries.get_mut(&node)?;
        if !matches!(entry.state, CardState::Observing | CardState::Queued) {
            return None;
        }
        self.next_ticket = self.next_ticket.wrapping_add(1);
        let ticket = Ticket(self.next_ticket);
        entry.state = CardState::Resolving { ticket };
        Some(ticket)
    }

    /// True while `ticket` is still the active claim on `node`.
    pub fn holds(&self, node: NodeId, ticket: Ticket) -> bool {
        self.state(node) == Some(CardState::Resolving { ticket })
    }

    fn settle(&mut self, node: NodeId, ticket: Ticket, state: CardState) -> bool {
        match self.entries.get_mut(&node) {
            Some(entry) if entry.state == (CardState::Resolving { ticket }) => {
                entry.state = state;
                true
            }
            _ => false,
        }
    }

    /// Record the overlay produced under `ticket`. Fails if the claim was lost.
    pub fn mark_overlaid(&mut self, node: NodeId, ticket: Ticket, overlay: NodeId) -> bool {
        self.settle(node, ticket, CardState::Overlaid { overlay })
    }

    /// Terminally reject the element resolved under `ticket`.
    pub fn mark_rejected(&mut self, node: NodeId, ticket: Ticket) -> bool {
        self.settle(node, ticket, CardState::Rejected)
    }

    /// Reject an element regardless of its current state (cap eviction).
    pub fn force_reject(&mut self, node: NodeId) {
        if let Some(entry) = self.entries.get_mut(&node) {
            entry.state = CardState::Rejected;
        }
    }

    /// Return an element to unseen. Returns the overlay it owned, if any.
    pub fn forget(&mut self, node: NodeId) -> Option<NodeId> {
        match self.entries.shift_remove(&node)?.state {
            CardState::Overlaid { overlay } => Some(overlay),
            CardState::Observing
            | CardState::Queued
            | CardState::Resolving { .. }
            | CardState::Rejected => None,
        }
    }

    /// Elements currently waiting for visibility.
    pub fn observing(&self) -> Vec<NodeId> {
        self.entries
            .iter()
            .filter(|(_, entry)| entry.state == CardState::Observing)
            .map(|(node, _)| *node)
            .collect()
    }

    pub fn nodes(&self) -> Vec<NodeId> {
        self.entries.keys().copied().collect()
    }

    /// Drop every entry. Overlays are owned by the overlay manager and are not touched.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Short-lived guard against double processing of rapidly repainted images.
///
/// Keyed by the trailing path segment of the image URL; an entry blocks other elements
/// with the same key until it expires.
#[derive(Debug)]
pub struct FingerprintGuard {
    window: Duration,
    entries: HashMap<String, (NodeId, Instant)>,
}

impl FingerprintGuard {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            entries: HashMap::new(),
        }
    }

    /// Try to claim `key` for `node`. Fails while another element holds a live entry.
    pub fn try_claim(&mut self, key: &str, node: NodeId, now: Instant) -> bool {
        let window = self.window;
        self.entries
            .retain(|_, (_, claimed)| now.saturating_duration_since(*claimed) < window);
        match self.entries.get(key) {
            Some((holder, _)) if *holder != node => false,
            _ => {
                self.entries.insert(key.to_owned(), (node, now));
                true
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dom::Document;

    fn nodes(count: usize) -> Vec<NodeId> {
        let mut doc = Document::new("https://cards.example/".parse().unwrap());
        (0..count).map(|_| doc.create_element("div")).collect()
    }

    #[test]
    fn observe_is_once_per_lifetime() {
        let ids = nodes(1);
        let mut registry = CardRegistry::default();
        assert!(registry.observe(ids[0], 0));
        assert!(!registry.observe(ids[0], 1));
        assert_eq!(registry.descriptor(ids[0]), Some(0));
    }

    #[test]
    fn tickets_gate_settlement() {
        let ids = nodes(2);
        let mut registry = CardRegistry::default();
        registry.observe(ids[0], 0);
        let ticket = registry.begin_resolving(ids[0]).unwrap();
        assert!(registry.begin_resolving(ids[0]).is_none());

        registry.forget(ids[0]);
        registry.observe(ids[0], 0);
        let fresh = registry.begin_resolving(ids[0]).unwrap();
        assert_ne!(ticket, fresh);
        assert!(!registry.mark_overlaid(ids[0], ticket, ids[1]));
        assert!(registry.mark_overlaid(ids[0], fresh, ids[1]));
        assert_eq!(registry.forget(ids[0]), Some(ids[1]));
    }

    #[test]
    fn queued_elements_can_resolve() {
        let ids = nodes(1);
        let mut registry = CardRegistry::default();
        registry.observe(ids[0], 0);
        assert!(registry.queue(ids[0]));
        assert!(!registry.queue(ids[0]));
        assert!(registry.observing().is_empty());
        assert!(registry.begin_resolving(ids[0]).is_some());
    }

    #[test]
    fn fingerprint_guard_expires() {
        let ids = nodes(2);
        let start = Instant::now();
        let mut guard = FingerprintGuard::new(Duration::from_secs(5));
        assert!(guard.try_claim("a.webp", ids[0], start));
        assert!(guard.try_claim("a.webp", ids[0], start));
        assert!(!guard.try_claim("a.webp", ids[1], start + Duration::from_secs(4)));
        assert!(guard.try_claim("a.webp", ids[1], start + Duration::from_secs(5)));
    }
}
