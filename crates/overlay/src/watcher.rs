//! Classification of mutation records.
//!
//! The watcher decides which host page mutations matter. Anything touching an overlay
//! subtree is dropped first: overlay insertions must never feed back into a scan.

use crate::context::PageContext;
use crate::descriptor::DescriptorTable;
use crate::manager::is_in_overlay;
use card_selectors::SelectorList;
use dom::{Document, MutationRecord, NodeId};
use log::trace;

/// Attributes whose changes may swap a card's content in place.
pub const WATCHED_ATTRIBUTES: [&str; 6] = [
    "class",
    "data-loaded",
    "data-updated",
    "style",
    "data-id",
    "data-pack-id",
];

/// Panel roots that the host page repopulates wholesale on trade pages.
pub const BULK_CONTAINERS: &str = ".trade__inventory, .trade__main, .inventory__list";

/// How a card reacts to an attribute change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reset {
    /// Release the overlay and treat the element as unseen.
    Full,
    /// Treat the element as unseen unless it already owns an overlay.
    UnlessOverlaid,
}

/// Outcome of classifying one batch of mutation records.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Classification {
    /// Card elements were added or changed.
    pub cards: bool,
    /// A bulk update container was added.
    pub bulk: bool,
    /// Card elements whose state must be reset.
    pub resets: Vec<(NodeId, Reset)>,
    /// Removed non-card nodes; registered cards inside them are forgotten.
    pub removed_containers: Vec<NodeId>,
    /// Records dropped because they touched an overlay.
    pub ignored: usize,
}

impl Classification {
    /// True when the batch should lead to a delayed scan.
    pub const fn is_actionable(&self) -> bool {
        self.cards || self.bulk
    }
}

/// Stateless classifier plus the pending dispatch it feeds.
#[derive(Debug)]
pub struct MutationWatcher {
    bulk_containers: SelectorList,
    ancestor_depth: usize,
    /// `Some(bulk)` while a dispatch is scheduled.
    pending: Option<bool>,
}

/// What to do with the dispatch timer after an actionable batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchPlan {
    /// Nothing is pending: start a timer with the delay for `bulk`.
    Schedule { bulk: bool },
    /// A card-level dispatch is pending and this batch is bulk: restart with the bulk delay.
    Upgrade,
    /// Fold into the pending dispatch.
    Coalesce,
}

impl MutationWatcher {
    pub fn new(ancestor_depth: usize) -> Self {
        Self {
            bulk_containers: SelectorList::parse(BULK_CONTAINERS),
            ancestor_depth,
            pending: None,
        }
    }

    /// Classify a batch of records against the current document.
    pub fn classify(
        &self,
        doc: &Document,
        table: &DescriptorTable,
        context: PageContext,
        records: &[MutationRecord],
    ) -> Classification {
        let mut outcome = Classification::default();
        for record in records {
            match record {
                MutationRecord::ChildList { added, removed, .. } => {
                    for &node in added {
                        if !doc.is_element(node) {
                            continue;
                        }
                        if is_in_overlay(doc, node) {
                            outcome.ignored = outcome.ignored.saturating_add(1);
                            continue;
                        }
                        self.classify_added(doc, table, context, node, &mut outcome);
                    }
                    for &node in removed {
                        // Only overlays are ever freed, so a vanished node was one.
                        if !doc.exists(node) {
                            outcome.ignored = outcome.ignored.saturating_add(1);
                            continue;
                        }
                        if !doc.is_element(node) {
                            continue;
                        }
                        if is_in_overlay(doc, node) {
                            outcome.ignored = outcome.ignored.saturating_add(1);
                            continue;
                        }
                        if table.match_node(doc, node).is_none() {
                            outcome.removed_containers.push(node);
                        }
                    }
                }
                MutationRecord::Attributes { target, name, .. } => {
                    if !WATCHED_ATTRIBUTES.contains(&name.as_str()) {
                        continue;
                    }
                    if is_in_overlay(doc, *target) {
                        outcome.ignored = outcome.ignored.saturating_add(1);
                        continue;
                    }
                    if let Some(card) =
                        table.relevant_card_within(doc, *target, self.ancestor_depth, context)
                    {
                        let reset = if name.starts_with("data-") {
                            Reset::Full
                        } else {
                            Reset::UnlessOverlaid
                        };
                        trace!("attribute {name} changed on card {card:?}");
                        outcome.resets.push((card, reset));
                        outcome.cards = true;
                    }
                }
            }
        }
        outcome
    }

    fn classify_added(
        &self,
        doc: &Document,
        table: &DescriptorTable,
        context: PageContext,
        node: NodeId,
        outcome: &mut Classification,
    ) {
        if table.card_within(doc, node, self.ancestor_depth).is_some() {
            outcome.cards = true;
        } else if context.honors_bulk_containers() && doc.matches(node, &self.bulk_containers) {
            outcome.bulk = true;
        } else if table.has_card_descendant(doc, node) {
            outcome.cards = true;
        }
    }

    /// Plan the dispatch timer for an actionable batch.
    pub fn plan(&mut self, bulk: bool) -> DispatchPlan {
        match self.pending {
            None => {
                self.pending = Some(bulk);
                DispatchPlan::Schedule { bulk }
            }
            Some(false) if bulk => {
                self.pending = Some(true);
                DispatchPlan::Upgrade
            }
            Some(_) => DispatchPlan::Coalesce,
        }
    }

    /// The dispatch timer fired; returns whether it was a bulk dispatch.
    pub fn fire(&mut self) -> Option<bool> {
        self.pending.take()
    }

    pub fn cancel(&mut self) {
        self.pending = None;
    }
}
