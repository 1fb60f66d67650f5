//! Overlay construction, placement, layout and garbage collection.

use crate::context::LayoutContext;
use crate::descriptor::InsertionMode;
use crate::service::{CardId, CardStats};
use card_selectors::SelectorList;
use dom::{Document, DomError, NodeId};
use indexmap::IndexMap;
use log::{debug, trace};
use serde::Serialize;
use url::Url;

/// Class carried by every overlay root.
pub const OVERLAY_CLASS: &str = "cardlens-overlay";

/// True when `node` is an overlay root or lies inside one.
pub fn is_in_overlay(doc: &Document, node: NodeId) -> bool {
    doc.ancestors(node)
        .into_iter()
        .any(|ancestor| doc.has_class(ancestor, OVERLAY_CLASS))
}

/// Free an overlay subtree the engine owns, attached or not.
fn free(doc: &mut Document, overlay: NodeId) {
    if doc.exists(overlay) && doc.drop_subtree(overlay).is_err() {
        debug!("overlay {overlay:?} vanished before it was freed");
    }
}

/// Arrangement of the three statistics inside an overlay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OverlayLayout {
    Horizontal,
    Mixed,
    Vertical,
}

impl OverlayLayout {
    /// Pick the layout for a container width. Lootbox and carousel cards are narrower,
    /// so they switch to `Mixed` much earlier.
    pub fn for_width(width: f64, context: LayoutContext) -> Self {
        let (horizontal, mixed) = match context {
            LayoutContext::Standard => (210.0, 130.0),
            LayoutContext::Lootbox | LayoutContext::Carousel => (320.0, 100.0),
        };
        if width >= horizontal {
            Self::Horizontal
        } else if width >= mixed {
            Self::Mixed
        } else {
            Self::Vertical
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Horizontal => "horizontal",
            Self::Mixed => "mixed",
            Self::Vertical => "vertical",
        }
    }
}

/// A live overlay owned by one card element.
#[derive(Debug, Clone, PartialEq)]
pub struct OverlayRecord {
    pub overlay: NodeId,
    pub card_id: CardId,
    pub stats: CardStats,
    pub layout_context: LayoutContext,
    /// `None` until the container reported a width.
    pub layout: Option<OverlayLayout>,
    /// Built from a previous dataset version.
    pub stale: bool,
}

/// Result of a layout measurement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Measurement {
    Applied(OverlayLayout),
    Unchanged,
    /// The container has no width yet; measure again later.
    ZeroWidth,
    /// The owner no longer has an overlay.
    Gone,
}

/// Outcome of a periodic sweep.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepReport {
    /// Owners whose overlay was detached from the document.
    pub orphaned: Vec<NodeId>,
    /// Owners whose overlay was evicted to honor the cap.
    pub evicted: Vec<NodeId>,
}

/// Owns every overlay the engine inserted, in insertion order.
#[derive(Debug)]
pub struct OverlayManager {
    records: IndexMap<NodeId, OverlayRecord>,
    max_overlays: usize,
    unlimited: bool,
    report_base: Url,
    inserted: u64,
    removed: u64,
}

impl OverlayManager {
    pub fn new(max_overlays: usize, unlimited: bool, report_base: Url) -> Self {
        Self {
            records: IndexMap::new(),
            max_overlays,
            unlimited,
            report_base,
            inserted: 0,
            removed: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub const fn inserted(&self) -> u64 {
        self.inserted
    }

    pub const fn removed(&self) -> u64 {
        self.removed
    }

    pub fn record(&self, owner: NodeId) -> Option<&OverlayRecord> {
        self.records.get(&owner)
    }

    /// Records in insertion order, oldest first.
    pub fn records(&self) -> impl Iterator<Item = (NodeId, &OverlayRecord)> {
        self.records.iter().map(|(owner, record)| (*owner, record))
    }

    /// Whether an overlay for `owner` may be inserted. Replacing an owner's overlay never
    /// grows the count.
    pub fn has_capacity(&self, owner: NodeId) -> bool {
        self.unlimited
            || self.records.contains_key(&owner)
            || self.records.len() < self.max_overlays
    }

    /// Report link for one statistic.
    fn report_link(&self, id: CardId, kind: Option<&str>) -> String {
        let path = kind.map_or_else(
            || format!("/cards/{id}/users"),
            |kind| format!("/cards/{id}/users?type={kind}"),
        );
        self.report_base
            .join(&path)
            .map_or(path, |url| url.to_string())
    }

    /// Build a detached overlay subtree.
    ///
    /// # Errors
    /// Fails only if the freshly created nodes cannot be assembled; nothing is left behind.
    pub fn build(
        &self,
        doc: &mut Document,
        id: CardId,
        stats: CardStats,
        title: Option<&str>,
    ) -> Result<NodeId, DomError> {
        let id_text = id.to_string();
        let root = doc.create_element_with(
            "div",
            &[("class", OVERLAY_CLASS), ("data-card-id", id_text.as_str())],
        );
        match self.fill(doc, root, id, stats, title) {
            Ok(()) => Ok(root),
            Err(err) => {
                free(doc, root);
                Err(err)
            }
        }
    }

    fn fill(
        &self,
        doc: &mut Document,
        root: NodeId,
        id: CardId,
        stats: CardStats,
        title: Option<&str>,
    ) -> Result<(), DomError> {
        if let Some(title) = title.filter(|title| !title.trim().is_empty()) {
            doc.set_attribute(root, "title", title.trim())?;
        }
        let entries = [
            ("owners", None, stats.owners),
            ("wants", Some("want"), stats.wants),
            ("trades", Some("trade"), stats.trades),
        ];
        for (name, kind, count) in entries {
            let class = format!("{OVERLAY_CLASS}__stat {OVERLAY_CLASS}__{name}");
            let href = self.report_link(id, kind);
            let link = doc.create_element_with(
                "a",
                &[
                    ("class", class.as_str()),
                    ("href", href.as_str()),
                    ("target", "_blank"),
                    ("rel", "noopener noreferrer"),
                    ("data-stat", name),
                ],
            );
            let text = doc.create_text(&count.to_string());
            doc.append_child(link, text)?;
            doc.append_child(root, link)?;
        }
        Ok(())
    }

    /// Overlay already sitting where a new one would be inserted.
    pub fn existing_at(doc: &Document, target: NodeId, mode: InsertionMode) -> Option<NodeId> {
        let is_overlay = |node: &NodeId| doc.has_class(*node, OVERLAY_CLASS);
        match mode {
            InsertionMode::Append | InsertionMode::Prepend => {
                doc.element_children(target).into_iter().find(is_overlay)
            }
            InsertionMode::Before => doc.previous_element_sibling(target).filter(is_overlay),
            InsertionMode::After => {
                let mut next = doc.next_sibling(target);
                while let Some(sibling) = next {
                    if doc.is_element(sibling) {
                        return Some(sibling).filter(is_overlay);
                    }
                    next = doc.next_sibling(sibling);
                }
                None
            }
        }
    }

    /// Attach `overlay` for `owner` and take ownership of it. A stale overlay the owner had
    /// is removed first.
    ///
    /// # Errors
    /// Fails when the target cannot take the overlay.
    pub fn insert(
        &mut self,
        doc: &mut Document,
        owner: NodeId,
        target: NodeId,
        mode: InsertionMode,
        record: OverlayRecord,
    ) -> Result<(), DomError> {
        self.release(doc, owner);
        let overlay = record.overlay;
        let placed = match mode {
            InsertionMode::Append => doc.append_child(target, overlay),
            InsertionMode::Prepend => doc.prepend_child(target, overlay),
            InsertionMode::Before => doc.insert_before(target, overlay),
            InsertionMode::After => doc.insert_after(target, overlay),
        };
        if let Err(err) = placed {
            free(doc, overlay);
            return Err(err);
        }
        self.inserted = self.inserted.saturating_add(1);
        trace!("inserted overlay {overlay:?} for card {} on {owner:?}", record.card_id);
        self.records.insert(owner, record);
        Ok(())
    }

    /// Remove the overlay of `owner`. Returns `false` when it had none.
    pub fn release(&mut self, doc: &mut Document, owner: NodeId) -> bool {
        let Some(record) = self.records.shift_remove(&owner) else {
            return false;
        };
        free(doc, record.overlay);
        self.removed = self.removed.saturating_add(1);
        true
    }

    /// Remove every overlay, including orphans that are only found by class.
    pub fn remove_all(&mut self, doc: &mut Document) -> usize {
        let owners: Vec<NodeId> = self.records.keys().copied().collect();
        let mut count = 0_usize;
        for owner in owners {
            if self.release(doc, owner) {
                count = count.saturating_add(1);
            }
        }
        let orphans =
            doc.query_selector_all(doc.root(), &SelectorList::parse(&format!(".{OVERLAY_CLASS}")));
        for orphan in orphans {
            // Nested matches were already detached with their ancestor.
            if doc.is_connected(orphan) && doc.drop_subtree(orphan).is_ok() {
                count = count.saturating_add(1);
                self.removed = self.removed.saturating_add(1);
            }
        }
        count
    }

    /// Flag every current overlay as built from an outdated dataset.
    pub fn mark_stale(&mut self) -> usize {
        for record in self.records.values_mut() {
            record.stale = true;
        }
        self.records.len()
    }

    pub fn is_stale(&self, owner: NodeId) -> bool {
        self.records.get(&owner).is_some_and(|record| record.stale)
    }

    /// Owner of `overlay` if it is a stale overlay.
    pub fn stale_owner(&self, overlay: NodeId) -> Option<NodeId> {
        self.records
            .iter()
            .find(|(_, record)| record.overlay == overlay && record.stale)
            .map(|(owner, _)| *owner)
    }

    /// Measure the owner's overlay container and apply the matching layout.
    pub fn measure(&mut self, doc: &mut Document, owner: NodeId) -> Measurement {
        let Some(record) = self.records.get_mut(&owner) else {
            return Measurement::Gone;
        };
        let Some(container) = doc.parent_element(record.overlay) else {
            return Measurement::Gone;
        };
        let width = doc.width(container);
        if width <= 0.0 {
            return Measurement::ZeroWidth;
        }
        let layout = OverlayLayout::for_width(width, record.layout_context);
        if record.layout == Some(layout) {
            return Measurement::Unchanged;
        }
        record.layout = Some(layout);
        if doc
            .set_attribute(record.overlay, "data-layout", layout.as_str())
            .is_err()
        {
            return Measurement::Gone;
        }
        Measurement::Applied(layout)
    }

    /// Give up on measuring and fall back to the narrowest layout.
    pub fn force_layout(&mut self, doc: &mut Document, owner: NodeId, layout: OverlayLayout) {
        if let Some(record) = self.records.get_mut(&owner)
            && record.layout.is_none()
            && doc
                .set_attribute(record.overlay, "data-layout", layout.as_str())
                .is_ok()
        {
            record.layout = Some(layout);
        }
    }

    /// Owners affected by a resize of `node`: the node is the owner or its overlay's container.
    pub fn owners_resized(&self, doc: &Document, node: NodeId) -> Vec<NodeId> {
        self.records
            .iter()
            .filter(|(owner, record)| {
                **owner == node || doc.parent(record.overlay) == Some(node)
            })
            .map(|(owner, _)| *owner)
            .collect()
    }

    /// Drop detached overlays, then evict the oldest overlays above the cap.
    pub fn sweep(&mut self, doc: &mut Document) -> SweepReport {
        let mut report = SweepReport::default();
        let detached: Vec<NodeId> = self
            .records
            .iter()
            .filter(|(_, record)| !doc.is_connected(record.overlay))
            .map(|(owner, _)| *owner)
            .collect();
        for owner in detached {
            self.release(doc, owner);
            report.orphaned.push(owner);
        }
        if !self.unlimited {
            while self.records.len() > self.max_overlays {
                let Some(oldest) = self.records.keys().next().copied() else {
                    break;
                };
                self.release(doc, oldest);
                report.evicted.push(oldest);
            }
        }
        if !report.orphaned.is_empty() || !report.evicted.is_empty() {
            debug!(
                "sweep dropped {} detached and {} excess overlays",
                report.orphaned.len(),
                report.evicted.len()
            );
        }
        report
    }

    /// Forget every record without touching the document.
    pub fn clear(&mut self) {
        self.records.clear();
    }
}
