//! Scan, admission and per-card resolution.

use super::{Inner, Phase};
use crate::context::{LayoutContext, PageContext};
use crate::manager::{Measurement, OverlayLayout, OverlayManager, OverlayRecord, is_in_overlay};
use crate::registry::{CardState, Ticket};
use crate::resolver::{Extraction, extract};
use crate::scheduler::{ScanDecision, visible_elements};
use crate::service::{CardId, CardStats, image_fingerprint};
use dom::NodeId;
use futures::future::join_all;
use log::{debug, trace, warn};
use std::rc::Rc;
use tokio::task::spawn_local;
use tokio::time::{Instant, sleep};

/// One claimed card on its way to an overlay.
#[derive(Debug)]
pub(super) struct Job {
    node: NodeId,
    ticket: Ticket,
    descriptor: usize,
    extraction: Extraction,
}

/// Why a finished attempt did not produce an overlay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Rejection {
    NoId,
    NoStats,
    LookupFailed,
    NoTarget,
    Capped,
}

impl Inner {
    pub(super) fn is_torn_down(&self) -> bool {
        self.state.borrow().phase == Phase::TornDown
    }

    /// Request a full scan, honoring the minimum spacing between scans.
    pub(super) fn request_scan(self: &Rc<Self>) {
        let decision = {
            let mut state = self.state.borrow_mut();
            if state.phase != Phase::Running {
                return;
            }
            state.throttle.request(Instant::now())
        };
        match decision {
            ScanDecision::RunNow => self.scan(),
            ScanDecision::ScheduleIn(delay) => {
                let inner = Rc::clone(self);
                let handle = spawn_local(async move {
                    sleep(delay).await;
                    inner.state.borrow_mut().throttle.trailing_started(Instant::now());
                    inner.scan();
                });
                self.state.borrow_mut().tasks.track(handle);
            }
            ScanDecision::Coalesced => trace!("scan request coalesced"),
        }
    }

    /// Register every unseen card element with the visibility scheduler, then admit the
    /// visible ones. Idempotent: registered elements and overlay content are skipped.
    pub(super) fn scan(self: &Rc<Self>) {
        {
            let doc = self.doc.borrow();
            let mut state = self.state.borrow_mut();
            if state.phase != Phase::Running {
                return;
            }
            let root = doc.root();
            let mut registered = 0_usize;
            for (index, descriptor) in self.table.iter() {
                for node in doc.query_selector_all(root, &descriptor.match_pattern) {
                    if !is_in_overlay(&doc, node) && state.registry.observe(node, index) {
                        registered = registered.saturating_add(1);
                    }
                }
            }
            state.counters.scans = state.counters.scans.saturating_add(1);
            debug!(
                "scan #{} registered {registered} new card elements ({} tracked)",
                state.counters.scans,
                state.registry.len()
            );
        }
        self.check_visibility();
    }

    /// Admit observed elements near the viewport, or park them while the user is inactive.
    pub(super) fn check_visibility(self: &Rc<Self>) {
        let admitted = {
            let doc = self.doc.borrow();
            let mut state = self.state.borrow_mut();
            if state.phase != Phase::Running {
                return;
            }
            let candidates = state.registry.observing();
            let visible = visible_elements(&doc, &candidates, self.config.viewport_margin_px);
            if visible.is_empty() {
                return;
            }
            if !state.activity.is_active(Instant::now()) {
                for node in visible {
                    if state.registry.queue(node) {
                        state.pending.insert(node);
                        state.counters.queued_while_inactive =
                            state.counters.queued_while_inactive.saturating_add(1);
                    }
                }
                trace!("{} cards parked while inactive", state.pending.len());
                return;
            }
            visible
        };
        self.process_batch(admitted);
    }

    /// Flush the elements parked while inactive, then rescan for anything missed.
    pub(super) fn resume(self: &Rc<Self>) {
        let parked: Vec<NodeId> = {
            let mut state = self.state.borrow_mut();
            state.pending.drain(..).collect()
        };
        debug!("activity resumed with {} parked cards", parked.len());
        if !parked.is_empty() {
            self.process_batch(parked);
        }
        self.request_scan();
    }

    /// Claim every element synchronously, then resolve them all concurrently.
    pub(super) fn process_batch(self: &Rc<Self>, nodes: Vec<NodeId>) {
        let jobs: Vec<Job> = {
            let doc = self.doc.borrow();
            let mut state = self.state.borrow_mut();
            let now = Instant::now();
            let mut jobs = Vec::with_capacity(nodes.len());
            for node in nodes {
                let Some(index) = state.registry.descriptor(node) else {
                    continue;
                };
                let Some(descriptor) = self.table.get(index) else {
                    continue;
                };
                if !doc.is_connected(node) {
                    state.registry.forget(node);
                    continue;
                }
                if !matches!(
                    state.registry.state(node),
                    Some(CardState::Observing | CardState::Queued)
                ) {
                    continue;
                }
                let extraction = extract(&doc, node, descriptor, &state.page_url);
                if descriptor.fingerprint_guard
                    && state.context == PageContext::Disassembly
                    && let Extraction::Image { raw, .. } = &extraction
                    && let Some(key) = image_fingerprint(raw)
                    && !state.guard.try_claim(&key, node, now)
                {
                    trace!("fingerprint {key} is busy, {node:?} returns to unseen");
                    state.registry.forget(node);
                    continue;
                }
                let Some(ticket) = state.registry.begin_resolving(node) else {
                    continue;
                };
                jobs.push(Job {
                    node,
                    ticket,
                    descriptor: index,
                    extraction,
                });
            }
            jobs
        };
        if jobs.is_empty() {
            return;
        }
        trace!("resolving a batch of {} cards", jobs.len());
        let inner = Rc::clone(self);
        let handle = spawn_local(async move {
            join_all(jobs.into_iter().map(|job| inner.process_card(job))).await;
        });
        self.state.borrow_mut().tasks.track(handle);
    }

    /// Resolve one claimed card and hand it to the overlay manager.
    async fn process_card(self: &Rc<Self>, job: Job) {
        let id = match self.resolver.card_id(&job.extraction).await {
            Ok(Some(id)) => id,
            Ok(None) => return self.reject(&job, Rejection::NoId),
            Err(err) => {
                warn!("id lookup failed for {:?}: {err}", job.node);
                return self.reject(&job, Rejection::LookupFailed);
            }
        };
        if !self.state.borrow().registry.holds(job.node, job.ticket) {
            self.discard(&job, "claim lost before stats lookup");
            return;
        }
        let stats = match self.resolver.stats(id).await {
            Ok(Some(stats)) => stats,
            Ok(None) => return self.reject(&job, Rejection::NoStats),
            Err(err) => {
                warn!("stats lookup failed for card {id}: {err}");
                return self.reject(&job, Rejection::LookupFailed);
            }
        };
        self.install(&job, id, stats);
    }

    fn reject(&self, job: &Job, reason: Rejection) {
        let mut doc = self.doc.borrow_mut();
        let mut state = self.state.borrow_mut();
        if !state.registry.mark_rejected(job.node, job.ticket) {
            drop(state);
            drop(doc);
            self.discard(job, "claim lost before rejection");
            return;
        }
        state.counters.rejected = state.counters.rejected.saturating_add(1);
        // A card that lost its stats must not keep showing the old ones.
        if reason == Rejection::NoStats && state.manager.is_stale(job.node) {
            state.manager.release(&mut doc, job.node);
        }
        trace!("rejected {:?}: {reason:?}", job.node);
    }

    /// Drop a finished attempt without touching the document.
    fn discard(&self, job: &Job, why: &str) {
        let mut state = self.state.borrow_mut();
        state.counters.discarded_races = state.counters.discarded_races.saturating_add(1);
        trace!("discarded result for {:?}: {why}", job.node);
    }

    /// Insert the overlay if the element is still attached, still claimed by this attempt,
    /// and has no live overlay at the insertion position.
    fn install(self: &Rc<Self>, job: &Job, id: CardId, stats: CardStats) {
        let poll_width = {
            let mut doc = self.doc.borrow_mut();
            let mut state = self.state.borrow_mut();
            if state.phase != Phase::Running {
                return;
            }
            if !doc.is_connected(job.node) {
                if state.registry.holds(job.node, job.ticket) {
                    state.registry.forget(job.node);
                }
                drop(state);
                drop(doc);
                self.discard(job, "element left the document");
                return;
            }
            if !state.registry.holds(job.node, job.ticket) {
                drop(state);
                drop(doc);
                self.discard(job, "claim lost");
                return;
            }
            let Some(descriptor) = self.table.get(job.descriptor) else {
                return;
            };
            let Some(target) = descriptor.target(&doc, job.node) else {
                drop(doc);
                drop(state);
                return self.reject(job, Rejection::NoTarget);
            };
            if let Some(existing) =
                OverlayManager::existing_at(&doc, target, descriptor.insertion_mode)
            {
                match state.manager.stale_owner(existing) {
                    Some(owner) if owner != job.node => {
                        state.manager.release(&mut doc, owner);
                    }
                    Some(_) => {}
                    None => {
                        state.registry.mark_rejected(job.node, job.ticket);
                        drop(state);
                        drop(doc);
                        self.discard(job, "an overlay already sits at the insertion point");
                        return;
                    }
                }
            }
            if !state.manager.has_capacity(job.node) {
                debug!("overlay cap reached, {:?} stays without stats", job.node);
                drop(doc);
                drop(state);
                return self.reject(job, Rejection::Capped);
            }
            let title = descriptor
                .name_attribute
                .and_then(|attribute| doc.attribute(job.node, attribute))
                .map(str::to_owned);
            let built = state
                .manager
                .build(&mut doc, id, stats, title.as_deref());
            let overlay = match built {
                Ok(overlay) => overlay,
                Err(err) => {
                    warn!("could not build overlay for card {id}: {err}");
                    drop(doc);
                    drop(state);
                    return self.reject(job, Rejection::NoTarget);
                }
            };
            let record = OverlayRecord {
                overlay,
                card_id: id,
                stats,
                layout_context: LayoutContext::resolve(state.context, descriptor.carousel),
                layout: None,
                stale: false,
            };
            if let Err(err) = state.manager.insert(
                &mut doc,
                job.node,
                target,
                descriptor.insertion_mode,
                record,
            ) {
                warn!("could not insert overlay for card {id}: {err}");
                drop(doc);
                drop(state);
                return self.reject(job, Rejection::NoTarget);
            }
            state.registry.mark_overlaid(job.node, job.ticket, overlay);
            state.manager.measure(&mut doc, job.node) == Measurement::ZeroWidth
        };
        if poll_width {
            self.poll_width(job.node);
        }
    }

    /// Re-measure a freshly inserted overlay until its container reports a width.
    fn poll_width(self: &Rc<Self>, owner: NodeId) {
        let inner = Rc::clone(self);
        let handle = spawn_local(async move {
            for _ in 0..inner.config.width_poll_attempts {
                sleep(inner.config.width_poll()).await;
                if inner.measure(owner) != Measurement::ZeroWidth {
                    return;
                }
            }
            debug!("container of {owner:?} never reported a width");
            let mut doc = inner.doc.borrow_mut();
            inner
                .state
                .borrow_mut()
                .manager
                .force_layout(&mut doc, owner, OverlayLayout::Vertical);
        });
        self.state.borrow_mut().tasks.track(handle);
    }

    pub(super) fn measure(&self, owner: NodeId) -> Measurement {
        let mut doc = self.doc.borrow_mut();
        self.state.borrow_mut().manager.measure(&mut doc, owner)
    }
}
