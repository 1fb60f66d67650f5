//! Document events, dataset updates, mutation dispatch and navigation rebuilds.

use super::{Inner, Phase};
use crate::context::PageContext;
use crate::navigation::TriggerDecision;
use crate::registry::CardState;
use crate::service::DatasetUpdated;
use crate::watcher::{DispatchPlan, Reset};
use core::time::Duration;
use dom::{DomEvent, MutationRecord, NodeId};
use log::{debug, info, trace, warn};
use std::rc::Rc;
use tokio::sync::broadcast::Receiver;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::spawn_local;
use tokio::time::{Instant, sleep, timeout};

impl Inner {
    /// Drain document events until the subscription closes.
    pub(super) async fn event_loop(self: Rc<Self>, mut events: UnboundedReceiver<DomEvent>) {
        while let Some(event) = events.recv().await {
            if self.is_torn_down() {
                break;
            }
            self.handle_event(event);
        }
        trace!("document event loop finished");
    }

    /// React to dataset replacements until the service stops broadcasting.
    pub(super) async fn dataset_loop(self: Rc<Self>, mut updates: Receiver<DatasetUpdated>) {
        loop {
            match updates.recv().await {
                Ok(update) => self.on_dataset_updated(Some(update)),
                Err(RecvError::Lagged(skipped)) => {
                    debug!("missed {skipped} dataset notifications");
                    self.on_dataset_updated(None);
                }
                Err(RecvError::Closed) => break,
            }
        }
    }

    fn handle_event(self: &Rc<Self>, event: DomEvent) {
        match event {
            DomEvent::Mutations(records) => self.on_mutations(&records),
            DomEvent::Resized(node) => {
                let owners = {
                    let doc = self.doc.borrow();
                    self.state.borrow().manager.owners_resized(&doc, node)
                };
                for owner in owners {
                    self.measure(owner);
                }
                self.check_visibility();
            }
            DomEvent::Scrolled => {
                self.note_interaction();
                self.check_visibility();
            }
            DomEvent::Click { target } => {
                self.note_interaction();
                self.on_click(target);
            }
            DomEvent::Interaction(_) => self.note_interaction(),
            DomEvent::VisibilityChanged { hidden } => {
                let woke = self
                    .state
                    .borrow_mut()
                    .activity
                    .set_hidden(hidden, Instant::now());
                if woke {
                    self.resume();
                }
            }
        }
    }

    /// Clicks and scrolls count as activity just like pointer and key input.
    fn note_interaction(self: &Rc<Self>) {
        let woke = self.state.borrow_mut().activity.interact(Instant::now());
        if woke {
            self.resume();
        }
    }

    fn on_mutations(self: &Rc<Self>, records: &[MutationRecord]) {
        let plan = {
            let mut doc = self.doc.borrow_mut();
            let mut state = self.state.borrow_mut();
            if state.phase != Phase::Running {
                return;
            }
            let outcome = state
                .watcher
                .classify(&doc, &self.table, state.context, records);
            state.counters.self_mutations_ignored = state
                .counters
                .self_mutations_ignored
                .saturating_add(outcome.ignored as u64);

            for container in &outcome.removed_containers {
                let inside: Vec<NodeId> = state
                    .registry
                    .nodes()
                    .into_iter()
                    .filter(|&node| node != *container && doc.contains(*container, node))
                    .collect();
                if !inside.is_empty() {
                    trace!("container {container:?} left with {} cards", inside.len());
                }
                for node in inside {
                    state.forget_card(&mut doc, node);
                }
            }
            for &(card, reset) in &outcome.resets {
                let overlaid = matches!(state.registry.state(card), Some(CardState::Overlaid { .. }));
                match reset {
                    Reset::Full => state.forget_card(&mut doc, card),
                    Reset::UnlessOverlaid if !overlaid => {
                        state.registry.forget(card);
                        state.pending.shift_remove(&card);
                    }
                    Reset::UnlessOverlaid => {}
                }
            }
            if !outcome.is_actionable() {
                return;
            }
            state.watcher.plan(outcome.bulk)
        };
        match plan {
            DispatchPlan::Schedule { bulk } => self.schedule_dispatch(bulk),
            DispatchPlan::Upgrade => {
                debug!("bulk container arrived, upgrading pending dispatch");
                self.schedule_dispatch(true);
            }
            DispatchPlan::Coalesce => trace!("mutation batch folded into pending dispatch"),
        }
    }

    /// Start (or restart) the dispatch timer.
    fn schedule_dispatch(self: &Rc<Self>, bulk: bool) {
        let delay = self.config.dispatch_delay(bulk);
        let inner = Rc::clone(self);
        let handle = spawn_local(async move {
            sleep(delay).await;
            inner.fire_dispatch();
        });
        if let Some(previous) = self.state.borrow_mut().tasks.dispatch.replace(handle) {
            previous.abort();
        }
    }

    fn fire_dispatch(self: &Rc<Self>) {
        {
            let mut doc = self.doc.borrow_mut();
            let mut state = self.state.borrow_mut();
            let Some(bulk) = state.watcher.fire() else {
                return;
            };
            state.counters.mutation_dispatches = state.counters.mutation_dispatches.saturating_add(1);
            if bulk {
                state.clear_cards();
                let removed = state.manager.remove_all(&mut doc);
                debug!("bulk update: cleared all cards and {removed} overlays");
            }
        }
        self.request_scan();
    }

    fn on_dataset_updated(self: &Rc<Self>, update: Option<DatasetUpdated>) {
        {
            let mut state = self.state.borrow_mut();
            if state.phase != Phase::Running {
                return;
            }
            state.counters.dataset_updates = state.counters.dataset_updates.saturating_add(1);
            state.clear_cards();
            let stale = state.manager.mark_stale();
            info!(
                "dataset updated to {}, {stale} overlays are stale",
                update.map_or_else(
                    || String::from("an unknown version"),
                    |known| format!("v{}", known.version)
                )
            );
        }
        self.resolver.invalidate_stats();
        let inner = Rc::clone(self);
        let settle = self.config.dataset_settle();
        let handle = spawn_local(async move {
            sleep(settle).await;
            inner.request_scan();
        });
        if let Some(previous) = self.state.borrow_mut().tasks.settle.replace(handle) {
            previous.abort();
        }
    }

    fn on_click(self: &Rc<Self>, target: NodeId) {
        let decision = {
            let doc = self.doc.borrow();
            let mut state = self.state.borrow_mut();
            if state.phase != Phase::Running {
                return;
            }
            let Some(delay) = state.navigation.match_click(&doc, target) else {
                return;
            };
            state.navigation.trigger(delay)
        };
        match decision {
            TriggerDecision::Start(delay) => self.spawn_rebuild(delay, Duration::ZERO),
            TriggerDecision::Queued => debug!("navigation rebuild in flight, trigger queued"),
        }
    }

    /// Run one rebuild under the watchdog, then the queued one if any.
    fn spawn_rebuild(self: &Rc<Self>, delay: Duration, backoff: Duration) {
        let inner = Rc::clone(self);
        let handle = spawn_local(async move {
            if !backoff.is_zero() {
                sleep(backoff).await;
            }
            if timeout(inner.config.rebuild_watchdog(), inner.rebuild(delay))
                .await
                .is_err()
            {
                warn!("navigation rebuild exceeded its watchdog, forcing it clear");
                let mut state = inner.state.borrow_mut();
                state.counters.rebuild_timeouts = state.counters.rebuild_timeouts.saturating_add(1);
            }
            let queued = inner.state.borrow_mut().navigation.complete();
            if let Some(next) = queued {
                inner.spawn_rebuild(next, inner.config.rebuild_backoff());
            }
        });
        self.state.borrow_mut().tasks.track(handle);
    }

    /// Wait for the host to replace its content, then drop all cards and overlays and rescan.
    async fn rebuild(self: &Rc<Self>, delay: Duration) {
        sleep(delay).await;
        {
            let mut doc = self.doc.borrow_mut();
            let mut state = self.state.borrow_mut();
            if state.phase != Phase::Running {
                return;
            }
            state.counters.rebuilds = state.counters.rebuilds.saturating_add(1);
            state.clear_cards();
            let removed = state.manager.remove_all(&mut doc);
            if state.context == PageContext::Disassembly {
                state.guard.clear();
            }
            debug!("navigation rebuild removed {removed} overlays");
        }
        self.request_scan();
    }
}
