//! The overlay engine: wires the document, the data service and the components together.
//!
//! All engine state lives behind one `RefCell` on a single thread. Work is driven by tasks
//! spawned on the current `LocalSet`: the document event loop, the dataset listener, the
//! sweep timer, and short-lived timers for scans, mutation dispatch and rebuilds. No borrow
//! of the document or the state is held across an `.await`.

mod events;
mod lifecycle;
mod pipeline;

use crate::config::OverlayConfig;
use crate::context::PageContext;
use crate::descriptor::DescriptorTable;
use crate::manager::{OverlayManager, OverlayRecord};
use crate::navigation::NavigationCoordinator;
use crate::registry::{CardRegistry, CardState, FingerprintGuard};
use crate::resolver::Resolver;
use crate::scheduler::{ActivityGate, ScanThrottle};
use crate::service::CardDataService;
use crate::telemetry::EngineCounters;
use crate::watcher::MutationWatcher;
use core::cell::RefCell;
use dom::{NodeId, SharedDocument, SubscriptionId};
use indexmap::IndexSet;
use std::rc::Rc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Running,
    TornDown,
}

/// Handles of every task the engine spawned, so teardown can abort them.
#[derive(Debug, Default)]
struct Tasks {
    listeners: Vec<JoinHandle<()>>,
    dispatch: Option<JoinHandle<()>>,
    settle: Option<JoinHandle<()>>,
    transient: Vec<JoinHandle<()>>,
}

impl Tasks {
    fn track(&mut self, handle: JoinHandle<()>) {
        self.transient.retain(|task| !task.is_finished());
        self.transient.push(handle);
    }

    fn abort_all(&mut self) {
        let slots = self.dispatch.take().into_iter().chain(self.settle.take());
        for task in self
            .listeners
            .drain(..)
            .chain(slots)
            .chain(self.transient.drain(..))
        {
            task.abort();
        }
    }
}

struct State {
    phase: Phase,
    context: PageContext,
    page_url: Url,
    registry: CardRegistry,
    /// Visible elements parked while the user is inactive, in admission order.
    pending: IndexSet<NodeId>,
    guard: FingerprintGuard,
    manager: OverlayManager,
    throttle: ScanThrottle,
    activity: ActivityGate,
    watcher: MutationWatcher,
    navigation: NavigationCoordinator,
    counters: EngineCounters,
    subscription: Option<SubscriptionId>,
    tasks: Tasks,
}

impl State {
    /// Forget a card and release its overlay.
    fn forget_card(&mut self, doc: &mut dom::Document, node: NodeId) {
        self.registry.forget(node);
        self.pending.shift_remove(&node);
        self.manager.release(doc, node);
    }

    /// Forget every card, park nothing, keep overlays.
    fn clear_cards(&mut self) {
        self.registry.clear();
        self.pending.clear();
    }
}

struct Inner {
    doc: SharedDocument,
    config: OverlayConfig,
    table: DescriptorTable,
    resolver: Resolver,
    state: RefCell<State>,
}

/// The card overlay engine attached to one document.
///
/// Cloning yields another handle to the same engine.
#[derive(Clone)]
pub struct Engine {
    inner: Rc<Inner>,
}

impl Engine {
    /// Create an engine for `doc` using the built-in descriptor table.
    pub fn new(
        doc: SharedDocument,
        service: Rc<dyn CardDataService>,
        config: OverlayConfig,
    ) -> Self {
        Self::with_descriptors(doc, service, config, DescriptorTable::builtin())
    }

    /// Create an engine with a custom descriptor table.
    pub fn with_descriptors(
        doc: SharedDocument,
        service: Rc<dyn CardDataService>,
        config: OverlayConfig,
        table: DescriptorTable,
    ) -> Self {
        let (page_url, hidden) = {
            let doc = doc.borrow();
            (doc.url().clone(), doc.is_hidden())
        };
        let context = PageContext::from_url(&page_url);
        let report_base = config
            .report_base
            .clone()
            .unwrap_or_else(|| origin_of(&page_url));
        let state = State {
            phase: Phase::Idle,
            context,
            registry: CardRegistry::default(),
            pending: IndexSet::new(),
            guard: FingerprintGuard::new(config.fingerprint_window()),
            manager: OverlayManager::new(config.max_overlays, context.is_unlimited(), report_base),
            throttle: ScanThrottle::new(config.scan_spacing()),
            activity: ActivityGate::new(config.inactivity(), Instant::now(), hidden),
            watcher: MutationWatcher::new(config.ancestor_depth),
            navigation: NavigationCoordinator::new(context),
            counters: EngineCounters::default(),
            subscription: None,
            tasks: Tasks::default(),
            page_url,
        };
        Self {
            inner: Rc::new(Inner {
                doc,
                config,
                table,
                resolver: Resolver::new(service),
                state: RefCell::new(state),
            }),
        }
    }

    pub fn page_context(&self) -> PageContext {
        self.inner.state.borrow().context
    }

    /// Current state of a card element; `None` when unseen.
    pub fn card_state(&self, node: NodeId) -> Option<CardState> {
        self.inner.state.borrow().registry.state(node)
    }

    /// Overlays currently owned by the engine, oldest first.
    pub fn overlays(&self) -> Vec<(NodeId, OverlayRecord)> {
        self.inner
            .state
            .borrow()
            .manager
            .records()
            .map(|(owner, record)| (owner, record.clone()))
            .collect()
    }

    /// Counter snapshot.
    pub fn counters(&self) -> EngineCounters {
        let state = self.inner.state.borrow();
        EngineCounters {
            lookups: self.inner.resolver.lookups(),
            overlays_inserted: state.manager.inserted(),
            overlays_removed: state.manager.removed(),
            overlays_live: state.manager.len() as u64,
            scans_coalesced: state.throttle.coalesced(),
            ..state.counters
        }
    }

    pub fn is_running(&self) -> bool {
        self.inner.state.borrow().phase == Phase::Running
    }

    /// Request a full scan, subject to the scan throttle.
    pub fn request_scan(&self) {
        self.inner.request_scan();
    }
}

/// Origin of a page URL as a base for report links.
fn origin_of(url: &Url) -> Url {
    let mut base = url.clone();
    base.set_path("/");
    base.set_query(None);
    base.set_fragment(None);
    base
}
