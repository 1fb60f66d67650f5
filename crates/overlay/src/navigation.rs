//! Navigation triggers handled by the host page through partial content replacement.

use crate::context::PageContext;
use crate::manager::is_in_overlay;
use card_selectors::SelectorList;
use core::time::Duration;
use dom::{Document, NodeId};

const PAGINATION: &str = ".pagination__button";

/// A clickable control that replaces the card list, and how long the host takes to do it.
#[derive(Debug, Clone)]
pub struct Trigger {
    pub selector: SelectorList,
    pub delay: Duration,
}

impl Trigger {
    fn new(selector: &str, delay_ms: u64) -> Self {
        Self {
            selector: SelectorList::parse(selector),
            delay: Duration::from_millis(delay_ms),
        }
    }
}

/// The trigger table of a page context.
pub fn triggers_for(context: PageContext) -> Vec<Trigger> {
    match context {
        PageContext::Trade => vec![
            Trigger::new(PAGINATION, 300),
            Trigger::new(".trade__rank-filter, .trade__lock-filter, .trade__sort", 800),
        ],
        PageContext::Disassembly => vec![
            Trigger::new(PAGINATION, 300),
            Trigger::new(".melt__rank-filter, .melt__sort", 800),
        ],
        PageContext::Lootbox => vec![
            Trigger::new(".lootbox__next", 300),
            Trigger::new(".lootbox__open", 600),
        ],
        PageContext::Catalog | PageContext::Generic => vec![Trigger::new(PAGINATION, 300)],
    }
}

/// Result of a trigger click.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerDecision {
    /// Start a rebuild after the given post-trigger delay.
    Start(Duration),
    /// A rebuild is in flight; this one runs after it.
    Queued,
}

/// Single-flight coordinator for navigation rebuilds.
#[derive(Debug)]
pub struct NavigationCoordinator {
    triggers: Vec<Trigger>,
    in_flight: bool,
    /// Delay of the queued rebuild; several queued triggers fold into one.
    queued: Option<Duration>,
}

impl NavigationCoordinator {
    pub fn new(context: PageContext) -> Self {
        Self {
            triggers: triggers_for(context),
            in_flight: false,
            queued: None,
        }
    }

    /// Post-trigger delay of the trigger enclosing `target`, if any.
    ///
    /// Clicks inside overlays never count.
    pub fn match_click(&self, doc: &Document, target: NodeId) -> Option<Duration> {
        if is_in_overlay(doc, target) {
            return None;
        }
        self.triggers
            .iter()
            .find(|trigger| doc.closest(target, &trigger.selector).is_some())
            .map(|trigger| trigger.delay)
    }

    pub const fn is_in_flight(&self) -> bool {
        self.in_flight
    }

    pub const fn has_queued(&self) -> bool {
        self.queued.is_some()
    }

    /// Register a trigger firing.
    pub fn trigger(&mut self, delay: Duration) -> TriggerDecision {
        if self.in_flight {
            self.queued = Some(self.queued.map_or(delay, |queued| queued.max(delay)));
            TriggerDecision::Queued
        } else {
            self.in_flight = true;
            TriggerDecision::Start(delay)
        }
    }

    /// The in-flight rebuild finished or timed out. Returns the queued rebuild's delay; the
    /// coordinator stays in flight for it.
    pub fn complete(&mut self) -> Option<Duration> {
        let queued = self.queued.take();
        self.in_flight = queued.is_some();
        queued
    }

    /// Drop all rebuild state (teardown).
    pub fn reset(&mut self) {
        self.in_flight = false;
        self.queued = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dom::parse_document;

    #[test]
    fn delegated_match_uses_closest() {
        let doc = parse_document(
            r#"<body><nav><button class="pagination__button"><span>2</span></button></nav>
               <div class="trade__sort"><i>v</i></div></body>"#,
            "https://cards.example/trades/3".parse().unwrap(),
        )
        .unwrap();
        let coordinator = NavigationCoordinator::new(PageContext::Trade);
        let span = doc.query_selector(doc.root(), &SelectorList::parse("span")).unwrap();
        let icon = doc.query_selector(doc.root(), &SelectorList::parse("i")).unwrap();
        assert_eq!(coordinator.match_click(&doc, span), Some(Duration::from_millis(300)));
        assert_eq!(coordinator.match_click(&doc, icon), Some(Duration::from_millis(800)));
        let nav = doc.query_selector(doc.root(), &SelectorList::parse("nav")).unwrap();
        assert_eq!(coordinator.match_click(&doc, nav), None);
    }

    #[test]
    fn single_flight_with_one_queued_rebuild() {
        let mut coordinator = NavigationCoordinator::new(PageContext::Catalog);
        let short = Duration::from_millis(300);
        assert_eq!(coordinator.trigger(short), TriggerDecision::Start(short));
        assert_eq!(coordinator.trigger(short), TriggerDecision::Queued);
        assert_eq!(coordinator.trigger(Duration::from_millis(800)), TriggerDecision::Queued);
        assert_eq!(coordinator.complete(), Some(Duration::from_millis(800)));
        assert!(coordinator.is_in_flight());
        assert_eq!(coordinator.complete(), None);
        assert!(!coordinator.is_in_flight());
    }
}
