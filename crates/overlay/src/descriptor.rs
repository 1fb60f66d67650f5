//! Declarative card layout descriptors.
//!
//! Each supported host layout is one row of a table. A single generic routine matches,
//! extracts and inserts for every row, so supporting a new layout means adding a row.

use crate::context::PageContext;
use card_selectors::SelectorList;
use dom::{Document, NodeId};

/// How a card id is obtained from a matched element.
#[derive(Debug, Clone)]
pub enum IdExtraction {
    /// Read `attribute` from the element, or from the first descendant matching
    /// `wrapper_child` when the element wraps the actual card.
    DirectAttribute {
        attribute: &'static str,
        wrapper_child: Option<SelectorList>,
    },
    /// Read query parameter `parameter` from the URL stored in `attribute`.
    UrlEmbeddedId {
        attribute: &'static str,
        parameter: &'static str,
    },
    /// Look the id up by the `src` of the first element matching `image`.
    ImageFingerprint { image: SelectorList },
}

impl IdExtraction {
    /// Fingerprint extraction always needs an asynchronous lookup.
    pub const fn is_async(&self) -> bool {
        matches!(self, Self::ImageFingerprint { .. })
    }
}

/// Node the overlay is positioned relative to.
#[derive(Debug, Clone)]
pub enum InsertionTarget {
    Element,
    Closest(SelectorList),
    Descendant(SelectorList),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertionMode {
    Append,
    Prepend,
    Before,
    After,
}

/// One supported card layout.
#[derive(Debug, Clone)]
pub struct CardDescriptor {
    pub name: &'static str,
    pub match_pattern: SelectorList,
    pub id_extraction: IdExtraction,
    pub name_attribute: Option<&'static str>,
    pub insertion_target: InsertionTarget,
    pub insertion_mode: InsertionMode,
    pub carousel: bool,
    pub fingerprint_guard: bool,
    /// Page context the layout belongs to; `None` for layouts found on any page.
    pub context: Option<PageContext>,
}

impl CardDescriptor {
    fn new(name: &'static str, pattern: &str, id_extraction: IdExtraction) -> Self {
        Self {
            name,
            match_pattern: SelectorList::parse(pattern),
            id_extraction,
            name_attribute: None,
            insertion_target: InsertionTarget::Element,
            insertion_mode: InsertionMode::Append,
            carousel: false,
            fingerprint_guard: false,
            context: None,
        }
    }

    fn direct(attribute: &'static str) -> IdExtraction {
        IdExtraction::DirectAttribute {
            attribute,
            wrapper_child: None,
        }
    }

    fn image(selector: &str) -> IdExtraction {
        IdExtraction::ImageFingerprint {
            image: SelectorList::parse(selector),
        }
    }

    #[must_use]
    fn named(mut self, attribute: &'static str) -> Self {
        self.name_attribute = Some(attribute);
        self
    }

    #[must_use]
    fn inserted(mut self, target: InsertionTarget, mode: InsertionMode) -> Self {
        self.insertion_target = target;
        self.insertion_mode = mode;
        self
    }

    #[must_use]
    fn only_in(mut self, context: PageContext) -> Self {
        self.context = Some(context);
        self
    }

    /// True when elements of this layout are cards on a page of `context`.
    pub fn relevant_in(&self, context: PageContext) -> bool {
        self.context.is_none_or(|only| only == context)
    }

    /// Resolve the node the overlay is inserted relative to.
    pub fn target(&self, doc: &Document, element: NodeId) -> Option<NodeId> {
        match &self.insertion_target {
            InsertionTarget::Element => Some(element),
            InsertionTarget::Closest(selector) => doc.closest(element, selector),
            InsertionTarget::Descendant(selector) => doc.query_selector(element, selector),
        }
    }
}

/// The descriptor table for the host site's layouts.
pub fn builtin_descriptors() -> Vec<CardDescriptor> {
    vec![
        CardDescriptor::new(
            "catalog-card",
            ".card-item[data-card-id]",
            CardDescriptor::direct("data-card-id"),
        )
        .named("data-card-name"),
        CardDescriptor::new(
            "trade-card",
            ".trade__item",
            IdExtraction::DirectAttribute {
                attribute: "data-card-id",
                wrapper_child: Some(SelectorList::parse(".trade__item-card")),
            },
        )
        .only_in(PageContext::Trade),
        CardDescriptor::new(
            "inventory-card",
            ".inventory__card[data-id]",
            CardDescriptor::direct("data-id"),
        )
        .inserted(
            InsertionTarget::Closest(SelectorList::parse(".inventory__cell")),
            InsertionMode::Prepend,
        ),
        CardDescriptor::new(
            "card-link",
            r#"a.card-link[href*="card_id="]"#,
            IdExtraction::UrlEmbeddedId {
                attribute: "href",
                parameter: "card_id",
            },
        )
        .inserted(InsertionTarget::Element, InsertionMode::After),
        CardDescriptor::new("lootbox-card", ".lootbox__card", CardDescriptor::image("img"))
            .named("data-name")
            .only_in(PageContext::Lootbox),
        CardDescriptor {
            fingerprint_guard: true,
            ..CardDescriptor::new(
                "melt-card",
                ".melt__card",
                CardDescriptor::image("img.melt__card-image"),
            )
            .only_in(PageContext::Disassembly)
        },
        CardDescriptor {
            carousel: true,
            ..CardDescriptor::new(
                "carousel-card",
                ".carousel__slide[data-card-id]",
                CardDescriptor::direct("data-card-id"),
            )
        },
    ]
}

/// Descriptor table with the lookups shared by the scanner and the mutation watcher.
#[derive(Debug, Clone)]
pub struct DescriptorTable {
    descriptors: Vec<CardDescriptor>,
}

impl DescriptorTable {
    pub const fn new(descriptors: Vec<CardDescriptor>) -> Self {
        Self { descriptors }
    }

    pub fn builtin() -> Self {
        Self::new(builtin_descriptors())
    }

    pub fn get(&self, index: usize) -> Option<&CardDescriptor> {
        self.descriptors.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &CardDescriptor)> {
        self.descriptors.iter().enumerate()
    }

    /// Index of the first descriptor matching `node`.
    pub fn match_node(&self, doc: &Document, node: NodeId) -> Option<usize> {
        self.descriptors
            .iter()
            .position(|descriptor| doc.matches(node, &descriptor.match_pattern))
    }

    /// Nearest card element among `node` and its ancestors up to `depth` levels up.
    pub fn card_within(&self, doc: &Document, node: NodeId, depth: usize) -> Option<NodeId> {
        doc.ancestors(node)
            .into_iter()
            .take(depth.saturating_add(1))
            .find(|&candidate| self.match_node(doc, candidate).is_some())
    }

    /// Like [`Self::card_within`], but only cards whose layout belongs on a `context` page.
    pub fn relevant_card_within(
        &self,
        doc: &Document,
        node: NodeId,
        depth: usize,
        context: PageContext,
    ) -> Option<NodeId> {
        doc.ancestors(node)
            .into_iter()
            .take(depth.saturating_add(1))
            .find(|&candidate| {
                self.descriptors.iter().any(|descriptor| {
                    descriptor.relevant_in(context) && doc.matches(candidate, &descriptor.match_pattern)
                })
            })
    }

    /// True when any descriptor matches a node strictly inside `node`.
    pub fn has_card_descendant(&self, doc: &Document, node: NodeId) -> bool {
        self.descriptors
            .iter()
            .any(|descriptor| doc.query_selector(node, &descriptor.match_pattern).is_some())
    }
}
