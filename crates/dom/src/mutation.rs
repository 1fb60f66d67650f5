//! Mutation records and page events delivered to document subscribers.

use indextree::NodeId;

/// A change to the connected part of the tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationRecord {
    /// Children of `target` were inserted or removed.
    ChildList {
        target: NodeId,
        added: Vec<NodeId>,
        removed: Vec<NodeId>,
    },
    /// Attribute `name` of `target` changed; `old_value` is `None` when it was absent.
    Attributes {
        target: NodeId,
        name: String,
        old_value: Option<String>,
    },
}

impl MutationRecord {
    pub fn target(&self) -> NodeId {
        match self {
            Self::ChildList { target, .. } | Self::Attributes { target, .. } => *target,
        }
    }
}

/// Kind of user input that counts as activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InteractionKind {
    Pointer,
    Key,
    Touch,
    Wheel,
}

/// Everything a subscriber can observe on the page.
#[derive(Debug, Clone, PartialEq)]
pub enum DomEvent {
    /// A batch of mutation records, in the order they happened.
    Mutations(Vec<MutationRecord>),
    /// The layout box of an element changed.
    Resized(NodeId),
    /// The viewport moved or changed size.
    Scrolled,
    /// A click was dispatched at `target`; it bubbles to the document root.
    Click { target: NodeId },
    /// Pointer, key, touch or wheel input that is neither a click nor a scroll.
    Interaction(InteractionKind),
    /// The tab was hidden or shown.
    VisibilityChanged { hidden: bool },
}
