//! Host document model for the card overlay engine.
//!
//! A [`Document`] is an indextree arena of element, text and comment nodes plus the parts of
//! the browser surface a content script observes: element geometry, the viewport, tab
//! visibility, and user input. Every tree or attribute change on a connected node produces a
//! [`MutationRecord`]; records and other page events are delivered to subscribers as
//! [`DomEvent`] values over unbounded channels, the way DOM update batches are mirrored to
//! their subscribers.

mod document;
mod error;
mod geometry;
mod mutation;
mod node;
mod parser;
mod query;

pub use document::{Document, SharedDocument, Subscription, SubscriptionId};
pub use error::DomError;
pub use geometry::Rect;
pub use indextree::NodeId;
pub use mutation::{DomEvent, InteractionKind, MutationRecord};
pub use node::{ElementData, NodeData};
pub use parser::{parse_document, parse_fragment_into};
