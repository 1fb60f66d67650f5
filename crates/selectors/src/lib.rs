//! Structural selectors for matching host-page card markup.
//!
//! This crate implements the subset of CSS selector syntax that card layout descriptors and
//! navigation triggers are written in:
//! - Type, class, id and universal selectors
//! - Attribute presence and `=`, `~=`, `^=`, `$=`, `*=` value operators
//! - Combinators: descendant, child, adjacent sibling, general sibling
//! - Comma-separated selector lists
//!
//! Matching is right-to-left over any DOM that implements [`ElementAdapter`].

mod matcher;
mod parser;

pub use matcher::{matches_complex, matches_compound, matches_selector_list};
pub use parser::{parse_complex_selector, parse_selector_list};

/// An adapter that abstracts DOM access for selector matching.
/// Implement this for your DOM layer.
pub trait ElementAdapter {
    type Handle: Copy + Eq;

    /// Parent element if any. Document and non-element parents yield `None`.
    fn parent(&self, element: Self::Handle) -> Option<Self::Handle>;

    /// Previous sibling element, skipping text and comment nodes.
    fn previous_sibling_element(&self, element: Self::Handle) -> Option<Self::Handle>;

    /// Tag name in ASCII lowercase.
    fn tag_name(&self, element: Self::Handle) -> &str;

    /// Returns Some(id) if the element has an id attribute, else None.
    fn element_id(&self, element: Self::Handle) -> Option<&str>;

    /// True if the element has the given class token (compared ASCII case-insensitively).
    fn has_class(&self, element: Self::Handle, class: &str) -> bool;

    /// Returns the attribute value if present.
    fn attr(&self, element: Self::Handle, name: &str) -> Option<&str>;
}

/// Value comparison of an attribute selector.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AttrOperator {
    /// `[name=value]`
    Equals,
    /// `[name~=value]`, whitespace-separated word match
    Includes,
    /// `[name^=value]`
    Prefix,
    /// `[name$=value]`
    Suffix,
    /// `[name*=value]`
    Contains,
}

impl AttrOperator {
    /// Apply the operator to an attribute value.
    #[must_use]
    pub fn test(self, actual: &str, expected: &str) -> bool {
        match self {
            Self::Equals => actual == expected,
            Self::Includes => actual.split_ascii_whitespace().any(|word| word == expected),
            Self::Prefix => !expected.is_empty() && actual.starts_with(expected),
            Self::Suffix => !expected.is_empty() && actual.ends_with(expected),
            Self::Contains => !expected.is_empty() && actual.contains(expected),
        }
    }
}

/// Simple selectors (subset).
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum SimpleSelector {
    Type(String),
    Class(String),
    IdSelector(String),
    /// `[name]`
    AttrExists(String),
    /// `[name<op>value]`
    AttrMatch {
        name: String,
        operator: AttrOperator,
        value: String,
    },
    /// Universal selector '*'.
    Universal,
}

/// A compound selector is a sequence of simple selectors (no combinators).
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct CompoundSelector {
    pub simples: Vec<SimpleSelector>,
}

/// Combinators between compounds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Combinator {
    Descendant,
    Child,
    AdjacentSibling,
    GeneralSibling,
}

/// A complex selector is one or more compounds separated by combinators.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct ComplexSelector {
    pub first: CompoundSelector,
    pub rest: Vec<(Combinator, CompoundSelector)>,
}

/// A selector list separated by commas.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct SelectorList {
    pub selectors: Vec<ComplexSelector>,
}

impl SelectorList {
    /// Parse a comma-separated selector list. Empty parts are dropped.
    #[must_use]
    pub fn parse(input: &str) -> Self {
        parse_selector_list(input)
    }

    /// True when the list holds no selector at all; such a list never matches.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.selectors.is_empty()
    }

    /// Match the list against one element.
    pub fn matches<A: ElementAdapter>(&self, adapter: &A, element: A::Handle) -> bool {
        matches_selector_list(adapter, element, self)
    }
}
