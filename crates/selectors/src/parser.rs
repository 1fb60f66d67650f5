//! Selector parsing.

use crate::{
    AttrOperator, Combinator, ComplexSelector, CompoundSelector, SelectorList, SimpleSelector,
};
use core::mem::take;
use log::debug;

/// Lexical unit of a descriptor selector.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Tok {
    /// `>`, `+` or `~`
    Combinator(Combinator),
    DescendantWS,
    /// Tag, class, id, attribute test or `*`
    Simple(SimpleSelector),
}

/// Byte cursor over selector text. Descendant whitespace is reported lazily.
pub struct SelectorTokenizer {
    input_bytes: Vec<u8>,
    index: usize,
    /// Set after whitespace that may still turn out to be a descendant combinator
    pending_whitespace: bool,
}

impl SelectorTokenizer {
    #[inline]
    pub(crate) fn new(input: &str) -> Self {
        Self {
            input_bytes: input.as_bytes().to_vec(),
            index: 0,
            pending_whitespace: false,
        }
    }

    #[inline]
    pub(crate) fn next(&mut self) -> Option<Tok> {
        if self.pending_whitespace {
            self.pending_whitespace = false;
            return Some(Tok::DescendantWS);
        }
        self.skip_whitespace_descendant();
        if self.pending_whitespace && self.index >= self.input_bytes.len() {
            // Trailing whitespace is not a combinator.
            self.pending_whitespace = false;
            return None;
        }
        if self.pending_whitespace {
            self.pending_whitespace = false;
            return Some(Tok::DescendantWS);
        }
        let &current = self.input_bytes.get(self.index)?;
        Some(match current {
            b'*' => {
                self.index = self.index.saturating_add(1);
                Tok::Simple(SimpleSelector::Universal)
            }
            b'.' => self.consume_class(),
            b'#' => self.consume_id(),
            b'[' => self.consume_attr(),
            b'>' => {
                self.index = self.index.saturating_add(1);
                Tok::Combinator(Combinator::Child)
            }
            b'+' => {
                self.index = self.index.saturating_add(1);
                Tok::Combinator(Combinator::AdjacentSibling)
            }
            b'~' => {
                self.index = self.index.saturating_add(1);
                Tok::Combinator(Combinator::GeneralSibling)
            }
            _ => self.consume_type(),
        })
    }

    /// Eat a whitespace run and remember it as a possible descendant step.
    #[inline]
    fn skip_whitespace_descendant(&mut self) {
        let mut saw = false;
        while let Some(&byte) = self.input_bytes.get(self.index) {
            if byte.is_ascii_whitespace() {
                saw = true;
                self.index = self.index.saturating_add(1);
            } else {
                break;
            }
        }
        if saw && self.index > 0 {
            self.pending_whitespace = true;
        }
    }

    /// Lowercased `[A-Za-z0-9_-]+` run.
    #[inline]
    fn consume_ident(&mut self) -> String {
        let start = self.index;
        while let Some(&byte) = self.input_bytes.get(self.index) {
            if byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_' {
                self.index = self.index.saturating_add(1);
            } else {
                break;
            }
        }
        let slice = self.input_bytes.get(start..self.index).unwrap_or(&[]);
        String::from_utf8_lossy(slice).to_ascii_lowercase()
    }

    /// Parse a type selector identifier into a `SimpleSelector::Type`.
    ///
    /// Unsupported syntax (pseudo-classes and the like) is skipped one byte at a time so that
    /// parsing always terminates.
    #[inline]
    fn consume_type(&mut self) -> Tok {
        let ident = self.consume_ident();
        if ident.is_empty() {
            self.index = self.index.saturating_add(1);
        }
        Tok::Simple(SimpleSelector::Type(ident))
    }

    #[inline]
    fn consume_class(&mut self) -> Tok {
        // skip '.'
        self.index = self.index.saturating_add(1);
        let ident = self.consume_ident();
        Tok::Simple(SimpleSelector::Class(ident))
    }

    #[inline]
    fn consume_id(&mut self) -> Tok {
        // skip '#'
        self.index = self.index.saturating_add(1);
        let ident = self.consume_ident();
        Tok::Simple(SimpleSelector::IdSelector(ident))
    }

    /// Parse an attribute selector: `[name]` or `[name<op>value]` with a quoted or unquoted
    /// value, where `<op>` is one of `=`, `~=`, `^=`, `$=`, `*=`.
    #[inline]
    fn consume_attr(&mut self) -> Tok {
        // skip '['
        self.index = self.index.saturating_add(1);
        self.skip_spaces();
        let name = self.consume_ident();
        self.skip_spaces();
        let operator = self.consume_operator();
        let value = operator.map(|_| {
            self.skip_spaces();
            match self.input_bytes.get(self.index).copied() {
                Some(quote @ (b'"' | b'\'')) => {
                    self.index = self.index.saturating_add(1);
                    self.consume_quoted_attr_value(quote)
                }
                _ => self.consume_unquoted_attr_value(),
            }
        });
        self.skip_spaces();
        if self
            .input_bytes
            .get(self.index)
            .is_some_and(|&byte| byte == b']')
        {
            self.index = self.index.saturating_add(1);
        }
        match (operator, value) {
            (Some(operator), Some(value)) => Tok::Simple(SimpleSelector::AttrMatch {
                name,
                operator,
                value,
            }),
            _ => Tok::Simple(SimpleSelector::AttrExists(name)),
        }
    }

    /// Consume an attribute operator if one starts at the cursor.
    #[inline]
    fn consume_operator(&mut self) -> Option<AttrOperator> {
        let first = *self.input_bytes.get(self.index)?;
        if first == b'=' {
            self.index = self.index.saturating_add(1);
            return Some(AttrOperator::Equals);
        }
        let operator = match first {
            b'~' => AttrOperator::Includes,
            b'^' => AttrOperator::Prefix,
            b'$' => AttrOperator::Suffix,
            b'*' => AttrOperator::Contains,
            _ => return None,
        };
        if self.input_bytes.get(self.index.saturating_add(1)) == Some(&b'=') {
            self.index = self.index.saturating_add(2);
            Some(operator)
        } else {
            None
        }
    }

    /// Value runs to the next whitespace or `]`; case is kept.
    #[inline]
    fn consume_unquoted_attr_value(&mut self) -> String {
        let start = self.index;
        while let Some(&byte) = self.input_bytes.get(self.index) {
            if byte.is_ascii_whitespace() || byte == b']' {
                break;
            }
            self.index = self.index.saturating_add(1);
        }
        let slice = self.input_bytes.get(start..self.index).unwrap_or(&[]);
        String::from_utf8_lossy(slice).to_string()
    }

    /// Value up to the closing `quote`, which is consumed.
    #[inline]
    fn consume_quoted_attr_value(&mut self, quote: u8) -> String {
        let start = self.index;
        while matches!(self.input_bytes.get(self.index), Some(&byte) if byte != quote) {
            self.index = self.index.saturating_add(1);
        }
        let slice = self.input_bytes.get(start..self.index).unwrap_or(&[]);
        let out = String::from_utf8_lossy(slice).to_string();
        if self.input_bytes.get(self.index).is_some() {
            self.index = self.index.saturating_add(1);
        }
        out
    }

    #[inline]
    fn skip_spaces(&mut self) {
        while matches!(self.input_bytes.get(self.index), Some(byte) if byte.is_ascii_whitespace()) {
            self.index = self.index.saturating_add(1);
        }
    }
}

/// Parse a selector list from selector text.
pub fn parse_selector_list(input: &str) -> SelectorList {
    let mut list = SelectorList::default();
    for part in input.split(',') {
        let sel = parse_complex_selector(part.trim());
        if sel.first.simples.is_empty() && sel.rest.is_empty() {
            debug!("dropping empty selector part in {input:?}");
        } else {
            list.selectors.push(sel);
        }
    }
    list
}

/// Parse a single complex selector. Malformed input yields whatever parsed cleanly.
pub fn parse_complex_selector(input: &str) -> ComplexSelector {
    let mut tokens = SelectorTokenizer::new(input.trim());
    let mut current = CompoundSelector::default();
    let mut first = None;
    let mut rest: Vec<(Combinator, CompoundSelector)> = Vec::new();
    let mut pending_combinator: Option<Combinator> = None;
    // Combinator that joins `current` to whatever precedes it.
    let mut current_combinator: Option<Combinator> = None;

    while let Some(token) = tokens.next() {
        match token {
            Tok::Combinator(comb) => {
                pending_combinator = Some(comb);
            }
            Tok::DescendantWS => {
                if pending_combinator.is_none() {
                    pending_combinator = Some(Combinator::Descendant);
                }
            }
            Tok::Simple(simple) => {
                if let Some(comb) = pending_combinator.take()
                    && !current.simples.is_empty()
                {
                    let finished = take(&mut current);
                    match current_combinator.take() {
                        None => first = Some(finished),
                        Some(prev) => rest.push((prev, finished)),
                    }
                    current_combinator = Some(comb);
                }
                current.simples.push(simple);
            }
        }
    }

    match current_combinator {
        None => first = Some(current),
        Some(prev) => {
            if !current.simples.is_empty() {
                rest.push((prev, current));
            }
        }
    }

    ComplexSelector {
        first: first.unwrap_or_default(),
        rest,
    }
}
