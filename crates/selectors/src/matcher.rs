//! Selector matching engine.

use crate::{
    Combinator, ComplexSelector, CompoundSelector, ElementAdapter, SelectorList, SimpleSelector,
};

/// Match a selector list against an element.
pub fn matches_selector_list<A: ElementAdapter>(
    adapter: &A,
    element: A::Handle,
    list: &SelectorList,
) -> bool {
    list.selectors
        .iter()
        .any(|selector_item| matches_complex(adapter, element, selector_item))
}

/// Match a complex selector against an element, right to left.
pub fn matches_complex<A: ElementAdapter>(
    adapter: &A,
    element: A::Handle,
    sel: &ComplexSelector,
) -> bool {
    match_at(adapter, element, sel, sel.rest.len())
}

/// The compound at `index`, where 0 is `sel.first` and `n` is `sel.rest[n - 1]`.
fn compound_at(sel: &ComplexSelector, index: usize) -> Option<&CompoundSelector> {
    match index.checked_sub(1) {
        None => Some(&sel.first),
        Some(rest_index) => sel.rest.get(rest_index).map(|pair| &pair.1),
    }
}

/// Match the compound at `index` against `element`, then relate it to the compounds on its
/// left through their combinators. Descendant and general-sibling steps backtrack.
fn match_at<A: ElementAdapter>(
    adapter: &A,
    element: A::Handle,
    sel: &ComplexSelector,
    index: usize,
) -> bool {
    let Some(compound) = compound_at(sel, index) else {
        return false;
    };
    if !matches_compound(adapter, element, compound) {
        return false;
    }
    let Some(left_index) = index.checked_sub(1) else {
        return true;
    };
    let Some(&(combinator, _)) = sel.rest.get(left_index) else {
        return false;
    };
    match combinator {
        Combinator::Descendant => {
            let mut current_parent = adapter.parent(element);
            while let Some(ancestor_element) = current_parent {
                if match_at(adapter, ancestor_element, sel, left_index) {
                    return true;
                }
                current_parent = adapter.parent(ancestor_element);
            }
            false
        }
        Combinator::Child => adapter
            .parent(element)
            .is_some_and(|parent_el| match_at(adapter, parent_el, sel, left_index)),
        Combinator::AdjacentSibling => adapter
            .previous_sibling_element(element)
            .is_some_and(|prev_el| match_at(adapter, prev_el, sel, left_index)),
        Combinator::GeneralSibling => {
            let mut current_sibling = adapter.previous_sibling_element(element);
            while let Some(sibling_element) = current_sibling {
                if match_at(adapter, sibling_element, sel, left_index) {
                    return true;
                }
                current_sibling = adapter.previous_sibling_element(sibling_element);
            }
            false
        }
    }
}

/// Match a compound selector against a single element.
pub fn matches_compound<A: ElementAdapter>(
    adapter: &A,
    element: A::Handle,
    compound: &CompoundSelector,
) -> bool {
    compound.simples.iter().all(|simple| match simple {
        SimpleSelector::Universal => true,
        SimpleSelector::Type(type_name) => {
            type_name.is_empty() || adapter.tag_name(element) == type_name.as_str()
        }
        SimpleSelector::Class(class_name) => adapter.has_class(element, class_name),
        SimpleSelector::IdSelector(id_value) => adapter
            .element_id(element)
            .is_some_and(|value| value.eq_ignore_ascii_case(id_value)),
        SimpleSelector::AttrExists(name) => adapter.attr(element, name).is_some(),
        SimpleSelector::AttrMatch {
            name,
            operator,
            value,
        } => adapter
            .attr(element, name)
            .is_some_and(|attr_value| operator.test(attr_value, value)),
    })
}
