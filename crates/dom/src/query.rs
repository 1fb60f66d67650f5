//! Selector queries over the document.

use crate::document::Document;
use card_selectors::{ElementAdapter, SelectorList};
use indextree::NodeId;

impl ElementAdapter for Document {
    type Handle = NodeId;

    fn parent(&self, element: NodeId) -> Option<NodeId> {
        self.parent_element(element)
    }

    fn previous_sibling_element(&self, element: NodeId) -> Option<NodeId> {
        Self::previous_element_sibling(self, element)
    }

    fn tag_name(&self, element: NodeId) -> &str {
        Self::tag_name(self, element).unwrap_or_default()
    }

    fn element_id(&self, element: NodeId) -> Option<&str> {
        self.attribute(element, "id")
    }

    fn has_class(&self, element: NodeId, class: &str) -> bool {
        Self::has_class(self, element, class)
    }

    fn attr(&self, element: NodeId, name: &str) -> Option<&str> {
        self.attribute(element, name)
    }
}

impl Document {
    /// True when `node` is an element matching `selectors`.
    pub fn matches(&self, node: NodeId, selectors: &SelectorList) -> bool {
        self.is_element(node) && selectors.matches(self, node)
    }

    /// All matching elements strictly inside `scope`, in tree order.
    pub fn query_selector_all(&self, scope: NodeId, selectors: &SelectorList) -> Vec<NodeId> {
        if selectors.is_empty() {
            return Vec::new();
        }
        self.descendants(scope)
            .into_iter()
            .filter(|&node| self.matches(node, selectors))
            .collect()
    }

    /// First matching element strictly inside `scope`.
    pub fn query_selector(&self, scope: NodeId, selectors: &SelectorList) -> Option<NodeId> {
        if selectors.is_empty() {
            return None;
        }
        self.descendants(scope)
            .into_iter()
            .find(|&node| self.matches(node, selectors))
    }

    /// Nearest inclusive ancestor matching `selectors`.
    pub fn closest(&self, node: NodeId, selectors: &SelectorList) -> Option<NodeId> {
        self.ancestors(node)
            .into_iter()
            .find(|&ancestor| self.matches(ancestor, selectors))
    }
}

#[cfg(test)]
mod tests {
    use crate::parser::parse_document;
    use card_selectors::SelectorList;

    const PAGE: &str = r#"<html><body>
        <ul class="inventory__list">
          <li class="inventory__cell"><div class="inventory__card" data-id="4"></div></li>
          <li class="inventory__cell"><div class="inventory__card"></div></li>
        </ul>
        <a class="card-link" href="/cards?card_id=9">nine</a>
    </body></html>"#;

    #[test]
    fn queries_follow_tree_order() {
        let doc = parse_document(PAGE, "https://cards.example/".parse().unwrap()).unwrap();
        let root = doc.root();
        let cards = doc.query_selector_all(root, &SelectorList::parse(".inventory__card"));
        assert_eq!(cards.len(), 2);
        let with_id = doc
            .query_selector(root, &SelectorList::parse(".inventory__card[data-id]"))
            .unwrap();
        assert_eq!(with_id, cards[0]);
        let cell = doc
            .closest(with_id, &SelectorList::parse(".inventory__cell"))
            .unwrap();
        assert_eq!(doc.tag_name(cell), Some("li"));
        assert_eq!(doc.closest(with_id, &SelectorList::parse(".inventory__card")), Some(with_id));
    }

    #[test]
    fn attribute_substring_queries() {
        let doc = parse_document(PAGE, "https://cards.example/".parse().unwrap()).unwrap();
        let link = doc.query_selector(doc.root(), &SelectorList::parse(r#"a.card-link[href*="card_id="]"#));
        assert!(link.is_some());
        assert!(doc.query_selector(doc.root(), &SelectorList::parse("")).is_none());
    }
}
