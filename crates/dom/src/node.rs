//! Node payloads stored in the document arena.

use smallvec::SmallVec;

/// Data stored for each DOM node.
#[derive(Debug, Clone, Default)]
pub enum NodeData {
    #[default]
    Document,
    Element(ElementData),
    Text(String),
    Comment(String),
}

impl NodeData {
    /// The element payload, if this is an element node.
    pub fn as_element(&self) -> Option<&ElementData> {
        match self {
            Self::Element(element) => Some(element),
            Self::Document | Self::Text(_) | Self::Comment(_) => None,
        }
    }

    pub(crate) fn as_element_mut(&mut self) -> Option<&mut ElementData> {
        match self {
            Self::Element(element) => Some(element),
            Self::Document | Self::Text(_) | Self::Comment(_) => None,
        }
    }
}

/// Data for an element node. Attribute order is preserved; names are ASCII lowercase.
#[derive(Debug, Clone)]
pub struct ElementData {
    pub tag_name: String,
    pub attributes: SmallVec<[(String, String); 4]>,
}

impl ElementData {
    pub fn new(tag_name: &str) -> Self {
        Self {
            tag_name: tag_name.to_ascii_lowercase(),
            attributes: SmallVec::new(),
        }
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Set an attribute, returning the previous value.
    pub fn set_attribute(&mut self, name: &str, value: &str) -> Option<String> {
        let name = name.to_ascii_lowercase();
        if let Some(slot) = self.attributes.iter_mut().find(|(key, _)| *key == name) {
            return Some(core::mem::replace(&mut slot.1, value.to_owned()));
        }
        self.attributes.push((name, value.to_owned()));
        None
    }

    /// Remove an attribute, returning the previous value.
    pub fn remove_attribute(&mut self, name: &str) -> Option<String> {
        let position = self.attributes.iter().position(|(key, _)| key == name)?;
        Some(self.attributes.remove(position).1)
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.attribute("class").is_some_and(|list| {
            list.split_ascii_whitespace()
                .any(|token| token.eq_ignore_ascii_case(class))
        })
    }
}
