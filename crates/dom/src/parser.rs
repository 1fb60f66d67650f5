//! HTML5 parsing using html5ever.

use crate::document::Document;
use crate::error::DomError;
use html5ever::tendril::TendrilSink;
use html5ever::{ParseOpts, parse_document as parse_html};
use indextree::NodeId;
use markup5ever_rcdom::{Handle, NodeData as RcNodeData, RcDom};
use url::Url;

fn parse_rcdom(html: &str) -> Result<RcDom, DomError> {
    Ok(parse_html(RcDom::default(), ParseOpts::default())
        .from_utf8()
        .read_from(&mut html.as_bytes())?)
}

/// Convert one html5ever node into a detached node of `doc`.
/// Doctypes, processing instructions and whitespace-only text produce nothing.
fn import_node(doc: &mut Document, rc_node: &Handle) -> Result<Option<NodeId>, DomError> {
    let node = match &rc_node.data {
        RcNodeData::Text { contents } => {
            let text = contents.borrow();
            if text.trim().is_empty() {
                return Ok(None);
            }
            doc.create_text(&text)
        }
        RcNodeData::Comment { contents } => doc.create_comment(contents),
        RcNodeData::Element { name, attrs, .. } => {
            let attributes = attrs
                .borrow()
                .iter()
                .map(|attr| (attr.name.local.to_string(), attr.value.to_string()))
                .collect::<Vec<_>>();
            let borrowed = attributes
                .iter()
                .map(|(key, value)| (key.as_str(), value.as_str()))
                .collect::<Vec<_>>();
            let element = doc.create_element_with(&name.local, &borrowed);
            import_children(doc, rc_node, element)?;
            element
        }
        RcNodeData::Document
        | RcNodeData::Doctype { .. }
        | RcNodeData::ProcessingInstruction { .. } => return Ok(None),
    };
    Ok(Some(node))
}

fn import_children(doc: &mut Document, rc_node: &Handle, parent: NodeId) -> Result<(), DomError> {
    for child in rc_node.children.borrow().iter() {
        if let Some(node) = import_node(doc, child)? {
            doc.append_child(parent, node)?;
        }
    }
    Ok(())
}

fn find_body(rc_node: &Handle) -> Option<Handle> {
    if let RcNodeData::Element { name, .. } = &rc_node.data
        && &*name.local == "body"
    {
        return Some(Handle::clone(rc_node));
    }
    rc_node.children.borrow().iter().find_map(find_body)
}

/// Parse a complete HTML document.
///
/// # Errors
/// Returns an error if the input cannot be read by the parser.
pub fn parse_document(html: &str, url: Url) -> Result<Document, DomError> {
    let dom = parse_rcdom(html)?;
    let mut doc = Document::new(url);
    let root = doc.root();
    import_children(&mut doc, &dom.document, root)?;
    Ok(doc)
}

/// Parse `html` as body content and append the resulting nodes to `parent`.
///
/// All insertions are delivered to subscribers as one mutation batch, the way a host page
/// rendering a new list page looks to an observer.
///
/// # Errors
/// Returns an error if parsing fails or `parent` is not part of the document.
pub fn parse_fragment_into(
    doc: &mut Document,
    parent: NodeId,
    html: &str,
) -> Result<Vec<NodeId>, DomError> {
    if !doc.exists(parent) {
        return Err(DomError::UnknownNode(parent));
    }
    let dom = parse_rcdom(&format!("<body>{html}</body>"))?;
    let Some(body) = find_body(&dom.document) else {
        return Ok(Vec::new());
    };
    let mut imported = Vec::new();
    for child in body.children.borrow().iter() {
        if let Some(node) = import_node(doc, child)? {
            imported.push(node);
        }
    }
    doc.with_batch(|doc| {
        imported
            .iter()
            .try_for_each(|&node| doc.append_child(parent, node))
    })?;
    Ok(imported)
}
