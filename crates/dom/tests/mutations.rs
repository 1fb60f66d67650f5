use card_selectors::SelectorList;
use dom::{DomEvent, MutationRecord, Rect, parse_document, parse_fragment_into};

const PAGE: &str = r#"<!DOCTYPE html>
<html><body>
  <div class="cards__grid">
    <div class="card-item" data-card-id="1"><img src="/a.webp"></div>
    <div class="card-item" data-card-id="2"><img src="/b.webp"></div>
  </div>
  <nav><button class="pagination__button">2</button></nav>
</body></html>"#;

fn drain(events: &mut tokio::sync::mpsc::UnboundedReceiver<DomEvent>) -> Vec<DomEvent> {
    let mut out = Vec::new();
    while let Ok(event) = events.try_recv() {
        out.push(event);
    }
    out
}

#[test]
fn fixture_page_mirrors_host_edits() -> anyhow::Result<()> {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut doc = parse_document(PAGE, "https://cards.example/cards".parse()?)?;
    let cards = SelectorList::parse(".cards__grid > .card-item");
    let grid = doc
        .query_selector(doc.root(), &SelectorList::parse(".cards__grid"))
        .ok_or_else(|| anyhow::anyhow!("grid missing"))?;
    assert_eq!(doc.query_selector_all(doc.root(), &cards).len(), 2);

    let mut subscription = doc.subscribe();
    let added = parse_fragment_into(
        &mut doc,
        grid,
        r#"<div class="card-item" data-card-id="3"></div><div class="card-item" data-card-id="4"></div>"#,
    )?;
    assert_eq!(added.len(), 2);
    doc.set_rect(added[0], Rect::new(0.0, 0.0, 240.0, 340.0));
    doc.set_attribute(added[1], "data-card-id", "5")?;

    let events = drain(&mut subscription.events);
    assert_eq!(events.len(), 3);
    let inserted: usize = match &events[0] {
        DomEvent::Mutations(records) => records
            .iter()
            .map(|record| match record {
                MutationRecord::ChildList { added, .. } => added.len(),
                MutationRecord::Attributes { .. } => 0,
            })
            .sum(),
        _ => 0,
    };
    assert_eq!(inserted, 2);
    assert!(matches!(events[1], DomEvent::Resized(node) if node == added[0]));
    assert!(matches!(
        &events[2],
        DomEvent::Mutations(records) if matches!(
            &records[..],
            [MutationRecord::Attributes { old_value: Some(old), .. }] if old == "4"
        )
    ));

    assert_eq!(doc.query_selector_all(doc.root(), &cards).len(), 4);
    Ok(())
}

#[test]
fn closest_and_text_of_parsed_controls() -> anyhow::Result<()> {
    let doc = parse_document(PAGE, "https://cards.example/cards".parse()?)?;
    let button = doc
        .query_selector(doc.root(), &SelectorList::parse("nav button"))
        .ok_or_else(|| anyhow::anyhow!("button missing"))?;
    assert_eq!(doc.text_content(button), "2");
    let nav = doc.closest(button, &SelectorList::parse("nav"));
    assert_eq!(nav, doc.parent_element(button));
    assert!(doc.closest(button, &SelectorList::parse(".cards__grid")).is_none());
    Ok(())
}

#[test]
fn dropped_subtrees_never_resolve_again() -> anyhow::Result<()> {
    let mut doc = parse_document(PAGE, "https://cards.example/cards".parse()?)?;
    let grid = doc
        .query_selector(doc.root(), &SelectorList::parse(".cards__grid"))
        .ok_or_else(|| anyhow::anyhow!("grid missing"))?;
    let badge = doc.create_element_with("div", &[("class", "badge")]);
    let line = doc.create_element("span");
    doc.append_child(badge, line)?;
    doc.append_child(grid, badge)?;
    doc.set_rect(badge, Rect::new(0.0, 0.0, 240.0, 30.0));
    doc.set_rect(line, Rect::new(0.0, 0.0, 240.0, 15.0));

    let mut subscription = doc.subscribe();
    doc.drop_subtree(badge)?;

    let events = drain(&mut subscription.events);
    assert!(matches!(
        &events[..],
        [DomEvent::Mutations(records)] if matches!(
            &records[..],
            [MutationRecord::ChildList { target, removed, .. }] if *target == grid && removed == &[badge]
        )
    ));
    for freed in [badge, line] {
        assert!(!doc.exists(freed));
        assert_eq!(doc.rect(freed), None);
    }
    assert!(doc.drop_subtree(badge).is_err());

    // Fresh nodes may take the freed slots without reviving the old ids.
    let fresh = doc.create_element("div");
    let _spare = doc.create_element("span");
    doc.append_child(grid, fresh)?;
    assert!(!doc.exists(badge));
    assert!(!doc.exists(line));
    assert_eq!(doc.rect(badge), None);
    assert_eq!(doc.element_children(grid).len(), 3);
    Ok(())
}
