mod common;

use common::*;
use core::time::Duration;
use dom::Rect;
use overlay::{CardState, InitError, OverlayConfig, OverlayLayout};
use tokio::task::LocalSet;

#[tokio::test(start_paused = true)]
async fn initial_scan_overlays_every_visible_card_once() -> anyhow::Result<()> {
    init_logging();
    LocalSet::new()
        .run_until(async {
            let doc = page(CATALOG_URL);
            let grid = container(&doc, "cards__grid");
            let cards = catalog_grid(&doc, grid, 12);
            let service = MockService::with_cards(12);
            let engine = engine(&doc, &service, config());

            engine.start().await?;
            settle(100).await;

            assert_eq!(overlays_in(&doc).len(), 12);
            for &card in &cards {
                assert_eq!(overlays_on(&doc, card), 1);
                assert!(matches!(engine.card_state(card), Some(CardState::Overlaid { .. })));
            }

            // A rescan finds nothing new and re-fetches nothing.
            engine.request_scan();
            settle(1_000).await;
            assert_eq!(overlays_in(&doc).len(), 12);
            assert_eq!(service.total_stats_calls(), 12);
            let counters = engine.counters();
            assert_eq!(counters.scans, 2);
            assert_eq!(counters.overlays_live, 12);
            assert_eq!(counters.overlays_inserted, 12);
            Ok(())
        })
        .await
}

#[tokio::test(start_paused = true)]
async fn overlay_contents_and_links() -> anyhow::Result<()> {
    init_logging();
    LocalSet::new()
        .run_until(async {
            let doc = page(CATALOG_URL);
            let grid = container(&doc, "cards__grid");
            let card = catalog_card(&doc, grid, 7, 0);
            let service = MockService::with_cards(7);
            let engine = engine(&doc, &service, config());
            engine.start().await?;
            settle(50).await;

            let overlays = engine.overlays();
            assert_eq!(overlays.len(), 1);
            let (owner, record) = &overlays[0];
            assert_eq!(*owner, card);
            assert_eq!(record.card_id, 7);
            assert_eq!(record.stats, stats_for(7));
            assert_eq!(record.layout, Some(OverlayLayout::Horizontal));

            let doc = doc.borrow();
            assert_eq!(doc.attribute(record.overlay, "title"), Some("Card 7"));
            assert_eq!(doc.attribute(record.overlay, "data-layout"), Some("horizontal"));
            let links = doc.element_children(record.overlay);
            assert_eq!(links.len(), 3);
            assert_eq!(doc.text_content(links[0]), "21");
            assert_eq!(
                doc.attribute(links[1], "href"),
                Some("https://cards.example/cards/7/users?type=want")
            );
            assert_eq!(doc.attribute(links[2], "target"), Some("_blank"));
            Ok(())
        })
        .await
}

#[tokio::test(start_paused = true)]
async fn own_insertions_never_trigger_a_rescan() -> anyhow::Result<()> {
    init_logging();
    LocalSet::new()
        .run_until(async {
            let doc = page(CATALOG_URL);
            let grid = container(&doc, "cards__grid");
            catalog_grid(&doc, grid, 6);
            let service = MockService::with_cards(6);
            let engine = engine(&doc, &service, config());
            engine.start().await?;
            settle(2_000).await;

            let counters = engine.counters();
            assert_eq!(counters.scans, 1);
            assert_eq!(counters.mutation_dispatches, 0);
            assert!(counters.self_mutations_ignored >= 6);
            assert_eq!(overlays_in(&doc).len(), 6);
            Ok(())
        })
        .await
}

#[tokio::test(start_paused = true)]
async fn catalog_pages_are_capped() -> anyhow::Result<()> {
    init_logging();
    LocalSet::new()
        .run_until(async {
            let doc = page(CATALOG_URL);
            let grid = container(&doc, "cards__grid");
            let cards = catalog_grid(&doc, grid, 250);
            let service = MockService::with_cards(250);
            let engine = engine(&doc, &service, config());
            engine.start().await?;
            settle(200).await;

            assert_eq!(overlays_in(&doc).len(), 200);
            let counters = engine.counters();
            assert_eq!(counters.overlays_live, 200);
            assert_eq!(counters.rejected, 50);
            let rejected = cards
                .iter()
                .filter(|&&card| engine.card_state(card) == Some(CardState::Rejected))
                .count();
            assert_eq!(rejected, 50);
            Ok(())
        })
        .await
}

#[tokio::test(start_paused = true)]
async fn trade_pages_are_unlimited() -> anyhow::Result<()> {
    init_logging();
    LocalSet::new()
        .run_until(async {
            let doc = page(TRADE_URL);
            let list = container(&doc, "trade__list");
            for index in 0..250 {
                trade_card(&doc, list, index as u32 + 1, index);
            }
            let service = MockService::with_cards(250);
            let engine = engine(&doc, &service, config());
            engine.start().await?;
            settle(200).await;

            assert_eq!(overlays_in(&doc).len(), 250);
            assert_eq!(engine.counters().rejected, 0);
            Ok(())
        })
        .await
}

#[tokio::test(start_paused = true)]
async fn unknown_image_gets_no_overlay() -> anyhow::Result<()> {
    init_logging();
    LocalSet::new()
        .run_until(async {
            let doc = page(MELT_URL);
            let list = container(&doc, "melt__list");
            let series = melt_card(&doc, list, "https://cdn.example/images/anime/311/cover.webp", 0);
            let known = melt_card(&doc, list, "https://cdn.example/images/cards/42.webp?v=3", 1);
            let service = MockService::with_cards(50);
            service.add_image("images/cards/42.webp", 42);
            let engine = engine(&doc, &service, config());
            engine.start().await?;
            settle(100).await;

            assert_eq!(overlays_on(&doc, series), 0);
            assert_eq!(engine.card_state(series), Some(CardState::Rejected));
            // The series number in the path is never taken for a card id.
            assert_eq!(service.stats_calls(311), 0);

            assert_eq!(overlays_on(&doc, known), 1);
            let overlays = engine.overlays();
            assert_eq!(overlays.len(), 1);
            assert_eq!(overlays[0].1.card_id, 42);
            assert_eq!(service.image_calls(), 2);
            Ok(())
        })
        .await
}

#[tokio::test(start_paused = true)]
async fn removal_before_lookup_resolves_leaves_no_overlay() -> anyhow::Result<()> {
    init_logging();
    LocalSet::new()
        .run_until(async {
            let doc = page(CATALOG_URL);
            let grid = container(&doc, "cards__grid");
            let cards = catalog_grid(&doc, grid, 3);
            let service = MockService::with_cards(3);
            service.set_latency(Duration::from_millis(200));
            let engine = engine(&doc, &service, config());
            engine.start().await?;
            settle(50).await;

            doc.borrow_mut().remove(cards[0])?;
            settle(500).await;

            assert_eq!(overlays_in(&doc).len(), 2);
            assert_eq!(overlays_on(&doc, cards[0]), 0);
            assert_eq!(engine.card_state(cards[0]), None);
            assert!(engine.counters().discarded_races >= 1);
            Ok(())
        })
        .await
}

#[tokio::test(start_paused = true)]
async fn cards_added_by_the_host_are_picked_up() -> anyhow::Result<()> {
    init_logging();
    LocalSet::new()
        .run_until(async {
            let doc = page(CATALOG_URL);
            let grid = container(&doc, "cards__grid");
            catalog_grid(&doc, grid, 2);
            let service = MockService::with_cards(5);
            let engine = engine(&doc, &service, config());
            engine.start().await?;
            settle(100).await;
            assert_eq!(overlays_in(&doc).len(), 2);

            for index in 2..5 {
                catalog_card(&doc, grid, index as u32 + 1, index);
            }
            settle(1_000).await;

            assert_eq!(overlays_in(&doc).len(), 5);
            // Three insertions folded into one dispatch.
            assert_eq!(engine.counters().mutation_dispatches, 1);
            Ok(())
        })
        .await
}

#[tokio::test(start_paused = true)]
async fn data_attribute_change_replaces_the_overlay() -> anyhow::Result<()> {
    init_logging();
    LocalSet::new()
        .run_until(async {
            let doc = page("https://cards.example/inventory");
            let list = container(&doc, "inventory__grid");
            let (cell, card) = {
                let mut doc = doc.borrow_mut();
                let cell = doc.create_element_with("div", &[("class", "inventory__cell")]);
                let card = doc.create_element_with(
                    "div",
                    &[("class", "inventory__card"), ("data-id", "4")],
                );
                doc.append_child(cell, card)?;
                doc.append_child(list, cell)?;
                doc.set_rect(cell, slot(0));
                doc.set_rect(card, slot(0));
                (cell, card)
            };
            let service = MockService::with_cards(9);
            let engine = engine(&doc, &service, config());
            engine.start().await?;
            settle(100).await;
            assert_eq!(overlays_on(&doc, cell), 1);
            assert_eq!(engine.overlays()[0].1.card_id, 4);

            doc.borrow_mut().set_attribute(card, "data-id", "9")?;
            settle(1_000).await;

            assert_eq!(overlays_on(&doc, cell), 1);
            let overlays = engine.overlays();
            assert_eq!(overlays.len(), 1);
            assert_eq!(overlays[0].1.card_id, 9);
            Ok(())
        })
        .await
}

#[tokio::test(start_paused = true)]
async fn layout_follows_container_width() -> anyhow::Result<()> {
    init_logging();
    LocalSet::new()
        .run_until(async {
            let doc = page(CATALOG_URL);
            let grid = container(&doc, "cards__grid");
            let card = catalog_card(&doc, grid, 1, 0);
            let service = MockService::with_cards(1);
            let engine = engine(&doc, &service, config());
            engine.start().await?;
            settle(50).await;
            assert_eq!(engine.overlays()[0].1.layout, Some(OverlayLayout::Horizontal));

            doc.borrow_mut().set_rect(card, Rect::new(0.0, 0.0, 150.0, CARD_HEIGHT));
            settle(50).await;
            assert_eq!(engine.overlays()[0].1.layout, Some(OverlayLayout::Mixed));

            doc.borrow_mut().set_rect(card, Rect::new(0.0, 0.0, 100.0, CARD_HEIGHT));
            settle(50).await;
            let (_, record) = &engine.overlays()[0];
            assert_eq!(record.layout, Some(OverlayLayout::Vertical));
            assert_eq!(doc.borrow().attribute(record.overlay, "data-layout"), Some("vertical"));
            Ok(())
        })
        .await
}

#[tokio::test(start_paused = true)]
async fn zero_width_containers_are_polled() -> anyhow::Result<()> {
    init_logging();
    LocalSet::new()
        .run_until(async {
            let doc = page("https://cards.example/inventory");
            let list = container(&doc, "inventory__grid");
            let mut cells = Vec::new();
            for (index, id) in ["1", "2"].into_iter().enumerate() {
                let mut doc = doc.borrow_mut();
                let cell = doc.create_element_with("div", &[("class", "inventory__cell")]);
                let card = doc.create_element_with(
                    "div",
                    &[("class", "inventory__card"), ("data-id", id)],
                );
                doc.append_child(cell, card)?;
                doc.append_child(list, cell)?;
                doc.set_rect(card, slot(index));
                cells.push(cell);
            }
            let service = MockService::with_cards(2);
            let engine = engine(&doc, &service, config());
            engine.start().await?;
            settle(10).await;
            assert!(engine.overlays().iter().all(|(_, record)| record.layout.is_none()));

            // The first cell is laid out late; the second never is.
            settle(190).await;
            doc.borrow_mut().set_rect(cells[0], Rect::new(0.0, 0.0, 300.0, CARD_HEIGHT));
            settle(2_000).await;

            let layout_of = |id: u32| {
                engine
                    .overlays()
                    .into_iter()
                    .find(|(_, record)| record.card_id == id)
                    .and_then(|(_, record)| record.layout)
            };
            assert_eq!(layout_of(1), Some(OverlayLayout::Horizontal));
            assert_eq!(layout_of(2), Some(OverlayLayout::Vertical));
            Ok(())
        })
        .await
}

#[tokio::test(start_paused = true)]
async fn sweep_drops_overlays_of_detached_cards() -> anyhow::Result<()> {
    init_logging();
    LocalSet::new()
        .run_until(async {
            let doc = page(CATALOG_URL);
            let grid = container(&doc, "cards__grid");
            let cards = catalog_grid(&doc, grid, 3);
            let service = MockService::with_cards(3);
            let engine = engine(
                &doc,
                &service,
                OverlayConfig {
                    sweep_interval_ms: 1_000,
                    ..config()
                },
            );
            engine.start().await?;
            settle(100).await;

            doc.borrow_mut().remove(cards[1])?;
            assert_eq!(engine.counters().overlays_live, 3);
            settle(1_000).await;

            let counters = engine.counters();
            assert_eq!(counters.overlays_live, 2);
            assert_eq!(counters.overlays_removed, 1);
            assert_eq!(engine.card_state(cards[1]), None);
            Ok(())
        })
        .await
}

#[tokio::test(start_paused = true)]
async fn teardown_is_idempotent() -> anyhow::Result<()> {
    init_logging();
    LocalSet::new()
        .run_until(async {
            let doc = page(CATALOG_URL);
            let grid = container(&doc, "cards__grid");
            catalog_grid(&doc, grid, 4);
            let service = MockService::with_cards(10);
            let engine = engine(&doc, &service, config());
            engine.start().await?;
            settle(100).await;
            assert_eq!(overlays_in(&doc).len(), 4);

            engine.teardown();
            engine.teardown();
            assert!(engine.is_torn_down());
            assert!(!engine.is_running());
            assert!(overlays_in(&doc).is_empty());
            assert_eq!(doc.borrow().subscriber_count(), 0);

            catalog_card(&doc, grid, 5, 4);
            settle(1_000).await;
            assert!(overlays_in(&doc).is_empty());
            assert!(matches!(engine.start().await, Err(InitError::TornDown)));
            Ok(())
        })
        .await
}

#[tokio::test(start_paused = true)]
async fn start_gives_up_after_retries() {
    init_logging();
    LocalSet::new()
        .run_until(async {
            let doc = page(CATALOG_URL);
            let service = MockService::with_cards(1);
            service.set_reachable(false);
            let engine = engine(
                &doc,
                &service,
                OverlayConfig {
                    init_attempts: 2,
                    ping_delays_ms: vec![0, 100],
                    ..config()
                },
            );
            let err = engine.start().await.unwrap_err();
            assert!(matches!(err, InitError::Connect { attempts: 2, .. }));
            assert_eq!(service.pings(), 4);
            assert!(!engine.is_running());
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn run_retries_until_the_service_is_ready() {
    init_logging();
    LocalSet::new()
        .run_until(async {
            let doc = page(CATALOG_URL);
            let grid = container(&doc, "cards__grid");
            catalog_grid(&doc, grid, 2);
            let service = MockService::with_cards(2);
            service.set_ready(false);
            let engine = engine(&doc, &service, config());
            let runner = engine.clone();
            let handle = tokio::task::spawn_local(async move { runner.run().await });

            settle(10_000).await;
            assert!(!engine.is_running());
            service.set_ready(true);
            settle(10_000).await;

            assert!(engine.is_running());
            assert!(handle.is_finished());
            assert_eq!(overlays_in(&doc).len(), 2);
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn empty_dataset_waits_for_the_first_update() -> anyhow::Result<()> {
    init_logging();
    LocalSet::new()
        .run_until(async {
            let doc = page(CATALOG_URL);
            let grid = container(&doc, "cards__grid");
            catalog_grid(&doc, grid, 2);
            let service = MockService::new();
            let engine = engine(&doc, &service, config());
            engine.start().await?;
            settle(100).await;
            assert_eq!(engine.counters().scans, 0);

            service.publish((1..=2).map(|id| (id, stats_for(id))).collect());
            settle(1_000).await;
            assert_eq!(overlays_in(&doc).len(), 2);
            Ok(())
        })
        .await
}

#[tokio::test(start_paused = true)]
async fn repeated_melt_image_is_processed_once_per_window() -> anyhow::Result<()> {
    init_logging();
    LocalSet::new()
        .run_until(async {
            let doc = page(MELT_URL);
            let list = container(&doc, "melt__list");
            let image = "https://cdn.example/images/cards/42.webp";
            let first = melt_card(&doc, list, image, 0);
            let second = melt_card(&doc, list, image, 1);
            let service = MockService::with_cards(50);
            service.add_image("images/cards/42.webp", 42);
            let engine = engine(&doc, &service, config());
            engine.start().await?;
            settle(100).await;

            assert_eq!(overlays_on(&doc, first), 1);
            assert_eq!(overlays_on(&doc, second), 0);
            assert_eq!(engine.card_state(second), None);
            assert_eq!(service.stats_calls(42), 1);

            // Still inside the window: the twin goes back to unseen.
            settle(1_000).await;
            engine.request_scan();
            settle(1_000).await;
            assert_eq!(overlays_on(&doc, second), 0);
            assert_eq!(engine.card_state(second), None);

            settle(5_000).await;
            engine.request_scan();
            settle(1_000).await;
            assert_eq!(overlays_on(&doc, first), 1);
            assert_eq!(overlays_on(&doc, second), 1);
            assert_eq!(engine.overlays().len(), 2);
            // The second pass is answered by the image cache.
            assert_eq!(service.image_calls(), 1);
            Ok(())
        })
        .await
}

#[tokio::test(start_paused = true)]
async fn cards_with_one_image_share_a_lookup() -> anyhow::Result<()> {
    init_logging();
    LocalSet::new()
        .run_until(async {
            let doc = page(LOOTBOX_URL);
            let opened = container(&doc, "lootbox__cards");
            let image = "https://cdn.example/images/cards/7.webp";
            let cards = [
                lootbox_card(&doc, opened, image, 0),
                lootbox_card(&doc, opened, image, 1),
            ];
            let service = MockService::with_cards(10);
            service.add_image("images/cards/7.webp", 7);
            service.set_latency(Duration::from_millis(200));
            let engine = engine(&doc, &service, config());
            engine.start().await?;
            settle(1_000).await;

            assert_eq!(service.image_calls(), 1);
            for card in cards {
                assert_eq!(overlays_on(&doc, card), 1);
            }
            assert!(engine.overlays().iter().all(|(_, record)| record.card_id == 7));
            Ok(())
        })
        .await
}

#[tokio::test(start_paused = true)]
async fn inventory_swap_repaints_every_card_once() -> anyhow::Result<()> {
    init_logging();
    LocalSet::new()
        .run_until(async {
            let doc = page(TRADE_URL);
            let list = container(&doc, "trade__list");
            let mut items: Vec<_> = (0..3)
                .map(|index| trade_card(&doc, list, index as u32 + 1, index))
                .collect();
            let service = MockService::with_cards(5);
            let engine = engine(&doc, &service, config());
            engine.start().await?;
            settle(100).await;
            assert_eq!(overlays_in(&doc).len(), 3);

            let inventory = doc
                .borrow_mut()
                .create_element_with("div", &[("class", "trade__inventory")]);
            items.push(trade_card(&doc, inventory, 4, 3));
            items.push(trade_card(&doc, inventory, 5, 4));
            {
                let mut doc = doc.borrow_mut();
                let body = doc.body();
                doc.append_child(body, inventory)?;
                doc.set_rect(inventory, Rect::new(0.0, 0.0, 1280.0, 100_000.0));
            }

            settle(700).await;
            assert_eq!(engine.counters().mutation_dispatches, 0);
            assert_eq!(overlays_in(&doc).len(), 3);

            settle(300).await;
            let counters = engine.counters();
            assert_eq!(counters.mutation_dispatches, 1);
            assert_eq!(counters.overlays_inserted, 8);
            assert_eq!(overlays_in(&doc).len(), 5);
            for item in items {
                assert_eq!(overlays_on(&doc, item), 1);
            }
            for id in 1..=5 {
                assert_eq!(service.stats_calls(id), 1);
            }
            Ok(())
        })
        .await
}
