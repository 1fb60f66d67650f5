#![allow(dead_code, reason = "each integration test binary uses a different subset")]

use dataset::{CardRecord, Dataset, MANIFEST_FILE, Manifest};
use std::fs;
use std::path::Path;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// A dataset of `count` cards, each with an image under `images/cards/`.
pub fn dataset(version: u64, count: u32) -> Dataset {
    Dataset {
        version,
        generated_at: Some(String::from("2026-10-01T00:00:00Z")),
        cards: (1..=count)
            .map(|id| CardRecord {
                id,
                name: format!("Card {id}"),
                image: Some(format!("https://cdn.example/images/cards/{id}.webp")),
                owners: id * 10 + u32::try_from(version).unwrap_or(0),
                wants: id,
                trades: 1,
            })
            .collect(),
    }
}

/// Publish `dataset` into `dir` under an announced manifest version.
pub fn publish(dir: &Path, announced: u64, dataset: &Dataset) {
    let file = format!("cards-v{announced}.json");
    fs::write(dir.join(&file), serde_json::to_vec(dataset).unwrap()).unwrap();
    let manifest = Manifest {
        version: announced,
        url: file,
    };
    fs::write(dir.join(MANIFEST_FILE), serde_json::to_vec(&manifest).unwrap()).unwrap();
}
