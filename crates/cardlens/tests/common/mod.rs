#![allow(dead_code, reason = "each integration test binary uses a different subset")]

use cardlens::Args;
use std::fs;
use std::path::{Path, PathBuf};
use url::Url;

pub const CATALOG_PAGE: &str = r#"<!DOCTYPE html>
<html><body>
  <div class="cards__grid">
    <div class="card-item" data-card-id="1" data-card-name="Alpha"></div>
    <div class="card-item" data-card-id="2" data-card-name="Beta"></div>
    <div class="card-item" data-card-id="3" data-card-name="Gamma"></div>
    <div class="card-item" data-card-id="99" data-card-name="Unknown"></div>
  </div>
</body></html>"#;

pub const DATASET: &str = r#"{
  "version": 3,
  "generated_at": "2026-10-01T00:00:00Z",
  "cards": [
    {"id": 1, "name": "Alpha", "image": "/images/cards/1.webp", "owners": 10, "wants": 4, "trades": 2},
    {"id": 2, "name": "Beta", "owners": 20, "wants": 5, "trades": 0},
    {"id": 3, "name": "Gamma", "owners": 30, "wants": 6, "trades": 1}
  ]
}"#;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn write(dir: &Path, name: &str, contents: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, contents).unwrap();
    path
}

pub fn args(page: PathBuf, url: &str, dataset: &Path) -> Args {
    Args {
        page,
        url: Url::parse(url).unwrap(),
        dataset: dataset.display().to_string(),
        viewport: (1280.0, 800.0),
        settle_ms: 200,
        counters: true,
    }
}
