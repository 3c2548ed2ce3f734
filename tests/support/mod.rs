#![allow(dead_code)]

pub mod socket_guard;

use std::path::Path;

use web_scraper::ScraperConfig;

/// Encrypted cookie files under `dir` with a fixed key; tests never touch the
/// system keychain.
#[must_use]
pub fn test_config(dir: &Path) -> ScraperConfig {
    let mut config = ScraperConfig::default();
    config.cookies.directory = dir.join("cookies");
    config.cookies.encrypt = true;
    config.cookies.encryption_key = Some("test-key".to_string());
    config
}
