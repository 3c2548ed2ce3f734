//! Deterministic cache keys for API requests.

use std::collections::BTreeMap;

use md5::{Digest, Md5};

use super::PageLimit;

/// Leading component of every API cache key.
pub const CACHE_KEY_PREFIX: &str = "ScraperAPI";

/// Builds `ScraperAPI.{name}.{md5(url)}[.{md5(params)}][.{pages}]`.
///
/// `params` are form-encoded in key order, so insertion order never changes
/// the key. The caller leaves the page parameter out of `params`.
#[must_use]
pub fn build_cache_key(
    name: &str,
    url: &str,
    params: &BTreeMap<String, String>,
    pages: Option<PageLimit>,
) -> String {
    let mut key = format!("{CACHE_KEY_PREFIX}.{name}.{}", md5_hex(url));

    if !params.is_empty() {
        let query = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(params)
            .finish();
        key.push('.');
        key.push_str(&md5_hex(&query));
    }

    if let Some(pages) = pages {
        key.push('.');
        key.push_str(&pages.to_string());
    }
    key
}

fn md5_hex(input: &str) -> String {
    hex::encode(Md5::digest(input.as_bytes()))
}
