//! Scraping APIs: user-defined page parsers with accumulated, cacheable and
//! paginated results.
//!
//! Implement [`ApiDefinition`] to describe a page and how to turn it into
//! records, register it with a [`Dispatcher`], then drive it through an
//! [`ApiHandle`].

mod cache_key;
mod dispatcher;
mod handle;
mod state;

use std::fmt;

use reqwest::Method;
use scraper::Html;
use serde_json::Value;

use crate::session::CsrfTokenFilter;

pub use cache_key::{CACHE_KEY_PREFIX, build_cache_key};
pub use dispatcher::Dispatcher;
pub use handle::ApiHandle;
pub use state::{FetchOutcome, PaginateCallback, ScraperApi};

/// Upper bound on pages fetched by [`PageLimit::All`].
pub const MAX_PAGES: u32 = 9999;

/// Describes one scrapable endpoint.
///
/// Only `name`, `url` and `parse` are required.
pub trait ApiDefinition: Send + Sync {
    /// Unique registry name.
    fn name(&self) -> &str;

    /// Default endpoint URL, without query parameters.
    fn url(&self) -> &str;

    fn method(&self) -> Method {
        Method::GET
    }

    /// Whether the API only works for a logged-in session.
    fn requires_auth(&self) -> bool {
        false
    }

    /// Query parameter carrying the page number while paginating.
    fn page_param(&self) -> &str {
        "page"
    }

    /// Filter for a CSRF token this API needs; falls back to the session's.
    fn csrf_filter(&self) -> Option<CsrfTokenFilter> {
        None
    }

    /// Turns one fetched page into records. An empty vector ends pagination.
    fn parse(&self, document: &Html) -> Vec<Value>;
}

/// How many pages [`ScraperApi::paginate`] may fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PageLimit {
    /// Until a page adds nothing (capped at [`MAX_PAGES`]).
    #[default]
    All,
    /// At most this many pages.
    Pages(u32),
}

impl PageLimit {
    /// Highest page number to fetch.
    #[must_use]
    pub fn upper_bound(self) -> u32 {
        match self {
            Self::All => MAX_PAGES,
            Self::Pages(pages) => pages,
        }
    }
}

impl fmt::Display for PageLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => f.write_str("all"),
            Self::Pages(pages) => write!(f, "{pages}"),
        }
    }
}
