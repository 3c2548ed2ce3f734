//! Buffered HTTP response.

use reqwest::StatusCode;
use reqwest::header::HeaderMap;
use scraper::Html;
use url::Url;

/// A fully-read response: status, headers, final URL and body text.
#[derive(Debug, Clone)]
pub struct ScrapeResponse {
    url: Url,
    status: StatusCode,
    headers: HeaderMap,
    body: String,
}

impl ScrapeResponse {
    pub(crate) fn new(url: Url, status: StatusCode, headers: HeaderMap, body: String) -> Self {
        Self {
            url,
            status,
            headers,
            body,
        }
    }

    /// Final URL after any redirects.
    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }

    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.status
    }

    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Header value as text, when present and valid ASCII.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }

    #[must_use]
    pub fn text(&self) -> &str {
        &self.body
    }

    #[must_use]
    pub fn into_text(self) -> String {
        self.body
    }

    /// Parses the body as an HTML document.
    #[must_use]
    pub fn document(&self) -> Html {
        Html::parse_document(&self.body)
    }
}
