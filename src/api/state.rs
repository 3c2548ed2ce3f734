//! Runtime state of a registered API: parameters, cache, pagination and the
//! accumulated result set.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, info, instrument};
use url::Url;

use crate::cache::{CacheStore, Records};
use crate::session::{
    CsrfToken, CsrfTokenFilter, Method, RequestOptions, ScrapeError, Session, TokenPlacement,
};

use super::{ApiDefinition, PageLimit, build_cache_key};

/// Called after each fetched page with the page number.
pub type PaginateCallback = Box<dyn FnMut(u32) + Send + Sync>;

const DEFAULT_CACHE_MINUTES: u64 = 60;

/// What [`ScraperApi::fetch_page`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    /// Records came from the cache; nothing was requested.
    Cached,
    /// The page was requested and parsed into this many records.
    Fetched(usize),
}

/// A registered API plus everything that changes while using it.
///
/// Results accumulate across requests and pages until
/// [`reset_results`](Self::reset_results) is called.
pub struct ScraperApi {
    definition: Box<dyn ApiDefinition>,
    api_url: String,
    url_params: BTreeMap<String, String>,
    page: u32,
    results: Vec<Value>,
    count: usize,
    cache_enabled: bool,
    cache_minutes: u64,
    cache_key: Option<String>,
    paginating: bool,
    total_pages: Option<PageLimit>,
    callback: Option<PaginateCallback>,
    csrf_filter: Option<CsrfTokenFilter>,
    csrf_token: Option<String>,
}

impl ScraperApi {
    #[must_use]
    pub fn new(definition: Box<dyn ApiDefinition>) -> Self {
        let api_url = definition.url().to_string();
        let csrf_filter = definition.csrf_filter();
        Self {
            definition,
            api_url,
            url_params: BTreeMap::new(),
            page: 1,
            results: Vec::new(),
            count: 0,
            cache_enabled: false,
            cache_minutes: DEFAULT_CACHE_MINUTES,
            cache_key: None,
            paginating: false,
            total_pages: None,
            callback: None,
            csrf_filter,
            csrf_token: None,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        self.definition.name()
    }

    #[must_use]
    pub fn requires_auth(&self) -> bool {
        self.definition.requires_auth()
    }

    /// Endpoint URL used by the next request, without parameters.
    #[must_use]
    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    pub fn set_api_url(&mut self, url: impl Into<String>) -> &mut Self {
        self.api_url = url.into();
        self
    }

    /// Merges `params` into the URL parameters; existing keys are overwritten,
    /// others are kept.
    pub fn params<I, K, V>(&mut self, params: I) -> &mut Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.url_params
            .extend(params.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    #[must_use]
    pub fn url_params(&self) -> &BTreeMap<String, String> {
        &self.url_params
    }

    /// Enables result caching for `minutes`.
    pub fn cache(&mut self, minutes: u64) -> &mut Self {
        self.cache_enabled = true;
        self.cache_minutes = minutes;
        self
    }

    #[must_use]
    pub fn is_caching(&self) -> bool {
        self.cache_enabled
    }

    /// Key of the current logical request, once computed.
    #[must_use]
    pub fn cache_key(&self) -> Option<&str> {
        self.cache_key.as_deref()
    }

    /// Sets the per-page callback, replacing any previous one.
    pub fn paginate_callback(&mut self, callback: impl FnMut(u32) + Send + Sync + 'static) -> &mut Self {
        self.callback = Some(Box::new(callback));
        self
    }

    #[must_use]
    pub fn is_paginating(&self) -> bool {
        self.paginating
    }

    /// Page number of the last paginated fetch.
    #[must_use]
    pub fn page(&self) -> u32 {
        self.page
    }

    /// Total records accumulated so far.
    #[must_use]
    pub fn count(&self) -> usize {
        self.count
    }

    /// Accumulated records, bypassing the cache.
    #[must_use]
    pub fn accumulated(&self) -> &[Value] {
        &self.results
    }

    /// Drops accumulated records and the count.
    pub fn reset_results(&mut self) -> &mut Self {
        self.results.clear();
        self.count = 0;
        self
    }

    pub fn set_csrf_filter(&mut self, filter: CsrfTokenFilter) -> &mut Self {
        self.csrf_filter = Some(filter);
        self
    }

    #[must_use]
    pub fn csrf_filter(&self) -> Option<&CsrfTokenFilter> {
        self.csrf_filter.as_ref()
    }

    #[must_use]
    pub fn csrf_token(&self) -> Option<&str> {
        self.csrf_token.as_deref()
    }

    /// Requests the API (at `api_url` when given) and returns the results.
    ///
    /// # Errors
    ///
    /// Returns any [`ScrapeError`] from the session request.
    #[instrument(level = "debug", skip(self, session, cache), fields(api = %self.name()))]
    pub async fn request(
        &mut self,
        session: &mut Session,
        cache: &dyn CacheStore,
        api_url: Option<&str>,
    ) -> Result<Records, ScrapeError> {
        if !self.paginating {
            self.cache_key = None;
        }
        if let Some(url) = api_url {
            self.api_url = url.to_string();
        }
        self.fetch_page(session, cache).await?;
        Ok(self.results(cache).await)
    }

    /// Fetches pages `1..` until one adds no records, the limit is reached,
    /// or the result set is found in the cache.
    ///
    /// Pagination state is cleared on every exit, errors included.
    ///
    /// # Errors
    ///
    /// Returns the first [`ScrapeError`] from a page request.
    #[instrument(level = "debug", skip(self, session, cache), fields(api = %self.name()))]
    pub async fn paginate(
        &mut self,
        session: &mut Session,
        cache: &dyn CacheStore,
        pages: PageLimit,
        api_url: Option<&str>,
    ) -> Result<Records, ScrapeError> {
        self.paginating = true;
        self.total_pages = Some(pages);
        self.cache_key = None;
        if let Some(url) = api_url {
            self.api_url = url.to_string();
        }

        let outcome = self.paginate_pages(session, cache, pages).await;
        self.paginating = false;
        outcome?;

        Ok(self.results(cache).await)
    }

    async fn paginate_pages(
        &mut self,
        session: &mut Session,
        cache: &dyn CacheStore,
        pages: PageLimit,
    ) -> Result<(), ScrapeError> {
        for page in 1..=pages.upper_bound() {
            self.page = page;
            let last_count = self.count;

            if self.fetch_page(session, cache).await? == FetchOutcome::Cached {
                debug!(page, "paginated results served from cache");
                return Ok(());
            }
            if let Some(callback) = self.callback.as_mut() {
                callback(page);
            }
            if self.count == last_count {
                debug!(page, "page added no records; stopping");
                break;
            }
        }
        info!(
            api = self.name(),
            pages = self.page,
            records = self.count,
            "pagination finished"
        );
        Ok(())
    }

    /// The result set: through the cache when caching outside pagination,
    /// otherwise the accumulated records.
    pub async fn results(&self, cache: &dyn CacheStore) -> Records {
        match self.cache_key.as_deref() {
            Some(key) if self.cache_enabled && !self.paginating => {
                cache
                    .remember(key, self.cache_ttl(), Box::new(|| self.results.clone()))
                    .await
            }
            _ => self.results.clone(),
        }
    }

    /// Fetches one page (or its cached result set) and appends the records.
    ///
    /// # Errors
    ///
    /// Returns any [`ScrapeError`] from the session request.
    pub async fn fetch_page(
        &mut self,
        session: &mut Session,
        cache: &dyn CacheStore,
    ) -> Result<FetchOutcome, ScrapeError> {
        if self.cache_enabled {
            let key = match &self.cache_key {
                Some(key) => key.clone(),
                None => {
                    let key = self.compute_cache_key();
                    self.cache_key = Some(key.clone());
                    key
                }
            };
            if let Some(records) = cache.get(&key).await {
                debug!(key = %key, records = records.len(), "cache hit");
                self.append(records);
                return Ok(FetchOutcome::Cached);
            }
        }

        let url = self.effective_url()?;
        let response = session
            .request(self.definition.method(), &url, self.request_options())
            .await?;
        let records = {
            let document = response.document();
            self.definition.parse(&document)
        };
        let added = records.len();
        debug!(url = %url, records = added, "parsed page");
        self.append(records);
        Ok(FetchOutcome::Fetched(added))
    }

    /// GETs `uri` and extracts a CSRF token with `filter`, the API filter,
    /// or the session filter, in that order.
    ///
    /// # Errors
    ///
    /// Returns [`ScrapeError::MissingCsrfFilter`] before any request when no
    /// filter has a selector.
    pub async fn fetch_csrf_token(
        &mut self,
        session: &mut Session,
        uri: &str,
        filter: Option<&CsrfTokenFilter>,
    ) -> Result<Option<CsrfToken>, ScrapeError> {
        let filter = match filter {
            Some(filter) => filter.clone(),
            None => {
                if !self.csrf_filter.as_ref().is_some_and(CsrfTokenFilter::is_configured) {
                    self.csrf_filter = Some(session.csrf_filter().clone());
                }
                self.csrf_filter.clone().unwrap_or_default()
            }
        };
        if !filter.is_configured() {
            return Err(ScrapeError::MissingCsrfFilter);
        }

        let response = session
            .request(Method::GET, uri, RequestOptions::new())
            .await?;
        let token = session.csrf_token_in(Some(&filter), response.text())?;
        if let Some(CsrfToken::Value(value)) = &token {
            self.csrf_token = Some(value.clone());
        }
        Ok(token)
    }

    /// Request URL: the endpoint plus URL parameters, plus the page parameter
    /// while paginating.
    ///
    /// # Errors
    ///
    /// Returns [`ScrapeError::InvalidUrl`] when the endpoint does not parse.
    pub fn effective_url(&self) -> Result<String, ScrapeError> {
        let mut url = Url::parse(&self.api_url).map_err(|_| ScrapeError::InvalidUrl {
            url: self.api_url.clone(),
        })?;

        let page_param = self.definition.page_param();
        let mut pairs: Vec<(&str, String)> = self
            .url_params
            .iter()
            .filter(|(key, _)| !(self.paginating && key.as_str() == page_param))
            .map(|(key, value)| (key.as_str(), value.clone()))
            .collect();
        if self.paginating {
            pairs.push((page_param, self.page.to_string()));
        }

        if !pairs.is_empty() {
            url.query_pairs_mut().extend_pairs(pairs);
        }
        Ok(url.into())
    }

    fn compute_cache_key(&self) -> String {
        let page_param = self.definition.page_param();
        let mut params = self.url_params.clone();
        if self.paginating {
            params.remove(page_param);
        }
        let pages = if self.paginating {
            self.total_pages
        } else {
            None
        };
        build_cache_key(self.name(), &self.api_url, &params, pages)
    }

    fn request_options(&self) -> RequestOptions {
        let mut options = RequestOptions::new();
        if let Some(filter) = &self.csrf_filter
            && filter.placement() == TokenPlacement::Header
            && let (Some(header), Some(token)) = (filter.field(), self.csrf_token.as_deref())
        {
            options = options.header(header, token);
        }
        options
    }

    fn append(&mut self, records: Records) {
        self.count += records.len();
        self.results.extend(records);
    }

    fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_minutes.saturating_mul(60))
    }
}

impl fmt::Debug for ScraperApi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScraperApi")
            .field("name", &self.name())
            .field("api_url", &self.api_url)
            .field("url_params", &self.url_params)
            .field("count", &self.count)
            .field("cache_enabled", &self.cache_enabled)
            .field("paginating", &self.paginating)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use scraper::Html;
    use serde_json::json;

    use super::*;

    struct Listing;

    impl ApiDefinition for Listing {
        fn name(&self) -> &str {
            "listing"
        }

        fn url(&self) -> &str {
            "https://example.com/items"
        }

        fn page_param(&self) -> &str {
            "p"
        }

        fn parse(&self, _document: &Html) -> Vec<Value> {
            Vec::new()
        }
    }

    fn api() -> ScraperApi {
        ScraperApi::new(Box::new(Listing))
    }

    #[test]
    fn test_new_uses_definition_url() {
        let api = api();
        assert_eq!(api.name(), "listing");
        assert_eq!(api.api_url(), "https://example.com/items");
        assert!(!api.requires_auth());
        assert_eq!(api.effective_url().unwrap(), "https://example.com/items");
    }

    #[test]
    fn test_params_merge_and_sort() {
        let mut api = api();
        api.params([("z", "1"), ("a", "2")]);
        api.params([("z", "3")]);
        assert_eq!(
            api.effective_url().unwrap(),
            "https://example.com/items?a=2&z=3"
        );
    }

    #[test]
    fn test_page_param_added_only_while_paginating() {
        let mut api = api();
        api.params([("q", "rust")]);
        api.paginating = true;
        api.page = 4;
        assert_eq!(
            api.effective_url().unwrap(),
            "https://example.com/items?q=rust&p=4"
        );
    }

    #[test]
    fn test_cache_key_ignores_page_param_while_paginating() {
        let mut api = api();
        api.params([("q", "rust")]);
        api.paginating = true;
        api.total_pages = Some(PageLimit::All);
        let without_page = api.compute_cache_key();

        api.params([("p", "7")]);
        assert_eq!(api.compute_cache_key(), without_page);
        assert!(without_page.ends_with(".all"));
    }

    #[test]
    fn test_reset_results_clears_count() {
        let mut api = api();
        api.append(vec![json!(1), json!(2)]);
        assert_eq!(api.count(), 2);
        api.reset_results();
        assert_eq!(api.count(), 0);
        assert!(api.accumulated().is_empty());
    }

    #[test]
    fn test_header_csrf_token_added_to_requests() {
        let mut api = api();
        api.set_csrf_filter(CsrfTokenFilter::laravel().in_header("X-CSRF-TOKEN"));
        assert!(api.request_options().headers.is_empty());

        api.csrf_token = Some("tok".to_string());
        assert_eq!(
            api.request_options().headers,
            vec![("X-CSRF-TOKEN".to_string(), "tok".to_string())]
        );
    }

    #[test]
    fn test_cache_ttl_in_minutes() {
        let mut api = api();
        api.cache(5);
        assert!(api.is_caching());
        assert_eq!(api.cache_ttl(), Duration::from_secs(300));
    }
}
