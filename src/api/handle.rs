//! Borrowed view tying one API to the session and cache it runs against.

use crate::cache::{CacheStore, Records};
use crate::session::{CsrfToken, CsrfTokenFilter, ScrapeError, Session};

use super::{PageLimit, ScraperApi};

/// An API together with the session and cache it uses, as handed out by
/// [`WebScraper::api`](crate::WebScraper::api).
///
/// Requests on an API that requires authentication fail with
/// [`ScrapeError::AuthRequired`] while the session is logged out.
pub struct ApiHandle<'a> {
    api: &'a mut ScraperApi,
    session: &'a mut Session,
    cache: &'a dyn CacheStore,
}

impl<'a> ApiHandle<'a> {
    #[must_use]
    pub fn new(api: &'a mut ScraperApi, session: &'a mut Session, cache: &'a dyn CacheStore) -> Self {
        Self {
            api,
            session,
            cache,
        }
    }

    /// The underlying API state.
    #[must_use]
    pub fn state(&self) -> &ScraperApi {
        &*self.api
    }

    pub fn state_mut(&mut self) -> &mut ScraperApi {
        &mut *self.api
    }

    /// Merges URL parameters.
    #[must_use]
    pub fn params<I, K, V>(self, params: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.api.params(params);
        self
    }

    /// Enables caching for `minutes`.
    #[must_use]
    pub fn cache(self, minutes: u64) -> Self {
        self.api.cache(minutes);
        self
    }

    /// Sets the per-page callback.
    #[must_use]
    pub fn paginate_callback(self, callback: impl FnMut(u32) + Send + Sync + 'static) -> Self {
        self.api.paginate_callback(callback);
        self
    }

    /// Clears accumulated results.
    #[must_use]
    pub fn reset_results(self) -> Self {
        self.api.reset_results();
        self
    }

    /// See [`ScraperApi::request`].
    ///
    /// # Errors
    ///
    /// Returns [`ScrapeError::AuthRequired`] or any request error.
    pub async fn request(&mut self, api_url: Option<&str>) -> Result<Records, ScrapeError> {
        self.ensure_authorized()?;
        self.api.request(self.session, self.cache, api_url).await
    }

    /// See [`ScraperApi::paginate`].
    ///
    /// # Errors
    ///
    /// Returns [`ScrapeError::AuthRequired`] or any page request error.
    pub async fn paginate(
        &mut self,
        pages: PageLimit,
        api_url: Option<&str>,
    ) -> Result<Records, ScrapeError> {
        self.ensure_authorized()?;
        self.api
            .paginate(self.session, self.cache, pages, api_url)
            .await
    }

    /// See [`ScraperApi::results`].
    pub async fn results(&self) -> Records {
        self.api.results(self.cache).await
    }

    /// See [`ScraperApi::fetch_csrf_token`].
    ///
    /// # Errors
    ///
    /// Returns [`ScrapeError::MissingCsrfFilter`] or any request error.
    pub async fn fetch_csrf_token(
        &mut self,
        uri: &str,
        filter: Option<&CsrfTokenFilter>,
    ) -> Result<Option<CsrfToken>, ScrapeError> {
        self.api.fetch_csrf_token(self.session, uri, filter).await
    }

    fn ensure_authorized(&self) -> Result<(), ScrapeError> {
        if self.api.requires_auth() && !self.session.is_logged_in() {
            return Err(ScrapeError::AuthRequired {
                name: self.api.name().to_string(),
            });
        }
        Ok(())
    }
}
