//! Facade wiring configuration, session, cache and API registry together.

use std::sync::Arc;

use scraper::Html;

use crate::api::{ApiDefinition, ApiHandle, Dispatcher};
use crate::cache::{CacheStore, MemoryCache};
use crate::config::{AuthTestConfig, ScraperConfig};
use crate::session::{
    CsrfTokenFilter, LoginOptions, LoginOutcome, Method, RequestOptions, ScrapeError,
    ScrapeResponse, Session,
};

/// Entry point: one session, one cache store, and the registered APIs.
///
/// ```no_run
/// use web_scraper::{ScraperConfig, WebScraper};
///
/// # async fn run() -> Result<(), web_scraper::ScrapeError> {
/// let mut scraper = WebScraper::new(ScraperConfig::default())?.laravel();
/// let page = scraper.get("https://example.com/").await?;
/// println!("{}", page.status());
/// # Ok(())
/// # }
/// ```
pub struct WebScraper {
    config: ScraperConfig,
    session: Session,
    dispatcher: Dispatcher,
    cache: Arc<dyn CacheStore>,
    is_laravel: bool,
}

impl WebScraper {
    /// Builds a scraper with an in-memory cache.
    ///
    /// # Errors
    ///
    /// Returns [`ScrapeError::Config`] for invalid configuration and
    /// [`ScrapeError::ClientBuild`] when the HTTP client cannot be created.
    pub fn new(config: ScraperConfig) -> Result<Self, ScrapeError> {
        let session = Session::new(&config)?;
        Ok(Self {
            config,
            session,
            dispatcher: Dispatcher::new(),
            cache: Arc::new(MemoryCache::new()),
            is_laravel: false,
        })
    }

    /// Swaps the cache store.
    #[must_use]
    pub fn with_cache_store(mut self, cache: Arc<dyn CacheStore>) -> Self {
        self.cache = cache;
        self
    }

    /// Configures the session CSRF filter for Laravel's `_token` field.
    #[must_use]
    pub fn laravel(mut self) -> Self {
        self.is_laravel = true;
        self.session.set_csrf_filter(CsrfTokenFilter::laravel());
        self
    }

    #[must_use]
    pub fn is_laravel(&self) -> bool {
        self.is_laravel
    }

    #[must_use]
    pub fn config(&self) -> &ScraperConfig {
        &self.config
    }

    /// Proxies to [`Session::request`].
    ///
    /// # Errors
    ///
    /// Same as [`Session::request`].
    pub async fn request(
        &mut self,
        method: Method,
        uri: &str,
        options: RequestOptions,
    ) -> Result<ScrapeResponse, ScrapeError> {
        self.session.request(method, uri, options).await
    }

    /// GET shorthand.
    ///
    /// # Errors
    ///
    /// Same as [`Session::request`].
    pub async fn get(&mut self, uri: &str) -> Result<ScrapeResponse, ScrapeError> {
        self.session.get(uri).await
    }

    /// Form POST shorthand.
    ///
    /// # Errors
    ///
    /// Same as [`Session::request`].
    pub async fn post(
        &mut self,
        uri: &str,
        form: Vec<(String, String)>,
    ) -> Result<ScrapeResponse, ScrapeError> {
        self.session
            .request(Method::POST, uri, RequestOptions::new().form(form))
            .await
    }

    /// Proxies to [`Session::login`].
    ///
    /// # Errors
    ///
    /// Same as [`Session::login`].
    pub async fn login(
        &mut self,
        login_page_uri: &str,
        post_data: Vec<(String, String)>,
        options: LoginOptions,
    ) -> Result<LoginOutcome, ScrapeError> {
        self.session.login(login_page_uri, post_data, options).await
    }

    /// Proxies to [`Session::check_if_logged_in`].
    ///
    /// # Errors
    ///
    /// Same as [`Session::check_if_logged_in`].
    pub async fn check_if_logged_in(&mut self) -> Result<bool, ScrapeError> {
        self.session.check_if_logged_in().await
    }

    #[must_use]
    pub fn is_logged_in(&self) -> bool {
        self.session.is_logged_in()
    }

    /// Replaces the auth check.
    pub fn set_auth_test(&mut self, auth_test: AuthTestConfig) -> &mut Self {
        self.config.auth_test = auth_test.clone();
        self.session.set_auth_test(auth_test);
        self
    }

    pub fn set_user_agent(&mut self, user_agent: impl Into<String>) -> &mut Self {
        let user_agent = user_agent.into();
        self.config.user_agent.clone_from(&user_agent);
        self.session.set_user_agent(user_agent);
        self
    }

    /// Switches the cookie file to `username`'s.
    ///
    /// # Errors
    ///
    /// Returns [`ScrapeError::Cookie`] when the new file cannot be read.
    pub fn set_username(&mut self, username: Option<&str>) -> Result<&mut Self, ScrapeError> {
        self.session.set_username(username)?;
        Ok(self)
    }

    /// Parses the last response body.
    #[must_use]
    pub fn document(&self) -> Option<Html> {
        self.session.document()
    }

    /// Registers an API definition.
    pub fn add_api(&mut self, definition: impl ApiDefinition + 'static) -> &mut Self {
        self.dispatcher.add_api(definition);
        self
    }

    /// Registers several API definitions.
    pub fn add_apis<I>(&mut self, definitions: I) -> &mut Self
    where
        I: IntoIterator<Item = Box<dyn ApiDefinition>>,
    {
        self.dispatcher.add_apis(definitions);
        self
    }

    /// Handle for the API registered as `name`; `None` (logged) when unknown.
    pub fn api(&mut self, name: &str) -> Option<ApiHandle<'_>> {
        let api = self.dispatcher.get_mut(name)?;
        Some(ApiHandle::new(api, &mut self.session, self.cache.as_ref()))
    }

    #[must_use]
    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }

    #[must_use]
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    #[must_use]
    pub fn cache_store(&self) -> &Arc<dyn CacheStore> {
        &self.cache
    }
}

impl std::fmt::Debug for WebScraper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebScraper")
            .field("session", &self.session)
            .field("dispatcher", &self.dispatcher)
            .field("is_laravel", &self.is_laravel)
            .finish_non_exhaustive()
    }
}
