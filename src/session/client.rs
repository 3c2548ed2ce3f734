//! Stateful HTTP session: cookies, user agent, login state and CSRF token.

use std::sync::Arc;
use std::time::Duration;

use regex::Regex;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, USER_AGENT};
use reqwest::{Client, Method};
use scraper::Html;
use tracing::{debug, info, instrument};
use url::Url;

use crate::config::{AuthTestConfig, ScraperConfig};
use crate::cookies::{CookieHandler, CookieJar, SharedCookieJar};

use super::csrf::{CsrfToken, CsrfTokenFilter, TokenPlacement, add_csrf_token_to_form};
use super::http::{HttpTimeouts, build_session_client};
use super::{LoginOptions, MergeMode, RequestOptions, ScrapeError, ScrapeResponse};

/// Result of [`Session::login`].
#[derive(Debug)]
pub enum LoginOutcome {
    /// The auth check already matched; nothing was submitted.
    AlreadyLoggedIn,
    /// The login form was posted; the session is now marked logged in.
    Submitted(ScrapeResponse),
}

/// A cookie-persisting HTTP session.
///
/// Every request reads the cookie file for the target domain, sends the
/// session user agent, and writes the jar back once the response arrives.
/// The last response body is kept so CSRF tokens can be pulled from it.
#[derive(Debug)]
pub struct Session {
    client: Client,
    no_redirect_client: Client,
    cookie_handler: CookieHandler,
    user_agent: String,
    auth_test: AuthTestConfig,
    csrf_filter: CsrfTokenFilter,
    csrf_token: Option<String>,
    is_logged_in: bool,
    last_body: Option<String>,
}

impl Session {
    /// Builds a session from `config`.
    ///
    /// # Errors
    ///
    /// Returns [`ScrapeError::Config`] for invalid configuration and
    /// [`ScrapeError::ClientBuild`] when the HTTP client cannot be created.
    /// An unreadable public suffix list is a [`ScrapeError::Cookie`].
    pub fn new(config: &ScraperConfig) -> Result<Self, ScrapeError> {
        config.validate()?;

        let jar = Arc::new(SharedCookieJar::new(CookieJar::for_config(&config.cookies)?));
        let timeouts = HttpTimeouts {
            connect_timeout: Duration::from_secs(config.connect_timeout_secs),
            read_timeout: Duration::from_secs(config.read_timeout_secs),
        };

        Ok(Self {
            client: build_session_client(&jar, timeouts, true)?,
            no_redirect_client: build_session_client(&jar, timeouts, false)?,
            cookie_handler: CookieHandler::new(config.cookies.clone(), jar),
            user_agent: config.user_agent.clone(),
            auth_test: config.auth_test.clone(),
            csrf_filter: CsrfTokenFilter::default(),
            csrf_token: None,
            is_logged_in: false,
            last_body: None,
        })
    }

    /// Sends a request and returns the buffered response.
    ///
    /// # Errors
    ///
    /// Returns [`ScrapeError::InvalidUrl`] / [`ScrapeError::InvalidHeader`]
    /// before any network activity, [`ScrapeError::Cookie`] when the cookie
    /// file cannot be read, [`ScrapeError::Transport`] for network failures,
    /// and [`ScrapeError::HttpStatus`] for 4xx/5xx when HTTP errors are on.
    #[instrument(level = "debug", skip(self, method, options), fields(method = %method))]
    pub async fn request(
        &mut self,
        method: Method,
        uri: &str,
        options: RequestOptions,
    ) -> Result<ScrapeResponse, ScrapeError> {
        let url = parse_target(uri)?;
        self.cookie_handler.set_url(url.as_str())?;
        self.merge_option_cookies(&url, &options);
        let headers = self.build_headers(&options)?;

        let client = if options.follows_redirects() {
            &self.client
        } else {
            &self.no_redirect_client
        };
        let mut builder = client.request(method, url).headers(headers);
        if !options.query.is_empty() {
            builder = builder.query(&options.query);
        }
        if let Some(form) = &options.form {
            builder = builder.form(form);
        } else if let Some(body) = options.body.clone() {
            builder = builder.body(body);
        }
        if let Some(timeout) = options.timeout {
            builder = builder.timeout(timeout);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| ScrapeError::transport(uri, e))?;
        self.cookie_handler.write();

        let status = response.status();
        let final_url = response.url().clone();
        let response_headers = response.headers().clone();
        let body = response
            .text()
            .await
            .map_err(|e| ScrapeError::transport(uri, e))?;
        debug!(status = status.as_u16(), bytes = body.len(), "response received");
        self.last_body = Some(body.clone());

        if options.raises_http_errors() && (status.is_client_error() || status.is_server_error()) {
            return Err(ScrapeError::HttpStatus {
                url: final_url.to_string(),
                status: status.as_u16(),
            });
        }

        Ok(ScrapeResponse::new(final_url, status, response_headers, body))
    }

    /// GET shorthand.
    ///
    /// # Errors
    ///
    /// Same as [`request`](Self::request).
    pub async fn get(&mut self, uri: &str) -> Result<ScrapeResponse, ScrapeError> {
        self.request(Method::GET, uri, RequestOptions::new()).await
    }

    /// Logs in by fetching `login_page_uri`, pulling the CSRF token when a
    /// filter is configured, and posting `post_data` with the token added.
    ///
    /// Does nothing when the auth check already reports a logged-in session.
    /// The session is marked logged in once the POST completes; call
    /// [`verify_login`](Self::verify_login) to confirm against the auth check.
    ///
    /// # Errors
    ///
    /// Returns any error from the auth check, the page fetch, token extraction or
    /// the POST.
    #[instrument(level = "debug", skip(self, post_data, options))]
    pub async fn login(
        &mut self,
        login_page_uri: &str,
        post_data: Vec<(String, String)>,
        options: LoginOptions,
    ) -> Result<LoginOutcome, ScrapeError> {
        if self.check_if_logged_in().await? {
            info!("session already logged in; skipping login form");
            return Ok(LoginOutcome::AlreadyLoggedIn);
        }

        self.request(Method::GET, login_page_uri, RequestOptions::new())
            .await?;
        if self.csrf_filter.is_configured() {
            self.csrf_token = None;
            self.csrf_token(None)?;
        }

        let mut form = post_data;
        let mut defaults = RequestOptions::new().allow_redirects(true);
        if let Some(token) = self.csrf_token.clone() {
            match self.csrf_filter.placement() {
                TokenPlacement::FormParam => {
                    add_csrf_token_to_form(&mut form, &self.csrf_filter, &token);
                }
                TokenPlacement::Header => {
                    if let Some(header) = self.csrf_filter.field() {
                        defaults = defaults.header(header, token);
                    }
                }
            }
        }

        let post_uri = options.post_uri.as_deref().unwrap_or(login_page_uri);
        let post_options = defaults.form(form).merged_with(options.request);
        let response = self.request(Method::POST, post_uri, post_options).await?;

        self.is_logged_in = true;
        info!(status = response.status().as_u16(), "login form submitted");
        Ok(LoginOutcome::Submitted(response))
    }

    /// Fetches the configured auth-test URL for the configured pattern.
    ///
    /// Without an auth-test URL this returns false without any network call.
    ///
    /// # Errors
    ///
    /// Returns [`ScrapeError::MissingAuthPattern`] or
    /// [`ScrapeError::InvalidAuthPattern`] before the request, and any
    /// transport or cookie error from it.
    pub async fn check_if_logged_in(&mut self) -> Result<bool, ScrapeError> {
        let Some(url) = self.auth_test.url.clone().filter(|url| !url.is_empty()) else {
            self.is_logged_in = false;
            return Ok(false);
        };
        let pattern = self
            .auth_test
            .see
            .as_deref()
            .filter(|see| !see.is_empty())
            .ok_or(ScrapeError::MissingAuthPattern)?;
        let regex = Regex::new(pattern).map_err(|source| ScrapeError::InvalidAuthPattern {
            pattern: pattern.to_string(),
            source,
        })?;

        let options = RequestOptions::new()
            .allow_redirects(true)
            .http_errors(false);
        let response = self.request(Method::GET, &url, options).await?;

        let logged_in = regex.is_match(response.text());
        debug!(logged_in, "auth check finished");
        self.is_logged_in = logged_in;
        Ok(logged_in)
    }

    /// Re-runs the auth check after a login.
    ///
    /// # Errors
    ///
    /// Same as [`check_if_logged_in`](Self::check_if_logged_in).
    pub async fn verify_login(&mut self) -> Result<bool, ScrapeError> {
        self.check_if_logged_in().await
    }

    /// Extracts a CSRF token from the last response body.
    ///
    /// `filter`, when given, is merged into the session filter first. An
    /// attribute token is remembered for the next login.
    ///
    /// # Errors
    ///
    /// Returns [`ScrapeError::MissingCsrfFilter`] when no selector is set.
    pub fn csrf_token(
        &mut self,
        filter: Option<&CsrfTokenFilter>,
    ) -> Result<Option<CsrfToken>, ScrapeError> {
        if let Some(filter) = filter {
            self.csrf_filter = self.csrf_filter.clone().merge(filter);
        }
        let body = self.last_body.clone().unwrap_or_default();
        let filter = self.csrf_filter.clone();
        self.extract_and_remember(&filter, &body)
    }

    /// Extracts a CSRF token from `body` with `filter`, or the session filter
    /// when `None`. The session filter is left untouched.
    ///
    /// # Errors
    ///
    /// Returns [`ScrapeError::MissingCsrfFilter`] when no selector is set.
    pub fn csrf_token_in(
        &mut self,
        filter: Option<&CsrfTokenFilter>,
        body: &str,
    ) -> Result<Option<CsrfToken>, ScrapeError> {
        let filter = filter.cloned().unwrap_or_else(|| self.csrf_filter.clone());
        self.extract_and_remember(&filter, body)
    }

    fn extract_and_remember(
        &mut self,
        filter: &CsrfTokenFilter,
        body: &str,
    ) -> Result<Option<CsrfToken>, ScrapeError> {
        let token = {
            let document = Html::parse_document(body);
            super::csrf::extract_csrf_token(filter, &document)?
        };
        if let Some(CsrfToken::Value(value)) = &token {
            self.csrf_token = Some(value.clone());
        }
        Ok(token)
    }

    /// Replaces the session CSRF filter.
    pub fn set_csrf_filter(&mut self, filter: CsrfTokenFilter) -> &mut Self {
        self.csrf_filter = filter;
        self
    }

    /// Sets only the selector, keeping the other filter fields.
    pub fn set_csrf_selector(&mut self, selector: impl Into<String>) -> &mut Self {
        self.csrf_filter = self
            .csrf_filter
            .clone()
            .merge(&CsrfTokenFilter::selector(selector));
        self
    }

    #[must_use]
    pub fn csrf_filter(&self) -> &CsrfTokenFilter {
        &self.csrf_filter
    }

    /// Most recently extracted attribute token.
    #[must_use]
    pub fn current_csrf_token(&self) -> Option<&str> {
        self.csrf_token.as_deref()
    }

    pub fn set_user_agent(&mut self, user_agent: impl Into<String>) -> &mut Self {
        self.user_agent = user_agent.into();
        self
    }

    #[must_use]
    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    /// Switches to the cookie file of `username` (`None` = unauthenticated).
    ///
    /// # Errors
    ///
    /// Returns [`ScrapeError::Cookie`] when the new file cannot be read.
    pub fn set_username(&mut self, username: Option<&str>) -> Result<&mut Self, ScrapeError> {
        self.cookie_handler.set_username(username)?;
        Ok(self)
    }

    pub fn set_auth_test(&mut self, auth_test: AuthTestConfig) -> &mut Self {
        self.auth_test = auth_test;
        self
    }

    #[must_use]
    pub fn auth_test(&self) -> &AuthTestConfig {
        &self.auth_test
    }

    #[must_use]
    pub fn is_logged_in(&self) -> bool {
        self.is_logged_in
    }

    pub fn set_logged_in(&mut self, logged_in: bool) -> &mut Self {
        self.is_logged_in = logged_in;
        self
    }

    /// Body of the last response, if any.
    #[must_use]
    pub fn last_body(&self) -> Option<&str> {
        self.last_body.as_deref()
    }

    /// Parses the last response body.
    #[must_use]
    pub fn document(&self) -> Option<Html> {
        self.last_body.as_deref().map(Html::parse_document)
    }

    #[must_use]
    pub fn cookie_jar(&self) -> &Arc<SharedCookieJar> {
        self.cookie_handler.jar()
    }

    #[must_use]
    pub fn cookie_handler(&self) -> &CookieHandler {
        &self.cookie_handler
    }

    pub fn cookie_handler_mut(&mut self) -> &mut CookieHandler {
        &mut self.cookie_handler
    }

    fn merge_option_cookies(&self, url: &Url, options: &RequestOptions) {
        if options.cookies.is_empty() {
            return;
        }
        let overwrite = options.merge == MergeMode::Deep;
        self.cookie_handler.jar().with_mut(|jar| {
            for (name, value) in &options.cookies {
                jar.seed(url, name, value, overwrite);
            }
        });
    }

    fn build_headers(&self, options: &RequestOptions) -> Result<HeaderMap, ScrapeError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&self.user_agent).map_err(|e| ScrapeError::InvalidHeader {
                name: USER_AGENT.to_string(),
                reason: e.to_string(),
            })?,
        );

        for (name, value) in &options.headers {
            let header_name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
                ScrapeError::InvalidHeader {
                    name: name.clone(),
                    reason: e.to_string(),
                }
            })?;
            let header_value =
                HeaderValue::from_str(value).map_err(|e| ScrapeError::InvalidHeader {
                    name: name.clone(),
                    reason: e.to_string(),
                })?;
            match options.merge {
                MergeMode::Defaults if header_name == USER_AGENT => {}
                MergeMode::Defaults => {
                    headers.append(header_name, header_value);
                }
                MergeMode::Deep => {
                    headers.insert(header_name, header_value);
                }
            }
        }
        Ok(headers)
    }
}

fn parse_target(uri: &str) -> Result<Url, ScrapeError> {
    let url = Url::parse(uri).map_err(|_| ScrapeError::InvalidUrl {
        url: uri.to_string(),
    })?;
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return Err(ScrapeError::InvalidUrl {
            url: uri.to_string(),
        });
    }
    Ok(url)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    fn session(temp: &TempDir) -> Session {
        let mut config = ScraperConfig::default();
        config.cookies.directory = temp.path().join("cookies");
        config.cookies.encrypt = false;
        Session::new(&config).unwrap()
    }

    #[test]
    fn test_parse_target_rejects_relative_and_non_http() {
        assert!(parse_target("/login").is_err());
        assert!(parse_target("ftp://example.com/").is_err());
        assert!(parse_target("https://example.com/login").is_ok());
    }

    #[test]
    fn test_session_defaults_to_logged_out_with_default_agent() {
        let temp = TempDir::new().unwrap();
        let session = session(&temp);
        assert!(!session.is_logged_in());
        assert_eq!(session.user_agent(), crate::DEFAULT_USER_AGENT);
        assert!(session.last_body().is_none());
    }

    #[test]
    fn test_defaults_merge_keeps_session_user_agent() {
        let temp = TempDir::new().unwrap();
        let session = session(&temp);
        let options = RequestOptions::new()
            .header("User-Agent", "caller")
            .header("X-Extra", "1");
        let headers = session.build_headers(&options).unwrap();
        assert_eq!(headers[USER_AGENT], crate::DEFAULT_USER_AGENT);
        assert_eq!(headers["x-extra"], "1");
    }

    #[test]
    fn test_deep_merge_lets_caller_override_user_agent() {
        let temp = TempDir::new().unwrap();
        let session = session(&temp);
        let options = RequestOptions::new()
            .header("User-Agent", "caller")
            .merge(MergeMode::Deep);
        let headers = session.build_headers(&options).unwrap();
        assert_eq!(headers[USER_AGENT], "caller");
    }

    #[test]
    fn test_invalid_header_is_rejected() {
        let temp = TempDir::new().unwrap();
        let session = session(&temp);
        let options = RequestOptions::new().header("bad header", "x");
        assert!(matches!(
            session.build_headers(&options),
            Err(ScrapeError::InvalidHeader { .. })
        ));
    }

    #[test]
    fn test_option_cookies_respect_merge_mode() {
        let temp = TempDir::new().unwrap();
        let session = session(&temp);
        let url = Url::parse("https://example.com/").unwrap();
        session
            .cookie_jar()
            .with_mut(|jar| jar.store_set_cookie("sid=server; Path=/", &url));

        session.merge_option_cookies(&url, &RequestOptions::new().cookie("sid", "caller"));
        assert_eq!(
            session.cookie_jar().snapshot().get("example.com", "/", "sid"),
            Some("server")
        );

        session.merge_option_cookies(
            &url,
            &RequestOptions::new()
                .cookie("sid", "caller")
                .merge(MergeMode::Deep),
        );
        assert_eq!(
            session.cookie_jar().snapshot().get("example.com", "/", "sid"),
            Some("caller")
        );
    }

    #[test]
    fn test_csrf_token_in_remembers_attribute_value() {
        let temp = TempDir::new().unwrap();
        let mut session = session(&temp);
        let body = r#"<input name="_token" value="tok">"#;
        let token = session
            .csrf_token_in(Some(&CsrfTokenFilter::laravel()), body)
            .unwrap();
        assert_eq!(token, Some(CsrfToken::Value("tok".to_string())));
        assert_eq!(session.current_csrf_token(), Some("tok"));
        assert!(!session.csrf_filter().is_configured());
    }

    #[test]
    fn test_csrf_token_without_filter_is_error() {
        let temp = TempDir::new().unwrap();
        let mut session = session(&temp);
        assert!(matches!(
            session.csrf_token(None),
            Err(ScrapeError::MissingCsrfFilter)
        ));
    }

    #[test]
    fn test_set_csrf_selector_keeps_attribute() {
        let temp = TempDir::new().unwrap();
        let mut session = session(&temp);
        session.set_csrf_filter(CsrfTokenFilter::laravel());
        session.set_csrf_selector("meta[name=\"csrf-token\"]");
        assert_eq!(session.csrf_filter().attribute(), Some("value"));
        assert_eq!(
            session.csrf_filter().selector_str(),
            Some("meta[name=\"csrf-token\"]")
        );
    }

    #[tokio::test]
    async fn test_check_without_auth_url_is_false_without_network() {
        let temp = TempDir::new().unwrap();
        let mut session = session(&temp);
        session.set_logged_in(true);
        assert!(!session.check_if_logged_in().await.unwrap());
        assert!(!session.is_logged_in());
        assert!(session.last_body().is_none());
    }

    #[tokio::test]
    async fn test_auth_url_without_pattern_fails_before_request() {
        let temp = TempDir::new().unwrap();
        let mut session = session(&temp);
        session.set_auth_test(AuthTestConfig {
            url: Some("http://127.0.0.1:9/".to_string()),
            see: None,
        });
        assert!(matches!(
            session.check_if_logged_in().await,
            Err(ScrapeError::MissingAuthPattern)
        ));
    }

    #[tokio::test]
    async fn test_invalid_auth_pattern_fails_before_request() {
        let temp = TempDir::new().unwrap();
        let mut session = session(&temp);
        session.set_auth_test(AuthTestConfig::new("http://127.0.0.1:9/", "(unclosed"));
        assert!(matches!(
            session.check_if_logged_in().await,
            Err(ScrapeError::InvalidAuthPattern { .. })
        ));
    }

    #[tokio::test]
    async fn test_transport_failure_does_not_persist_cookies() {
        let temp = TempDir::new().unwrap();
        let mut session = session(&temp);
        let url = Url::parse("http://127.0.0.1:9/").unwrap();
        session
            .cookie_jar()
            .with_mut(|jar| jar.seed(&url, "sid", "unsent", true));

        let result = session.get("http://127.0.0.1:9/").await;
        assert!(matches!(result, Err(ScrapeError::Transport { .. })));
        let path = session.cookie_handler().file_path().unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn test_unparsable_suffix_list_fails_session_creation() {
        let temp = TempDir::new().unwrap();
        let list = temp.path().join("suffixes.dat");
        std::fs::write(&list, "// no rules\n").unwrap();
        let mut config = ScraperConfig::default();
        config.cookies.directory = temp.path().join("cookies");
        config.cookies.public_suffix_list = Some(list);

        assert!(matches!(
            Session::new(&config),
            Err(ScrapeError::Cookie(crate::CookieError::SuffixList { .. }))
        ));
    }
}
