//! Per-request options and how they merge with session defaults.

use std::time::Duration;

/// How caller-supplied options combine with session-level values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MergeMode {
    /// Session values win; caller values only fill gaps.
    #[default]
    Defaults,
    /// Caller values override session values.
    Deep,
}

/// Options for a single [`Session::request`](super::Session::request).
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    /// Extra headers, in order.
    pub headers: Vec<(String, String)>,
    /// Cookies to seed into the jar for the target domain.
    pub cookies: Vec<(String, String)>,
    /// Query pairs appended to the URL.
    pub query: Vec<(String, String)>,
    /// Form fields sent as `application/x-www-form-urlencoded`.
    pub form: Option<Vec<(String, String)>>,
    /// Raw request body; ignored when `form` is set.
    pub body: Option<String>,
    /// Follow redirects (default true).
    pub allow_redirects: Option<bool>,
    /// Treat 4xx/5xx as errors (default true).
    pub http_errors: Option<bool>,
    /// Per-request timeout overriding the client default.
    pub timeout: Option<Duration>,
    /// Merge strategy for headers and cookies.
    pub merge: MergeMode,
}

impl RequestOptions {
    /// Empty options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a header.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Adds a cookie for the target domain.
    #[must_use]
    pub fn cookie(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.cookies.push((name.into(), value.into()));
        self
    }

    /// Adds a query pair.
    #[must_use]
    pub fn query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    /// Adds a form field, switching the request to a form body.
    #[must_use]
    pub fn form_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.form
            .get_or_insert_with(Vec::new)
            .push((name.into(), value.into()));
        self
    }

    /// Replaces the form body.
    #[must_use]
    pub fn form(mut self, fields: Vec<(String, String)>) -> Self {
        self.form = Some(fields);
        self
    }

    /// Sets a raw body.
    #[must_use]
    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Enables or disables redirect following.
    #[must_use]
    pub fn allow_redirects(mut self, allow: bool) -> Self {
        self.allow_redirects = Some(allow);
        self
    }

    /// Enables or disables error statuses as errors.
    #[must_use]
    pub fn http_errors(mut self, enabled: bool) -> Self {
        self.http_errors = Some(enabled);
        self
    }

    /// Sets a per-request timeout.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sets the merge mode.
    #[must_use]
    pub fn merge(mut self, merge: MergeMode) -> Self {
        self.merge = merge;
        self
    }

    pub(crate) fn follows_redirects(&self) -> bool {
        self.allow_redirects.unwrap_or(true)
    }

    pub(crate) fn raises_http_errors(&self) -> bool {
        self.http_errors.unwrap_or(true)
    }

    /// Layers `other` on top of `self`: list fields append, scalar fields
    /// from `other` win when set.
    #[must_use]
    pub fn merged_with(mut self, other: Self) -> Self {
        self.headers.extend(other.headers);
        self.cookies.extend(other.cookies);
        self.query.extend(other.query);
        if let Some(fields) = other.form {
            self.form.get_or_insert_with(Vec::new).extend(fields);
        }
        self.body = other.body.or(self.body);
        self.allow_redirects = other.allow_redirects.or(self.allow_redirects);
        self.http_errors = other.http_errors.or(self.http_errors);
        self.timeout = other.timeout.or(self.timeout);
        if other.merge != MergeMode::default() {
            self.merge = other.merge;
        }
        self
    }
}

/// Options for [`Session::login`](super::Session::login).
#[derive(Debug, Clone, Default)]
pub struct LoginOptions {
    /// Where the form is posted; defaults to the login page itself.
    pub post_uri: Option<String>,
    /// Extra request options for the POST, layered over the form defaults.
    pub request: RequestOptions,
}

impl LoginOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Posts the form to `uri` instead of the login page.
    #[must_use]
    pub fn post_to(mut self, uri: impl Into<String>) -> Self {
        self.post_uri = Some(uri.into());
        self
    }

    /// Extra options for the login POST.
    #[must_use]
    pub fn request(mut self, request: RequestOptions) -> Self {
        self.request = request;
        self
    }
}
