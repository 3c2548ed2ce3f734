//! Error types for session requests, login and CSRF handling.

use thiserror::Error;

use crate::config::ConfigError;
use crate::cookies::CookieError;

/// Errors raised by [`Session`](super::Session) and the API layer.
#[derive(Debug, Error)]
pub enum ScrapeError {
    /// Network-level failure (DNS, connection refused, TLS, timeout).
    #[error("network error requesting {url}: {source}")]
    Transport {
        /// The URL being requested.
        url: String,
        /// The underlying transport error.
        #[source]
        source: reqwest::Error,
    },

    /// The server answered 4xx/5xx while HTTP errors were enabled.
    #[error("HTTP {status} requesting {url}")]
    HttpStatus {
        /// The URL that returned an error status.
        url: String,
        /// The HTTP status code.
        status: u16,
    },

    /// The target is not an absolute http(s) URL.
    #[error("invalid URL: {url}")]
    InvalidUrl {
        /// The rejected URL.
        url: String,
    },

    /// A caller-supplied header name or value is not valid HTTP.
    #[error("invalid header '{name}': {reason}")]
    InvalidHeader {
        /// Header name as supplied.
        name: String,
        /// Why it was rejected.
        reason: String,
    },

    /// CSRF extraction was requested without a selector.
    #[error(
        "no CSRF token filter configured\n  Suggestion: call set_csrf_filter() or use laravel()"
    )]
    MissingCsrfFilter,

    /// A CSS selector failed to parse.
    #[error("invalid CSS selector '{selector}': {reason}")]
    InvalidSelector {
        /// The selector text.
        selector: String,
        /// Parser message.
        reason: String,
    },

    /// An auth-test URL is configured without a pattern to look for.
    #[error(
        "auth test URL is set but no pattern to look for\n  Suggestion: set auth_test.see alongside auth_test.url"
    )]
    MissingAuthPattern,

    /// The auth-test pattern is not a valid regular expression.
    #[error("invalid auth test pattern '{pattern}': {source}")]
    InvalidAuthPattern {
        /// The pattern text.
        pattern: String,
        /// Regex compile error.
        #[source]
        source: regex::Error,
    },

    /// The HTTP client could not be constructed.
    #[error("failed to build HTTP client: {0}")]
    ClientBuild(String),

    /// An API that requires a logged-in session was called while logged out.
    #[error("[AUTH] API '{name}' requires a logged-in session\n  Suggestion: call login() first")]
    AuthRequired {
        /// The API name.
        name: String,
    },

    /// Invalid configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Cookie persistence failed in a way that cannot be ignored.
    #[error(transparent)]
    Cookie(#[from] CookieError),
}

impl ScrapeError {
    pub(crate) fn transport(url: &str, source: reqwest::Error) -> Self {
        Self::Transport {
            url: url.to_string(),
            source,
        }
    }
}
