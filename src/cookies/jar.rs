//! Cookie jar backed by `cookie_store` and its reqwest cookie-store adapter.

use std::convert::Infallible;
use std::fmt;
use std::fs;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use cookie_store::{CookieDomain, CookieStore, RawCookie};
use publicsuffix::List;
use reqwest::header::HeaderValue;
use tracing::{debug, trace};
use url::Url;

use crate::config::CookieConfig;

use super::CookieError;

/// RFC 6265 cookie storage with a public-suffix guard on `Domain` attributes.
///
/// Persists as the JSON array written by `cookie_store::serde::json`,
/// session cookies included.
#[derive(Clone, Default)]
pub struct CookieJar {
    store: CookieStore,
    public_suffixes: Option<Arc<List>>,
}

impl CookieJar {
    /// Creates an empty jar that only rejects single-label `Domain` attributes.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty jar that rejects `Domain` attributes naming any
    /// suffix in `list`.
    #[must_use]
    pub fn with_public_suffixes(list: List) -> Self {
        Self {
            store: CookieStore::default(),
            public_suffixes: Some(Arc::new(list)),
        }
    }

    /// Creates an empty jar using the suffix list named in `config`, if any.
    ///
    /// # Errors
    ///
    /// Returns [`CookieError::Io`] when the list file cannot be read and
    /// [`CookieError::SuffixList`] when it does not parse.
    pub fn for_config(config: &CookieConfig) -> Result<Self, CookieError> {
        let Some(path) = config.public_suffix_list.as_deref() else {
            return Ok(Self::new());
        };
        let bytes = fs::read(path)?;
        let list = List::from_bytes(&bytes).map_err(|error| CookieError::SuffixList {
            path: path.to_path_buf(),
            reason: error.to_string(),
        })?;
        debug!(path = %path.display(), "loaded public suffix list");
        Ok(Self::with_public_suffixes(list))
    }

    /// Decodes a persisted jar, dropping cookies that expired since.
    ///
    /// # Errors
    ///
    /// Returns [`CookieError::Store`] when `bytes` is not a cookie array.
    pub fn from_json(bytes: &[u8]) -> Result<Self, CookieError> {
        let store = cookie_store::serde::json::load(bytes).map_err(CookieError::store)?;
        Ok(Self {
            store,
            public_suffixes: None,
        })
    }

    /// Encodes the unexpired cookies, session cookies included.
    ///
    /// # Errors
    ///
    /// Returns [`CookieError::Store`] when serialization fails.
    pub fn to_json(&self) -> Result<Vec<u8>, CookieError> {
        let Ok(live) = CookieStore::from_cookies(
            self.store.iter_unexpired().cloned().map(Ok::<_, Infallible>),
            false,
        );
        let mut buffer = Vec::new();
        cookie_store::serde::json::save_incl_expired_and_nonpersistent(&live, &mut buffer)
            .map_err(CookieError::store)?;
        Ok(buffer)
    }

    /// Number of unexpired cookies.
    #[must_use]
    pub fn len(&self) -> usize {
        self.store.iter_unexpired().count()
    }

    /// Returns true when the jar holds no unexpired cookies.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sorted names of the unexpired cookies.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .store
            .iter_unexpired()
            .map(|cookie| cookie.name().to_string())
            .collect();
        names.sort();
        names
    }

    /// Value of the unexpired cookie stored under `domain`, `path` and `name`.
    #[must_use]
    pub fn get(&self, domain: &str, path: &str, name: &str) -> Option<&str> {
        self.store
            .get(domain, path, name)
            .map(|cookie| cookie.value())
    }

    /// Stores a `Set-Cookie` header received from `url`.
    ///
    /// Returns true when the header updated the jar. An expired cookie
    /// deletes its stored counterpart.
    pub fn store_set_cookie(&mut self, header: &str, url: &Url) -> bool {
        let mut raw = match RawCookie::parse(header.to_string()) {
            Ok(raw) => raw,
            Err(error) => {
                trace!(url = %url, error = %error, "ignoring malformed Set-Cookie header");
                return false;
            }
        };
        if !self.accept_domain_attribute(&mut raw, url) {
            debug!(
                name = raw.name(),
                domain = ?raw.domain(),
                "rejecting cookie scoped to a public suffix"
            );
            return false;
        }
        match self.store.insert_raw(&raw, url) {
            Ok(action) => {
                debug!(name = raw.name(), ?action, "storing cookie from response");
                true
            }
            Err(error) => {
                trace!(name = raw.name(), ?error, "ignoring unusable Set-Cookie header");
                false
            }
        }
    }

    /// Adds `name=value` as a host-only cookie on path `/` for `url`.
    ///
    /// Without `overwrite` an unexpired cookie of the same name is kept.
    /// Returns true when the cookie was stored.
    pub fn seed(&mut self, url: &Url, name: &str, value: &str, overwrite: bool) -> bool {
        let Some(host) = url.host_str() else {
            return false;
        };
        if !overwrite && self.store.contains(host, "/", name) {
            return false;
        }
        let raw = RawCookie::build((name.to_string(), value.to_string()))
            .path("/")
            .build();
        self.store.insert_raw(&raw, url).is_ok()
    }

    /// Builds the `Cookie` request header for `url`.
    #[must_use]
    pub fn header_for(&self, url: &Url) -> Option<String> {
        let header = self
            .store
            .get_request_values(url)
            .map(|(name, value)| format!("{name}={value}"))
            .collect::<Vec<_>>()
            .join("; ");
        (!header.is_empty()).then_some(header)
    }

    /// Removes every cookie. The suffix list is kept.
    pub fn clear(&mut self) {
        self.store.clear();
    }

    // A `Domain` naming a public suffix is only honoured when it is the
    // request host itself, and then as a host-only cookie.
    fn accept_domain_attribute(&self, raw: &mut RawCookie<'static>, url: &Url) -> bool {
        let Some(domain) = raw
            .domain()
            .map(|domain| domain.trim().trim_start_matches('.').to_ascii_lowercase())
            .filter(|domain| !domain.is_empty())
        else {
            return true;
        };
        if !self.is_public_suffix(&domain) {
            return true;
        }
        let host = url.host_str().map(str::to_ascii_lowercase);
        if host.as_deref() == Some(domain.as_str()) {
            raw.unset_domain();
            return true;
        }
        false
    }

    fn is_public_suffix(&self, domain: &str) -> bool {
        match &self.public_suffixes {
            Some(list) => CookieDomain::Suffix(domain.to_string()).is_public_suffix(list),
            None => !domain.contains('.'),
        }
    }
}

// Values stay out of logs.
impl fmt::Debug for CookieJar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CookieJar")
            .field("cookies", &self.names())
            .field("public_suffixes", &self.public_suffixes.is_some())
            .finish()
    }
}

/// A [`CookieJar`] shared between the session and the HTTP client.
///
/// Implements [`reqwest::cookie::CookieStore`] so redirects and every response
/// update the same jar that gets persisted.
#[derive(Debug, Default)]
pub struct SharedCookieJar {
    inner: RwLock<CookieJar>,
}

impl SharedCookieJar {
    /// Wraps an existing jar.
    #[must_use]
    pub fn new(jar: CookieJar) -> Self {
        Self {
            inner: RwLock::new(jar),
        }
    }

    /// Returns a copy of the current jar.
    #[must_use]
    pub fn snapshot(&self) -> CookieJar {
        self.read().clone()
    }

    /// Replaces the stored cookies with those of `jar`, keeping this jar's
    /// suffix list.
    pub fn replace(&self, jar: CookieJar) {
        self.write().store = jar.store;
    }

    /// Runs `f` with mutable access to the jar.
    pub fn with_mut<R>(&self, f: impl FnOnce(&mut CookieJar) -> R) -> R {
        f(&mut self.write())
    }

    fn read(&self) -> RwLockReadGuard<'_, CookieJar> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, CookieJar> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl reqwest::cookie::CookieStore for SharedCookieJar {
    fn set_cookies(&self, cookie_headers: &mut dyn Iterator<Item = &HeaderValue>, url: &Url) {
        let mut jar = self.write();
        for header in cookie_headers {
            if let Ok(raw) = std::str::from_utf8(header.as_bytes()) {
                jar.store_set_cookie(raw, url);
            }
        }
    }

    fn cookies(&self, url: &Url) -> Option<HeaderValue> {
        let header = self.read().header_for(url)?;
        HeaderValue::from_str(&header).ok()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use reqwest::cookie::CookieStore as _;

    use super::*;

    fn url(raw: &str) -> Url {
        Url::parse(raw).unwrap()
    }

    fn suffix_list() -> List {
        "// ===BEGIN ICANN DOMAINS===\ncom\nuk\nco.uk\n// ===END ICANN DOMAINS===\n"
            .parse()
            .unwrap()
    }

    #[test]
    fn test_set_cookie_replaces_same_identity() {
        let mut jar = CookieJar::new();
        let target = url("https://example.com/");
        assert!(jar.store_set_cookie("a=1; Path=/", &target));
        assert!(jar.store_set_cookie("b=2; Path=/", &target));
        assert!(jar.store_set_cookie("a=3; Path=/", &target));

        assert_eq!(jar.len(), 2);
        assert_eq!(jar.get("example.com", "/", "a"), Some("3"));
    }

    #[test]
    fn test_expired_set_cookie_deletes_existing() {
        let mut jar = CookieJar::new();
        let target = url("https://example.com/");
        jar.store_set_cookie("sid=abc; Path=/", &target);
        assert_eq!(jar.len(), 1);

        jar.store_set_cookie("sid=; Path=/; Max-Age=0", &target);
        assert!(jar.is_empty());
        assert!(jar.header_for(&target).is_none());
    }

    #[test]
    fn test_single_label_domain_attribute_is_rejected() {
        let mut jar = CookieJar::new();
        let target = url("https://example.com/");
        assert!(!jar.store_set_cookie("sid=x; Domain=com; Path=/", &target));
        assert!(!jar.store_set_cookie("sid=x; Domain=.com; Path=/", &target));
        assert!(jar.is_empty());
        assert!(jar.header_for(&url("https://other.com/")).is_none());
    }

    #[test]
    fn test_listed_suffix_domain_attribute_is_rejected() {
        let mut jar = CookieJar::with_public_suffixes(suffix_list());
        let target = url("https://shop.example.co.uk/");
        assert!(!jar.store_set_cookie("sid=x; Domain=co.uk; Path=/", &target));
        assert!(jar.is_empty());

        assert!(jar.store_set_cookie("sid=y; Domain=example.co.uk; Path=/", &target));
        let header = jar.header_for(&url("https://www.example.co.uk/")).unwrap();
        assert_eq!(header, "sid=y");
    }

    #[test]
    fn test_suffix_domain_equal_to_host_becomes_host_only() {
        let mut jar = CookieJar::new();
        let target = url("http://localhost/");
        assert!(jar.store_set_cookie("sid=local; Domain=localhost; Path=/", &target));
        assert_eq!(jar.get("localhost", "/", "sid"), Some("local"));
    }

    #[test]
    fn test_seed_respects_overwrite_flag() {
        let mut jar = CookieJar::new();
        let target = url("https://example.com/page");
        jar.store_set_cookie("sid=server; Path=/", &target);

        assert!(!jar.seed(&target, "sid", "caller", false));
        assert_eq!(jar.get("example.com", "/", "sid"), Some("server"));

        assert!(jar.seed(&target, "sid", "caller", true));
        assert_eq!(jar.get("example.com", "/", "sid"), Some("caller"));

        assert!(jar.seed(&target, "lang", "en", false));
        assert_eq!(jar.len(), 2);
    }

    #[test]
    fn test_cookies_never_sent_to_other_domains() {
        let mut jar = CookieJar::new();
        jar.seed(&url("https://example.com/"), "sid", "secret", true);
        assert!(jar.header_for(&url("https://other.com/")).is_none());
        assert!(jar.header_for(&url("https://sub.example.com/")).is_none());
    }

    #[test]
    fn test_header_only_includes_matching_paths() {
        let mut jar = CookieJar::new();
        let target = url("https://example.com/app/login");
        jar.store_set_cookie("root=1; Path=/", &target);
        jar.store_set_cookie("nested=2; Path=/app", &target);

        let outside = jar.header_for(&url("https://example.com/other")).unwrap();
        assert_eq!(outside, "root=1");

        let inside = jar.header_for(&url("https://example.com/app/page")).unwrap();
        assert!(inside.contains("nested=2"));
        assert!(inside.contains("root=1"));
    }

    #[test]
    fn test_json_keeps_session_cookies_and_drops_expired() {
        let mut jar = CookieJar::new();
        let target = url("https://example.com/");
        jar.store_set_cookie("session=1; Path=/", &target);
        jar.store_set_cookie("kept=2; Path=/; Max-Age=3600", &target);
        jar.store_set_cookie("gone=3; Path=/", &target);
        jar.store_set_cookie("gone=; Path=/; Max-Age=0", &target);

        let bytes = jar.to_json().unwrap();
        assert_eq!(bytes.first(), Some(&b'['));

        let restored = CookieJar::from_json(&bytes).unwrap();
        assert_eq!(restored.names(), vec!["kept", "session"]);
        assert_eq!(restored.get("example.com", "/", "session"), Some("1"));
    }

    #[test]
    fn test_from_json_rejects_garbage() {
        let result = CookieJar::from_json(b"{ not a jar");
        assert!(matches!(result, Err(CookieError::Store(_))));
    }

    #[test]
    fn test_debug_output_hides_values() {
        let mut jar = CookieJar::new();
        jar.seed(&url("https://example.com/"), "sid", "top-secret", true);
        let rendered = format!("{jar:?}");
        assert!(rendered.contains("sid"));
        assert!(!rendered.contains("top-secret"));
    }

    #[test]
    fn test_replace_keeps_suffix_list() {
        let shared = SharedCookieJar::new(CookieJar::with_public_suffixes(suffix_list()));
        shared.replace(CookieJar::new());
        let stored = shared.with_mut(|jar| {
            jar.store_set_cookie("sid=x; Domain=co.uk", &url("https://example.co.uk/"))
        });
        assert!(!stored);
    }

    #[test]
    fn test_for_config_reads_suffix_list_file() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("public_suffix_list.dat");
        fs::write(
            &path,
            "// ===BEGIN ICANN DOMAINS===\nco.uk\n// ===END ICANN DOMAINS===\n",
        )
        .unwrap();
        let config = CookieConfig {
            public_suffix_list: Some(path),
            ..CookieConfig::default()
        };

        let mut jar = CookieJar::for_config(&config).unwrap();
        assert!(!jar.store_set_cookie("sid=x; Domain=co.uk", &url("https://a.co.uk/")));
    }

    #[test]
    fn test_for_config_rejects_unusable_list() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("empty.dat");
        fs::write(&path, "// nothing here\n").unwrap();
        let config = CookieConfig {
            public_suffix_list: Some(path),
            ..CookieConfig::default()
        };

        let result = CookieJar::for_config(&config);
        assert!(matches!(result, Err(CookieError::SuffixList { .. })));
    }

    #[test]
    fn test_shared_jar_acts_as_reqwest_cookie_store() {
        let shared = SharedCookieJar::default();
        let target = url("https://example.com/login");
        let set_cookie = HeaderValue::from_static("sid=abc; Path=/");
        shared.set_cookies(&mut std::iter::once(&set_cookie), &target);

        let sent = shared.cookies(&url("https://example.com/home")).unwrap();
        assert_eq!(sent.to_str().unwrap(), "sid=abc");
        assert_eq!(shared.snapshot().len(), 1);
    }
}
