//! HTTP client construction shared by the redirecting and non-redirecting
//! session clients.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::Duration;

use reqwest::redirect::Policy;
use reqwest::{Client, ClientBuilder, Proxy};
use tracing::warn;

use crate::cookies::SharedCookieJar;

use super::ScrapeError;

/// Timeouts applied to every session client.
#[derive(Debug, Clone, Copy)]
pub(crate) struct HttpTimeouts {
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
}

/// Builds a client bound to `jar`. Redirects are followed unless
/// `follow_redirects` is false.
pub(crate) fn build_session_client(
    jar: &Arc<SharedCookieJar>,
    timeouts: HttpTimeouts,
    follow_redirects: bool,
) -> Result<Client, ScrapeError> {
    match try_build_client(jar, timeouts, follow_redirects, false) {
        Ok(client) => Ok(client),
        Err(BuildClientFailure::Panic) => {
            // Some sandboxed environments panic while reading system proxy
            // settings; retry with env proxies only.
            warn!("HTTP client hit system proxy panic; using env-proxy fallback builder");
            match try_build_client(jar, timeouts, follow_redirects, true) {
                Ok(client) => Ok(client),
                Err(BuildClientFailure::Panic) => Err(ScrapeError::ClientBuild(
                    "client construction panicked while initializing networking".to_string(),
                )),
                Err(BuildClientFailure::Build(error)) => {
                    Err(ScrapeError::ClientBuild(error.to_string()))
                }
            }
        }
        Err(BuildClientFailure::Build(error)) => Err(ScrapeError::ClientBuild(error.to_string())),
    }
}

enum BuildClientFailure {
    Panic,
    Build(reqwest::Error),
}

fn try_build_client(
    jar: &Arc<SharedCookieJar>,
    timeouts: HttpTimeouts,
    follow_redirects: bool,
    disable_system_proxy_lookup: bool,
) -> Result<Client, BuildClientFailure> {
    let jar = Arc::clone(jar);
    catch_unwind(AssertUnwindSafe(move || {
        let mut builder = base_builder(jar, timeouts, follow_redirects);
        if disable_system_proxy_lookup {
            builder = apply_env_proxy_fallback(builder.no_proxy());
        }
        builder.build().map_err(BuildClientFailure::Build)
    }))
    .map_err(|_| BuildClientFailure::Panic)?
}

fn base_builder(
    jar: Arc<SharedCookieJar>,
    timeouts: HttpTimeouts,
    follow_redirects: bool,
) -> ClientBuilder {
    let builder = Client::builder()
        .connect_timeout(timeouts.connect_timeout)
        .timeout(timeouts.read_timeout)
        .gzip(true)
        .cookie_provider(jar);

    if follow_redirects {
        builder
    } else {
        builder.redirect(Policy::none())
    }
}

fn apply_env_proxy_fallback(mut builder: ClientBuilder) -> ClientBuilder {
    if let Some(proxy) = env_proxy_for_scheme("https")
        && let Ok(resolved) = Proxy::https(&proxy)
    {
        builder = builder.proxy(resolved);
    }
    if let Some(proxy) = env_proxy_for_scheme("http")
        && let Ok(resolved) = Proxy::http(&proxy)
    {
        builder = builder.proxy(resolved);
    }
    builder
}

fn env_proxy_for_scheme(scheme: &str) -> Option<String> {
    let names: &[&str] = match scheme {
        "https" => &["HTTPS_PROXY", "https_proxy", "ALL_PROXY", "all_proxy"],
        "http" => &["HTTP_PROXY", "http_proxy", "ALL_PROXY", "all_proxy"],
        _ => return None,
    };
    names.iter().find_map(|name| {
        std::env::var(name)
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_builds_both_redirect_variants() {
        let jar = Arc::new(SharedCookieJar::default());
        let timeouts = HttpTimeouts {
            connect_timeout: Duration::from_secs(1),
            read_timeout: Duration::from_secs(1),
        };
        assert!(build_session_client(&jar, timeouts, true).is_ok());
        assert!(build_session_client(&jar, timeouts, false).is_ok());
    }

    #[test]
    fn test_unknown_scheme_has_no_proxy() {
        assert!(env_proxy_for_scheme("ftp").is_none());
    }
}
