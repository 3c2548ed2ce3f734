//! Cookie file naming from the `{domain}` / `{username}` template.

use std::path::{Path, PathBuf};

use url::Url;

use super::CookieError;

/// Username substituted when the session has none.
pub const UNAUTHENTICATED_USERNAME: &str = "unauthenticated";

/// Substitutes `{domain}` and `{username}` in `template`.
///
/// Both values are reduced to their last path segment so they cannot point
/// outside the cookie directory. An empty username counts as absent.
#[must_use]
pub fn format_file_name(template: &str, domain: &str, username: Option<&str>) -> String {
    let username = username
        .filter(|name| !name.is_empty())
        .unwrap_or(UNAUTHENTICATED_USERNAME);

    template
        .replace("{domain}", last_segment(domain))
        .replace("{username}", last_segment(username))
}

/// Builds the full cookie file path for `url` inside `directory`.
///
/// # Errors
///
/// Returns [`CookieError::InvalidUrl`] when `url` has no host.
pub fn cookie_file_path(
    directory: &Path,
    template: &str,
    url: &str,
    username: Option<&str>,
) -> Result<PathBuf, CookieError> {
    let parsed = Url::parse(url).map_err(|_| CookieError::InvalidUrl {
        url: url.to_string(),
    })?;
    let Some(host) = parsed.host_str() else {
        return Err(CookieError::InvalidUrl {
            url: url.to_string(),
        });
    };
    Ok(directory.join(format_file_name(template, host, username)))
}

fn last_segment(value: &str) -> &str {
    value.rsplit(['/', '\\']).next().unwrap_or(value)
}
