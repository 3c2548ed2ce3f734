//! Default User-Agent string for scraping sessions.
//!
//! Override it with `ScraperConfig::user_agent` or `Session::set_user_agent`.

/// Desktop Firefox User-Agent used when the configuration does not set one.
pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:62.0) Gecko/20100101 Firefox/62.0";
