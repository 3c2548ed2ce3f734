//! Scraper configuration loading and validation.
//!
//! Every component receives its settings through [`ScraperConfig`]; nothing
//! reads global state at construction time. Configuration files are JSON:
//!
//! ```json
//! {
//!   "user_agent": "Mozilla/5.0 ...",
//!   "cookies": { "directory": "cookies", "encrypt": true },
//!   "auth_test": { "url": "https://example.com/account", "see": "Sign out" }
//! }
//! ```

use std::env;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::user_agent::DEFAULT_USER_AGENT;

/// Default cookie file name template.
pub const DEFAULT_COOKIE_FILE_NAME: &str = "{domain}-{username}.dat";

/// Default directory (relative to the working directory) for cookie files.
pub const DEFAULT_COOKIE_DIRECTORY: &str = "cookies";

const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
const DEFAULT_READ_TIMEOUT_SECS: u64 = 30;
const CONFIG_DIR_NAME: &str = "web-scraper";
const CONFIG_FILE_NAME: &str = "config.json";

/// Errors raised while loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read config file '{path}': {source}")]
    Read {
        /// Path that failed to load.
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// The configuration file is not valid JSON for [`ScraperConfig`].
    #[error("failed to parse config file '{path}': {source}")]
    Parse {
        /// Path that failed to parse.
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    /// A configuration value is out of range or inconsistent.
    #[error("invalid config value for `{field}`: {reason}")]
    Invalid {
        /// Dotted field name.
        field: &'static str,
        /// What is wrong with it.
        reason: String,
    },
}

/// Top-level configuration for a scraping session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScraperConfig {
    /// User-Agent header sent with every request.
    pub user_agent: String,
    /// Cookie persistence settings.
    pub cookies: CookieConfig,
    /// Authentication check used by login and `check_if_logged_in`.
    pub auth_test: AuthTestConfig,
    /// TCP connect timeout for the HTTP client.
    pub connect_timeout_secs: u64,
    /// Whole-request timeout for the HTTP client.
    pub read_timeout_secs: u64,
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            cookies: CookieConfig::default(),
            auth_test: AuthTestConfig::default(),
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            read_timeout_secs: DEFAULT_READ_TIMEOUT_SECS,
        }
    }
}

/// Cookie jar persistence settings.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CookieConfig {
    /// Keep cookies in memory only; never read or write cookie files.
    pub stateless: bool,
    /// Encrypt cookie files at rest.
    pub encrypt: bool,
    /// Directory holding cookie files. Created (non-recursively) on demand.
    pub directory: PathBuf,
    /// File name template with `{domain}` and `{username}` placeholders.
    pub file_name: String,
    /// Key material for cookie encryption. Falls back to the
    /// `WEB_SCRAPER_COOKIE_KEY` environment variable, then the system keychain.
    pub encryption_key: Option<String>,
    /// Public suffix list file (`public_suffix_list.dat` format). Without it
    /// only single-label `Domain` attributes are rejected.
    pub public_suffix_list: Option<PathBuf>,
}

impl Default for CookieConfig {
    fn default() -> Self {
        Self {
            stateless: false,
            encrypt: true,
            directory: PathBuf::from(DEFAULT_COOKIE_DIRECTORY),
            file_name: DEFAULT_COOKIE_FILE_NAME.to_string(),
            encryption_key: None,
            public_suffix_list: None,
        }
    }
}

// Key material is redacted.
impl fmt::Debug for CookieConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CookieConfig")
            .field("stateless", &self.stateless)
            .field("encrypt", &self.encrypt)
            .field("directory", &self.directory)
            .field("file_name", &self.file_name)
            .field(
                "encryption_key",
                &self.encryption_key.as_ref().map(|_| "[REDACTED]"),
            )
            .field("public_suffix_list", &self.public_suffix_list)
            .finish()
    }
}

/// URL to fetch and the pattern whose presence proves an authenticated session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthTestConfig {
    /// Page to fetch when checking the login state.
    pub url: Option<String>,
    /// Case-sensitive regular expression searched for in that page.
    pub see: Option<String>,
}

impl AuthTestConfig {
    /// Creates an auth check for `url` expecting `see` in the response body.
    #[must_use]
    pub fn new(url: impl Into<String>, see: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            see: Some(see.into()),
        }
    }
}

impl ScraperConfig {
    /// Parses configuration from a JSON string and validates it.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed JSON and
    /// [`ConfigError::Invalid`] when validation fails.
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(raw).map_err(|source| ConfigError::Parse {
            path: PathBuf::from("<inline>"),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Loads and validates configuration from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the file cannot be read, parsed or validated.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Loads the default config file if present, otherwise returns defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when an existing file is unreadable or invalid.
    pub fn load_default() -> Result<Self, ConfigError> {
        match resolve_default_config_path() {
            Some(path) if path.exists() => Self::from_file(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Validates config values.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.user_agent.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "user_agent",
                reason: "must not be empty".to_string(),
            });
        }
        if !self.cookies.file_name.contains("{domain}") {
            return Err(ConfigError::Invalid {
                field: "cookies.file_name",
                reason: format!(
                    "template '{}' must contain the {{domain}} placeholder",
                    self.cookies.file_name
                ),
            });
        }
        if self.auth_test.url.is_some() && self.auth_test.see.is_none() {
            return Err(ConfigError::Invalid {
                field: "auth_test.see",
                reason: "required when auth_test.url is set".to_string(),
            });
        }
        validate_timeout_secs("connect_timeout_secs", self.connect_timeout_secs)?;
        validate_timeout_secs("read_timeout_secs", self.read_timeout_secs)?;
        Ok(())
    }
}

fn validate_timeout_secs(field: &'static str, value: u64) -> Result<(), ConfigError> {
    if !(1..=3600).contains(&value) {
        return Err(ConfigError::Invalid {
            field,
            reason: format!("{value}. Expected range: 1..=3600"),
        });
    }
    Ok(())
}

/// Resolves the default config path.
///
/// Priority:
/// 1. `$XDG_CONFIG_HOME/web-scraper/config.json`
/// 2. `$HOME/.config/web-scraper/config.json`
#[must_use]
pub fn resolve_default_config_path() -> Option<PathBuf> {
    resolve_config_path(env_var_non_empty("XDG_CONFIG_HOME"), env_var_non_empty("HOME"))
}

fn resolve_config_path(xdg_config_home: Option<PathBuf>, home: Option<PathBuf>) -> Option<PathBuf> {
    if let Some(xdg) = xdg_config_home {
        return Some(xdg.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME));
    }
    let home = home?;
    Some(
        home.join(".config")
            .join(CONFIG_DIR_NAME)
            .join(CONFIG_FILE_NAME),
    )
}

fn env_var_non_empty(name: &str) -> Option<PathBuf> {
    let value = env::var_os(name)?;
    if value.to_string_lossy().trim().is_empty() {
        None
    } else {
        Some(PathBuf::from(value))
    }
}
