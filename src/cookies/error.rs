//! Error types for cookie persistence.

use std::path::PathBuf;

use thiserror::Error;

/// Errors for cookie jar persistence operations.
#[derive(Debug, Error)]
pub enum CookieError {
    /// Filesystem I/O failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// The persisted jar could not be encoded or decoded.
    #[error("cookie jar serialization failed: {0}")]
    Store(String),
    /// The configured public suffix list is unusable.
    #[error("invalid public suffix list {}: {reason}", path.display())]
    SuffixList {
        /// File the list was read from.
        path: PathBuf,
        /// Parser message.
        reason: String,
    },
    /// The target URL has no host to derive a cookie file name from.
    #[error("cannot derive cookie file name: '{url}' has no host")]
    InvalidUrl {
        /// The offending URL.
        url: String,
    },
    /// Could not access keychain and no configured or env key was provided.
    #[error(
        "unable to access system keychain for cookie encryption key\n  Suggestion: set WEB_SCRAPER_COOKIE_KEY or `cookies.encryption_key`"
    )]
    KeychainUnavailable,
    /// Stored encrypted payload is malformed.
    #[error("persisted cookie payload is invalid")]
    InvalidPayload,
    /// Encryption failed.
    #[error("failed to encrypt cookie jar")]
    EncryptionFailed,
    /// Decryption failed (wrong key or tampered file).
    #[error(
        "failed to decrypt cookie jar\n  Suggestion: the file was written with a different key; delete it or restore the original key"
    )]
    DecryptionFailed,
}

impl CookieError {
    pub(crate) fn store(error: cookie_store::Error) -> Self {
        Self::Store(error.to_string())
    }
}
