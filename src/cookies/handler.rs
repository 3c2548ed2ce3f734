//! Per-(domain, username) cookie file lifecycle.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, instrument, warn};

use crate::config::CookieConfig;

use super::crypto::CookieCipher;
use super::file_name::cookie_file_path;
use super::{CookieError, CookieJar, SharedCookieJar};

/// Reads and writes the shared cookie jar to the file derived from the
/// current target URL and username.
///
/// Writes are best-effort: failures are logged and swallowed. Reads are not:
/// a file that cannot be decrypted or decoded is a hard error.
#[derive(Debug)]
pub struct CookieHandler {
    jar: Arc<SharedCookieJar>,
    config: CookieConfig,
    url: Option<String>,
    username: Option<String>,
    file_path: Option<PathBuf>,
    cipher: Option<CookieCipher>,
}

impl CookieHandler {
    /// Creates a handler with no target yet; nothing is read until
    /// [`set_url`](Self::set_url) is called.
    #[must_use]
    pub fn new(config: CookieConfig, jar: Arc<SharedCookieJar>) -> Self {
        Self {
            jar,
            config,
            url: None,
            username: None,
            file_path: None,
            cipher: None,
        }
    }

    /// The jar shared with the HTTP client.
    #[must_use]
    pub fn jar(&self) -> &Arc<SharedCookieJar> {
        &self.jar
    }

    /// Current cookie file, if a target URL has been set.
    #[must_use]
    pub fn file_path(&self) -> Option<&Path> {
        self.file_path.as_deref()
    }

    /// Current username (`None` = unauthenticated).
    #[must_use]
    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    /// Points the handler at `url`'s domain.
    ///
    /// When the derived file differs from the current one the jar is
    /// immediately re-read from it.
    ///
    /// # Errors
    ///
    /// Returns [`CookieError::InvalidUrl`] when `url` has no host, or any
    /// read error from the new file.
    pub fn set_url(&mut self, url: &str) -> Result<&mut Self, CookieError> {
        self.url = Some(url.to_string());
        self.refresh_file_path()?;
        Ok(self)
    }

    /// Switches the username, re-reading the jar from the matching file.
    ///
    /// # Errors
    ///
    /// Returns any read error from the new file.
    pub fn set_username(&mut self, username: Option<&str>) -> Result<&mut Self, CookieError> {
        self.username = username.map(str::to_string);
        self.refresh_file_path()?;
        Ok(self)
    }

    /// Loads the jar from the current file, replacing the in-memory jar.
    ///
    /// Returns the jar unchanged when there is no file (or the handler is
    /// stateless). On failure the handler drops the file, so
    /// [`write`](Self::write) cannot overwrite it.
    ///
    /// # Errors
    ///
    /// Returns [`CookieError`] when the file cannot be read, decrypted or decoded.
    #[instrument(level = "debug", skip(self), fields(path = ?self.file_path))]
    pub fn read(&mut self) -> Result<CookieJar, CookieError> {
        if let Some(path) = self.file_path.take() {
            self.adopt(path)?;
        }
        Ok(self.jar.snapshot())
    }

    /// Persists the jar to the current file. Never fails; errors are logged.
    pub fn write(&mut self) {
        if let Err(error) = self.try_write() {
            warn!(
                error = %error,
                path = ?self.file_path,
                "failed to persist cookie jar; continuing"
            );
        }
    }

    /// Deletes the current cookie file and empties the jar.
    ///
    /// # Errors
    ///
    /// Returns [`CookieError::Io`] when the file exists but cannot be removed.
    pub fn clear(&mut self) -> Result<bool, CookieError> {
        self.jar.with_mut(CookieJar::clear);
        match &self.file_path {
            Some(path) if !self.config.stateless && path.exists() => {
                fs::remove_file(path)?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn try_write(&mut self) -> Result<(), CookieError> {
        if self.config.stateless {
            return Ok(());
        }
        let Some(path) = self.file_path.clone() else {
            return Ok(());
        };

        let mut data = self.jar.snapshot().to_json()?;
        if self.config.encrypt {
            data = self.cipher()?.encrypt(&data)?;
        }
        fs::write(&path, data)?;
        set_owner_only_permissions(&path)?;
        debug!(path = %path.display(), "persisted cookie jar");
        Ok(())
    }

    fn refresh_file_path(&mut self) -> Result<(), CookieError> {
        let Some(url) = self.url.as_deref() else {
            return Ok(());
        };
        let path = cookie_file_path(
            &self.config.directory,
            &self.config.file_name,
            url,
            self.username.as_deref(),
        )?;
        if self.file_path.as_deref() == Some(path.as_path()) {
            return Ok(());
        }

        if !self.config.stateless {
            ensure_directory(&self.config.directory);
        }
        debug!(path = %path.display(), "cookie file changed");
        self.file_path = None;
        self.adopt(path)
    }

    // The path becomes current only after its contents loaded.
    fn adopt(&mut self, path: PathBuf) -> Result<(), CookieError> {
        self.load(&path)?;
        self.file_path = Some(path);
        Ok(())
    }

    fn load(&mut self, path: &Path) -> Result<(), CookieError> {
        if self.config.stateless || !path.exists() {
            return Ok(());
        }
        let mut data = fs::read(path)?;
        if self.config.encrypt {
            data = self.cipher()?.decrypt(&data)?;
        }
        let jar = CookieJar::from_json(&data)?;
        debug!(cookies = jar.len(), "loaded cookie jar from disk");
        self.jar.replace(jar);
        Ok(())
    }

    fn cipher(&mut self) -> Result<&CookieCipher, CookieError> {
        if self.cipher.is_none() {
            self.cipher = Some(CookieCipher::resolve(
                self.config.encryption_key.as_deref(),
            )?);
        }
        self.cipher.as_ref().ok_or(CookieError::EncryptionFailed)
    }
}

// Non-recursive: a missing parent is a configuration problem.
fn ensure_directory(directory: &Path) {
    if directory.exists() {
        return;
    }
    if let Err(error) = fs::create_dir(directory) {
        warn!(
            error = %error,
            directory = %directory.display(),
            "failed to create cookie directory"
        );
    }
}

#[cfg(unix)]
fn set_owner_only_permissions(path: &Path) -> Result<(), CookieError> {
    use std::os::unix::fs::PermissionsExt;

    fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
    Ok(())
}

#[cfg(not(unix))]
fn set_owner_only_permissions(_path: &Path) -> Result<(), CookieError> {
    Ok(())
}
