//! Encryption at rest for cookie jar files.
//!
//! Payload layout: `magic (4) | nonce (24) | XChaCha20-Poly1305 ciphertext`.
//! The cipher key is the SHA-256 of the key material, which comes from (in
//! order) the configuration, `WEB_SCRAPER_COOKIE_KEY`, or a generated key kept
//! in the system keychain.

use std::env;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};

use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{Key, XChaCha20Poly1305, XNonce};
use rand::RngCore;
use sha2::{Digest, Sha256};
use tracing::debug;

use super::CookieError;

/// Environment variable consulted for key material.
pub const KEY_ENV_VAR: &str = "WEB_SCRAPER_COOKIE_KEY";

const KEYRING_SERVICE: &str = "web-scraper";
const KEYRING_ENTRY_NAME: &str = "cookie-master-key-v1";
const MAGIC: &[u8; 4] = b"WSC1";
const NONCE_LEN: usize = 24;
const KEY_LEN: usize = 32;

/// Symmetric cipher for cookie files.
#[derive(Clone)]
pub struct CookieCipher {
    key: [u8; KEY_LEN],
}

impl CookieCipher {
    /// Derives a cipher from arbitrary key material.
    #[must_use]
    pub fn from_key_material(key_material: &str) -> Self {
        let digest = Sha256::digest(key_material.as_bytes());
        let mut key = [0_u8; KEY_LEN];
        key.copy_from_slice(&digest[..KEY_LEN]);
        Self { key }
    }

    /// Resolves key material from `configured`, the environment, or the keychain.
    ///
    /// # Errors
    ///
    /// Returns [`CookieError::KeychainUnavailable`] when neither a configured
    /// key nor the env var is set and the keychain cannot be used.
    pub fn resolve(configured: Option<&str>) -> Result<Self, CookieError> {
        if let Some(key) = configured.map(str::trim).filter(|key| !key.is_empty()) {
            debug!("using configured cookie encryption key");
            return Ok(Self::from_key_material(key));
        }

        if let Some(from_env) = env::var_os(KEY_ENV_VAR) {
            let key = from_env.to_string_lossy().trim().to_string();
            if !key.is_empty() {
                debug!("using cookie encryption key from environment");
                return Ok(Self::from_key_material(&key));
            }
        }

        Ok(Self::from_key_material(&load_or_create_keychain_key()?))
    }

    /// Encrypts `plaintext` with a fresh random nonce.
    ///
    /// # Errors
    ///
    /// Returns [`CookieError::EncryptionFailed`] if the AEAD rejects the input.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, CookieError> {
        let cipher = XChaCha20Poly1305::new(Key::from_slice(&self.key));

        let mut nonce = [0_u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce);

        let ciphertext = cipher
            .encrypt(XNonce::from_slice(&nonce), plaintext)
            .map_err(|_| CookieError::EncryptionFailed)?;

        let mut output = Vec::with_capacity(MAGIC.len() + NONCE_LEN + ciphertext.len());
        output.extend_from_slice(MAGIC);
        output.extend_from_slice(&nonce);
        output.extend_from_slice(&ciphertext);
        Ok(output)
    }

    /// Decrypts a payload produced by [`encrypt`](Self::encrypt).
    ///
    /// # Errors
    ///
    /// Returns [`CookieError::InvalidPayload`] for malformed input and
    /// [`CookieError::DecryptionFailed`] for a wrong key or tampered data.
    pub fn decrypt(&self, payload: &[u8]) -> Result<Vec<u8>, CookieError> {
        if payload.len() < MAGIC.len() + NONCE_LEN || &payload[..MAGIC.len()] != MAGIC {
            return Err(CookieError::InvalidPayload);
        }

        let cipher = XChaCha20Poly1305::new(Key::from_slice(&self.key));
        let nonce_end = MAGIC.len() + NONCE_LEN;
        let nonce = XNonce::from_slice(&payload[MAGIC.len()..nonce_end]);

        cipher
            .decrypt(nonce, &payload[nonce_end..])
            .map_err(|_| CookieError::DecryptionFailed)
    }
}

impl fmt::Debug for CookieCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CookieCipher").finish_non_exhaustive()
    }
}

fn load_or_create_keychain_key() -> Result<String, CookieError> {
    let entry = catch_unwind(|| keyring::Entry::new(KEYRING_SERVICE, KEYRING_ENTRY_NAME))
        .map_err(|_| CookieError::KeychainUnavailable)?
        .map_err(|_| CookieError::KeychainUnavailable)?;

    let existing = catch_unwind(AssertUnwindSafe(|| entry.get_password()))
        .map_err(|_| CookieError::KeychainUnavailable)?;
    if let Ok(existing) = existing
        && !existing.trim().is_empty()
    {
        return Ok(existing);
    }

    let generated = generate_key_material();
    catch_unwind(AssertUnwindSafe(|| entry.set_password(&generated)))
        .map_err(|_| CookieError::KeychainUnavailable)?
        .map_err(|_| CookieError::KeychainUnavailable)?;
    debug!("generated new cookie encryption key in system keychain");
    Ok(generated)
}

fn generate_key_material() -> String {
    let mut bytes = [0_u8; KEY_LEN];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}
