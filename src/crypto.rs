//! Password-based encryption for synced mirror data.
//!
//! Blobs are sealed with AES-256-GCM. The working key is derived from the sync
//! password with PBKDF2-HMAC-SHA256. Passwords that are exactly 64 hex
//! characters are treated as raw keys written by older releases and take the
//! legacy path: the decoded bytes are hashed once with SHA-256.
//!
//! Blob layout: `salt(16) || nonce(12) || ciphertext || tag(16)`.
//!
//! Individual field values (API keys inside a snapshot) are sealed the same
//! way and rendered as `enc:BASE64` so callers can tell ciphertext from
//! plaintext at a glance.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use hmac::Hmac;
use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use thiserror::Error;

/// Key length in bytes (256 bits for AES-256)
const KEY_LENGTH: usize = 32;

/// Nonce length in bytes (96 bits for AES-GCM)
const NONCE_LENGTH: usize = 12;

/// Salt length for PBKDF2
const SALT_LENGTH: usize = 16;

/// GCM authentication tag length
const TAG_LENGTH: usize = 16;

/// Derived keys kept per engine before the cache is reset.
const KEY_CACHE_CAPACITY: usize = 32;

/// PBKDF2 iteration count for new passwords.
pub const PBKDF2_ITERATIONS: u32 = 100_000;

/// Length of a legacy raw key rendered as hex.
pub const LEGACY_KEY_HEX_LENGTH: usize = KEY_LENGTH * 2;

/// Prefix marking an individually encrypted field value.
pub const ENCRYPTED_FIELD_PREFIX: &str = "enc:";

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Sync password must not be empty")]
    EmptyPassword,

    #[error("Ciphertext is truncated or malformed")]
    InvalidCiphertext,

    #[error("Decryption failed: invalid password or corrupted data")]
    AuthenticationFailed,

    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("Invalid encoding: {0}")]
    Encoding(String),
}

/// How the working key is obtained from the password.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyScheme {
    /// PBKDF2-HMAC-SHA256 over the password, salted per blob.
    Pbkdf2,
    /// Password is a 64-char hex raw key; SHA-256 of the raw bytes.
    LegacyRawKey,
}

impl KeyScheme {
    /// Pick the scheme implied by the shape of the password.
    pub fn for_password(password: &str) -> Self {
        if is_legacy_key(password) {
            Self::LegacyRawKey
        } else {
            Self::Pbkdf2
        }
    }
}

/// Check whether a password looks like a legacy raw key (exactly 64 hex chars).
pub fn is_legacy_key(password: &str) -> bool {
    password.len() == LEGACY_KEY_HEX_LENGTH && password.chars().all(|c| c.is_ascii_hexdigit())
}

/// Check if a field value carries the encrypted-field prefix.
pub fn is_encrypted_field(value: &str) -> bool {
    value.starts_with(ENCRYPTED_FIELD_PREFIX)
}

/// Symmetric encryption bound to a single sync password.
///
/// PBKDF2 keys are cached per salt so a snapshot with many fields only pays
/// the derivation cost once.
pub struct CryptoEngine {
    password: String,
    scheme: KeyScheme,
    iterations: u32,
    legacy_key: Option<[u8; KEY_LENGTH]>,
    cache: std::sync::Mutex<HashMap<[u8; SALT_LENGTH], [u8; KEY_LENGTH]>>,
    session_salt: [u8; SALT_LENGTH],
}

impl std::fmt::Debug for CryptoEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CryptoEngine")
            .field("scheme", &self.scheme)
            .field("iterations", &self.iterations)
            .finish_non_exhaustive()
    }
}

impl CryptoEngine {
    /// Create an engine for `password`. An empty password is a configuration
    /// error.
    pub fn new(password: &str) -> Result<Self, CryptoError> {
        Self::with_iterations(password, PBKDF2_ITERATIONS)
    }

    pub(crate) fn with_iterations(password: &str, iterations: u32) -> Result<Self, CryptoError> {
        if password.is_empty() {
            return Err(CryptoError::EmptyPassword);
        }

        let scheme = KeyScheme::for_password(password);
        let legacy_key = match scheme {
            KeyScheme::LegacyRawKey => Some(derive_legacy_key(password)?),
            KeyScheme::Pbkdf2 => None,
        };

        let mut session_salt = [0u8; SALT_LENGTH];
        OsRng.fill_bytes(&mut session_salt);

        Ok(Self {
            password: password.to_string(),
            scheme,
            iterations,
            legacy_key,
            cache: std::sync::Mutex::new(HashMap::new()),
            session_salt,
        })
    }

    pub fn scheme(&self) -> KeyScheme {
        self.scheme
    }

    fn key_for_salt(&self, salt: &[u8; SALT_LENGTH]) -> Result<[u8; KEY_LENGTH], CryptoError> {
        if let Some(key) = self.legacy_key {
            return Ok(key);
        }

        if let Ok(cache) = self.cache.lock() {
            if let Some(key) = cache.get(salt) {
                return Ok(*key);
            }
        }

        let mut key = [0u8; KEY_LENGTH];
        pbkdf2::pbkdf2::<Hmac<Sha256>>(self.password.as_bytes(), salt, self.iterations, &mut key)
            .map_err(|e| CryptoError::EncryptionFailed(format!("Key derivation failed: {}", e)))?;

        if let Ok(mut cache) = self.cache.lock() {
            if cache.len() >= KEY_CACHE_CAPACITY {
                // Keep the key this engine encrypts with.
                let session_salt = self.session_salt;
                cache.retain(|s, _| *s == session_salt);
            }
            cache.insert(*salt, key);
        }
        Ok(key)
    }

    /// Encrypt an opaque payload. A fresh random nonce is drawn on every call.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let salt = self.session_salt;
        let key = self.key_for_salt(&salt)?;

        let mut nonce_bytes = [0u8; NONCE_LENGTH];
        OsRng.fill_bytes(&mut nonce_bytes);

        let cipher = Aes256Gcm::new_from_slice(&key)
            .map_err(|e| CryptoError::EncryptionFailed(format!("Failed to create cipher: {}", e)))?;
        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), plaintext)
            .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;

        let mut sealed = Vec::with_capacity(SALT_LENGTH + NONCE_LENGTH + ciphertext.len());
        sealed.extend_from_slice(&salt);
        sealed.extend_from_slice(&nonce_bytes);
        sealed.extend_from_slice(&ciphertext);
        Ok(sealed)
    }

    /// Decrypt a payload produced by [`CryptoEngine::encrypt`].
    ///
    /// Tampered or truncated input yields an error, never partial plaintext.
    pub fn decrypt(&self, sealed: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if sealed.len() < SALT_LENGTH + NONCE_LENGTH + TAG_LENGTH {
            return Err(CryptoError::InvalidCiphertext);
        }

        let (salt_bytes, rest) = sealed.split_at(SALT_LENGTH);
        let (nonce_bytes, ciphertext) = rest.split_at(NONCE_LENGTH);

        let mut salt = [0u8; SALT_LENGTH];
        salt.copy_from_slice(salt_bytes);
        let key = self.key_for_salt(&salt)?;

        let cipher =
            Aes256Gcm::new_from_slice(&key).map_err(|_| CryptoError::AuthenticationFailed)?;
        cipher
            .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
            .map_err(|_| CryptoError::AuthenticationFailed)
    }

    /// Encrypt a single field value into `enc:BASE64`.
    ///
    /// Empty values stay empty and already-encrypted values are returned as is.
    pub fn encrypt_field(&self, value: &str) -> Result<String, CryptoError> {
        if value.is_empty() || is_encrypted_field(value) {
            return Ok(value.to_string());
        }
        let sealed = self.encrypt(value.as_bytes())?;
        Ok(format!("{}{}", ENCRYPTED_FIELD_PREFIX, BASE64.encode(sealed)))
    }

    /// Decrypt an `enc:` field value. Values without the prefix pass through.
    pub fn decrypt_field(&self, value: &str) -> Result<String, CryptoError> {
        let Some(payload) = value.strip_prefix(ENCRYPTED_FIELD_PREFIX) else {
            return Ok(value.to_string());
        };

        let sealed = BASE64
            .decode(payload)
            .map_err(|e| CryptoError::Encoding(e.to_string()))?;
        let plaintext = self.decrypt(&sealed)?;
        String::from_utf8(plaintext).map_err(|e| CryptoError::Encoding(e.to_string()))
    }
}

fn derive_legacy_key(password: &str) -> Result<[u8; KEY_LENGTH], CryptoError> {
    let raw = hex::decode(password).map_err(|e| CryptoError::Encoding(e.to_string()))?;
    let digest = Sha256::digest(&raw);
    let mut key = [0u8; KEY_LENGTH];
    key.copy_from_slice(&digest);
    Ok(key)
}

/// One-shot encryption with a password.
pub fn encrypt(plaintext: &[u8], password: &str) -> Result<Vec<u8>, CryptoError> {
    CryptoEngine::new(password)?.encrypt(plaintext)
}

/// One-shot decryption with a password.
pub fn decrypt(ciphertext: &[u8], password: &str) -> Result<Vec<u8>, CryptoError> {
    CryptoEngine::new(password)?.decrypt(ciphertext)
}

#[cfg(test)]
pub(crate) fn test_engine(password: &str) -> CryptoEngine {
    CryptoEngine::with_iterations(password, 1_000).expect("test engine")
}
