//! Encryption of API keys at rest.
//!
//! Keys are sealed with AES-256-GCM. The stored form is base64 of the
//! 12-byte random nonce followed by the ciphertext and tag.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use rand::Rng;
use std::fmt;
use std::path::Path;

use crate::config::{resolve_env_var, Config};
use crate::error::StoreError;

const KEY_LEN: usize = 32;
const NONCE_LEN: usize = 12;

/// Encrypts and decrypts secrets with a single AES-256-GCM key.
#[derive(Clone)]
pub struct SecretCipher {
    cipher: Aes256Gcm,
}

impl fmt::Debug for SecretCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretCipher").finish_non_exhaustive()
    }
}

impl SecretCipher {
    /// Build a cipher from raw key bytes (must be 32 bytes).
    pub fn from_key(key: &[u8]) -> Result<Self, StoreError> {
        let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| {
            StoreError::Secret(format!("key must be {KEY_LEN} bytes, got {}", key.len()))
        })?;
        Ok(Self { cipher })
    }

    /// Build a cipher from a base64-encoded key.
    pub fn from_base64(encoded: &str) -> Result<Self, StoreError> {
        let key = BASE64
            .decode(encoded.trim())
            .map_err(|e| StoreError::Secret(format!("invalid base64 key: {e}")))?;
        Self::from_key(&key)
    }

    /// Resolve the cipher from config: an explicit key wins, otherwise the key file.
    pub fn from_config(config: &Config) -> Result<Self, StoreError> {
        match resolve_env_var(&config.security.secret_key) {
            Some(key) => {
                tracing::debug!("Using secret key from configuration");
                Self::from_base64(&key)
            }
            None => Self::load_or_create(&config.key_file_path()),
        }
    }

    /// Load a base64 key file, generating one if it does not exist.
    pub fn load_or_create(path: &Path) -> Result<Self, StoreError> {
        if path.exists() {
            let encoded = std::fs::read_to_string(path)?;
            return Self::from_base64(&encoded);
        }

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut key = [0u8; KEY_LEN];
        rand::thread_rng().fill(&mut key);
        std::fs::write(path, BASE64.encode(key))?;
        restrict_permissions(path)?;
        tracing::info!("Generated new secret key at {}", path.display());

        Self::from_key(&key)
    }

    /// Encrypt a UTF-8 secret.
    pub fn encrypt(&self, plaintext: &str) -> Result<String, StoreError> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::thread_rng().fill(&mut nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), plaintext.as_bytes())
            .map_err(|_| StoreError::Secret("encryption failed".to_string()))?;

        let mut combined = nonce_bytes.to_vec();
        combined.extend(ciphertext);
        Ok(BASE64.encode(combined))
    }

    /// Decrypt a value produced by [`SecretCipher::encrypt`].
    pub fn decrypt(&self, encoded: &str) -> Result<String, StoreError> {
        let combined = BASE64
            .decode(encoded)
            .map_err(|e| StoreError::Secret(format!("invalid ciphertext: {e}")))?;
        if combined.len() < NONCE_LEN {
            return Err(StoreError::Secret("ciphertext too short".to_string()));
        }

        let (nonce, ciphertext) = combined.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| StoreError::Secret("decryption failed, wrong key?".to_string()))?;

        String::from_utf8(plaintext).map_err(|e| StoreError::Secret(e.to_string()))
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

/// Mask an API key for display, keeping the first and last four characters.
pub fn mask_api_key(api_key: &str) -> String {
    let chars: Vec<char> = api_key.chars().collect();
    if chars.len() <= 8 {
        return "*".repeat(chars.len());
    }

    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}{}{tail}", "*".repeat(chars.len() - 8))
}
