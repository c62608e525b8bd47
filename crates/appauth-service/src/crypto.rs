//! Deterministic AES-256-GCM encryption of app secrets.
//!
//! Secrets are persisted only in encrypted form. Every secret is encrypted
//! with the same configured key and nonce, so the same plaintext always
//! produces the same ciphertext and verification can re-encrypt a candidate
//! and compare it against the stored values without ever storing plaintext.
//!
//! # Trade-off
//!
//! This is a functional-equality check, not a one-way hash. A fixed nonce
//! means equal secrets have equal ciphertexts, and anyone holding the key can
//! recover every secret. Keep the key out of the database and treat a change
//! of this scheme as a security review item.

use std::fmt;

use aes_gcm::{
    Aes256Gcm, Nonce,
    aead::{Aead, KeyInit},
};
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use rand::Rng;

use crate::config::CryptoConfig;

/// Alphabet of generated secrets.
pub const SECRET_ALPHABET: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

/// Nonce size for AES-256-GCM (96 bits)
const NONCE_SIZE: usize = 12;

/// Errors from the secret cipher.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    /// Key or nonce has the wrong length.
    #[error("Invalid cipher material: {message}")]
    InvalidMaterial {
        /// Description of the problem.
        message: String,
    },

    #[error("Encryption failed: {message}")]
    Encryption {
        /// Description of the failure.
        message: String,
    },

    /// Malformed input or a ciphertext produced with another key.
    #[error("Decryption failed: {message}")]
    Decryption {
        /// Description of the failure.
        message: String,
    },
}

impl CryptoError {
    /// Creates a new `InvalidMaterial` error.
    #[must_use]
    pub fn invalid_material(message: impl Into<String>) -> Self {
        Self::InvalidMaterial {
            message: message.into(),
        }
    }

    /// Creates a new `Encryption` error.
    #[must_use]
    pub fn encryption(message: impl Into<String>) -> Self {
        Self::Encryption {
            message: message.into(),
        }
    }

    /// Creates a new `Decryption` error.
    #[must_use]
    pub fn decryption(message: impl Into<String>) -> Self {
        Self::Decryption {
            message: message.into(),
        }
    }
}

/// Deterministic cipher for app secrets.
#[derive(Clone)]
pub struct SecretCipher {
    cipher: Aes256Gcm,
    nonce: [u8; NONCE_SIZE],
}

impl SecretCipher {
    pub fn new(key: &[u8], nonce: &[u8]) -> Result<Self, CryptoError> {
        let cipher = Aes256Gcm::new_from_slice(key)
            .map_err(|e| CryptoError::invalid_material(format!("Failed to create cipher: {e}")))?;

        let nonce: [u8; NONCE_SIZE] = nonce.try_into().map_err(|_| {
            CryptoError::invalid_material(format!(
                "nonce must be {NONCE_SIZE} bytes, got {}",
                nonce.len()
            ))
        })?;

        Ok(Self { cipher, nonce })
    }

    pub fn from_config(config: &CryptoConfig) -> Result<Self, CryptoError> {
        Self::new(config.key.as_bytes(), config.nonce.as_bytes())
    }

    /// Encrypt `plaintext` to its at-rest form (standard base64).
    ///
    /// Deterministic: equal inputs give equal outputs.
    pub fn encrypt_to_base64(&self, plaintext: &str) -> Result<String, CryptoError> {
        let ciphertext = self
            .cipher
            .encrypt(Nonce::from_slice(&self.nonce), plaintext.as_bytes())
            .map_err(|e| CryptoError::encryption(e.to_string()))?;
        Ok(BASE64.encode(ciphertext))
    }

    /// Reverse [`SecretCipher::encrypt_to_base64`].
    pub fn decrypt_from_base64(&self, encrypted: &str) -> Result<String, CryptoError> {
        let ciphertext = BASE64
            .decode(encrypted)
            .map_err(|e| CryptoError::decryption(format!("Invalid ciphertext base64: {e}")))?;

        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(&self.nonce), ciphertext.as_ref())
            .map_err(|e| CryptoError::decryption(e.to_string()))?;

        String::from_utf8(plaintext)
            .map_err(|e| CryptoError::decryption(format!("Invalid UTF-8 in decrypted value: {e}")))
    }
}

impl fmt::Debug for SecretCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretCipher").finish_non_exhaustive()
    }
}

/// Generate a random plaintext secret of `length` characters from
/// [`SECRET_ALPHABET`].
pub fn generate_secret(length: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..length)
        .map(|_| SECRET_ALPHABET[rng.gen_range(0..SECRET_ALPHABET.len())] as char)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &[u8] = b"AES256Key32Characters12345678901";
    const NONCE: &[u8] = b"0123456789ab";

    #[test]
    fn test_encryption_is_deterministic() {
        let cipher = SecretCipher::new(KEY, NONCE).unwrap();
        let a = cipher.encrypt_to_base64("s1").unwrap();
        let b = cipher.encrypt_to_base64("s1").unwrap();

        assert_eq!(a, b);
        assert_ne!(a, cipher.encrypt_to_base64("s2").unwrap());
        assert_ne!(a, "s1");
    }

    #[test]
    fn test_decrypt_reverses_encrypt() {
        let cipher = SecretCipher::new(KEY, NONCE).unwrap();
        let secret = generate_secret(36);
        let encrypted = cipher.encrypt_to_base64(&secret).unwrap();

        assert_eq!(cipher.decrypt_from_base64(&encrypted).unwrap(), secret);
    }

    #[test]
    fn test_decrypt_rejects_bad_input() {
        let cipher = SecretCipher::new(KEY, NONCE).unwrap();
        assert!(matches!(
            cipher.decrypt_from_base64("not base64!"),
            Err(CryptoError::Decryption { .. })
        ));

        let other = SecretCipher::new(b"Another32CharacterKey12345678901", NONCE).unwrap();
        let encrypted = other.encrypt_to_base64("s1").unwrap();
        assert!(cipher.decrypt_from_base64(&encrypted).is_err());
    }

    #[test]
    fn test_invalid_material() {
        assert!(SecretCipher::new(b"short", NONCE).is_err());
        assert!(SecretCipher::new(KEY, b"short").is_err());
    }

    #[test]
    fn test_generated_secret_shape() {
        let secret = generate_secret(36);
        assert_eq!(secret.len(), 36);
        assert!(secret.bytes().all(|b| SECRET_ALPHABET.contains(&b)));
        assert_ne!(secret, generate_secret(36));
    }
}
