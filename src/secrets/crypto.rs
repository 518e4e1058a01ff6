//! Password column encryption using AES-256-GCM.
//!
//! The relational backend stores `base64(nonce || ciphertext || tag)` in the
//! password column. The key is process-wide and loaded once at startup;
//! rotating it requires re-encrypting existing rows, which is not provided.

use crate::errors::{AuthStoreError, Result};
use crate::secrets::SecretValue;
use base64::Engine;
use ring::aead::{self, Aad, BoundKey, Nonce, NonceSequence, UnboundKey, AES_256_GCM};
use ring::rand::{SecureRandom, SystemRandom};
use std::sync::Arc;
use tracing::{debug, error, instrument};

/// Size of AES-256-GCM nonce in bytes
const NONCE_SIZE: usize = 12;

/// Size of AES-256-GCM tag in bytes
const TAG_SIZE: usize = 16;

/// Single-use nonce sequence for AES-GCM
struct SingleNonce {
    nonce: Option<[u8; NONCE_SIZE]>,
}

impl SingleNonce {
    fn new(nonce_bytes: [u8; NONCE_SIZE]) -> Self {
        Self { nonce: Some(nonce_bytes) }
    }
}

impl NonceSequence for SingleNonce {
    fn advance(&mut self) -> std::result::Result<Nonce, ring::error::Unspecified> {
        self.nonce.take().map(Nonce::assume_unique_for_key).ok_or(ring::error::Unspecified)
    }
}

/// Encrypts and decrypts password strings with the process-wide key
#[derive(Clone)]
pub struct PasswordCipher {
    key_bytes: Arc<[u8; 32]>,
    rng: Arc<SystemRandom>,
}

impl PasswordCipher {
    /// Build from a base64-encoded 32-byte key
    pub fn from_base64_key(encoded: &SecretValue) -> Result<Self> {
        let key_bytes = base64::engine::general_purpose::STANDARD
            .decode(encoded.expose().trim())
            .map_err(|e| {
                AuthStoreError::config(format!("Invalid base64 in AUTHSTORE_ENCRYPTION_KEY: {}", e))
            })?;

        if key_bytes.len() != 32 {
            return Err(AuthStoreError::config(format!(
                "AUTHSTORE_ENCRYPTION_KEY must be 32 bytes (256 bits), got {} bytes",
                key_bytes.len()
            )));
        }

        let mut key_array = [0u8; 32];
        key_array.copy_from_slice(&key_bytes);
        Ok(Self::from_key(key_array))
    }

    pub fn from_key(key: [u8; 32]) -> Self {
        debug!("Password cipher initialized");
        Self { key_bytes: Arc::new(key), rng: Arc::new(SystemRandom::new()) }
    }

    /// Fixed-key cipher for tests and local development only
    pub fn for_testing() -> Self {
        Self::from_key([0x42u8; 32])
    }

    /// Encrypt a password into its column representation
    #[instrument(skip(self, plaintext), fields(plaintext_len = plaintext.len()))]
    pub fn encrypt(&self, plaintext: &str) -> Result<String> {
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        self.rng.fill(&mut nonce_bytes).map_err(|_| {
            error!("Failed to generate random nonce");
            AuthStoreError::internal("Failed to generate random nonce for encryption")
        })?;

        let unbound_key = UnboundKey::new(&AES_256_GCM, &*self.key_bytes).map_err(|_| {
            error!("Failed to create encryption key");
            AuthStoreError::internal("Failed to create encryption key")
        })?;
        let mut sealing_key = aead::SealingKey::new(unbound_key, SingleNonce::new(nonce_bytes));

        let mut buffer = plaintext.as_bytes().to_vec();
        buffer.reserve(TAG_SIZE);
        sealing_key.seal_in_place_append_tag(Aad::empty(), &mut buffer).map_err(|_| {
            error!("Encryption failed");
            AuthStoreError::internal("Failed to encrypt password")
        })?;

        let mut sealed = Vec::with_capacity(NONCE_SIZE + buffer.len());
        sealed.extend_from_slice(&nonce_bytes);
        sealed.extend_from_slice(&buffer);
        Ok(base64::engine::general_purpose::STANDARD.encode(sealed))
    }

    /// Decrypt a column value produced by [`PasswordCipher::encrypt`]
    #[instrument(skip(self, encoded), fields(encoded_len = encoded.len()))]
    pub fn decrypt(&self, encoded: &str) -> Result<SecretValue> {
        let sealed = base64::engine::general_purpose::STANDARD.decode(encoded).map_err(|_| {
            AuthStoreError::internal("Stored password is not valid base64 ciphertext")
        })?;

        if sealed.len() < NONCE_SIZE + TAG_SIZE {
            return Err(AuthStoreError::internal(
                "Stored password is too short (missing nonce or authentication tag)",
            ));
        }

        let (nonce, ciphertext) = sealed.split_at(NONCE_SIZE);
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        nonce_bytes.copy_from_slice(nonce);

        let unbound_key = UnboundKey::new(&AES_256_GCM, &*self.key_bytes).map_err(|_| {
            error!("Failed to create decryption key");
            AuthStoreError::internal("Failed to create decryption key")
        })?;
        let mut opening_key = aead::OpeningKey::new(unbound_key, SingleNonce::new(nonce_bytes));

        let mut buffer = ciphertext.to_vec();
        let decrypted = opening_key.open_in_place(Aad::empty(), &mut buffer).map_err(|_| {
            error!("Decryption failed - possible tampering or wrong key");
            AuthStoreError::internal("Failed to decrypt password - authentication failed")
        })?;

        let plaintext = String::from_utf8(decrypted.to_vec())
            .map_err(|_| AuthStoreError::internal("Decrypted password is not valid UTF-8"))?;
        Ok(SecretValue::new(plaintext))
    }
}

impl std::fmt::Debug for PasswordCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PasswordCipher").field("key_bytes", &"[REDACTED]").finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let cipher = PasswordCipher::for_testing();
        let sealed = cipher.encrypt("my-secret-password").unwrap();

        assert_ne!(sealed, "my-secret-password");
        assert_eq!(cipher.decrypt(&sealed).unwrap().expose(), "my-secret-password");
    }

    #[test]
    fn test_random_nonces_produce_different_ciphertext() {
        let cipher = PasswordCipher::for_testing();
        let first = cipher.encrypt("same").unwrap();
        let second = cipher.encrypt("same").unwrap();

        assert_ne!(first, second);
        assert_eq!(cipher.decrypt(&first).unwrap(), cipher.decrypt(&second).unwrap());
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let cipher = PasswordCipher::for_testing();
        let sealed = cipher.encrypt("sensitive").unwrap();

        let mut bytes = base64::engine::general_purpose::STANDARD.decode(&sealed).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        let tampered = base64::engine::general_purpose::STANDARD.encode(bytes);

        assert!(cipher.decrypt(&tampered).is_err());
    }

    #[test]
    fn test_wrong_key_fails() {
        let sealed = PasswordCipher::for_testing().encrypt("sensitive").unwrap();
        let other = PasswordCipher::from_key([0x07u8; 32]);
        assert!(other.decrypt(&sealed).is_err());
    }

    #[test]
    fn test_short_or_garbage_input_fails() {
        let cipher = PasswordCipher::for_testing();
        assert!(cipher.decrypt("not base64!").is_err());
        assert!(cipher.decrypt("AAAA").is_err());
    }

    #[test]
    fn test_empty_password() {
        let cipher = PasswordCipher::for_testing();
        let sealed = cipher.encrypt("").unwrap();
        assert!(cipher.decrypt(&sealed).unwrap().is_empty());
    }

    #[test]
    fn test_key_from_base64() {
        let key = SecretValue::new(base64::engine::general_purpose::STANDARD.encode([0x42u8; 32]));
        let cipher = PasswordCipher::from_base64_key(&key).unwrap();
        let sealed = PasswordCipher::for_testing().encrypt("shared").unwrap();
        assert_eq!(cipher.decrypt(&sealed).unwrap().expose(), "shared");

        let short = SecretValue::new(base64::engine::general_purpose::STANDARD.encode([0u8; 16]));
        assert!(PasswordCipher::from_base64_key(&short).is_err());
        assert!(PasswordCipher::from_base64_key(&SecretValue::new("%%%")).is_err());
    }
}
