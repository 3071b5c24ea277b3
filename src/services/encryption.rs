//! Field-level encryption for stored source data
//!
//! AES-256-GCM with the stored layout `nonce(12) ‖ tag(16) ‖ ciphertext`, base64
//! encoded. Deterministic mode derives the nonce from the key and plaintext so equal
//! values encrypt identically and can be compared or deduplicated without decrypting.

use aes_gcm::{
    Aes256Gcm, Nonce, Tag,
    aead::{AeadInPlace, KeyInit},
};
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use rand::RngCore;
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::config::Config;

/// AES-256-GCM nonce size (96 bits = 12 bytes)
const NONCE_SIZE: usize = 12;
const TAG_SIZE: usize = 16;
/// AES-256 key size (256 bits = 32 bytes)
const KEY_SIZE: usize = 32;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("encryption key is not configured")]
    MissingKey,

    #[error("invalid encryption key: {0}")]
    InvalidKey(String),

    #[error("encryption failed")]
    Encryption,

    #[error("ciphertext is corrupted or was encrypted with a different key")]
    CorruptedOrWrongKey,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NonceMode {
    /// Fresh random nonce per call
    Random,
    /// Nonce derived from key and plaintext; equal inputs give equal output
    Deterministic,
}

#[derive(Clone)]
pub struct FieldCodec {
    cipher: Aes256Gcm,
    key: [u8; KEY_SIZE],
    keep_empty: bool,
}

impl FieldCodec {
    pub fn new(key: &[u8]) -> Result<Self, CryptoError> {
        let key: [u8; KEY_SIZE] = key.try_into().map_err(|_| {
            CryptoError::InvalidKey(format!("expected {} bytes, got {}", KEY_SIZE, key.len()))
        })?;
        let cipher = Aes256Gcm::new_from_slice(&key)
            .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;

        Ok(Self {
            cipher,
            key,
            keep_empty: false,
        })
    }

    pub fn from_base64_key(key_b64: &str) -> Result<Self, CryptoError> {
        let key_b64 = key_b64.trim();
        if key_b64.is_empty() {
            return Err(CryptoError::MissingKey);
        }

        let key = BASE64
            .decode(key_b64)
            .map_err(|e| CryptoError::InvalidKey(format!("invalid base64: {}", e)))?;
        Self::new(&key)
    }

    pub fn from_config(config: &Config) -> Result<Self, CryptoError> {
        let key = config
            .source_security_key
            .as_deref()
            .ok_or(CryptoError::MissingKey)?;
        Self::from_base64_key(key)
    }

    /// Generate a random encryption key (for initial setup)
    pub fn generate_key() -> String {
        let mut key = [0u8; KEY_SIZE];
        rand::thread_rng().fill_bytes(&mut key);
        BASE64.encode(key)
    }

    /// Empty strings encrypt to and decrypt from an empty string
    pub fn keep_empty(mut self, keep_empty: bool) -> Self {
        self.keep_empty = keep_empty;
        self
    }

    pub fn encrypt(&self, plaintext: &str, mode: NonceMode) -> Result<String, CryptoError> {
        if self.keep_empty && plaintext.is_empty() {
            return Ok(String::new());
        }
        self.encrypt_bytes(plaintext.as_bytes(), mode)
    }

    pub fn decrypt(&self, encoded: &str) -> Result<String, CryptoError> {
        if self.keep_empty && encoded.is_empty() {
            return Ok(String::new());
        }
        let plaintext = self.decrypt_bytes(encoded)?;
        String::from_utf8(plaintext).map_err(|_| CryptoError::CorruptedOrWrongKey)
    }

    pub fn encrypt_bytes(&self, plaintext: &[u8], mode: NonceMode) -> Result<String, CryptoError> {
        let nonce_bytes = match mode {
            NonceMode::Random => {
                let mut nonce = [0u8; NONCE_SIZE];
                rand::thread_rng().fill_bytes(&mut nonce);
                nonce
            }
            NonceMode::Deterministic => self.derived_nonce(plaintext),
        };

        let mut buffer = plaintext.to_vec();
        let tag = self
            .cipher
            .encrypt_in_place_detached(Nonce::from_slice(&nonce_bytes), b"", &mut buffer)
            .map_err(|_| CryptoError::Encryption)?;

        let mut packed = Vec::with_capacity(NONCE_SIZE + TAG_SIZE + buffer.len());
        packed.extend_from_slice(&nonce_bytes);
        packed.extend_from_slice(&tag);
        packed.extend_from_slice(&buffer);

        Ok(BASE64.encode(packed))
    }

    pub fn decrypt_bytes(&self, encoded: &str) -> Result<Vec<u8>, CryptoError> {
        let packed = BASE64
            .decode(encoded)
            .map_err(|_| CryptoError::CorruptedOrWrongKey)?;
        if packed.len() < NONCE_SIZE + TAG_SIZE {
            return Err(CryptoError::CorruptedOrWrongKey);
        }

        let (nonce, rest) = packed.split_at(NONCE_SIZE);
        let (tag, ciphertext) = rest.split_at(TAG_SIZE);

        let mut buffer = ciphertext.to_vec();
        self.cipher
            .decrypt_in_place_detached(
                Nonce::from_slice(nonce),
                b"",
                &mut buffer,
                Tag::from_slice(tag),
            )
            .map_err(|_| CryptoError::CorruptedOrWrongKey)?;

        Ok(buffer)
    }

    fn derived_nonce(&self, plaintext: &[u8]) -> [u8; NONCE_SIZE] {
        let digest = Sha256::new()
            .chain_update(self.key)
            .chain_update(plaintext)
            .finalize();

        let mut nonce = [0u8; NONCE_SIZE];
        nonce.copy_from_slice(&digest[..NONCE_SIZE]);
        nonce
    }
}

// Implement Debug without exposing the key
impl std::fmt::Debug for FieldCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldCodec")
            .field("key", &"[REDACTED]")
            .field("keep_empty", &self.keep_empty)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn codec() -> FieldCodec {
        FieldCodec::from_base64_key(&FieldCodec::generate_key()).unwrap()
    }

    #[test]
    fn test_round_trip_empty_and_long() {
        let codec = codec();
        let long = "magnet:?xt=urn:btih:".repeat(5_000);

        for plaintext in ["", "abc", long.as_str()] {
            for mode in [NonceMode::Random, NonceMode::Deterministic] {
                let encrypted = codec.encrypt(plaintext, mode).unwrap();
                assert_eq!(codec.decrypt(&encrypted).unwrap(), plaintext);
            }
        }
    }

    #[test]
    fn test_random_mode_differs() {
        let codec = codec();
        let a = codec.encrypt("same-value", NonceMode::Random).unwrap();
        let b = codec.encrypt("same-value", NonceMode::Random).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_deterministic_mode_is_stable() {
        let codec = codec();
        let a = codec.encrypt("same-value", NonceMode::Deterministic).unwrap();
        let b = codec.encrypt("same-value", NonceMode::Deterministic).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, codec.encrypt("other-value", NonceMode::Deterministic).unwrap());
    }

    #[test]
    fn test_single_byte_tamper_fails() {
        let codec = codec();
        let encrypted = codec.encrypt("secret info hash", NonceMode::Random).unwrap();
        let packed = BASE64.decode(&encrypted).unwrap();

        for index in 0..packed.len() {
            let mut tampered = packed.clone();
            tampered[index] ^= 0x01;
            assert_matches!(
                codec.decrypt(&BASE64.encode(&tampered)),
                Err(CryptoError::CorruptedOrWrongKey)
            );
        }
    }

    #[test]
    fn test_malformed_input_fails() {
        let codec = codec();
        assert_matches!(codec.decrypt("not base64!!"), Err(CryptoError::CorruptedOrWrongKey));
        assert_matches!(
            codec.decrypt(&BASE64.encode([0u8; 20])),
            Err(CryptoError::CorruptedOrWrongKey)
        );
        assert_matches!(codec.decrypt(""), Err(CryptoError::CorruptedOrWrongKey));
    }

    #[test]
    fn test_wrong_key_fails() {
        let encrypted = codec().encrypt("secret", NonceMode::Random).unwrap();
        assert_matches!(codec().decrypt(&encrypted), Err(CryptoError::CorruptedOrWrongKey));
    }

    #[test]
    fn test_keep_empty_shortcut() {
        let codec = codec().keep_empty(true);
        assert_eq!(codec.encrypt("", NonceMode::Random).unwrap(), "");
        assert_eq!(codec.decrypt("").unwrap(), "");
        assert_ne!(codec.encrypt("x", NonceMode::Random).unwrap(), "");
    }

    #[test]
    fn test_key_validation() {
        assert_matches!(FieldCodec::from_base64_key(""), Err(CryptoError::MissingKey));
        assert_matches!(FieldCodec::from_base64_key("%%%"), Err(CryptoError::InvalidKey(_)));
        assert_matches!(
            FieldCodec::from_base64_key(&BASE64.encode([7u8; 16])),
            Err(CryptoError::InvalidKey(_))
        );
        assert_matches!(
            FieldCodec::from_config(&Config::default()),
            Err(CryptoError::MissingKey)
        );
    }

    #[test]
    fn test_debug_redacts_key() {
        let rendered = format!("{:?}", codec());
        assert!(rendered.contains("[REDACTED]"));
    }
}
