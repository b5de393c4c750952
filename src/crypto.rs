//! Session secret handling and access-token encryption.
//!
//! GitHub access tokens are sealed with AES-256-GCM before they reach the
//! `sessions` table. The ciphertext layout is `version || nonce || ct+tag`
//! and the session and user ids are bound in as additional authenticated data,
//! so a ciphertext copied onto another session row fails to open.
//!
//! Session bearer secrets are random 32-byte values; only their SHA-256 digest
//! is persisted and comparisons run in constant time.

#![allow(deprecated)]

use aes_gcm::{
    Aes256Gcm, Key, Nonce,
    aead::{Aead, AeadCore, KeyInit, OsRng, Payload},
};
use rand::Rng;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use thiserror::Error;
use uuid::Uuid;
use zeroize::{Zeroize, ZeroizeOnDrop};

const VERSION_ENCRYPTED: u8 = 0x01;
const VERSION_FIELD_LEN: usize = 1;
const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;
const MIN_ENCRYPTED_LEN: usize = VERSION_FIELD_LEN + NONCE_LEN + TAG_LEN;
const RANDOM_TOKEN_BYTES: usize = 32;

/// Crypto error types
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("invalid key length: expected 32 bytes, got {0}")]
    InvalidKeyLength(usize),
    #[error("encryption failed: {0}")]
    EncryptionFailed(String),
    #[error("decryption failed: {0}")]
    DecryptionFailed(String),
    #[error("unsupported ciphertext version {0:#04x}")]
    UnsupportedVersion(u8),
    #[error("invalid ciphertext format")]
    InvalidFormat,
    #[error("empty ciphertext")]
    EmptyCiphertext,
}

/// Secure wrapper for encryption keys with zeroization
#[derive(Debug, Clone, Zeroize, ZeroizeOnDrop)]
pub struct ZeroizingKey(Vec<u8>);

/// Type alias for crypto keys
pub type CryptoKey = ZeroizingKey;

impl CryptoKey {
    /// Create a new crypto key from bytes
    pub fn new(bytes: Vec<u8>) -> Result<Self, CryptoError> {
        if bytes.len() != 32 {
            return Err(CryptoError::InvalidKeyLength(bytes.len()));
        }
        Ok(ZeroizingKey(bytes))
    }

    /// Get the key as bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

/// Encrypt bytes using AES-256-GCM
pub fn encrypt_bytes(
    key: &CryptoKey,
    aad: &[u8],
    plaintext: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes()));
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);

    let mut ciphertext = cipher
        .encrypt(
            &nonce,
            Payload {
                msg: plaintext,
                aad,
            },
        )
        .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;

    let mut result = Vec::with_capacity(VERSION_FIELD_LEN + NONCE_LEN + ciphertext.len());
    result.push(VERSION_ENCRYPTED);
    result.extend_from_slice(&nonce);
    result.append(&mut ciphertext);

    Ok(result)
}

/// Decrypt bytes produced by [`encrypt_bytes`].
pub fn decrypt_bytes(
    key: &CryptoKey,
    aad: &[u8],
    ciphertext: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let Some(&version) = ciphertext.first() else {
        return Err(CryptoError::EmptyCiphertext);
    };
    if version != VERSION_ENCRYPTED {
        return Err(CryptoError::UnsupportedVersion(version));
    }
    if ciphertext.len() < MIN_ENCRYPTED_LEN {
        return Err(CryptoError::InvalidFormat);
    }

    let nonce = Nonce::from_slice(&ciphertext[VERSION_FIELD_LEN..VERSION_FIELD_LEN + NONCE_LEN]);
    let tag_and_ct = &ciphertext[VERSION_FIELD_LEN + NONCE_LEN..];
    debug_assert!(tag_and_ct.len() >= TAG_LEN);

    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes()));
    cipher
        .decrypt(
            nonce,
            Payload {
                msg: tag_and_ct,
                aad,
            },
        )
        .map_err(|e| CryptoError::DecryptionFailed(e.to_string()))
}

fn session_aad(session_id: Uuid, user_id: Uuid) -> String {
    format!("session|{}|{}", session_id, user_id)
}

/// Seal a GitHub access token for storage on a session row.
pub fn encrypt_access_token(
    key: &CryptoKey,
    session_id: Uuid,
    user_id: Uuid,
    access_token: &str,
) -> Result<Vec<u8>, CryptoError> {
    encrypt_bytes(
        key,
        session_aad(session_id, user_id).as_bytes(),
        access_token.as_bytes(),
    )
}

/// Open a token sealed by [`encrypt_access_token`] for the same session/user pair.
pub fn decrypt_access_token(
    key: &CryptoKey,
    session_id: Uuid,
    user_id: Uuid,
    ciphertext: &[u8],
) -> Result<String, CryptoError> {
    let bytes = decrypt_bytes(key, session_aad(session_id, user_id).as_bytes(), ciphertext)?;
    String::from_utf8(bytes)
        .map_err(|e| CryptoError::DecryptionFailed(format!("Invalid UTF-8: {}", e)))
}

/// 32 random bytes, URL-safe base64 encoded. Used for OAuth state and session secrets.
pub fn generate_random_token() -> String {
    let mut bytes = [0u8; RANDOM_TOKEN_BYTES];
    rand::thread_rng().fill(&mut bytes);
    base64_url::encode(&bytes)
}

/// Hex-encoded SHA-256 digest of a session secret.
pub fn hash_secret(secret: &str) -> String {
    hex::encode(Sha256::digest(secret.as_bytes()))
}

/// Constant-time check of a presented secret against a stored digest.
pub fn verify_secret(secret: &str, stored_hash: &str) -> bool {
    let computed = hash_secret(secret);
    computed.as_bytes().ct_eq(stored_hash.as_bytes()).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_key() -> CryptoKey {
        CryptoKey::new(vec![0u8; 32]).expect("valid test key")
    }

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let key = test_key();
        let encrypted = encrypt_bytes(&key, b"aad", b"secret message").unwrap();
        assert_eq!(encrypted[0], VERSION_ENCRYPTED);
        let decrypted = decrypt_bytes(&key, b"aad", &encrypted).unwrap();
        assert_eq!(decrypted, b"secret message");
    }

    #[test]
    fn test_different_aad_fails() {
        let key = test_key();
        let encrypted = encrypt_bytes(&key, b"aad-1", b"secret").unwrap();
        assert!(decrypt_bytes(&key, b"aad-2", &encrypted).is_err());
    }

    #[test]
    fn test_modified_ciphertext_fails() {
        let key = test_key();
        let mut encrypted = encrypt_bytes(&key, b"aad", b"secret message").unwrap();
        encrypted[13] ^= 0x01;
        assert!(decrypt_bytes(&key, b"aad", &encrypted).is_err());
    }

    #[test]
    fn test_nonce_uniqueness() {
        let key = test_key();
        let first = encrypt_bytes(&key, b"aad", b"same").unwrap();
        let second = encrypt_bytes(&key, b"aad", b"same").unwrap();
        assert_ne!(&first[1..13], &second[1..13]);
    }

    #[test]
    fn test_unversioned_payload_rejected() {
        let key = test_key();
        let result = decrypt_bytes(&key, b"aad", b"plain-token");
        assert!(matches!(result, Err(CryptoError::UnsupportedVersion(b'p'))));
        assert!(matches!(
            decrypt_bytes(&key, b"aad", &[]),
            Err(CryptoError::EmptyCiphertext)
        ));
    }

    #[test]
    fn test_insufficient_ciphertext_length() {
        let key = test_key();
        let result = decrypt_bytes(&key, b"aad", &[VERSION_ENCRYPTED, 0x02]);
        assert!(matches!(result, Err(CryptoError::InvalidFormat)));
    }

    #[test]
    fn test_invalid_key_length_rejected() {
        assert!(matches!(
            CryptoKey::new(vec![0u8; 16]),
            Err(CryptoError::InvalidKeyLength(16))
        ));
        assert!(CryptoKey::new(vec![0u8; 64]).is_err());
    }

    #[test]
    fn access_token_is_bound_to_session_and_user() {
        let key = test_key();
        let session_id = Uuid::new_v4();
        let user_id = Uuid::new_v4();

        let sealed = encrypt_access_token(&key, session_id, user_id, "gho_abc").unwrap();
        assert_eq!(
            decrypt_access_token(&key, session_id, user_id, &sealed).unwrap(),
            "gho_abc"
        );
        assert!(decrypt_access_token(&key, Uuid::new_v4(), user_id, &sealed).is_err());
        assert!(decrypt_access_token(&key, session_id, Uuid::new_v4(), &sealed).is_err());
    }

    #[test]
    fn random_tokens_are_url_safe_and_distinct() {
        let a = generate_random_token();
        let b = generate_random_token();
        assert_ne!(a, b);
        assert!(
            a.chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        );
        assert_eq!(base64_url::decode(&a).unwrap().len(), RANDOM_TOKEN_BYTES);
    }

    #[test]
    fn secret_hash_verification() {
        let digest = hash_secret("s3cret");
        assert_eq!(digest.len(), 64);
        assert!(verify_secret("s3cret", &digest));
        assert!(!verify_secret("other", &digest));
        assert!(!verify_secret("s3cret", "deadbeef"));
    }
}
