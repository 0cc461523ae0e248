//! Credential encryption at rest
//!
//! AES-256-GCM with HKDF-derived per-profile keys. Profiles persist only
//! ciphertext; plaintext credentials exist transiently inside the call
//! that decrypts them.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use hkdf::Hkdf;
use sha2::Sha256;
use uuid::Uuid;

use crate::error::{ConnectorError, ConnectorResult};

/// Length of AES-256 key in bytes.
const KEY_LENGTH: usize = 32;

/// Length of GCM nonce in bytes.
const NONCE_LENGTH: usize = 12;

/// Length of GCM authentication tag in bytes.
const TAG_LENGTH: usize = 16;

/// Context string for HKDF key derivation.
const HKDF_INFO: &[u8] = b"dataops-connection-credentials-v1";

/// Vault for encrypting and decrypting connection credentials.
///
/// Uses AES-256-GCM with keys derived per connection profile, so a
/// ciphertext copied between profiles does not decrypt.
#[derive(Clone)]
pub struct CredentialVault {
    /// Master key for deriving profile-specific keys.
    master_key: [u8; KEY_LENGTH],
}

impl CredentialVault {
    /// Create a vault with the given 32-byte master key.
    #[must_use]
    pub fn new(master_key: [u8; KEY_LENGTH]) -> Self {
        Self { master_key }
    }

    /// Create a vault from a hex-encoded master key.
    pub fn from_hex(hex_key: &str) -> ConnectorResult<Self> {
        let bytes = hex::decode(hex_key).map_err(|e| ConnectorError::EncryptionFailed {
            message: format!("invalid hex key: {e}"),
        })?;
        Self::from_bytes(&bytes)
    }

    /// Create a vault from a base64-encoded master key.
    pub fn from_base64(base64_key: &str) -> ConnectorResult<Self> {
        let bytes = BASE64
            .decode(base64_key)
            .map_err(|e| ConnectorError::EncryptionFailed {
                message: format!("invalid base64 key: {e}"),
            })?;
        Self::from_bytes(&bytes)
    }

    fn from_bytes(bytes: &[u8]) -> ConnectorResult<Self> {
        if bytes.len() != KEY_LENGTH {
            return Err(ConnectorError::EncryptionFailed {
                message: format!("key must be {} bytes, got {}", KEY_LENGTH, bytes.len()),
            });
        }
        let mut key = [0u8; KEY_LENGTH];
        key.copy_from_slice(bytes);
        Ok(Self::new(key))
    }

    /// Derive the profile-specific key using HKDF-SHA256.
    fn derive_profile_key(&self, profile_id: Uuid) -> [u8; KEY_LENGTH] {
        let hkdf = Hkdf::<Sha256>::new(Some(profile_id.as_bytes()), &self.master_key);
        let mut derived_key = [0u8; KEY_LENGTH];
        // 32 bytes is always a valid HKDF-SHA256 output length.
        hkdf.expand(HKDF_INFO, &mut derived_key)
            .expect("HKDF-SHA256 supports 32-byte output");
        derived_key
    }

    /// Encrypt a secret for a specific profile.
    ///
    /// Returns nonce || ciphertext || tag.
    pub fn encrypt(&self, profile_id: Uuid, plaintext: &[u8]) -> ConnectorResult<Vec<u8>> {
        let key = self.derive_profile_key(profile_id);
        let cipher =
            Aes256Gcm::new_from_slice(&key).map_err(|e| ConnectorError::EncryptionFailed {
                message: format!("failed to create cipher: {e}"),
            })?;

        // Random nonce from the OS CSPRNG.
        use rand::rngs::OsRng;
        use rand::RngCore;
        let mut nonce_bytes = [0u8; NONCE_LENGTH];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext =
            cipher
                .encrypt(nonce, plaintext)
                .map_err(|e| ConnectorError::EncryptionFailed {
                    message: format!("encryption failed: {e}"),
                })?;

        let mut result = Vec::with_capacity(NONCE_LENGTH + ciphertext.len());
        result.extend_from_slice(&nonce_bytes);
        result.extend_from_slice(&ciphertext);

        Ok(result)
    }

    /// Decrypt a secret for a specific profile.
    ///
    /// The profile id must match the one used for encryption. A tampered
    /// or foreign ciphertext yields `DecryptionFailed`, never a panic.
    pub fn decrypt(&self, profile_id: Uuid, ciphertext: &[u8]) -> ConnectorResult<Vec<u8>> {
        if ciphertext.len() < NONCE_LENGTH + TAG_LENGTH {
            return Err(ConnectorError::DecryptionFailed {
                message: "ciphertext too short".to_string(),
            });
        }

        let key = self.derive_profile_key(profile_id);
        let cipher =
            Aes256Gcm::new_from_slice(&key).map_err(|e| ConnectorError::DecryptionFailed {
                message: format!("failed to create cipher: {e}"),
            })?;

        let (nonce_bytes, encrypted) = ciphertext.split_at(NONCE_LENGTH);
        let nonce = Nonce::from_slice(nonce_bytes);

        cipher
            .decrypt(nonce, encrypted)
            .map_err(|e| ConnectorError::DecryptionFailed {
                message: format!("decryption failed: {e}"),
            })
    }

    /// Encrypt a string secret to base64, the form profiles persist.
    pub fn encrypt_string(&self, profile_id: Uuid, plaintext: &str) -> ConnectorResult<String> {
        let bytes = self.encrypt(profile_id, plaintext.as_bytes())?;
        Ok(BASE64.encode(bytes))
    }

    /// Decrypt a base64 ciphertext back to the string secret.
    pub fn decrypt_string(&self, profile_id: Uuid, ciphertext: &str) -> ConnectorResult<String> {
        let bytes = BASE64
            .decode(ciphertext)
            .map_err(|e| ConnectorError::DecryptionFailed {
                message: format!("invalid base64 ciphertext: {e}"),
            })?;
        let plaintext = self.decrypt(profile_id, &bytes)?;
        String::from_utf8(plaintext).map_err(|e| ConnectorError::DecryptionFailed {
            message: format!("decrypted data is not valid UTF-8: {e}"),
        })
    }
}

impl std::fmt::Debug for CredentialVault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialVault")
            .field("master_key", &"[REDACTED]")
            .finish()
    }
}

/// Generate a random master key from the OS CSPRNG.
///
/// For initial setup or testing.
#[must_use]
pub fn generate_master_key() -> [u8; KEY_LENGTH] {
    use rand::rngs::OsRng;
    use rand::RngCore;
    let mut key = [0u8; KEY_LENGTH];
    OsRng.fill_bytes(&mut key);
    key
}

/// Generate a random master key as a hex string.
#[must_use]
pub fn generate_master_key_hex() -> String {
    hex::encode(generate_master_key())
}
