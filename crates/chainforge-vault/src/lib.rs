use std::fmt;

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use hkdf::Hkdf;
use sha2::Sha256;
use thiserror::Error;

/// Length of the random nonce prepended to every ciphertext.
const NONCE_LEN: usize = 12;

/// Domain-separation info for the key derivation.
const KEY_INFO: &[u8] = b"chainforge credential vault v1";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum VaultError {
    #[error("encryption failed")]
    EncryptionFailed,

    /// Covers tampering, a wrong key and malformed input alike; callers get
    /// no oracle into which one it was.
    #[error("decryption failed")]
    DecryptionFailed,
}

// ── Vault ─────────────────────────────────────────────────────────────────────

/// Symmetric AEAD vault for credentials and private keys at rest.
///
/// The 256-bit key is derived from a process-wide secret with HKDF-SHA256.
/// Ciphertexts are laid out as `base64( nonce(12) || AES-256-GCM(plaintext) )`
/// so they fit in text columns.
///
/// Construct once at startup and pass by clone; the derived key is immutable.
#[derive(Clone)]
pub struct Vault {
    key: [u8; 32],
}

impl Vault {
    pub fn new(secret: &str) -> Self {
        let hkdf = Hkdf::<Sha256>::new(None, secret.as_bytes());
        let mut key = [0u8; 32];
        hkdf.expand(KEY_INFO, &mut key)
            .expect("32 bytes is a valid HKDF-SHA256 output length");

        Vault { key }
    }

    /// Encrypt sensitive data into the base64 envelope.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<String, VaultError> {
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&self.key));
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);

        let ciphertext = cipher
            .encrypt(&nonce, plaintext)
            .map_err(|_| VaultError::EncryptionFailed)?;

        let mut blob = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        blob.extend_from_slice(&nonce);
        blob.extend_from_slice(&ciphertext);

        Ok(BASE64.encode(blob))
    }

    /// Decrypt a previously produced envelope.
    pub fn decrypt(&self, encoded: &str) -> Result<Vec<u8>, VaultError> {
        let blob = BASE64
            .decode(encoded)
            .map_err(|_| VaultError::DecryptionFailed)?;

        if blob.len() < NONCE_LEN {
            return Err(VaultError::DecryptionFailed);
        }

        let (nonce, ciphertext) = blob.split_at(NONCE_LEN);
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&self.key));

        cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| VaultError::DecryptionFailed)
    }
}

// Never expose key material through debug output.
impl fmt::Debug for Vault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Vault").finish_non_exhaustive()
    }
}
