// services/encryption.rs
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::errors::{AppError, Result};

const NONCE_LEN: usize = 12;

/// Symmetric string encryption for credentials at rest.
///
/// Ciphertext format: hex(nonce || AES-256-GCM(plaintext)). The key is
/// SHA-256 over the configured salt followed by the secret.
#[derive(Clone)]
pub struct TextEncryptor {
    cipher: Aes256Gcm,
}

impl TextEncryptor {
    pub fn new(secret_key: &str, salt: &str) -> Result<Self> {
        let mut hasher = Sha256::new();
        hasher.update(salt.as_bytes());
        hasher.update(secret_key.as_bytes());
        let key = hasher.finalize();

        let cipher = Aes256Gcm::new_from_slice(&key)
            .map_err(|e| AppError::Encryption(format!("Invalid key length: {}", e)))?;
        Ok(TextEncryptor { cipher })
    }

    pub fn encrypt(&self, plaintext: &str) -> Result<String> {
        let mut nonce = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce);

        let ciphertext = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext.as_bytes())
            .map_err(|_| AppError::Encryption("Failed to encrypt value".into()))?;

        let mut output = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        output.extend_from_slice(&nonce);
        output.extend_from_slice(&ciphertext);
        Ok(hex::encode(output))
    }

    pub fn decrypt(&self, encoded: &str) -> Result<String> {
        let bytes = hex::decode(encoded.trim())
            .map_err(|e| AppError::Encryption(format!("Ciphertext is not valid hex: {}", e)))?;
        if bytes.len() <= NONCE_LEN {
            return Err(AppError::Encryption("Ciphertext is too short".into()));
        }

        let (nonce, ciphertext) = bytes.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| AppError::Encryption("Failed to decrypt value (wrong key or tampered data)".into()))?;

        String::from_utf8(plaintext).map_err(|e| AppError::Encryption(format!("Decrypted value is not UTF-8: {}", e)))
    }

    pub fn encrypt_opt(&self, plaintext: Option<&str>) -> Result<Option<String>> {
        plaintext.map(|value| self.encrypt(value)).transpose()
    }
}
