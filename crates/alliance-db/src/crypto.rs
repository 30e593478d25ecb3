//! AES-256-GCM secret cipher.
//!
//! Wire format: 12-byte random nonce prefix followed by the ciphertext.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use rand::RngCore;

use alliance_core::{AllianceError, Result, SecretCipher};

const NONCE_LEN: usize = 12;

pub struct AesGcmSecretCipher {
    key: Vec<u8>,
}

impl AesGcmSecretCipher {
    /// The key must be exactly 32 bytes
    pub fn new(key: Vec<u8>) -> Result<Self> {
        if key.len() != 32 {
            return Err(AllianceError::invalid_config(format!(
                "Encryption key must be 32 bytes, got {}",
                key.len()
            )));
        }
        Ok(Self { key })
    }

    /// Accepts the key as base64 (standard alphabet)
    pub fn from_base64(encoded: &str) -> Result<Self> {
        use base64::Engine;
        let key = base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(|e| {
                AllianceError::invalid_config(format!("Encryption key is not valid base64: {}", e))
            })?;
        Self::new(key)
    }

    fn cipher(&self) -> Result<Aes256Gcm> {
        Aes256Gcm::new_from_slice(&self.key)
            .map_err(|e| AllianceError::internal_error(format!("Cipher init failed: {}", e)))
    }
}

impl SecretCipher for AesGcmSecretCipher {
    fn encrypt(&self, plaintext: &str) -> Result<Vec<u8>> {
        let cipher = self.cipher()?;

        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|e| AllianceError::internal_error(format!("Encryption failed: {}", e)))?;

        let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        out.extend_from_slice(&nonce_bytes);
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    fn decrypt(&self, ciphertext: &[u8]) -> Result<String> {
        if ciphertext.len() <= NONCE_LEN {
            return Err(AllianceError::internal_error("Ciphertext too short"));
        }

        let cipher = self.cipher()?;
        let nonce = Nonce::from_slice(&ciphertext[..NONCE_LEN]);

        let plaintext = cipher
            .decrypt(nonce, &ciphertext[NONCE_LEN..])
            .map_err(|e| AllianceError::internal_error(format!("Decryption failed: {}", e)))?;

        String::from_utf8(plaintext)
            .map_err(|e| AllianceError::internal_error(format!("Decrypted non-UTF8 data: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_cipher() -> AesGcmSecretCipher {
        AesGcmSecretCipher::new(vec![7u8; 32]).unwrap()
    }

    #[test]
    fn roundtrip() {
        let cipher = test_cipher();
        let encrypted = cipher.encrypt("hunter2").unwrap();
        assert_eq!(cipher.decrypt(&encrypted).unwrap(), "hunter2");
    }

    #[test]
    fn nonce_makes_ciphertexts_distinct() {
        let cipher = test_cipher();
        let a = cipher.encrypt("same secret").unwrap();
        let b = cipher.encrypt("same secret").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn rejects_short_key() {
        assert!(AesGcmSecretCipher::new(vec![0u8; 16]).is_err());
    }

    #[test]
    fn rejects_tampered_ciphertext() {
        let cipher = test_cipher();
        let mut encrypted = cipher.encrypt("secret").unwrap();
        let last = encrypted.len() - 1;
        encrypted[last] ^= 0xff;
        assert!(cipher.decrypt(&encrypted).is_err());
    }

    #[test]
    fn wrong_key_fails() {
        let encrypted = test_cipher().encrypt("secret").unwrap();
        let other = AesGcmSecretCipher::new(vec![8u8; 32]).unwrap();
        assert!(other.decrypt(&encrypted).is_err());
    }

    #[test]
    fn b64_helpers_roundtrip() {
        let cipher = test_cipher();
        let encoded = cipher.encrypt_b64("client-secret").unwrap();
        assert_ne!(encoded, "client-secret");
        assert_eq!(cipher.decrypt_b64(&encoded).unwrap(), "client-secret");
    }
}
