// /////////////////////////////////////////////////////////////////////////////
// Channel Pipeline Orchestrator
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Credential Encryption
//!
//! Per-channel third-party credentials (§6.4) are encrypted at rest with
//! AES-256-GCM. `FERNET_KEY` is expected to be a base64-encoded 32-byte
//! key, following the naming and shape of the equivalent Python `Fernet`
//! key material. The key is zeroized on drop; plaintext credentials never
//! reach a log line.

use aes_gcm::aead::{Aead, KeyInit, OsRng};
use aes_gcm::{AeadCore, Aes256Gcm, Key};
use base64::Engine;
use channel_pipeline_domain::PipelineError;
use zeroize::Zeroize;

const NONCE_LEN: usize = 12;

/// Wraps the configured encryption key, zeroizing it on drop.
pub struct CredentialCipher {
    key_bytes: Vec<u8>,
}

impl Drop for CredentialCipher {
    fn drop(&mut self) {
        self.key_bytes.zeroize();
    }
}

impl CredentialCipher {
    /// Decodes `raw_key` (base64) into the 32-byte AES-256 key. Returns
    /// [`PipelineError::EncryptionKeyMissing`] when `raw_key` is `None` —
    /// every call site that needs a cipher goes through this constructor,
    /// so the missing-key case only needs handling once.
    pub fn from_configured_key(raw_key: Option<&str>) -> Result<Self, PipelineError> {
        let raw_key = raw_key.ok_or(PipelineError::EncryptionKeyMissing)?;
        let key_bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
            .decode(raw_key.trim_end_matches('='))
            .or_else(|_| base64::engine::general_purpose::STANDARD.decode(raw_key))
            .map_err(|_| PipelineError::InvalidConfiguration("FERNET_KEY is not valid base64".to_string()))?;
        if key_bytes.len() != 32 {
            return Err(PipelineError::InvalidConfiguration(
                "FERNET_KEY must decode to exactly 32 bytes".to_string(),
            ));
        }
        Ok(Self { key_bytes })
    }

    fn cipher(&self) -> Aes256Gcm {
        Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&self.key_bytes))
    }

    /// Encrypts `plaintext`, returning `nonce || ciphertext`.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, PipelineError> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher()
            .encrypt(&nonce, plaintext)
            .map_err(|_| PipelineError::InternalError("credential encryption failed".to_string()))?;
        let mut out = nonce.to_vec();
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    /// Decrypts a blob produced by [`Self::encrypt`]. Authentication
    /// failure (tampering, or the wrong key) is reported as
    /// [`PipelineError::DecryptionFailed`] — never as the underlying AEAD
    /// error, which would not say anything useful anyway.
    pub fn decrypt(&self, blob: &[u8]) -> Result<Vec<u8>, PipelineError> {
        if blob.len() < NONCE_LEN {
            return Err(PipelineError::DecryptionFailed);
        }
        let (nonce, ciphertext) = blob.split_at(NONCE_LEN);
        self.cipher()
            .decrypt(nonce.into(), ciphertext)
            .map_err(|_| PipelineError::DecryptionFailed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_key() -> String {
        base64::engine::general_purpose::STANDARD.encode([7u8; 32])
    }

    #[test]
    fn missing_key_is_a_dedicated_error() {
        let err = CredentialCipher::from_configured_key(None).unwrap_err();
        assert!(matches!(err, PipelineError::EncryptionKeyMissing));
    }

    #[test]
    fn round_trips_plaintext() {
        let cipher = CredentialCipher::from_configured_key(Some(&test_key())).unwrap();
        let ciphertext = cipher.encrypt(b"super-secret-api-key").unwrap();
        assert_ne!(ciphertext, b"super-secret-api-key");
        let plaintext = cipher.decrypt(&ciphertext).unwrap();
        assert_eq!(plaintext, b"super-secret-api-key");
    }

    #[test]
    fn tampered_ciphertext_fails_to_decrypt() {
        let cipher = CredentialCipher::from_configured_key(Some(&test_key())).unwrap();
        let mut ciphertext = cipher.encrypt(b"payload").unwrap();
        let last = ciphertext.len() - 1;
        ciphertext[last] ^= 0xFF;
        assert!(matches!(cipher.decrypt(&ciphertext), Err(PipelineError::DecryptionFailed)));
    }

    #[test]
    fn wrong_length_key_is_rejected() {
        let short_key = base64::engine::general_purpose::STANDARD.encode([1u8; 16]);
        assert!(CredentialCipher::from_configured_key(Some(&short_key)).is_err());
    }
}
