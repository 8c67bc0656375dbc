//! Serialization boundary: JSON encoding plus an optional authenticated
//! encryption envelope.
//!
//! Each value gets a single authenticated envelope (AES-GCM with a random
//! nonce per call, by default) rather than a multi-layer cascade of the same
//! primitive, which would add encoding overhead without any real security
//! margin over one AEAD layer. `chacha20` and `fernet` are selectable
//! alternatives to AES-GCM.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce as AesNonce};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chacha20poly1305::{ChaCha20Poly1305, Nonce as ChaChaNonce};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::value::Value;

/// Which authenticated-encryption scheme wraps the JSON payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EncryptionMode {
    AesGcm,
    Chacha20,
    Fernet,
}

const NONCE_LEN: usize = 12;

/// Encodes values to/from their on-disk text representation, optionally
/// wrapped in an authenticated encryption envelope.
#[derive(Clone)]
pub struct Codec {
    key: Option<[u8; 32]>,
    mode: EncryptionMode,
    fernet: Option<fernet::Fernet>,
}

impl Codec {
    /// Builds a plaintext-JSON codec (no encryption).
    pub fn plain() -> Self {
        Codec {
            key: None,
            mode: EncryptionMode::AesGcm,
            fernet: None,
        }
    }

    /// Builds a codec that wraps every value in an authenticated envelope.
    ///
    /// `key_material` is interpreted as UTF-8 and, unless it is already a
    /// valid 32-byte base64 encoding, hashed down to 32 bytes so callers can
    /// pass any passphrase-shaped string, matching common key-from-string
    /// ergonomics in the SQLite-wrapper examples in the pack.
    pub fn encrypted(key_material: &str, mode: EncryptionMode) -> Result<Self> {
        let key = derive_key(key_material);
        let fernet = match mode {
            EncryptionMode::Fernet => {
                let url_key = base64::engine::general_purpose::URL_SAFE.encode(key);
                Some(
                    fernet::Fernet::new(&url_key)
                        .ok_or_else(|| Error::Type("invalid fernet key".to_string()))?,
                )
            }
            _ => None,
        };
        Ok(Codec {
            key: Some(key),
            mode,
            fernet,
        })
    }

    fn encrypted_enabled(&self) -> bool {
        self.key.is_some()
    }

    /// Encodes a value to its on-disk text representation.
    pub fn encode(&self, value: &Value) -> Result<String> {
        let json = value.to_json_string()?;
        if !self.encrypted_enabled() {
            return Ok(json);
        }
        let envelope = self.seal(json.as_bytes())?;
        Ok(BASE64.encode(envelope))
    }

    /// Decodes a value from its on-disk text representation.
    pub fn decode(&self, text: &str) -> Result<Value> {
        if !self.encrypted_enabled() {
            return Value::from_json_str(text);
        }
        let envelope = BASE64
            .decode(text)
            .map_err(|_| Error::Decryption)?;
        let plaintext = self.open(&envelope)?;
        let json = String::from_utf8(plaintext).map_err(|_| Error::Decryption)?;
        Value::from_json_str(&json)
    }

    fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        let key = self.key.expect("encryption key present");
        match self.mode {
            EncryptionMode::AesGcm => {
                let cipher = Aes256Gcm::new_from_slice(&key)
                    .map_err(|_| Error::Type("invalid AES-256 key".to_string()))?;
                let mut nonce_bytes = [0u8; NONCE_LEN];
                OsRng.fill_bytes(&mut nonce_bytes);
                let nonce = AesNonce::from_slice(&nonce_bytes);
                let ciphertext = cipher
                    .encrypt(nonce, plaintext)
                    .map_err(|_| Error::Decryption)?;
                let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
                out.extend_from_slice(&nonce_bytes);
                out.extend_from_slice(&ciphertext);
                Ok(out)
            }
            EncryptionMode::Chacha20 => {
                let cipher = ChaCha20Poly1305::new_from_slice(&key)
                    .map_err(|_| Error::Type("invalid ChaCha20 key".to_string()))?;
                let mut nonce_bytes = [0u8; NONCE_LEN];
                OsRng.fill_bytes(&mut nonce_bytes);
                let nonce = ChaChaNonce::from_slice(&nonce_bytes);
                let ciphertext = cipher
                    .encrypt(nonce, plaintext)
                    .map_err(|_| Error::Decryption)?;
                let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
                out.extend_from_slice(&nonce_bytes);
                out.extend_from_slice(&ciphertext);
                Ok(out)
            }
            EncryptionMode::Fernet => {
                let token = self
                    .fernet
                    .as_ref()
                    .expect("fernet instance present")
                    .encrypt(plaintext);
                Ok(token.into_bytes())
            }
        }
    }

    fn open(&self, envelope: &[u8]) -> Result<Vec<u8>> {
        match self.mode {
            EncryptionMode::AesGcm => {
                let key = self.key.expect("encryption key present");
                if envelope.len() < NONCE_LEN {
                    return Err(Error::Decryption);
                }
                let (nonce_bytes, ciphertext) = envelope.split_at(NONCE_LEN);
                let cipher = Aes256Gcm::new_from_slice(&key)
                    .map_err(|_| Error::Type("invalid AES-256 key".to_string()))?;
                cipher
                    .decrypt(AesNonce::from_slice(nonce_bytes), ciphertext)
                    .map_err(|_| Error::Decryption)
            }
            EncryptionMode::Chacha20 => {
                let key = self.key.expect("encryption key present");
                if envelope.len() < NONCE_LEN {
                    return Err(Error::Decryption);
                }
                let (nonce_bytes, ciphertext) = envelope.split_at(NONCE_LEN);
                let cipher = ChaCha20Poly1305::new_from_slice(&key)
                    .map_err(|_| Error::Type("invalid ChaCha20 key".to_string()))?;
                cipher
                    .decrypt(ChaChaNonce::from_slice(nonce_bytes), ciphertext)
                    .map_err(|_| Error::Decryption)
            }
            EncryptionMode::Fernet => {
                let token = String::from_utf8(envelope.to_vec()).map_err(|_| Error::Decryption)?;
                self.fernet
                    .as_ref()
                    .expect("fernet instance present")
                    .decrypt(&token)
                    .map_err(|_| Error::Decryption)
            }
        }
    }
}

/// Turns arbitrary caller-supplied key material into a 32-byte secret.
///
/// A key that is already exactly 32 bytes is used verbatim (the documented
/// "Key is a 32-byte secret" case). Anything else — a passphrase, a key of
/// the wrong length — is hashed down with SHA-256, matching how the other
/// SQLite-adjacent crates in the pack (`walletkit-db`, `ZeroFS`) derive
/// symmetric keys from arbitrary-length input.
fn derive_key(material: &str) -> [u8; 32] {
    use sha2::{Digest, Sha256};
    let bytes = material.as_bytes();
    if bytes.len() == 32 {
        let mut key = [0u8; 32];
        key.copy_from_slice(bytes);
        return key;
    }
    let digest = Sha256::digest(bytes);
    let mut key = [0u8; 32];
    key.copy_from_slice(&digest);
    key
}
