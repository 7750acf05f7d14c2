//! Session key lifecycle: in-memory caching with TTL and password-wrapped
//! persistence.
//!
//! Live keys sit in a [`KeyStore`] and expire lazily; nothing evicts them in
//! the background, a `get` past the deadline simply comes back empty. For
//! persistence across restarts the keys are individually wrapped: PBKDF2-SHA-256
//! stretches the password into an AES-256-GCM wrapping key, and the GCM tag
//! doubles as the password check. Plaintext key material never touches disk.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use pbkdf2::pbkdf2_hmac;
use rand::rngs::OsRng;
use rand::RngCore;
use seal_crypto::SessionKeys;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::fs;
use std::path::Path;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use thiserror::Error;
use zeroize::Zeroizing;

/// PBKDF2 work factor for password wrapping.
pub const PBKDF2_ITERATIONS: u32 = 100_000;

const SALT_LEN: usize = 16;
const GCM_IV_LEN: usize = 12;

/// Key persistence errors.
#[derive(Debug, Error)]
pub enum KeyStoreError {
    /// GCM rejected the record under the derived key. Either the password
    /// is wrong or the record was tampered with; the two are
    /// indistinguishable and treated alike.
    #[error("wrong password")]
    WrongPassword,

    #[error("corrupt key record: {0}")]
    CorruptRecord(String),

    #[error("key wrapping failed")]
    WrapFailed,

    #[error("storage error: {0}")]
    Storage(String),
}

struct Entry {
    keys: SessionKeys,
    expires_at: Instant,
}

/// Thread-safe single-slot store for the current session's keys.
///
/// Shared between the client and its sessions; concurrent `put`/`get`/
/// `clear` are safe and readers always observe a complete key pair.
#[derive(Default)]
pub struct KeyStore {
    slot: Mutex<Option<Entry>>,
}

impl KeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cache keys for `ttl`. Replaces whatever was there.
    pub fn put(&self, keys: SessionKeys, ttl: Duration) {
        let mut slot = self.slot.lock().unwrap_or_else(|e| e.into_inner());
        *slot = Some(Entry {
            keys,
            expires_at: Instant::now() + ttl,
        });
    }

    /// Current keys, or `None` if absent or past their TTL.
    ///
    /// Expiry is lazy: the first `get` after the deadline drops the entry.
    pub fn get(&self) -> Option<SessionKeys> {
        let mut slot = self.slot.lock().unwrap_or_else(|e| e.into_inner());
        match &*slot {
            Some(entry) if entry.expires_at > Instant::now() => Some(entry.keys.clone()),
            Some(_) => {
                *slot = None;
                None
            }
            None => None,
        }
    }

    /// Drop the cached keys immediately.
    pub fn clear(&self) {
        let mut slot = self.slot.lock().unwrap_or_else(|e| e.into_inner());
        *slot = None;
    }
}

/// One password-wrapped 32-byte key: base64 salt, GCM nonce and ciphertext.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WrappedKey {
    salt: String,
    iv: String,
    ciphertext: String,
}

/// Both session keys in wrapped form, safe to write to disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvelopeRecord {
    k_mac: WrappedKey,
    k_enc: WrappedKey,
}

impl EnvelopeRecord {
    /// Wrap both keys under `password`. Fresh salt and nonce per key.
    pub fn wrap(keys: &SessionKeys, password: &str) -> Result<Self, KeyStoreError> {
        Ok(Self {
            k_mac: wrap_one(&keys.k_mac, password)?,
            k_enc: wrap_one(&keys.k_enc, password)?,
        })
    }

    /// Recover the keys. Any authentication failure reads as a wrong
    /// password.
    pub fn unwrap(&self, password: &str) -> Result<SessionKeys, KeyStoreError> {
        Ok(SessionKeys {
            k_mac: unwrap_one(&self.k_mac, password)?,
            k_enc: unwrap_one(&self.k_enc, password)?,
        })
    }

    /// Write the record as JSON, 0600 on Unix.
    pub fn save(&self, path: &Path) -> Result<(), KeyStoreError> {
        let json = serde_json::to_vec_pretty(self).map_err(|e| KeyStoreError::Storage(e.to_string()))?;
        fs::write(path, json).map_err(|e| KeyStoreError::Storage(e.to_string()))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mut perms = fs::metadata(path)
                .map_err(|e| KeyStoreError::Storage(e.to_string()))?
                .permissions();
            perms.set_mode(0o600);
            fs::set_permissions(path, perms).map_err(|e| KeyStoreError::Storage(e.to_string()))?;
        }

        Ok(())
    }

    /// Read a record back from disk.
    pub fn load(path: &Path) -> Result<Self, KeyStoreError> {
        let json = fs::read(path).map_err(|e| KeyStoreError::Storage(e.to_string()))?;
        serde_json::from_slice(&json).map_err(|e| KeyStoreError::CorruptRecord(e.to_string()))
    }
}

fn derive_wrapping_key(password: &str, salt: &[u8]) -> Zeroizing<[u8; 32]> {
    let mut key = Zeroizing::new([0u8; 32]);
    pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, PBKDF2_ITERATIONS, key.as_mut());
    key
}

fn wrap_one(key: &[u8; 32], password: &str) -> Result<WrappedKey, KeyStoreError> {
    let mut salt = [0u8; SALT_LEN];
    let mut iv = [0u8; GCM_IV_LEN];
    OsRng.fill_bytes(&mut salt);
    OsRng.fill_bytes(&mut iv);

    let wrapping = derive_wrapping_key(password, &salt);
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(wrapping.as_ref()));
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&iv), key.as_ref())
        .map_err(|_| KeyStoreError::WrapFailed)?;

    Ok(WrappedKey {
        salt: BASE64.encode(salt),
        iv: BASE64.encode(iv),
        ciphertext: BASE64.encode(ciphertext),
    })
}

fn unwrap_one(wrapped: &WrappedKey, password: &str) -> Result<[u8; 32], KeyStoreError> {
    let salt = BASE64
        .decode(&wrapped.salt)
        .map_err(|e| KeyStoreError::CorruptRecord(e.to_string()))?;
    let iv = BASE64
        .decode(&wrapped.iv)
        .map_err(|e| KeyStoreError::CorruptRecord(e.to_string()))?;
    let ciphertext = BASE64
        .decode(&wrapped.ciphertext)
        .map_err(|e| KeyStoreError::CorruptRecord(e.to_string()))?;
    if salt.len() != SALT_LEN || iv.len() != GCM_IV_LEN {
        return Err(KeyStoreError::CorruptRecord("bad salt or iv length".into()));
    }

    let wrapping = derive_wrapping_key(password, &salt);
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(wrapping.as_ref()));
    let plaintext = cipher
        .decrypt(Nonce::from_slice(&iv), ciphertext.as_ref())
        .map_err(|_| KeyStoreError::WrongPassword)?;

    plaintext
        .try_into()
        .map_err(|_| KeyStoreError::CorruptRecord("bad key length".into()))
}
