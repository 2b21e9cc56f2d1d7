// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Encrypted per-stack secrets.
//!
//! Each stack owns a `secrets.json` holding `key → {nonce, ciphertext}`
//! entries. Values are encrypted with AES-256-GCM under a key derived
//! from the user's password and the stack salt via Argon2id. A wrong
//! password fails the GCM tag check and surfaces as [`SecretsError::AuthFailed`]
//! before any key name or value is revealed.

use crate::atomic::{self, PersistError};
use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use zeroize::{Zeroize, Zeroizing};

/// Length of the per-stack salt in bytes.
pub const SALT_LEN: usize = 16;

/// Length of the derived AES key in bytes.
const KEY_LEN: usize = 32;

/// Errors from secret operations
#[derive(Debug, Error)]
pub enum SecretsError {
    #[error(transparent)]
    Persist(#[from] PersistError),

    /// Wrong password (or tampered ciphertext): the GCM tag check failed.
    #[error("authentication failed: wrong password for this stack")]
    AuthFailed,

    #[error("corrupt secret entry '{key}': {message}")]
    Corrupt { key: String, message: String },

    #[error("key derivation failed: {0}")]
    Kdf(String),
}

/// One encrypted secret at rest.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct SecretEntry {
    /// 96-bit GCM nonce, fresh per write (base64)
    nonce: String,
    /// Ciphertext with the GCM tag appended (base64)
    ciphertext: String,
}

/// Decrypted secrets for one run.
///
/// Values are zeroized when the map drops so plaintext does not outlive
/// the run.
#[derive(Debug, Default)]
pub struct SecretMap(HashMap<String, String>);

impl SecretMap {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.0.iter()
    }
}

impl Drop for SecretMap {
    fn drop(&mut self) {
        for (_, value) in self.0.iter_mut() {
            value.zeroize();
        }
    }
}

/// Store for one stack's encrypted secrets.
pub struct SecretsStore {
    path: PathBuf,
}

impl SecretsStore {
    /// Open the secrets store inside a stack directory.
    pub fn for_stack(stack_dir: &Path) -> Self {
        Self {
            path: stack_dir.join("secrets.json"),
        }
    }

    /// Whether any secrets are stored for this stack.
    pub fn has_secrets(&self) -> bool {
        self.path.exists()
    }

    /// Encrypt and store one secret under the given password and salt.
    ///
    /// A fresh random nonce is generated for every write; re-setting a
    /// key replaces its entry entirely.
    pub fn set(
        &self,
        key: &str,
        value: &str,
        password: &str,
        salt: &[u8; SALT_LEN],
    ) -> Result<(), SecretsError> {
        let cipher = self.cipher(password, salt)?;

        // If a file exists, the password must decrypt it before we mix
        // in new material under a possibly different key.
        let mut entries: HashMap<String, SecretEntry> =
            atomic::load_json(&self.path, "secret map")?.unwrap_or_default();
        if let Some((name, entry)) = entries.iter().next() {
            decrypt_entry(&cipher, name, entry)?;
        }

        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = cipher
            .encrypt(&nonce, value.as_bytes())
            .map_err(|_| SecretsError::AuthFailed)?;

        entries.insert(
            key.to_string(),
            SecretEntry {
                nonce: BASE64.encode(nonce),
                ciphertext: BASE64.encode(ciphertext),
            },
        );
        atomic::save_json(&self.path, &entries)?;
        Ok(())
    }

    /// Decrypt every secret for this stack.
    ///
    /// With a wrong password this returns [`SecretsError::AuthFailed`]
    /// and no partial map; key names are not revealed to callers that
    /// fail authentication.
    pub fn get_all(
        &self,
        password: &str,
        salt: &[u8; SALT_LEN],
    ) -> Result<SecretMap, SecretsError> {
        let entries: HashMap<String, SecretEntry> =
            atomic::load_json(&self.path, "secret map")?.unwrap_or_default();
        if entries.is_empty() {
            return Ok(SecretMap::default());
        }

        let cipher = self.cipher(password, salt)?;
        let mut map = SecretMap::default();
        for (key, entry) in &entries {
            let plaintext = decrypt_entry(&cipher, key, entry)?;
            map.0.insert(key.clone(), plaintext);
        }
        Ok(map)
    }

    fn cipher(&self, password: &str, salt: &[u8; SALT_LEN]) -> Result<Aes256Gcm, SecretsError> {
        let key = derive_key(password, salt)?;
        Aes256Gcm::new_from_slice(key.as_slice()).map_err(|e| SecretsError::Kdf(e.to_string()))
    }
}

/// Derive a 32-byte key from password + salt via Argon2id.
///
/// Default Argon2id parameters land around the 100 ms mark on current
/// hardware, which is the cost target for interactive use. The derived
/// key zeroizes on drop.
fn derive_key(
    password: &str,
    salt: &[u8; SALT_LEN],
) -> Result<Zeroizing<[u8; KEY_LEN]>, SecretsError> {
    let mut key = Zeroizing::new([0u8; KEY_LEN]);
    argon2::Argon2::default()
        .hash_password_into(password.as_bytes(), salt, key.as_mut())
        .map_err(|e| SecretsError::Kdf(e.to_string()))?;
    Ok(key)
}

fn decrypt_entry(
    cipher: &Aes256Gcm,
    key: &str,
    entry: &SecretEntry,
) -> Result<String, SecretsError> {
    let nonce_bytes = BASE64.decode(&entry.nonce).map_err(|e| SecretsError::Corrupt {
        key: key.to_string(),
        message: format!("bad nonce encoding: {e}"),
    })?;
    if nonce_bytes.len() != 12 {
        return Err(SecretsError::Corrupt {
            key: key.to_string(),
            message: "nonce has wrong length".to_string(),
        });
    }
    let ciphertext = BASE64
        .decode(&entry.ciphertext)
        .map_err(|e| SecretsError::Corrupt {
            key: key.to_string(),
            message: format!("bad ciphertext encoding: {e}"),
        })?;

    let nonce = Nonce::from_slice(&nonce_bytes);
    let mut plaintext = cipher
        .decrypt(nonce, ciphertext.as_slice())
        .map_err(|_| SecretsError::AuthFailed)?;

    let result = String::from_utf8(plaintext.clone()).map_err(|_| SecretsError::Corrupt {
        key: key.to_string(),
        message: "plaintext is not valid UTF-8".to_string(),
    });
    plaintext.zeroize();
    result
}

#[cfg(test)]
#[path = "secrets_tests.rs"]
mod tests;
