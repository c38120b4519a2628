//! Encrypted secret store — authenticated at-rest storage for job secrets.
//!
//! Secrets are held as a single JSON document `{key: value}`, encrypted as
//! a whole with AES-256-GCM. The on-disk format is
//! `base64(iv || tag || ciphertext)`; the 256-bit key lives base64-encoded
//! in a sibling file. Both files are created with owner-only permissions
//! (0600). The store never logs plaintext.
//!
//! There is no key rotation here — that's an out-of-band operator
//! procedure, not a core responsibility.

use crate::error::{Result, SupervisorError};
use aes_gcm::aead::{Aead, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, AeadCore, Key, Nonce};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use zeroize::Zeroizing;

use super::value_expr::ValueExpression;

const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;
const KEY_LEN: usize = 32;

/// Authenticated, encrypted key-value store for secrets referenced from job
/// configurations.
pub struct SecretStore {
    secrets_path: PathBuf,
    key_path: PathBuf,
    /// Read-through cache of successfully-read values. Absent keys are
    /// never cached, so a later `set` on another process is observed.
    cache: Mutex<HashMap<String, String>>,
}

impl SecretStore {
    pub fn new(secrets_path: impl Into<PathBuf>, key_path: impl Into<PathBuf>) -> Self {
        Self {
            secrets_path: secrets_path.into(),
            key_path: key_path.into(),
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Default prefix used by `import_from_env` when the caller doesn't
    /// specify one (the secrets CLI's `import` verb).
    pub const DEFAULT_IMPORT_PREFIX: &'static str = "SECRET_";

    pub fn get(&self, key: &str) -> Result<Option<String>> {
        if let Some(cached) = self.cache.lock().unwrap().get(key) {
            return Ok(Some(cached.clone()));
        }
        let doc = self.load_document()?;
        match doc.get(key) {
            Some(value) => {
                self.cache
                    .lock()
                    .unwrap()
                    .insert(key.to_string(), value.clone());
                Ok(Some(value.clone()))
            }
            None => Ok(None),
        }
    }

    pub fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.get(key)?.is_some())
    }

    pub fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut doc = self.load_document()?;
        doc.insert(key.to_string(), value.to_string());
        self.save_document(&doc)?;
        self.cache
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    /// Returns whether a key was present and removed.
    pub fn delete(&self, key: &str) -> Result<bool> {
        let mut doc = self.load_document()?;
        let removed = doc.remove(key).is_some();
        if removed {
            self.save_document(&doc)?;
            self.cache.lock().unwrap().remove(key);
        }
        Ok(removed)
    }

    /// Lexicographically sorted key list.
    pub fn keys(&self) -> Result<Vec<String>> {
        Ok(self.load_document()?.into_keys().collect())
    }

    /// Import every process environment variable whose name begins with
    /// `prefix`, storing the remainder of the name as the key. Returns the
    /// number of variables imported.
    pub fn import_from_env(&self, prefix: &str) -> Result<usize> {
        let mut doc = self.load_document()?;
        let mut count = 0usize;
        for (name, value) in std::env::vars() {
            if let Some(key) = name.strip_prefix(prefix) {
                doc.insert(key.to_string(), value);
                count += 1;
            }
        }
        if count > 0 {
            self.save_document(&doc)?;
            self.cache.lock().unwrap().clear();
        }
        Ok(count)
    }

    /// Copy the encrypted store to `dst`. Returns whether a copy happened
    /// (`false` if the primary file doesn't exist yet).
    pub fn backup(&self, dst: &Path) -> Result<bool> {
        if !self.secrets_path.exists() {
            return Ok(false);
        }
        fs::copy(&self.secrets_path, dst)
            .map_err(|e| SupervisorError::configuration(format!("backup failed: {e}")))?;
        Ok(true)
    }

    /// Resolve a mapping of value expressions (as raw strings) to their
    /// concrete values. `secret:`/`env:`/`file:` references that cannot be
    /// resolved raise `SupervisorError::Validation`; anything else passes
    /// through unchanged.
    pub fn resolve(&self, mapping: &BTreeMap<String, String>) -> Result<HashMap<String, String>> {
        let mut resolved = HashMap::with_capacity(mapping.len());
        for (name, raw) in mapping {
            let value = match ValueExpression::parse(raw) {
                ValueExpression::Literal(s) => s,
                ValueExpression::Secret(key) => self.get(&key)?.ok_or_else(|| {
                    SupervisorError::validation(format!("Secret not found: {key}"))
                })?,
                ValueExpression::Env(var) => std::env::var(&var).map_err(|_| {
                    SupervisorError::validation(format!(
                        "Environment variable not found: {var}"
                    ))
                })?,
                ValueExpression::File(path) => {
                    let contents = fs::read_to_string(&path).map_err(|_| {
                        SupervisorError::validation(format!(
                            "Cannot read file: {}",
                            path.display()
                        ))
                    })?;
                    contents.trim_matches(|c: char| c.is_ascii_whitespace()).to_string()
                }
            };
            resolved.insert(name.clone(), value);
        }
        Ok(resolved)
    }

    // ── on-disk document ────────────────────────────────────────────────

    fn load_document(&self) -> Result<BTreeMap<String, String>> {
        if !self.secrets_path.exists() {
            return Ok(BTreeMap::new());
        }
        let raw = fs::read_to_string(&self.secrets_path).map_err(|e| {
            SupervisorError::security(format!("Failed to load secrets: {e}"))
        })?;
        let blob = BASE64.decode(raw.trim()).map_err(|e| {
            SupervisorError::security(format!("Failed to load secrets: corrupt base64 ({e})"))
        })?;
        if blob.len() < NONCE_LEN + TAG_LEN {
            return Err(SupervisorError::security(
                "Failed to load secrets: ciphertext too short",
            ));
        }
        let (nonce_bytes, rest) = blob.split_at(NONCE_LEN);
        let (tag, ciphertext) = rest.split_at(TAG_LEN);

        let key_bytes = self.load_or_create_key()?;
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key_bytes));
        let nonce = Nonce::from_slice(nonce_bytes);

        // aes-gcm expects ciphertext with the tag appended at the end.
        let mut combined = Vec::with_capacity(ciphertext.len() + TAG_LEN);
        combined.extend_from_slice(ciphertext);
        combined.extend_from_slice(tag);

        let plaintext = cipher.decrypt(nonce, combined.as_ref()).map_err(|_| {
            SupervisorError::security(
                "Failed to load secrets: decryption failed (wrong key or tampered data)",
            )
        })?;

        serde_json::from_slice(&plaintext).map_err(|e| {
            SupervisorError::security(format!("Failed to load secrets: malformed document ({e})"))
        })
    }

    fn save_document(&self, doc: &BTreeMap<String, String>) -> Result<()> {
        let plaintext = serde_json::to_vec(doc)
            .map_err(|e| SupervisorError::configuration(format!("serialize secrets: {e}")))?;

        let key_bytes = self.load_or_create_key()?;
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key_bytes));
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let combined = cipher
            .encrypt(&nonce, plaintext.as_ref())
            .map_err(|e| SupervisorError::configuration(format!("encryption failed: {e}")))?;

        // `combined` is ciphertext || tag (RustCrypto convention). Reorder
        // to the documented on-disk layout: iv || tag || ciphertext.
        let (ciphertext, tag) = combined.split_at(combined.len() - TAG_LEN);
        let mut blob = Vec::with_capacity(NONCE_LEN + TAG_LEN + ciphertext.len());
        blob.extend_from_slice(&nonce);
        blob.extend_from_slice(tag);
        blob.extend_from_slice(ciphertext);

        let encoded = BASE64.encode(&blob);

        // Write to a sibling temp file then rename, so a crash mid-write
        // leaves the previous ciphertext intact.
        let tmp_path = self.secrets_path.with_extension("tmp");
        if let Some(parent) = self.secrets_path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| SupervisorError::configuration(format!("create dir: {e}")))?;
        }
        fs::write(&tmp_path, encoded)
            .map_err(|e| SupervisorError::configuration(format!("write secrets: {e}")))?;
        set_owner_only(&tmp_path)?;
        fs::rename(&tmp_path, &self.secrets_path)
            .map_err(|e| SupervisorError::configuration(format!("rename secrets: {e}")))?;
        Ok(())
    }

    fn load_or_create_key(&self) -> Result<Zeroizing<Vec<u8>>> {
        if self.key_path.exists() {
            let encoded = fs::read_to_string(&self.key_path).map_err(|e| {
                SupervisorError::security(format!("Failed to load secrets: key read: {e}"))
            })?;
            let key = BASE64.decode(encoded.trim()).map_err(|e| {
                SupervisorError::security(format!("Failed to load secrets: corrupt key ({e})"))
            })?;
            if key.len() != KEY_LEN {
                return Err(SupervisorError::security(
                    "Failed to load secrets: key file has wrong length",
                ));
            }
            Ok(Zeroizing::new(key))
        } else {
            let key = Aes256Gcm::generate_key(&mut OsRng).to_vec();
            if let Some(parent) = self.key_path.parent() {
                fs::create_dir_all(parent)
                    .map_err(|e| SupervisorError::configuration(format!("create dir: {e}")))?;
            }
            fs::write(&self.key_path, BASE64.encode(&key))
                .map_err(|e| SupervisorError::configuration(format!("write key: {e}")))?;
            set_owner_only(&self.key_path)?;
            Ok(Zeroizing::new(key))
        }
    }
}

#[cfg(unix)]
fn set_owner_only(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))
        .map_err(|e| SupervisorError::configuration(format!("chmod {}: {e}", path.display())))
}

#[cfg(not(unix))]
fn set_owner_only(_path: &Path) -> Result<()> {
    Ok(())
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
