//! Encrypted secret store for the closed set of upstream credentials.
//!
//! Values are AES-256-GCM encrypted ("iv:tag:ciphertext" in hex) and kept
//! in `{data_dir}/secrets.json`. The key comes from the
//! `SPIEGEL_ENCRYPTION_KEY` env var or is auto-generated into
//! `{data_dir}/.secret_key`. Secrets are read lazily each time they are
//! needed; nothing is cached in memory.

use std::path::{Path, PathBuf};

use aes_gcm::aead::{Aead, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Nonce};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::store_util::write_atomic;

/// The closed set of supported secret keys.
pub const SECRET_KEYS: [&str; 5] = [
    "scm-token",
    "tracker-username",
    "tracker-pat",
    "qa-internal-key",
    "telemetry-key",
];

pub fn is_supported_key(key: &str) -> bool {
    SECRET_KEYS.contains(&key)
}

// ── Encryption helpers ────────────────────────────────────────

/// Encrypt a secret value using AES-256-GCM. Returns "iv:tag:ciphertext" in hex.
fn encrypt_value(key: &[u8; 32], plaintext: &str) -> anyhow::Result<String> {
    let cipher = Aes256Gcm::new_from_slice(key)
        .map_err(|e| anyhow::anyhow!("Failed to create cipher: {}", e))?;

    let mut iv_bytes = [0u8; 12];
    OsRng.fill_bytes(&mut iv_bytes);
    let nonce = Nonce::from_slice(&iv_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext.as_bytes())
        .map_err(|e| anyhow::anyhow!("Encryption failed: {}", e))?;

    // AES-GCM appends the 16-byte tag to the ciphertext.
    let tag_offset = ciphertext.len() - 16;
    let ct = &ciphertext[..tag_offset];
    let tag = &ciphertext[tag_offset..];

    Ok(format!(
        "{}:{}:{}",
        hex::encode(iv_bytes),
        hex::encode(tag),
        hex::encode(ct)
    ))
}

/// Decrypt a secret value from "iv:tag:ciphertext" hex format.
fn decrypt_value(key: &[u8; 32], encrypted: &str) -> anyhow::Result<String> {
    let parts: Vec<&str> = encrypted.splitn(3, ':').collect();
    if parts.len() != 3 {
        anyhow::bail!("Invalid encrypted value format (expected iv:tag:ciphertext)");
    }

    let iv_bytes = hex::decode(parts[0])?;
    let tag_bytes = hex::decode(parts[1])?;
    let ct_bytes = hex::decode(parts[2])?;

    if iv_bytes.len() != 12 {
        anyhow::bail!("Invalid IV length: expected 12, got {}", iv_bytes.len());
    }

    let cipher = Aes256Gcm::new_from_slice(key)
        .map_err(|e| anyhow::anyhow!("Failed to create cipher: {}", e))?;
    let nonce = Nonce::from_slice(&iv_bytes);

    let mut combined = ct_bytes;
    combined.extend_from_slice(&tag_bytes);

    let plaintext = cipher
        .decrypt(nonce, combined.as_ref())
        .map_err(|e| anyhow::anyhow!("Decryption failed: {}", e))?;

    Ok(String::from_utf8(plaintext)?)
}

/// Load encryption key from `SPIEGEL_ENCRYPTION_KEY` env var or
/// auto-generate in `{data_dir}/.secret_key`.
fn load_or_generate_key(data_dir: &Path) -> anyhow::Result<[u8; 32]> {
    if let Ok(env_key) = std::env::var("SPIEGEL_ENCRYPTION_KEY") {
        let key_bytes = hex::decode(env_key.trim())?;
        if key_bytes.len() != 32 {
            anyhow::bail!(
                "SPIEGEL_ENCRYPTION_KEY must be 64 hex characters (32 bytes), got {} bytes",
                key_bytes.len()
            );
        }
        let mut key = [0u8; 32];
        key.copy_from_slice(&key_bytes);
        info!("Using encryption key from SPIEGEL_ENCRYPTION_KEY env var");
        return Ok(key);
    }

    let key_path = data_dir.join(".secret_key");
    if key_path.exists() {
        let hex_key = std::fs::read_to_string(&key_path)?;
        let key_bytes = hex::decode(hex_key.trim())?;
        if key_bytes.len() != 32 {
            anyhow::bail!(
                "Invalid key file at {}: expected 32 bytes, got {}",
                key_path.display(),
                key_bytes.len()
            );
        }
        let mut key = [0u8; 32];
        key.copy_from_slice(&key_bytes);
        return Ok(key);
    }

    let mut key = [0u8; 32];
    OsRng.fill_bytes(&mut key);
    std::fs::create_dir_all(data_dir)?;
    std::fs::write(&key_path, hex::encode(key))?;
    info!("Generated new encryption key at {}", key_path.display());
    Ok(key)
}

// ── Store ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredSecret {
    key: String,
    /// Encrypted value ("iv:tag:ciphertext" hex).
    value: String,
    created_at: String,
    updated_at: String,
}

pub struct SecretStore {
    path: PathBuf,
    key: [u8; 32],
}

impl SecretStore {
    pub fn open(data_dir: &Path) -> anyhow::Result<Self> {
        Ok(Self {
            path: data_dir.join("secrets.json"),
            key: load_or_generate_key(data_dir)?,
        })
    }

    fn load_stored(&self) -> anyhow::Result<Vec<StoredSecret>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let data = std::fs::read_to_string(&self.path)?;
        Ok(serde_json::from_str(&data)?)
    }

    fn save_stored(&self, records: &[StoredSecret]) -> anyhow::Result<()> {
        let data = serde_json::to_vec_pretty(records)?;
        write_atomic(&self.path, &data)
    }

    fn ensure_supported(key: &str) -> anyhow::Result<()> {
        if !is_supported_key(key) {
            anyhow::bail!("unsupported secret key: {}", key);
        }
        Ok(())
    }

    /// Decrypted value, or `None` when the secret is unset.
    pub fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        Self::ensure_supported(key)?;
        let stored = self.load_stored()?;
        match stored.iter().find(|s| s.key == key) {
            Some(s) => Ok(Some(decrypt_value(&self.key, &s.value)?)),
            None => Ok(None),
        }
    }

    pub fn has(&self, key: &str) -> anyhow::Result<bool> {
        Self::ensure_supported(key)?;
        Ok(self.load_stored()?.iter().any(|s| s.key == key))
    }

    pub fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
        Self::ensure_supported(key)?;
        let mut stored = self.load_stored()?;
        let now = chrono::Utc::now().to_rfc3339();
        let encrypted = encrypt_value(&self.key, value)?;

        match stored.iter_mut().find(|s| s.key == key) {
            Some(existing) => {
                existing.value = encrypted;
                existing.updated_at = now;
            }
            None => stored.push(StoredSecret {
                key: key.to_string(),
                value: encrypted,
                created_at: now.clone(),
                updated_at: now,
            }),
        }
        self.save_stored(&stored)?;
        info!("Stored secret '{}'", key);
        Ok(())
    }

    /// Remove a secret. Returns true if it existed.
    pub fn delete(&self, key: &str) -> anyhow::Result<bool> {
        Self::ensure_supported(key)?;
        let mut stored = self.load_stored()?;
        let len_before = stored.len();
        stored.retain(|s| s.key != key);
        if stored.len() == len_before {
            return Ok(false);
        }
        self.save_stored(&stored)?;
        info!("Deleted secret '{}'", key);
        Ok(true)
    }
}
