use crate::error::{Error, Result};
use serde_json::{Map, Value};
use std::fs;
use std::path::PathBuf;
use tracing::{debug, warn};

/// Byte budgets mirroring the synced store's platform limits.
#[derive(Debug, Clone, Copy)]
pub struct QuotaLimits {
    /// Total serialized size of the whole store
    pub total_bytes: usize,
    /// Serialized size of a single `{key: value}` payload
    pub per_item_bytes: usize,
}

/// Limits of the synced backend: ~100KB total, ~8KB per item.
pub const SYNCED_QUOTA: QuotaLimits = QuotaLimits {
    total_bytes: 102_400,
    per_item_bytes: 8_192,
};

/// Serialized byte size of a `{key: value}` payload, as the synced store
/// measures writes.
pub fn payload_size(key: &str, value: &Value) -> Result<usize> {
    let mut payload = Map::new();
    payload.insert(key.to_string(), value.clone());
    Ok(serde_json::to_vec(&payload)?.len())
}

/// A JSON-file-backed key/value store, optionally quota-limited.
///
/// The synced backend gets [`SYNCED_QUOTA`]; the device-local and fallback
/// backends are unconstrained.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    quota: Option<QuotaLimits>,
    entries: Map<String, Value>,
}

impl FileStore {
    /// Open a store at `path`, loading existing contents if present.
    pub fn open(path: PathBuf, quota: Option<QuotaLimits>) -> Result<Self> {
        let entries = if path.exists() {
            let data = fs::read(&path)?;
            match serde_json::from_slice::<Map<String, Value>>(&data) {
                Ok(map) => map,
                Err(e) => {
                    warn!("Discarding corrupt store file {:?}: {}", path, e);
                    Map::new()
                }
            }
        } else {
            debug!("Store file not found at {:?}, starting empty", path);
            Map::new()
        };

        Ok(Self {
            path,
            quota,
            entries,
        })
    }

    /// Persist the current contents. Creates parent directories if needed.
    fn persist(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let json = serde_json::to_vec_pretty(&self.entries)?;
        fs::write(&self.path, json)?;
        debug!("Store saved to {:?}", self.path);
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    /// Fetch several keys at once; absent keys are left out of the result.
    pub fn get_many(&self, keys: &[&str]) -> Map<String, Value> {
        let mut result = Map::new();
        for key in keys {
            if let Some(value) = self.entries.get(*key) {
                result.insert((*key).to_string(), value.clone());
            }
        }
        result
    }

    /// Write one key. Quota-limited stores reject oversized payloads with
    /// [`Error::QuotaExceeded`] before anything touches disk.
    pub fn set(&mut self, key: &str, value: Value) -> Result<()> {
        if let Some(quota) = self.quota {
            let item_size = payload_size(key, &value)?;
            if item_size > quota.per_item_bytes {
                return Err(Error::QuotaExceeded {
                    size: item_size,
                    limit: quota.per_item_bytes,
                });
            }

            let mut next = self.entries.clone();
            next.insert(key.to_string(), value.clone());
            let total_size = serde_json::to_vec(&next)?.len();
            if total_size > quota.total_bytes {
                return Err(Error::QuotaExceeded {
                    size: total_size,
                    limit: quota.total_bytes,
                });
            }
        }

        self.entries.insert(key.to_string(), value);
        self.persist()
    }

    pub fn remove(&mut self, key: &str) -> Result<()> {
        if self.entries.remove(key).is_some() {
            self.persist()?;
        }
        Ok(())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
