use crate::error::{Error, Result};
use crate::storage::backend::{payload_size, FileStore, SYNCED_QUOTA};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Keys under which page state is persisted. The names are part of the
/// stored data format.
pub mod keys {
    pub const SETTINGS: &str = "settings";
    pub const SHORTCUTS: &str = "shortcuts";
    pub const VERSION: &str = "version";
    pub const SEARCH_HISTORY: &str = "searchHistory";
    pub const UPLOADED_BACKGROUND: &str = "uploadedBackground";
    pub const WALLPAPER_URL: &str = "wallpaperUrl";
}

/// Fixed key holding the synced-store payload map inside the fallback store.
const FALLBACK_KEY: &str = "newtab_data";

/// Stored data format version.
pub const CURRENT_VERSION: &str = "1.0.0";

/// Which backend a write ultimately landed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreTarget {
    Synced,
    Local,
    Fallback,
}

/// A completed write, drained by the session to refresh in-memory caches.
#[derive(Debug, Clone)]
pub struct ChangeEvent {
    pub key: String,
    pub target: StoreTarget,
}

/// Storage directory resolution. Fails with [`Error::HostContext`] when no
/// data directory exists, which the shell turns into the fixed fallback page.
#[derive(Debug, Clone)]
pub struct StorageDirs {
    pub data_dir: PathBuf,
}

impl StorageDirs {
    /// Resolve the platform data directory.
    pub fn resolve() -> Result<Self> {
        let data_dir = dirs::data_dir().ok_or(Error::HostContext)?;
        Ok(Self {
            data_dir: data_dir.join("freshtab"),
        })
    }

    /// Root all stores under an explicit directory.
    pub fn at(root: &Path) -> Self {
        Self {
            data_dir: root.to_path_buf(),
        }
    }
}

/// Key/value store adapter over the quota-limited synced backend, the
/// device-local backend, and the single-blob fallback store.
///
/// Writes that exceed the synced quota are redirected into the fallback blob
/// and surfaced as a one-time notice; parked keys are replayed into the
/// synced store after the next successful synced write.
#[derive(Debug)]
pub struct StoreAdapter {
    synced: FileStore,
    local: FileStore,
    fallback: FileStore,
    notices: Vec<String>,
    fallback_notice_shown: bool,
    changes: Vec<ChangeEvent>,
}

impl StoreAdapter {
    /// Open all three backends under the given storage directories.
    pub fn open(dirs: &StorageDirs) -> Result<Self> {
        let synced = FileStore::open(dirs.data_dir.join("sync.json"), Some(SYNCED_QUOTA))?;
        let local = FileStore::open(dirs.data_dir.join("local.json"), None)?;
        let fallback = FileStore::open(dirs.data_dir.join("fallback.json"), None)?;

        info!("Storage opened under {:?}", dirs.data_dir);
        Ok(Self {
            synced,
            local,
            fallback,
            notices: Vec::new(),
            fallback_notice_shown: false,
            changes: Vec::new(),
        })
    }

    /// Open the adapter at the platform default location.
    pub fn open_default() -> Result<Self> {
        Self::open(&StorageDirs::resolve()?)
    }

    /// Read synced keys. Values parked in the fallback blob fill in for keys
    /// the primary store does not hold, so a write that fell back stays
    /// visible to readers.
    pub fn get_synced(&self, keys: &[&str]) -> Map<String, Value> {
        let mut result = self.synced.get_many(keys);

        if result.len() < keys.len() {
            if let Some(parked) = self.fallback_blob() {
                for key in keys {
                    if !result.contains_key(*key) {
                        if let Some(value) = parked.get(*key) {
                            result.insert((*key).to_string(), value.clone());
                        }
                    }
                }
            }
        }

        result
    }

    /// Write one synced key with quota-aware fallback.
    ///
    /// Oversized payloads are redirected to the fallback blob before the
    /// backend is touched; a quota rejection from the backend falls back the
    /// same way. Any other failure propagates.
    pub fn set_synced(&mut self, key: &str, value: Value) -> Result<StoreTarget> {
        let item_size = payload_size(key, &value)?;
        if item_size > SYNCED_QUOTA.per_item_bytes {
            warn!(
                "Payload for '{}' is {} bytes, over the per-item limit; redirecting to fallback",
                key, item_size
            );
            self.park_in_fallback(key, value)?;
            self.notice_once(
                "Data size exceeds synced storage limits. Falling back to local storage.",
            );
            self.changes.push(ChangeEvent {
                key: key.to_string(),
                target: StoreTarget::Fallback,
            });
            return Ok(StoreTarget::Fallback);
        }

        match self.synced.set(key, value.clone()) {
            Ok(()) => {
                self.changes.push(ChangeEvent {
                    key: key.to_string(),
                    target: StoreTarget::Synced,
                });
                self.reconcile()?;
                Ok(StoreTarget::Synced)
            }
            Err(Error::QuotaExceeded { size, limit }) => {
                warn!(
                    "Synced store rejected '{}' ({} bytes over {}); redirecting to fallback",
                    key, size, limit
                );
                self.park_in_fallback(key, value)?;
                self.notice_once(
                    "Synced storage quota exceeded. Falling back to local storage.",
                );
                self.changes.push(ChangeEvent {
                    key: key.to_string(),
                    target: StoreTarget::Fallback,
                });
                Ok(StoreTarget::Fallback)
            }
            Err(e) => Err(e),
        }
    }

    /// Write several synced keys, pre-checking the combined payload against
    /// the total budget the way first-run initialization does.
    pub fn set_synced_many(&mut self, updates: Map<String, Value>) -> Result<StoreTarget> {
        let total = serde_json::to_vec(&updates)?.len();
        if total > SYNCED_QUOTA.total_bytes {
            warn!(
                "Initial payload of {} bytes exceeds the synced total budget; using fallback",
                total
            );
            for (key, value) in updates {
                self.park_in_fallback(&key, value)?;
                self.changes.push(ChangeEvent {
                    key,
                    target: StoreTarget::Fallback,
                });
            }
            self.notice_once(
                "Initial data exceeds synced storage limits. Using local storage.",
            );
            return Ok(StoreTarget::Fallback);
        }

        let mut target = StoreTarget::Synced;
        for (key, value) in updates {
            if self.set_synced(&key, value)? == StoreTarget::Fallback {
                target = StoreTarget::Fallback;
            }
        }
        Ok(target)
    }

    /// Remove a synced key from the primary store and the fallback blob.
    pub fn remove_synced(&mut self, key: &str) -> Result<()> {
        self.synced.remove(key)?;

        if let Some(mut parked) = self.fallback_blob() {
            if parked.remove(key).is_some() {
                self.write_fallback_blob(parked)?;
            }
        }

        self.changes.push(ChangeEvent {
            key: key.to_string(),
            target: StoreTarget::Synced,
        });
        Ok(())
    }

    pub fn get_local(&self, key: &str) -> Option<Value> {
        self.local.get(key).cloned()
    }

    pub fn set_local(&mut self, key: &str, value: Value) -> Result<()> {
        self.local.set(key, value)?;
        self.changes.push(ChangeEvent {
            key: key.to_string(),
            target: StoreTarget::Local,
        });
        Ok(())
    }

    pub fn remove_local(&mut self, key: &str) -> Result<()> {
        self.local.remove(key)?;
        self.changes.push(ChangeEvent {
            key: key.to_string(),
            target: StoreTarget::Local,
        });
        Ok(())
    }

    /// Drain queued user-visible notices.
    pub fn take_notices(&mut self) -> Vec<String> {
        std::mem::take(&mut self.notices)
    }

    /// Drain change events since the last call.
    pub fn take_changes(&mut self) -> Vec<ChangeEvent> {
        std::mem::take(&mut self.changes)
    }

    /// Whether any keys are currently parked in the fallback blob.
    pub fn has_parked_data(&self) -> bool {
        self.fallback_blob().map(|b| !b.is_empty()).unwrap_or(false)
    }

    fn fallback_blob(&self) -> Option<Map<String, Value>> {
        self.fallback
            .get(FALLBACK_KEY)
            .and_then(Value::as_object)
            .cloned()
    }

    fn write_fallback_blob(&mut self, blob: Map<String, Value>) -> Result<()> {
        if blob.is_empty() {
            self.fallback.remove(FALLBACK_KEY)
        } else {
            self.fallback.set(FALLBACK_KEY, Value::Object(blob))
        }
    }

    /// Move a key into the fallback blob. Any stale copy in the synced
    /// store is dropped so reads fall through to the parked value; a key
    /// lives in exactly one of the two stores.
    fn park_in_fallback(&mut self, key: &str, value: Value) -> Result<()> {
        let mut blob = self.fallback_blob().unwrap_or_default();
        blob.insert(key.to_string(), value);
        self.write_fallback_blob(blob)?;
        self.synced.remove(key)
    }

    fn notice_once(&mut self, message: &str) {
        if !self.fallback_notice_shown {
            self.notices.push(message.to_string());
            self.fallback_notice_shown = true;
        }
    }

    /// Replay parked fallback keys into the synced store. Keys that still
    /// exceed quota stay parked.
    fn reconcile(&mut self) -> Result<()> {
        let Some(parked) = self.fallback_blob() else {
            return Ok(());
        };

        let mut remaining = Map::new();
        for (key, value) in parked {
            let item_size = payload_size(&key, &value)?;
            if item_size > SYNCED_QUOTA.per_item_bytes {
                remaining.insert(key, value);
                continue;
            }

            match self.synced.set(&key, value.clone()) {
                Ok(()) => {
                    debug!("Reconciled fallback key '{}' into the synced store", key);
                    self.changes.push(ChangeEvent {
                        key,
                        target: StoreTarget::Synced,
                    });
                }
                Err(Error::QuotaExceeded { .. }) => {
                    remaining.insert(key, value);
                }
                Err(e) => {
                    warn!("Reconciliation write for '{}' failed: {}", key, e);
                    remaining.insert(key, value);
                }
            }
        }

        self.write_fallback_blob(remaining)
    }
}
