use crate::error::Result;
use crate::storage::{keys, StoreAdapter};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::rc::Rc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};

/// History is a capped most-recent-first queue.
pub const MAX_SEARCH_HISTORY: usize = 50;

/// One remembered search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub query: String,
    /// Epoch milliseconds of the last submission
    pub timestamp: u64,
}

/// Record a query at the front. An existing entry with the same
/// case-insensitive text is removed first, so re-searching moves it up and
/// refreshes its timestamp instead of duplicating it.
pub fn record(entries: &mut Vec<HistoryEntry>, query: &str, now_ms: u64) {
    let lowered = query.to_lowercase();
    entries.retain(|entry| entry.query.to_lowercase() != lowered);

    entries.insert(
        0,
        HistoryEntry {
            query: query.to_string(),
            timestamp: now_ms,
        },
    );
    entries.truncate(MAX_SEARCH_HISTORY);
}

/// Case-insensitive prefix filter. An empty prefix returns the full list.
pub fn filter(entries: &[HistoryEntry], prefix: &str) -> Vec<HistoryEntry> {
    let prefix = prefix.trim();
    if prefix.is_empty() {
        return entries.to_vec();
    }

    let lowered = prefix.to_lowercase();
    entries
        .iter()
        .filter(|entry| entry.query.to_lowercase().starts_with(&lowered))
        .cloned()
        .collect()
}

/// Remove the entry with exactly this query text. Returns whether anything
/// was removed.
pub fn remove(entries: &mut Vec<HistoryEntry>, query: &str) -> bool {
    let before = entries.len();
    entries.retain(|entry| entry.query != query);
    entries.len() != before
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Persisted search history, stored in the device-local backend.
#[derive(Debug, Clone)]
pub struct SearchHistory {
    store: Rc<RefCell<StoreAdapter>>,
}

impl SearchHistory {
    pub fn new(store: Rc<RefCell<StoreAdapter>>) -> Self {
        Self { store }
    }

    /// Load all entries, most recent first.
    pub fn load(&self) -> Vec<HistoryEntry> {
        match self.store.borrow().get_local(keys::SEARCH_HISTORY) {
            Some(value) => serde_json::from_value(value).unwrap_or_else(|e| {
                warn!("Discarding unparseable search history: {}", e);
                Vec::new()
            }),
            None => Vec::new(),
        }
    }

    fn save(&self, mut entries: Vec<HistoryEntry>) -> Result<()> {
        entries.truncate(MAX_SEARCH_HISTORY);
        let value = serde_json::to_value(&entries)?;
        self.store
            .borrow_mut()
            .set_local(keys::SEARCH_HISTORY, value)
    }

    /// Record a submitted query.
    pub fn record(&self, query: &str) -> Result<()> {
        let mut entries = self.load();
        record(&mut entries, query, now_ms());
        debug!("Recorded search '{}' ({} entries)", query, entries.len());
        self.save(entries)
    }

    /// Entries matching the given prefix.
    pub fn matching(&self, prefix: &str) -> Vec<HistoryEntry> {
        filter(&self.load(), prefix)
    }

    /// Explicit user delete of one remembered query.
    pub fn remove(&self, query: &str) -> Result<()> {
        let mut entries = self.load();
        if remove(&mut entries, query) {
            self.save(entries)?;
        }
        Ok(())
    }
}
