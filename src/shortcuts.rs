use crate::error::{Error, Result};
use crate::storage::{keys, StoreAdapter};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::rc::Rc;
use tracing::{debug, info};
use url::Url;
use uuid::Uuid;

/// Display-order cap on the shortcut grid.
pub const MAX_SHORTCUTS: usize = 20;

/// Upper bound on user-supplied titles.
pub const MAX_TITLE_LEN: usize = 50;

/// A bookmark tile on the grid. Order within the stored list is the display
/// order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shortcut {
    pub id: Uuid,
    pub title: String,
    pub url: String,
}

/// Accept only absolute http/https URLs.
pub fn is_valid_url(input: &str) -> bool {
    match Url::parse(input) {
        Ok(url) => url.scheme() == "http" || url.scheme() == "https",
        Err(_) => false,
    }
}

/// Field-level outcome of validating the add/edit form, so the shell can
/// mark both fields in a single pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FieldErrors {
    pub title: Option<String>,
    pub url: Option<String>,
}

impl FieldErrors {
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.url.is_none()
    }
}

/// Validate form input for add/edit. Collects all failing fields.
pub fn validate_input(title: &str, url: &str) -> FieldErrors {
    let mut errors = FieldErrors::default();

    let title = title.trim();
    if title.is_empty() {
        errors.title = Some(Error::EmptyTitle.to_string());
    } else if title.chars().count() > MAX_TITLE_LEN {
        errors.title = Some(Error::TitleTooLong(MAX_TITLE_LEN).to_string());
    }

    if !is_valid_url(url.trim()) {
        errors.url = Some(Error::InvalidUrl.to_string());
    }

    errors
}

/// CRUD and reordering over the persisted shortcut list.
///
/// Every operation is a full read-modify-write cycle against the store
/// adapter; there is no partially written state to observe.
#[derive(Debug, Clone)]
pub struct ShortcutManager {
    store: Rc<RefCell<StoreAdapter>>,
}

impl ShortcutManager {
    pub fn new(store: Rc<RefCell<StoreAdapter>>) -> Self {
        Self { store }
    }

    /// The shortcut list seeded on first run.
    pub fn default_shortcuts() -> Vec<Shortcut> {
        vec![
            Shortcut {
                id: Uuid::new_v4(),
                title: "Google".to_string(),
                url: "https://google.com".to_string(),
            },
            Shortcut {
                id: Uuid::new_v4(),
                title: "YouTube".to_string(),
                url: "https://youtube.com".to_string(),
            },
        ]
    }

    /// Current list in display order.
    pub fn list(&self) -> Vec<Shortcut> {
        let values = self.store.borrow().get_synced(&[keys::SHORTCUTS]);
        match values.get(keys::SHORTCUTS) {
            Some(value) => serde_json::from_value(value.clone()).unwrap_or_else(|e| {
                tracing::warn!("Discarding unparseable shortcut list: {}", e);
                Vec::new()
            }),
            None => Vec::new(),
        }
    }

    fn save(&self, shortcuts: &[Shortcut]) -> Result<()> {
        let value = serde_json::to_value(shortcuts)?;
        self.store.borrow_mut().set_synced(keys::SHORTCUTS, value)?;
        Ok(())
    }

    /// Append a new shortcut. Fails with [`Error::LimitExceeded`] at the cap
    /// and with validation errors on bad input; nothing is written in either
    /// case.
    pub fn add(&self, title: &str, url: &str) -> Result<Shortcut> {
        let title = title.trim();
        let url = url.trim();
        validate(title, url)?;

        let mut shortcuts = self.list();
        if shortcuts.len() >= MAX_SHORTCUTS {
            return Err(Error::LimitExceeded(MAX_SHORTCUTS));
        }

        let shortcut = Shortcut {
            id: Uuid::new_v4(),
            title: title.to_string(),
            url: url.to_string(),
        };
        shortcuts.push(shortcut.clone());
        self.save(&shortcuts)?;

        info!("Added shortcut '{}' ({})", shortcut.title, shortcut.url);
        Ok(shortcut)
    }

    /// Replace title/url of an existing shortcut, preserving id and position.
    pub fn edit(&self, id: Uuid, title: &str, url: &str) -> Result<Shortcut> {
        let title = title.trim();
        let url = url.trim();
        validate(title, url)?;

        let mut shortcuts = self.list();
        let entry = shortcuts
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or(Error::NotFound(id))?;

        entry.title = title.to_string();
        entry.url = url.to_string();
        let updated = entry.clone();
        self.save(&shortcuts)?;

        info!("Edited shortcut {}", id);
        Ok(updated)
    }

    /// Remove by id. An unknown id is a silent no-op; returns whether
    /// anything was removed.
    pub fn remove(&self, id: Uuid) -> Result<bool> {
        let mut shortcuts = self.list();
        let before = shortcuts.len();
        shortcuts.retain(|s| s.id != id);

        if shortcuts.len() == before {
            debug!("Delete of unknown shortcut {} ignored", id);
            return Ok(false);
        }

        self.save(&shortcuts)?;
        info!("Removed shortcut {}", id);
        Ok(true)
    }

    /// Move the dragged entry to the target's index: both indices are
    /// resolved before removal, then the dragged entry is spliced out and
    /// reinserted. Equal ids are a no-op.
    pub fn reorder(&self, dragged: Uuid, target: Uuid) -> Result<()> {
        if dragged == target {
            return Ok(());
        }

        let mut shortcuts = self.list();
        let dragged_index = shortcuts
            .iter()
            .position(|s| s.id == dragged)
            .ok_or(Error::NotFound(dragged))?;
        let target_index = shortcuts
            .iter()
            .position(|s| s.id == target)
            .ok_or(Error::NotFound(target))?;

        let entry = shortcuts.remove(dragged_index);
        shortcuts.insert(target_index, entry);
        self.save(&shortcuts)?;

        debug!("Moved shortcut {} to index {}", dragged, target_index);
        Ok(())
    }
}

/// Strict single-error validation used by the mutation paths.
fn validate(title: &str, url: &str) -> Result<()> {
    if title.is_empty() {
        return Err(Error::EmptyTitle);
    }
    if title.chars().count() > MAX_TITLE_LEN {
        return Err(Error::TitleTooLong(MAX_TITLE_LEN));
    }
    if !is_valid_url(url) {
        return Err(Error::InvalidUrl);
    }
    Ok(())
}
