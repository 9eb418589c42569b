use crate::error::{Error, Result};
use crate::shortcuts::is_valid_url;
use crate::storage::{keys, StoreAdapter};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Uploaded background files are capped at 1.5MB.
pub const MAX_UPLOAD_BYTES: u64 = 1_572_864;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    System,
    Light,
    Dark,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackgroundType {
    Default,
    Color,
    Image,
    Upload,
}

/// The singleton display-preferences record, overwritten wholesale on save.
/// Field casing matches the stored data format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub theme: Theme,
    pub columns: u32,
    pub show_clock: bool,
    pub show_search: bool,
    pub show_shortcut: bool,
    /// Placeholder carried in the stored record; nothing reads it yet.
    pub show_weather: bool,
    pub background_type: BackgroundType,
    pub background_value: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            theme: Theme::System,
            columns: 4,
            show_clock: true,
            show_search: true,
            show_shortcut: true,
            show_weather: false,
            background_type: BackgroundType::Default,
            background_value: String::new(),
        }
    }
}

/// Which settings field a validation failure belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingsField {
    BackgroundImage,
    BackgroundUpload,
}

/// A field-level validation failure; save is blocked and the modal stays
/// open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettingsError {
    pub field: SettingsField,
    pub message: String,
}

impl SettingsError {
    fn image(message: &str) -> Self {
        Self {
            field: SettingsField::BackgroundImage,
            message: message.to_string(),
        }
    }

    fn upload(message: &str) -> Self {
        Self {
            field: SettingsField::BackgroundUpload,
            message: message.to_string(),
        }
    }
}

/// Result of a save attempt: committed, or blocked by a field error.
#[derive(Debug)]
pub enum SaveOutcome {
    Saved(Settings),
    Blocked(SettingsError),
}

/// The effective background for the shell to apply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackgroundSpec {
    Color(String),
    ImageUrl(String),
    DataUrl(String),
}

/// Network collaborator probing that a background image URL actually loads.
pub trait ImageProbe {
    fn probe(&self, url: &str) -> Result<()>;
}

/// Probe over HTTP: the URL must answer successfully with an image content
/// type.
pub struct HttpImageProbe {
    timeout: Duration,
}

impl HttpImageProbe {
    pub fn new(timeout_secs: u64) -> Self {
        Self {
            timeout: Duration::from_secs(timeout_secs),
        }
    }
}

impl ImageProbe for HttpImageProbe {
    fn probe(&self, url: &str) -> Result<()> {
        let response = ureq::get(url)
            .timeout(self.timeout)
            .call()
            .map_err(|e| Error::Network(e.to_string()))?;

        if !response.content_type().starts_with("image/") {
            return Err(Error::Network(format!(
                "{} is not an image ({})",
                url,
                response.content_type()
            )));
        }
        Ok(())
    }
}

/// Pure validation of an uploaded file, independent of any I/O. MIME and
/// size failures carry distinct user-facing messages.
pub fn validate_upload(mime: &str, size: u64) -> std::result::Result<(), SettingsError> {
    if !mime.starts_with("image/") {
        return Err(SettingsError::upload("File must be an image."));
    }
    if size > MAX_UPLOAD_BYTES {
        return Err(SettingsError::upload("File size must be under 1.5MB."));
    }
    Ok(())
}

/// Owns the persisted settings record and the background payload split: the
/// record itself goes through the synced store, large image/upload payloads
/// live under dedicated local keys because they can exceed the synced
/// per-item quota.
#[derive(Clone)]
pub struct SettingsManager {
    store: Rc<RefCell<StoreAdapter>>,
}

impl SettingsManager {
    pub fn new(store: Rc<RefCell<StoreAdapter>>) -> Self {
        Self { store }
    }

    /// Load the stored record, or defaults when absent/corrupt.
    pub fn load(&self) -> Settings {
        let values = self.store.borrow().get_synced(&[keys::SETTINGS]);
        match values.get(keys::SETTINGS) {
            Some(value) => serde_json::from_value(value.clone()).unwrap_or_else(|e| {
                warn!("Discarding unparseable settings record: {}", e);
                Settings::default()
            }),
            None => Settings::default(),
        }
    }

    /// Validate and commit an edited settings record.
    ///
    /// `upload` is the data URL produced by a prior file read, when the user
    /// picked one this session. Field-level failures block the save and are
    /// returned as [`SaveOutcome::Blocked`]; storage failures propagate.
    pub fn save(
        &self,
        mut temp: Settings,
        upload: Option<&str>,
        probe: &dyn ImageProbe,
    ) -> Result<SaveOutcome> {
        let previous = self.load();

        match temp.background_type {
            BackgroundType::Image => {
                let url = temp.background_value.trim().to_string();
                if url.is_empty() || !is_valid_url(&url) {
                    return Ok(SaveOutcome::Blocked(SettingsError::image(
                        "Please enter a valid URL.",
                    )));
                }
                if let Err(e) = probe.probe(&url) {
                    debug!("Background image probe failed: {}", e);
                    return Ok(SaveOutcome::Blocked(SettingsError::image(
                        "Failed to load image.",
                    )));
                }
            }
            BackgroundType::Upload => {
                if upload.is_none() && previous.background_type != BackgroundType::Upload {
                    return Ok(SaveOutcome::Blocked(SettingsError::upload(
                        "Please select an image file.",
                    )));
                }
            }
            BackgroundType::Color => {
                if temp.background_value.is_empty() {
                    temp.background_value = "#000000".to_string();
                }
            }
            BackgroundType::Default => {}
        }

        // The large payload goes to its local key, the opposite key is
        // cleared, and the synced record keeps only the type.
        let mut store = self.store.borrow_mut();
        match temp.background_type {
            BackgroundType::Upload => {
                if let Some(data_url) = upload {
                    store.set_local(keys::UPLOADED_BACKGROUND, Value::String(data_url.into()))?;
                    store.remove_local(keys::WALLPAPER_URL)?;
                }
                temp.background_value = String::new();
            }
            BackgroundType::Image => {
                let url = temp.background_value.trim().to_string();
                store.set_local(keys::WALLPAPER_URL, Value::String(url))?;
                store.remove_local(keys::UPLOADED_BACKGROUND)?;
                temp.background_value = String::new();
            }
            BackgroundType::Default | BackgroundType::Color => {
                store.remove_local(keys::UPLOADED_BACKGROUND)?;
                store.remove_local(keys::WALLPAPER_URL)?;
            }
        }

        let record = serde_json::to_value(&temp)?;
        store.set_synced(keys::SETTINGS, record)?;
        drop(store);

        info!("Settings saved ({:?})", temp.background_type);
        Ok(SaveOutcome::Saved(temp))
    }

    /// The effective background to apply for the given record.
    pub fn resolved_background(&self, settings: &Settings) -> Option<BackgroundSpec> {
        match settings.background_type {
            BackgroundType::Default => None,
            BackgroundType::Color => {
                let value = &settings.background_value;
                if is_hex_color(value) {
                    Some(BackgroundSpec::Color(value.clone()))
                } else {
                    None
                }
            }
            BackgroundType::Image => self
                .store
                .borrow()
                .get_local(keys::WALLPAPER_URL)
                .and_then(|v| v.as_str().map(|s| s.to_string()))
                .filter(|url| is_valid_url(url))
                .map(BackgroundSpec::ImageUrl),
            BackgroundType::Upload => self
                .store
                .borrow()
                .get_local(keys::UPLOADED_BACKGROUND)
                .and_then(|v| v.as_str().map(|s| s.to_string()))
                .map(BackgroundSpec::DataUrl),
        }
    }
}

/// `#RRGGBB` with hex digits only.
fn is_hex_color(value: &str) -> bool {
    value.len() == 7
        && value.starts_with('#')
        && value[1..].chars().all(|c| c.is_ascii_hexdigit())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::StorageDirs;

    /// Probe that never touches the network.
    struct StubProbe {
        ok: bool,
    }

    impl ImageProbe for StubProbe {
        fn probe(&self, _url: &str) -> Result<()> {
            if self.ok {
                Ok(())
            } else {
                Err(Error::Network("probe failed".to_string()))
            }
        }
    }

    fn temp_manager() -> (tempfile::TempDir, SettingsManager) {
        let dir = tempfile::tempdir().unwrap();
        let adapter = StoreAdapter::open(&StorageDirs::at(dir.path())).unwrap();
        (dir, SettingsManager::new(Rc::new(RefCell::new(adapter))))
    }

    fn saved(outcome: SaveOutcome) -> Settings {
        match outcome {
            SaveOutcome::Saved(settings) => settings,
            SaveOutcome::Blocked(e) => panic!("save blocked: {}", e.message),
        }
    }

    fn blocked(outcome: SaveOutcome) -> SettingsError {
        match outcome {
            SaveOutcome::Blocked(e) => e,
            SaveOutcome::Saved(_) => panic!("expected blocked save"),
        }
    }

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.theme, Theme::System);
        assert_eq!(settings.columns, 4);
        assert!(settings.show_clock);
        assert_eq!(settings.background_type, BackgroundType::Default);
    }

    #[test]
    fn test_stored_field_casing() {
        let json = serde_json::to_value(Settings::default()).unwrap();
        assert!(json.get("showClock").is_some());
        assert!(json.get("backgroundType").is_some());
        assert_eq!(json["backgroundType"], "default");
        assert_eq!(json["theme"], "system");
    }

    #[test]
    fn test_empty_image_url_blocks_save() {
        let (_dir, manager) = temp_manager();

        let mut temp = Settings::default();
        temp.background_type = BackgroundType::Image;
        temp.background_value = String::new();

        let err = blocked(manager.save(temp, None, &StubProbe { ok: true }).unwrap());
        assert_eq!(err.field, SettingsField::BackgroundImage);
        assert_eq!(err.message, "Please enter a valid URL.");

        // Nothing was committed.
        assert_eq!(manager.load(), Settings::default());
    }

    #[test]
    fn test_failed_probe_blocks_save() {
        let (_dir, manager) = temp_manager();

        let mut temp = Settings::default();
        temp.background_type = BackgroundType::Image;
        temp.background_value = "https://example.com/missing.png".to_string();

        let err = blocked(manager.save(temp, None, &StubProbe { ok: false }).unwrap());
        assert_eq!(err.message, "Failed to load image.");
    }

    #[test]
    fn test_image_save_splits_payload_into_local_store() {
        let (_dir, manager) = temp_manager();

        let mut temp = Settings::default();
        temp.background_type = BackgroundType::Image;
        temp.background_value = "https://example.com/bg.png".to_string();

        let committed = saved(manager.save(temp, None, &StubProbe { ok: true }).unwrap());
        // The synced record carries the type only.
        assert_eq!(committed.background_value, "");

        let spec = manager.resolved_background(&committed).unwrap();
        assert_eq!(
            spec,
            BackgroundSpec::ImageUrl("https://example.com/bg.png".to_string())
        );
    }

    #[test]
    fn test_upload_requires_data_unless_already_uploaded() {
        let (_dir, manager) = temp_manager();

        let mut temp = Settings::default();
        temp.background_type = BackgroundType::Upload;

        let err = blocked(manager.save(temp.clone(), None, &StubProbe { ok: true }).unwrap());
        assert_eq!(err.field, SettingsField::BackgroundUpload);
        assert_eq!(err.message, "Please select an image file.");

        // First save with an upload payload.
        let committed = saved(
            manager
                .save(temp.clone(), Some("data:image/png;base64,AAAA"), &StubProbe { ok: true })
                .unwrap(),
        );
        assert_eq!(
            manager.resolved_background(&committed).unwrap(),
            BackgroundSpec::DataUrl("data:image/png;base64,AAAA".to_string())
        );

        // Re-saving with type still `upload` and no fresh file keeps the
        // stored payload.
        let committed = saved(manager.save(temp, None, &StubProbe { ok: true }).unwrap());
        assert_eq!(
            manager.resolved_background(&committed).unwrap(),
            BackgroundSpec::DataUrl("data:image/png;base64,AAAA".to_string())
        );
    }

    #[test]
    fn test_switching_to_default_clears_payload_keys() {
        let (_dir, manager) = temp_manager();

        let mut temp = Settings::default();
        temp.background_type = BackgroundType::Upload;
        saved(
            manager
                .save(temp, Some("data:image/png;base64,AAAA"), &StubProbe { ok: true })
                .unwrap(),
        );

        let committed = saved(
            manager
                .save(Settings::default(), None, &StubProbe { ok: true })
                .unwrap(),
        );
        assert!(manager.resolved_background(&committed).is_none());

        // The payload really is gone: switching back to upload with no fresh
        // file is blocked again because the saved type is no longer `upload`.
        let mut temp = Settings::default();
        temp.background_type = BackgroundType::Upload;
        let err = blocked(manager.save(temp, None, &StubProbe { ok: true }).unwrap());
        assert_eq!(err.field, SettingsField::BackgroundUpload);
    }

    #[test]
    fn test_empty_color_defaults_to_black() {
        let (_dir, manager) = temp_manager();

        let mut temp = Settings::default();
        temp.background_type = BackgroundType::Color;

        let committed = saved(manager.save(temp, None, &StubProbe { ok: true }).unwrap());
        assert_eq!(committed.background_value, "#000000");
        assert_eq!(
            manager.resolved_background(&committed).unwrap(),
            BackgroundSpec::Color("#000000".to_string())
        );
    }

    #[test]
    fn test_validate_upload_messages_are_distinct() {
        let mime_err = validate_upload("text/plain", 100).unwrap_err();
        assert_eq!(mime_err.message, "File must be an image.");

        let size_err = validate_upload("image/png", MAX_UPLOAD_BYTES + 1).unwrap_err();
        assert_eq!(size_err.message, "File size must be under 1.5MB.");

        assert!(validate_upload("image/jpeg", MAX_UPLOAD_BYTES).is_ok());
    }

    #[test]
    fn test_invalid_hex_color_not_applied() {
        let (_dir, manager) = temp_manager();

        let mut settings = Settings::default();
        settings.background_type = BackgroundType::Color;
        settings.background_value = "not-a-color".to_string();

        assert!(manager.resolved_background(&settings).is_none());
    }
}
