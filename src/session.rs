use crate::clock::{self, ClockDisplay};
use crate::config::Config;
use crate::error::Result;
use crate::history::SearchHistory;
use crate::icons::{self, FaviconSource, HttpFaviconSource, IconCache};
use crate::settings::{
    HttpImageProbe, ImageProbe, SaveOutcome, Settings, SettingsManager,
};
use crate::shortcuts::{
    is_valid_url, validate_input, FieldErrors, Shortcut, ShortcutManager, MAX_SHORTCUTS,
};
use crate::storage::{keys, ChangeEvent, StorageDirs, StoreAdapter, CURRENT_VERSION};
use crate::suggest::{
    merge_candidates, DebounceTicket, DropdownState, HttpSuggestionSource, SuggestEngine,
    SuggestionSource,
};
use crate::worker;
use serde_json::{Map, Value};
use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

/// What the shell should do with a submitted search-bar query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitAction {
    /// The query was a URL (or looked like a domain): go there directly.
    Navigate(String),
    /// Run a text search; the query has been recorded into history.
    Search { query: String, url: String },
}

/// Outcome of the add/edit shortcut form.
#[derive(Debug)]
pub enum FormOutcome {
    Saved(Shortcut),
    Invalid(FieldErrors),
}

/// A pending deferred blur-hide. Invalidated by re-focusing before the
/// shell's timer fires, so a click landing on a dropdown row is not
/// pre-empted.
#[derive(Debug, Clone, Copy)]
pub struct BlurTicket {
    generation: u64,
}

/// Network collaborators the session talks to.
pub struct Collaborators {
    pub suggestions: Box<dyn SuggestionSource>,
    pub favicons: Box<dyn FaviconSource>,
    pub image_probe: Box<dyn ImageProbe>,
}

impl Collaborators {
    /// Production wiring: suggestions through the background worker when one
    /// is running, direct HTTP otherwise.
    pub fn from_config(config: &Config) -> Self {
        let suggestions: Box<dyn SuggestionSource> = if worker::is_worker_running() {
            debug!("Routing suggestions through the background worker");
            Box::new(worker::WorkerClient::new())
        } else {
            Box::new(HttpSuggestionSource::new(
                &config.suggest.endpoint,
                config.suggest.timeout_secs,
            ))
        };

        Self {
            suggestions,
            favicons: Box::new(HttpFaviconSource::new(config.icons.timeout_secs)),
            image_probe: Box::new(HttpImageProbe::new(config.icons.timeout_secs)),
        }
    }
}

/// The per-page controller object.
///
/// Owns every piece of state the original page kept in module globals:
/// managers, the dropdown view-model, drag state, debounce/blur generations
/// and the online flag. The shell renders from this and feeds DOM events
/// into it; mutations complete their read-modify-write cycle before
/// returning, so handlers cannot interleave.
pub struct PageSession {
    store: Rc<RefCell<StoreAdapter>>,
    config: Config,
    pub shortcuts: ShortcutManager,
    pub history: SearchHistory,
    pub settings: SettingsManager,
    suggest: SuggestEngine,
    pub dropdown: DropdownState,
    icon_cache: IconCache,
    favicons: Box<dyn FaviconSource>,
    image_probe: Box<dyn ImageProbe>,
    current_settings: Settings,
    drag: Option<Uuid>,
    focus_generation: u64,
    online: bool,
}

impl PageSession {
    /// Boot a session: open storage, run the version migration, seed missing
    /// defaults, and load state. A host where storage cannot be resolved
    /// fails with [`crate::Error::HostContext`] and the shell renders the
    /// fixed fallback page instead.
    pub fn boot(
        dirs: &StorageDirs,
        config: Config,
        collaborators: Collaborators,
        icon_cache: IconCache,
    ) -> Result<Self> {
        let mut adapter = StoreAdapter::open(dirs)?;
        migrate(&mut adapter)?;
        initialize_defaults(&mut adapter)?;

        let store = Rc::new(RefCell::new(adapter));
        let shortcuts = ShortcutManager::new(store.clone());
        let history = SearchHistory::new(store.clone());
        let settings = SettingsManager::new(store.clone());
        let current_settings = settings.load();

        let suggest = SuggestEngine::new(
            collaborators.suggestions,
            Duration::from_millis(config.suggest.debounce_ms),
        );

        info!(
            "Session booted: {} shortcuts, clock {}",
            shortcuts.list().len(),
            if current_settings.show_clock { "on" } else { "off" }
        );

        Ok(Self {
            store,
            config,
            shortcuts,
            history,
            settings,
            suggest,
            dropdown: DropdownState::default(),
            icon_cache,
            favicons: collaborators.favicons,
            image_probe: collaborators.image_probe,
            current_settings,
            drag: None,
            focus_generation: 0,
            online: true,
        })
    }

    /// Boot against the platform default storage location and production
    /// collaborators.
    pub fn boot_default(config: Config) -> Result<Self> {
        let dirs = StorageDirs::resolve()?;
        let collaborators = Collaborators::from_config(&config);
        let icon_cache = IconCache::load().unwrap_or_else(|e| {
            tracing::warn!("Icon cache unavailable: {}", e);
            IconCache::new_at(dirs.data_dir.join("icons.cache"))
        });
        Self::boot(&dirs, config, collaborators, icon_cache)
    }

    // ----- rendering state -----

    pub fn settings(&self) -> &Settings {
        &self.current_settings
    }

    /// Clock panel content, when the clock is enabled.
    pub fn clock(&self) -> Option<ClockDisplay> {
        self.current_settings.show_clock.then(clock::render_now)
    }

    /// The effective background for the shell to apply.
    pub fn background(&self) -> Option<crate::settings::BackgroundSpec> {
        self.settings.resolved_background(&self.current_settings)
    }

    /// Shortcut grid in display order.
    pub fn grid(&self) -> Vec<Shortcut> {
        self.shortcuts.list()
    }

    /// Whether the grid still shows the add tile.
    pub fn can_add_shortcut(&self) -> bool {
        self.shortcuts.list().len() < MAX_SHORTCUTS
    }

    /// Resolve the icon for one grid tile.
    pub fn icon_for(&mut self, shortcut: &Shortcut) -> String {
        icons::resolve_icon(
            &mut self.icon_cache,
            self.favicons.as_ref(),
            &self.config.icons.favicon_url,
            &shortcut.url,
            &shortcut.title,
            self.online,
        )
    }

    pub fn set_online(&mut self, online: bool) {
        self.online = online;
    }

    /// Drain queued user-visible storage notices.
    pub fn take_notices(&mut self) -> Vec<String> {
        self.store.borrow_mut().take_notices()
    }

    /// Drain storage change events; the shell refreshes the affected views.
    pub fn take_changes(&mut self) -> Vec<ChangeEvent> {
        self.store.borrow_mut().take_changes()
    }

    // ----- search bar -----

    /// Focus cancels any pending blur-hide and shows history filtered by the
    /// current input text.
    pub fn on_search_focus(&mut self, input: &str) {
        self.focus_generation += 1;
        let filtered = self.history.matching(input.trim());
        self.dropdown.show(merge_candidates(&filtered, &[]));
    }

    /// Input change: immediate history render, plus a debounce ticket for
    /// the remote fetch when the input is non-empty.
    pub fn on_search_input(&mut self, input: &str) -> Option<DebounceTicket> {
        let filtered = self.history.matching(input.trim());
        let (candidates, ticket) = self.suggest.on_input(input, &filtered);
        self.dropdown.show(candidates);
        ticket
    }

    /// The shell's debounce timer fired. Stale tickets are dropped.
    pub fn on_suggestions_due(&mut self, ticket: &DebounceTicket) {
        let fresh = self.history.matching(&ticket.query);
        if let Some(candidates) = self.suggest.on_debounce(ticket, &fresh) {
            self.dropdown.show(candidates);
        }
    }

    /// Blur hands back a deferred ticket instead of hiding immediately.
    pub fn on_blur(&self) -> BlurTicket {
        BlurTicket {
            generation: self.focus_generation,
        }
    }

    /// The deferred blur timer fired; hide unless focus returned meanwhile.
    pub fn on_blur_elapsed(&mut self, ticket: BlurTicket) {
        if ticket.generation == self.focus_generation {
            self.dropdown.hide();
        }
    }

    /// Arrow-Down over the dropdown; returns the text to echo into the
    /// input field.
    pub fn on_key_down(&mut self) -> Option<String> {
        self.dropdown.select_next().map(|s| s.to_string())
    }

    /// Arrow-Up over the dropdown.
    pub fn on_key_up(&mut self) -> Option<String> {
        self.dropdown.select_previous().map(|s| s.to_string())
    }

    /// Escape closes the dropdown and clears the selection.
    pub fn on_escape(&mut self) {
        self.dropdown.hide();
    }

    /// Any other keystroke clears the highlight without closing the
    /// dropdown.
    pub fn on_other_key(&mut self) {
        self.dropdown.clear_selection();
    }

    /// Enter with an active selection: record the candidate and search it.
    pub fn confirm_selection(&mut self) -> Result<Option<SubmitAction>> {
        let Some(candidate) = self.dropdown.selected() else {
            return Ok(None);
        };
        let query = candidate.text.clone();

        self.history.record(&query)?;
        self.dropdown.hide();
        let url = self.search_url(&query);
        Ok(Some(SubmitAction::Search { query, url }))
    }

    /// Click on a dropdown row.
    pub fn pick_candidate(&mut self, index: usize) -> Result<Option<SubmitAction>> {
        let Some(candidate) = self.dropdown.items().get(index) else {
            return Ok(None);
        };
        let query = candidate.text.clone();

        self.history.record(&query)?;
        self.dropdown.hide();
        let url = self.search_url(&query);
        Ok(Some(SubmitAction::Search { query, url }))
    }

    /// Delete one remembered query from the row's delete affordance, then
    /// re-render the dropdown against the current input.
    pub fn delete_history_entry(&mut self, query: &str, current_input: &str) -> Result<()> {
        self.history.remove(query)?;
        let filtered = self.history.matching(current_input.trim());
        self.dropdown.show(merge_candidates(&filtered, &[]));
        Ok(())
    }

    /// Explicit search-bar submit.
    ///
    /// A trimmed query containing a dot, no space and no scheme gets
    /// `https://` prepended; if the result is a well-formed http/https URL
    /// the shell navigates directly, otherwise the query is recorded and a
    /// normal engine search proceeds.
    pub fn submit_query(&mut self, raw: &str) -> Result<Option<SubmitAction>> {
        let query = raw.trim();
        if query.is_empty() {
            return Ok(None);
        }
        self.dropdown.hide();

        let mut candidate = query.to_string();
        if query.contains('.') && !query.contains(' ') && !query.starts_with("http") {
            candidate = format!("https://{}", query);
        }

        if is_valid_url(&candidate) {
            debug!("Submitting '{}' as direct navigation", candidate);
            return Ok(Some(SubmitAction::Navigate(candidate)));
        }

        self.history.record(query)?;
        Ok(Some(SubmitAction::Search {
            query: query.to_string(),
            url: self.search_url(query),
        }))
    }

    fn search_url(&self, query: &str) -> String {
        self.config
            .search
            .engine_url
            .replace("{}", &urlencoding::encode(query))
    }

    // ----- shortcut grid -----

    /// Handle the add/edit form. Field errors come back together so the
    /// shell can mark both inputs in one pass; the limit error propagates
    /// as [`crate::Error::LimitExceeded`].
    pub fn submit_shortcut_form(
        &mut self,
        id: Option<Uuid>,
        title: &str,
        url: &str,
    ) -> Result<FormOutcome> {
        let errors = validate_input(title, url);
        if !errors.is_empty() {
            return Ok(FormOutcome::Invalid(errors));
        }

        let shortcut = match id {
            Some(id) => self.shortcuts.edit(id, title, url)?,
            None => self.shortcuts.add(title, url)?,
        };
        Ok(FormOutcome::Saved(shortcut))
    }

    /// Confirmation prompt for a delete, or `None` for an unknown id (a
    /// silent no-op, matching the delete semantics).
    pub fn delete_prompt(&self, id: Uuid) -> Option<String> {
        self.shortcuts
            .list()
            .into_iter()
            .find(|s| s.id == id)
            .map(|s| format!("Are you sure you want to delete \"{}\"?", s.title))
    }

    /// The user confirmed the delete dialog.
    pub fn confirm_delete(&mut self, id: Uuid) -> Result<()> {
        self.shortcuts.remove(id)?;
        Ok(())
    }

    pub fn drag_start(&mut self, id: Uuid) {
        self.drag = Some(id);
    }

    pub fn drag_end(&mut self) {
        self.drag = None;
    }

    /// Drop the dragged tile on a target tile. Returns whether the order
    /// changed.
    pub fn drop_on(&mut self, target: Uuid) -> Result<bool> {
        let Some(dragged) = self.drag.take() else {
            return Ok(false);
        };
        if dragged == target {
            return Ok(false);
        }
        self.shortcuts.reorder(dragged, target)?;
        Ok(true)
    }

    // ----- settings -----

    /// Start editing: the draft the modal mutates.
    pub fn begin_settings_edit(&self) -> Settings {
        self.current_settings.clone()
    }

    /// Save the edited draft. On success the session's settings snapshot
    /// advances; a blocked save leaves it untouched and the modal open.
    pub fn save_settings(
        &mut self,
        draft: Settings,
        upload: Option<&str>,
    ) -> Result<SaveOutcome> {
        let outcome = self.settings.save(draft, upload, self.image_probe.as_ref())?;
        if let SaveOutcome::Saved(ref committed) = outcome {
            self.current_settings = committed.clone();
        }
        Ok(outcome)
    }

    /// Cancel editing: the pre-edit snapshot for the shell to re-apply. No
    /// partial commit ever happened.
    pub fn cancel_settings(&self) -> Settings {
        self.current_settings.clone()
    }
}

/// Bring the stored data format up to the current version.
fn migrate(adapter: &mut StoreAdapter) -> Result<()> {
    let values = adapter.get_synced(&[keys::VERSION]);
    let stored = values
        .get(keys::VERSION)
        .and_then(Value::as_str)
        .unwrap_or("0.0.0")
        .to_string();

    if stored != CURRENT_VERSION {
        info!("Migrating stored data {} -> {}", stored, CURRENT_VERSION);
        adapter.set_synced(keys::VERSION, Value::String(CURRENT_VERSION.to_string()))?;
    }
    Ok(())
}

/// Seed missing settings/shortcuts on first run, with the initial payload
/// checked against the total synced budget.
fn initialize_defaults(adapter: &mut StoreAdapter) -> Result<()> {
    let existing = adapter.get_synced(&[keys::SETTINGS, keys::SHORTCUTS]);

    let mut updates = Map::new();
    if !existing.contains_key(keys::SETTINGS) {
        updates.insert(
            keys::SETTINGS.to_string(),
            serde_json::to_value(Settings::default())?,
        );
    }
    if !existing.contains_key(keys::SHORTCUTS) {
        updates.insert(
            keys::SHORTCUTS.to_string(),
            serde_json::to_value(ShortcutManager::default_shortcuts())?,
        );
    }

    if !updates.is_empty() {
        info!("Seeding {} default record(s)", updates.len());
        adapter.set_synced_many(updates)?;
    }
    Ok(())
}
