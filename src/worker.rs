use crate::config::Config;
use crate::error::Result;
use crate::icons;
use crate::shortcuts::{is_valid_url, Shortcut, ShortcutManager, MAX_TITLE_LEN};
use crate::storage::StoreAdapter;
use crate::suggest::{HttpSuggestionSource, SuggestionSource};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::cell::RefCell;
use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use std::rc::Rc;
use tracing::{debug, error, info, warn};

/// Path to the Unix socket for worker communication
pub fn socket_path() -> PathBuf {
    let runtime_dir = std::env::var("XDG_RUNTIME_DIR").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(runtime_dir).join("freshtab.sock")
}

/// Check if a worker is running by attempting to connect to its socket
pub fn is_worker_running() -> bool {
    let sock_path = socket_path();
    sock_path.exists() && UnixStream::connect(&sock_path).is_ok()
}

/// A request line sent to the worker. Field names are the wire format.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action")]
pub enum Request {
    #[serde(rename = "fetchSuggestions")]
    FetchSuggestions { query: String },
    #[serde(rename = "addCurrentTab")]
    AddCurrentTab,
}

/// Reply to `fetchSuggestions`.
#[derive(Debug, Serialize, Deserialize)]
pub struct SuggestionsReply {
    pub success: bool,
    #[serde(default)]
    pub suggestions: Vec<String>,
}

/// Reply to `addCurrentTab`.
#[derive(Debug, Serialize, Deserialize)]
pub struct AddTabReply {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// The host browser tab the popup asks to bookmark.
#[derive(Debug, Clone)]
pub struct CurrentTab {
    pub title: String,
    pub url: String,
}

/// Collaborator resolving the active tab. The tab lives in the host
/// browser, outside this process.
pub trait CurrentTabQuery {
    fn current_tab(&self) -> Option<CurrentTab>;
}

/// Default query for hosts with no tab integration.
pub struct NoCurrentTab;

impl CurrentTabQuery for NoCurrentTab {
    fn current_tab(&self) -> Option<CurrentTab> {
        None
    }
}

/// The background worker: answers `fetchSuggestions` and `addCurrentTab`
/// over a line-oriented JSON socket protocol.
pub struct Worker {
    suggestions: Box<dyn SuggestionSource>,
    tabs: Box<dyn CurrentTabQuery>,
    shortcuts: ShortcutManager,
}

impl Worker {
    pub fn new(
        suggestions: Box<dyn SuggestionSource>,
        tabs: Box<dyn CurrentTabQuery>,
        shortcuts: ShortcutManager,
    ) -> Self {
        Self {
            suggestions,
            tabs,
            shortcuts,
        }
    }

    /// Production wiring over the default storage location.
    pub fn from_config(config: &Config) -> Result<Self> {
        let adapter = StoreAdapter::open_default()?;
        let shortcuts = ShortcutManager::new(Rc::new(RefCell::new(adapter)));
        Ok(Self::new(
            Box::new(HttpSuggestionSource::new(
                &config.suggest.endpoint,
                config.suggest.timeout_secs,
            )),
            Box::new(NoCurrentTab),
            shortcuts,
        ))
    }

    /// Answer one request. Suggestion failures degrade to an empty list;
    /// add failures come back as user-facing messages.
    pub fn handle(&self, request: Request) -> Value {
        match request {
            Request::FetchSuggestions { query } => match self.suggestions.fetch(&query) {
                Ok(suggestions) => json!({ "success": true, "suggestions": suggestions }),
                Err(e) => {
                    warn!("Suggestion fetch failed: {}", e);
                    json!({ "success": false, "suggestions": [] })
                }
            },
            Request::AddCurrentTab => match self.add_current_tab() {
                Ok(shortcut) => {
                    info!("Added current tab as '{}'", shortcut.title);
                    json!({ "success": true })
                }
                Err(message) => json!({ "success": false, "message": message }),
            },
        }
    }

    fn add_current_tab(&self) -> std::result::Result<Shortcut, String> {
        let tab = self
            .tabs
            .current_tab()
            .ok_or_else(|| "No active tab to add.".to_string())?;

        if !is_valid_url(&tab.url) {
            return Err("This page cannot be added as a shortcut.".to_string());
        }

        // Pages without a usable title get their hostname instead.
        let title = if tab.title.trim().is_empty() {
            icons::hostname(&tab.url).unwrap_or_else(|| tab.url.clone())
        } else {
            tab.title.trim().to_string()
        };
        let title: String = title.chars().take(MAX_TITLE_LEN).collect();

        self.shortcuts.add(&title, &tab.url).map_err(|e| e.to_string())
    }

    /// Listen on the default socket until the process exits.
    pub fn run(self) -> Result<()> {
        self.run_at(&socket_path())
    }

    /// Listen on an explicit socket path, serving connections sequentially.
    pub fn run_at(self, sock_path: &Path) -> Result<()> {
        if sock_path.exists() {
            info!("Removing old socket at {:?}", sock_path);
            std::fs::remove_file(sock_path)?;
        }

        info!("Creating worker socket at {:?}", sock_path);
        let listener = UnixListener::bind(sock_path)?;

        // Only the owning user may connect.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mut perms = std::fs::metadata(sock_path)?.permissions();
            perms.set_mode(0o600);
            std::fs::set_permissions(sock_path, perms)?;
        }

        let sock_owned = sock_path.to_path_buf();
        let _cleanup = scopeguard::guard((), move |_| {
            debug!("Cleaning up worker socket at {:?}", sock_owned);
            let _ = std::fs::remove_file(&sock_owned);
        });

        info!("Worker ready, waiting for requests");
        for stream in listener.incoming() {
            match stream {
                Ok(stream) => {
                    if let Err(e) = self.serve_connection(stream) {
                        error!("Failed to serve worker connection: {}", e);
                    }
                }
                Err(e) => {
                    error!("Socket connection error: {}", e);
                }
            }
        }

        Ok(())
    }

    fn serve_connection(&self, stream: UnixStream) -> Result<()> {
        let mut reader = BufReader::new(&stream);
        let mut line = String::new();
        reader.read_line(&mut line)?;

        let response = match serde_json::from_str::<Request>(line.trim()) {
            Ok(request) => {
                debug!("Worker received {:?}", request);
                self.handle(request)
            }
            Err(e) => {
                warn!("Unparseable worker request: {}", e);
                json!({ "success": false })
            }
        };

        let mut writer = &stream;
        let mut payload = serde_json::to_string(&response)?;
        payload.push('\n');
        writer.write_all(payload.as_bytes())?;
        writer.flush()?;
        Ok(())
    }
}

/// Client side of the worker protocol: the page's suggestion source and the
/// popup's add-tab button.
pub struct WorkerClient {
    path: PathBuf,
}

impl WorkerClient {
    pub fn new() -> Self {
        Self {
            path: socket_path(),
        }
    }

    pub fn at(path: PathBuf) -> Self {
        Self { path }
    }

    /// Send one request and read the reply line.
    pub fn request(&self, request: &Request) -> Result<Value> {
        let mut stream = UnixStream::connect(&self.path)?;

        let mut line = serde_json::to_string(request)?;
        line.push('\n');
        stream.write_all(line.as_bytes())?;
        stream.flush()?;

        let mut reader = BufReader::new(&stream);
        let mut reply = String::new();
        reader.read_line(&mut reply)?;
        Ok(serde_json::from_str(reply.trim())?)
    }

    /// Ask the worker to bookmark the active tab.
    pub fn add_current_tab(&self) -> Result<AddTabReply> {
        let value = self.request(&Request::AddCurrentTab)?;
        Ok(serde_json::from_value(value)?)
    }
}

impl Default for WorkerClient {
    fn default() -> Self {
        Self::new()
    }
}

impl SuggestionSource for WorkerClient {
    fn fetch(&self, query: &str) -> Result<Vec<String>> {
        let value = self.request(&Request::FetchSuggestions {
            query: query.to_string(),
        })?;
        let reply: SuggestionsReply = serde_json::from_value(value)?;
        Ok(reply.suggestions)
    }
}
