use crate::error::{Error, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::io::Read;
use std::path::PathBuf;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};
use url::Url;

/// Bounded size of the per-hostname favicon cache.
pub const MAX_CACHED_ICONS: usize = 100;

/// Favicon payloads larger than this are not cached.
const MAX_ICON_BYTES: u64 = 256 * 1024;

/// A fetched favicon, stored as a data URL so the shell can use it without
/// touching the network again.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedIcon {
    pub data_url: String,
    /// Epoch milliseconds of the fetch; eviction removes the oldest first
    pub timestamp: u64,
}

/// Hostname-keyed favicon cache, persisted as a versioned binary cache file.
/// A version mismatch or unreadable file just rebuilds the cache empty.
#[derive(Debug, Serialize, Deserialize)]
pub struct IconCache {
    version: u32,
    entries: HashMap<String, CachedIcon>,

    #[serde(skip)]
    cache_path: PathBuf,
}

impl IconCache {
    const VERSION: u32 = 1;

    /// Create an empty cache persisting to `path`.
    pub fn new_at(path: PathBuf) -> Self {
        Self {
            version: Self::VERSION,
            entries: HashMap::new(),
            cache_path: path,
        }
    }

    /// Load the cache from the platform cache directory.
    pub fn load() -> Result<Self> {
        Self::load_from(Self::default_cache_path()?)
    }

    /// Load a cache file, falling back to empty on mismatch or corruption.
    pub fn load_from(path: PathBuf) -> Result<Self> {
        if !path.exists() {
            debug!("Icon cache not found at {:?}, starting empty", path);
            return Ok(Self::new_at(path));
        }

        let data = fs::read(&path)?;
        let mut cache: IconCache = match bincode::deserialize(&data) {
            Ok(cache) => cache,
            Err(e) => {
                warn!("Discarding unreadable icon cache: {}", e);
                return Ok(Self::new_at(path));
            }
        };

        if cache.version != Self::VERSION {
            warn!(
                "Icon cache version mismatch (expected {}, got {}), rebuilding",
                Self::VERSION,
                cache.version
            );
            return Ok(Self::new_at(path));
        }

        cache.cache_path = path;
        info!("Loaded {} cached icons", cache.entries.len());
        Ok(cache)
    }

    /// Persist the cache. Creates parent directories if needed.
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.cache_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let data = bincode::serialize(self)?;
        fs::write(&self.cache_path, data)?;
        debug!("Icon cache saved to {:?}", self.cache_path);
        Ok(())
    }

    /// Cached data URL for the page's hostname, if any.
    pub fn get(&self, page_url: &str) -> Option<&str> {
        let host = hostname(page_url)?;
        self.entries.get(&host).map(|icon| icon.data_url.as_str())
    }

    /// Cache an icon for the page's hostname. At the cap, the entry with
    /// the oldest timestamp is evicted first.
    pub fn insert(&mut self, page_url: &str, data_url: String, now_ms: u64) -> Result<()> {
        let Some(host) = hostname(page_url) else {
            return Ok(());
        };

        if self.entries.len() >= MAX_CACHED_ICONS {
            if let Some(oldest) = self
                .entries
                .iter()
                .min_by_key(|(_, icon)| icon.timestamp)
                .map(|(host, _)| host.clone())
            {
                debug!("Evicting oldest cached icon for {}", oldest);
                self.entries.remove(&oldest);
            }
        }

        self.entries.insert(
            host,
            CachedIcon {
                data_url,
                timestamp: now_ms,
            },
        );
        self.save()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn default_cache_path() -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir().ok_or(Error::HostContext)?;
        Ok(cache_dir.join("freshtab").join("icons.cache"))
    }
}

/// Hostname of an absolute URL.
pub fn hostname(input: &str) -> Option<String> {
    Url::parse(input)
        .ok()
        .and_then(|url| url.host_str().map(|h| h.to_string()))
}

/// Remote favicon URL for a page, or `None` while offline or for URLs
/// without a hostname. `template` replaces `{}` with the hostname.
pub fn favicon_url(template: &str, page_url: &str, online: bool) -> Option<String> {
    if !online {
        return None;
    }
    hostname(page_url).map(|host| template.replace("{}", &host))
}

/// First character of a title, uppercased, for the fallback glyph. Empty or
/// whitespace-only titles get `?`.
pub fn initial_character(text: &str) -> char {
    text.trim()
        .chars()
        .next()
        .map(|c| c.to_uppercase().next().unwrap_or(c))
        .unwrap_or('?')
}

/// Synthesize a single-letter SVG glyph icon as a data URL, used whenever a
/// real favicon is unavailable.
pub fn fallback_glyph(title: &str) -> String {
    let glyph = initial_character(title);
    let svg = format!(
        "<svg xmlns=\"http://www.w3.org/2000/svg\" viewBox=\"0 0 100 100\"><text y=\".9em\" font-size=\"90\" text-anchor=\"middle\" x=\"50\">{}</text></svg>",
        glyph
    );
    format!("data:image/svg+xml,{}", urlencoding::encode(&svg))
}

/// Per-hostname icon fetch collaborator.
pub trait FaviconSource {
    /// Fetch the icon at `icon_url` and return it as a data URL.
    fn fetch(&self, icon_url: &str) -> Result<String>;
}

/// Favicon fetch over HTTP, encoding the response body as a data URL.
pub struct HttpFaviconSource {
    timeout: Duration,
}

impl HttpFaviconSource {
    pub fn new(timeout_secs: u64) -> Self {
        Self {
            timeout: Duration::from_secs(timeout_secs),
        }
    }
}

impl FaviconSource for HttpFaviconSource {
    fn fetch(&self, icon_url: &str) -> Result<String> {
        let response = ureq::get(icon_url)
            .timeout(self.timeout)
            .call()
            .map_err(|e| Error::Network(e.to_string()))?;

        let content_type = response.content_type().to_string();
        if !content_type.starts_with("image/") {
            return Err(Error::Network(format!(
                "{} did not answer with an image ({})",
                icon_url, content_type
            )));
        }

        let mut bytes = Vec::new();
        response
            .into_reader()
            .take(MAX_ICON_BYTES)
            .read_to_end(&mut bytes)?;

        Ok(format!(
            "data:{};base64,{}",
            content_type,
            BASE64.encode(&bytes)
        ))
    }
}

/// Resolve the icon for a shortcut: cache, then remote fetch (cached on
/// success), then the glyph fallback. Fetch failures are never fatal.
pub fn resolve_icon(
    cache: &mut IconCache,
    source: &dyn FaviconSource,
    template: &str,
    page_url: &str,
    title: &str,
    online: bool,
) -> String {
    if let Some(cached) = cache.get(page_url) {
        return cached.to_string();
    }

    if let Some(icon_url) = favicon_url(template, page_url, online) {
        match source.fetch(&icon_url) {
            Ok(data_url) => {
                if let Err(e) = cache.insert(page_url, data_url.clone(), now_ms()) {
                    warn!("Failed to cache icon for {}: {}", page_url, e);
                }
                return data_url;
            }
            Err(e) => {
                debug!("Favicon fetch for {} failed: {}", page_url, e);
            }
        }
    }

    fallback_glyph(title)
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_cache() -> (tempfile::TempDir, IconCache) {
        let dir = tempfile::tempdir().unwrap();
        let cache = IconCache::new_at(dir.path().join("icons.cache"));
        (dir, cache)
    }

    #[test]
    fn test_hostname_extraction() {
        assert_eq!(hostname("https://example.com/page"), Some("example.com".into()));
        assert_eq!(hostname("http://sub.example.com"), Some("sub.example.com".into()));
        assert!(hostname("notaurl").is_none());
    }

    #[test]
    fn test_favicon_url_offline_is_none() {
        let template = "https://favicon.im/{}";
        assert_eq!(
            favicon_url(template, "https://example.com", true),
            Some("https://favicon.im/example.com".to_string())
        );
        assert!(favicon_url(template, "https://example.com", false).is_none());
    }

    #[test]
    fn test_initial_character() {
        assert_eq!(initial_character("google"), 'G');
        assert_eq!(initial_character("  spaces  "), 'S');
        assert_eq!(initial_character(""), '?');
        assert_eq!(initial_character("   "), '?');
    }

    #[test]
    fn test_fallback_glyph_is_svg_data_url() {
        let glyph = fallback_glyph("news");
        assert!(glyph.starts_with("data:image/svg+xml,"));
        assert!(glyph.contains("%3E")); // encoded markup
    }

    #[test]
    fn test_cache_get_by_hostname() {
        let (_dir, mut cache) = temp_cache();

        cache
            .insert("https://example.com/a", "data:one".to_string(), 1)
            .unwrap();

        // Any page on the same hostname hits the same entry.
        assert_eq!(cache.get("https://example.com/other"), Some("data:one"));
        assert!(cache.get("https://else.example").is_none());
    }

    #[test]
    fn test_eviction_removes_oldest_timestamp() {
        let (_dir, mut cache) = temp_cache();

        for i in 0..MAX_CACHED_ICONS {
            cache
                .insert(
                    &format!("https://host{}.example", i),
                    format!("data:{}", i),
                    100 + i as u64,
                )
                .unwrap();
        }
        assert_eq!(cache.len(), MAX_CACHED_ICONS);

        // The 101st distinct hostname evicts exactly the oldest entry.
        cache
            .insert("https://newest.example", "data:new".to_string(), 10_000)
            .unwrap();
        assert_eq!(cache.len(), MAX_CACHED_ICONS);
        assert!(cache.get("https://host0.example").is_none());
        assert!(cache.get("https://host1.example").is_some());
        assert!(cache.get("https://newest.example").is_some());
    }

    #[test]
    fn test_cache_survives_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("icons.cache");

        {
            let mut cache = IconCache::new_at(path.clone());
            cache
                .insert("https://example.com", "data:x".to_string(), 5)
                .unwrap();
        }

        let cache = IconCache::load_from(path).unwrap();
        assert_eq!(cache.get("https://example.com"), Some("data:x"));
    }

    #[test]
    fn test_corrupt_cache_file_rebuilds_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("icons.cache");
        fs::write(&path, b"not a cache file").unwrap();

        let cache = IconCache::load_from(path).unwrap();
        assert!(cache.is_empty());
    }

    struct StubFavicon {
        result: Option<String>,
    }

    impl FaviconSource for StubFavicon {
        fn fetch(&self, _icon_url: &str) -> Result<String> {
            self.result
                .clone()
                .ok_or_else(|| Error::Network("offline".to_string()))
        }
    }

    #[test]
    fn test_resolve_prefers_cache_then_fetch_then_glyph() {
        let (_dir, mut cache) = temp_cache();
        let template = "https://favicon.im/{}";

        // Fetch failure, online: glyph.
        let icon = resolve_icon(
            &mut cache,
            &StubFavicon { result: None },
            template,
            "https://example.com",
            "Example",
            true,
        );
        assert!(icon.starts_with("data:image/svg+xml,"));

        // Successful fetch is cached.
        let icon = resolve_icon(
            &mut cache,
            &StubFavicon {
                result: Some("data:image/png;base64,AA".to_string()),
            },
            template,
            "https://example.com",
            "Example",
            true,
        );
        assert_eq!(icon, "data:image/png;base64,AA");

        // Offline now, but the cache still answers.
        let icon = resolve_icon(
            &mut cache,
            &StubFavicon { result: None },
            template,
            "https://example.com",
            "Example",
            false,
        );
        assert_eq!(icon, "data:image/png;base64,AA");
    }

    #[test]
    fn test_resolve_offline_without_cache_is_glyph() {
        let (_dir, mut cache) = temp_cache();

        let icon = resolve_icon(
            &mut cache,
            &StubFavicon {
                result: Some("data:never".to_string()),
            },
            "https://favicon.im/{}",
            "https://example.com",
            "",
            false,
        );
        assert_eq!(icon, fallback_glyph(""));
    }
}
