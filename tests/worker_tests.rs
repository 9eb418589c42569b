use freshtab::error::Result;
use freshtab::shortcuts::ShortcutManager;
use freshtab::storage::{StorageDirs, StoreAdapter};
use freshtab::suggest::SuggestionSource;
use freshtab::worker::{
    CurrentTab, CurrentTabQuery, Request, Worker, WorkerClient,
};
use serde_json::json;
use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::{Duration, Instant};

struct CannedSuggestions;

impl SuggestionSource for CannedSuggestions {
    fn fetch(&self, query: &str) -> Result<Vec<String>> {
        Ok(vec![format!("{} news", query), format!("{} weather", query)])
    }
}

struct FixedTab;

impl CurrentTabQuery for FixedTab {
    fn current_tab(&self) -> Option<CurrentTab> {
        Some(CurrentTab {
            title: "Example".to_string(),
            url: "https://example.com/".to_string(),
        })
    }
}

/// Spawn a worker thread listening on `sock`, persisting under `data`.
fn spawn_worker(sock: PathBuf, data: PathBuf) {
    std::thread::spawn(move || {
        let adapter = StoreAdapter::open(&StorageDirs::at(&data)).unwrap();
        let shortcuts = ShortcutManager::new(Rc::new(RefCell::new(adapter)));
        let worker = Worker::new(
            Box::new(CannedSuggestions),
            Box::new(FixedTab),
            shortcuts,
        );
        let _ = worker.run_at(&sock);
    });
}

fn wait_for_socket(sock: &Path) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if sock.exists() && std::os::unix::net::UnixStream::connect(sock).is_ok() {
            return;
        }
        std::thread::sleep(Duration::from_millis(20));
    }
    panic!("worker socket never came up at {:?}", sock);
}

#[test]
fn test_fetch_suggestions_over_socket() {
    let dir = tempfile::tempdir().unwrap();
    let sock = dir.path().join("worker.sock");
    spawn_worker(sock.clone(), dir.path().join("data"));
    wait_for_socket(&sock);

    let client = WorkerClient::at(sock);
    let suggestions = client.fetch("rust").unwrap();
    assert_eq!(suggestions, vec!["rust news", "rust weather"]);
}

#[test]
fn test_add_current_tab_over_socket_persists() {
    let dir = tempfile::tempdir().unwrap();
    let sock = dir.path().join("worker.sock");
    let data = dir.path().join("data");
    spawn_worker(sock.clone(), data.clone());
    wait_for_socket(&sock);

    let client = WorkerClient::at(sock);
    let reply = client.add_current_tab().unwrap();
    assert!(reply.success);
    assert!(reply.message.is_none());

    // The shortcut reached the store the page reads from.
    let adapter = StoreAdapter::open(&StorageDirs::at(&data)).unwrap();
    let shortcuts = ShortcutManager::new(Rc::new(RefCell::new(adapter)));
    let list = shortcuts.list();
    assert_eq!(list.len(), 1);
    assert_eq!(list[0].title, "Example");
    assert_eq!(list[0].url, "https://example.com/");
}

#[test]
fn test_unknown_action_gets_failure_reply() {
    let dir = tempfile::tempdir().unwrap();
    let sock = dir.path().join("worker.sock");
    spawn_worker(sock.clone(), dir.path().join("data"));
    wait_for_socket(&sock);

    use std::io::{BufRead, BufReader, Write};
    let mut stream = std::os::unix::net::UnixStream::connect(&sock).unwrap();
    stream
        .write_all(b"{\"action\":\"noSuchAction\"}\n")
        .unwrap();
    stream.flush().unwrap();

    let mut reply = String::new();
    BufReader::new(&stream).read_line(&mut reply).unwrap();
    let value: serde_json::Value = serde_json::from_str(reply.trim()).unwrap();
    assert_eq!(value, json!({"success": false}));
}

#[test]
fn test_wire_shapes_match_page_protocol() {
    // The page sends exactly these shapes; keep them stable.
    let request = serde_json::to_string(&Request::FetchSuggestions {
        query: "hello world".to_string(),
    })
    .unwrap();
    assert_eq!(
        request,
        r#"{"action":"fetchSuggestions","query":"hello world"}"#
    );

    let request = serde_json::to_string(&Request::AddCurrentTab).unwrap();
    assert_eq!(request, r#"{"action":"addCurrentTab"}"#);
}
