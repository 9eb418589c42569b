use anyhow::{bail, Context, Result};
use freshtab::config::ConfigLoader;
use freshtab::session::{PageSession, SubmitAction};
use freshtab::suggest::{HttpSuggestionSource, SuggestionSource};
use freshtab::worker::{self, Worker, WorkerClient};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();

    match args.first().map(String::as_str) {
        Some("--worker") => run_worker(),
        Some("suggest") => run_suggest(&args[1..]),
        Some("add-tab") => run_add_tab(),
        Some("query") => run_query(&args[1..]),
        Some(other) => bail!("Unknown command '{}'. Commands: --worker, suggest, add-tab, query", other),
        None => run_inspect(),
    }
}

/// Run the background worker until killed.
fn run_worker() -> Result<()> {
    if worker::is_worker_running() {
        bail!("A worker is already running at {:?}", worker::socket_path());
    }

    let config_loader = ConfigLoader::load().unwrap_or_else(|e| {
        error!("Failed to load config: {}, using defaults", e);
        ConfigLoader::new()
    });
    info!("Config loaded from {:?}", config_loader.path());

    let worker = Worker::from_config(config_loader.config())
        .context("Failed to initialize the background worker")?;
    worker.run().context("Worker terminated")?;
    Ok(())
}

/// Fetch suggestions for a query, through the worker when one is running.
fn run_suggest(args: &[String]) -> Result<()> {
    if args.is_empty() {
        bail!("Usage: freshtab suggest <query>");
    }
    let query = args.join(" ");

    let config_loader = ConfigLoader::load().unwrap_or_else(|_| ConfigLoader::new());
    let config = config_loader.config();

    let suggestions = if worker::is_worker_running() {
        info!("Fetching through the running worker");
        WorkerClient::new().fetch(&query)?
    } else {
        HttpSuggestionSource::new(&config.suggest.endpoint, config.suggest.timeout_secs)
            .fetch(&query)?
    };

    if suggestions.is_empty() {
        println!("No suggestions for '{}'", query);
    } else {
        for suggestion in suggestions {
            println!("{}", suggestion);
        }
    }
    Ok(())
}

/// Ask the running worker to bookmark the active tab.
fn run_add_tab() -> Result<()> {
    if !worker::is_worker_running() {
        bail!("No worker running; start one with `freshtab --worker`");
    }

    let reply = WorkerClient::new()
        .add_current_tab()
        .context("Worker did not answer")?;

    if reply.success {
        println!("Shortcut added!");
    } else {
        println!(
            "{}",
            reply.message.unwrap_or_else(|| "Failed to add shortcut.".to_string())
        );
    }
    Ok(())
}

/// Resolve a search-bar submission the way the page would.
fn run_query(args: &[String]) -> Result<()> {
    if args.is_empty() {
        bail!("Usage: freshtab query <text>");
    }
    let input = args.join(" ");

    let mut session = boot_session()?;
    match session.submit_query(&input)? {
        Some(SubmitAction::Navigate(url)) => println!("navigate  {}", url),
        Some(SubmitAction::Search { url, .. }) => println!("search    {}", url),
        None => println!("(empty query)"),
    }
    Ok(())
}

/// Boot a page session and print what the shell would render.
fn run_inspect() -> Result<()> {
    let mut session = boot_session()?;

    let settings = session.settings().clone();
    println!("freshtab {}", env!("CARGO_PKG_VERSION"));
    if let Some(clock) = session.clock() {
        println!("{}  {}", clock.time, clock.date);
    }
    println!(
        "theme {:?}, {} columns, search {}, shortcuts {}",
        settings.theme,
        settings.columns,
        if settings.show_search { "on" } else { "off" },
        if settings.show_shortcut { "on" } else { "off" },
    );
    if let Some(background) = session.background() {
        println!("background: {:?}", background);
    }

    println!();
    for shortcut in session.grid() {
        println!("  {:<20} {}", shortcut.title, shortcut.url);
    }
    if session.can_add_shortcut() {
        println!("  [+] add shortcut");
    }

    let history = session.history.load();
    if !history.is_empty() {
        println!("\n{} remembered searches", history.len());
    }

    for notice in session.take_notices() {
        println!("\nnotice: {}", notice);
    }
    Ok(())
}

fn boot_session() -> Result<PageSession> {
    let config_loader = ConfigLoader::load().unwrap_or_else(|e| {
        error!("Failed to load config: {}, using defaults", e);
        ConfigLoader::new()
    });

    PageSession::boot_default(config_loader.config().clone())
        .context("Failed to initialize storage for this host")
}
