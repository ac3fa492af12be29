//! StreamFilter CLI
//!
//! Manage a filter profile from the command line and check how items would
//! be judged, using the same engine as the extension.

mod profile;

#[cfg(feature = "e2e")]
mod e2e;

use std::fs;

use clap::{Parser, Subcommand};

use sf_core::catalog::{CatalogSource, CategoryCatalog, CATALOG_URL};
use sf_core::normalize::streamer_from_path;
use sf_core::notify::{Notifier, ToastKind};
use sf_core::sync::{BackgroundService, ConfigPanel, DeliveryError, ExtensionStats, FilterMessage, MessageTransport};
use sf_core::{CandidateItem, ListKind, Matcher};

use profile::JsonFileStorage;

#[derive(Parser)]
#[command(name = "sf-cli")]
#[command(about = "StreamFilter profile management and tools")]
struct Cli {
    /// Profile file holding the filter storage
    #[arg(short, long, global = true, default_value = "streamfilter-profile.json")]
    profile: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Block a streamer, keyword or category
    Add {
        /// streamers | keywords | categories
        #[arg(value_parser = parse_list_kind)]
        list: ListKind,
        value: String,
    },

    /// Unblock a streamer, keyword or category
    Remove {
        #[arg(value_parser = parse_list_kind)]
        list: ListKind,
        value: String,
    },

    /// Show block lists
    List {
        #[arg(value_parser = parse_list_kind)]
        list: Option<ListKind>,
    },

    /// Change settings
    Settings {
        /// Suppress success/info notifications
        #[arg(long)]
        silent: Option<bool>,

        /// Blur blocked cards instead of hiding them
        #[arg(long)]
        blur: Option<bool>,
    },

    /// Judge a stream card, or a stream page with --page
    Check {
        /// Streamer name
        #[arg(short, long, default_value = "")]
        name: String,

        /// Stream title
        #[arg(short, long, default_value = "")]
        title: String,

        /// Category text
        #[arg(short, long, default_value = "")]
        category: String,

        /// Stream page path or URL, e.g. /xqc
        #[arg(long)]
        page: Option<String>,
    },

    /// Show list sizes
    Stats,

    /// Write a backup document
    Export {
        /// Output file (defaults to the dated backup name)
        #[arg(short, long)]
        output: Option<String>,
    },

    /// Restore from a backup document
    Import {
        input: String,
    },

    /// Browse the category catalog
    Categories {
        /// Filter by name or slug
        #[arg(short, long)]
        search: Option<String>,

        /// Skip the network and use the built-in list
        #[arg(long)]
        offline: bool,
    },

    /// Remove every stored value
    Clear,

    /// Load an unpacked extension in Chrome and smoke-test it
    #[cfg(feature = "e2e")]
    E2e {
        /// Unpacked extension directory
        #[arg(short, long)]
        extension: String,

        #[arg(long, default_value = "http://localhost:9515")]
        chromedriver: String,

        #[arg(long)]
        headless: bool,
    },
}

fn parse_list_kind(s: &str) -> Result<ListKind, String> {
    ListKind::parse(s).ok_or_else(|| format!("Unknown list '{}' (streamers, keywords, categories)", s))
}

/// Toasts become terminal lines.
struct ConsoleNotifier;

impl Notifier for ConsoleNotifier {
    fn show(&self, message: &str, kind: ToastKind) {
        match kind {
            ToastKind::Success | ToastKind::Info => println!("{}", message),
            ToastKind::Warning | ToastKind::Error => eprintln!("{}: {}", kind.as_str(), message),
        }
    }
}

/// The CLI has no tabs to message.
struct NoTabs;

impl MessageTransport for NoTabs {
    fn send_to_tab(&self, tab_id: i32, _message: &FilterMessage) -> Result<(), DeliveryError> {
        Err(DeliveryError::NoReceiver(tab_id))
    }
}

type Panel = ConfigPanel<JsonFileStorage, NoTabs, ConsoleNotifier>;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Add { list, value } => open_panel(&cli.profile).and_then(|mut p| cmd_add(&mut p, list, &value)),
        Commands::Remove { list, value } => open_panel(&cli.profile).and_then(|mut p| cmd_remove(&mut p, list, &value)),
        Commands::List { list } => open_panel(&cli.profile).map(|p| cmd_list(&p, list)),
        Commands::Settings { silent, blur } => open_panel(&cli.profile).map(|mut p| cmd_settings(&mut p, silent, blur)),
        Commands::Check { name, title, category, page } => {
            open_panel(&cli.profile).and_then(|p| cmd_check(&p, &name, &title, &category, page.as_deref()))
        }
        Commands::Stats => open_panel(&cli.profile).map(|p| cmd_stats(&p)),
        Commands::Export { output } => open_panel(&cli.profile).and_then(|p| cmd_export(&p, output)),
        Commands::Import { input } => open_panel(&cli.profile).and_then(|mut p| cmd_import(&mut p, &input)),
        Commands::Categories { search, offline } => {
            open_panel(&cli.profile).and_then(|mut p| cmd_categories(&mut p, search.as_deref(), offline))
        }
        Commands::Clear => cmd_clear(&cli.profile),
        #[cfg(feature = "e2e")]
        Commands::E2e {
            extension,
            chromedriver,
            headless,
        } => e2e::run_e2e(e2e::E2eOptions {
            chromedriver_url: chromedriver,
            extension_path: extension,
            headless,
        }),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

/// Open the profile, running the install/update step first if needed.
fn open_panel(path: &str) -> Result<Panel, String> {
    let storage = JsonFileStorage::open(path)?;
    let storage = match storage.pending_install() {
        Some(reason) => {
            let mut background = BackgroundService::new(storage, NoTabs, ConsoleNotifier);
            background.on_installed(&reason, &chrono::Utc::now().to_rfc3339());
            let path = background.storage().path().to_path_buf();
            JsonFileStorage::open(path)?
        }
        None => storage,
    };
    Ok(ConfigPanel::new(storage, NoTabs, ConsoleNotifier))
}

fn cmd_add(panel: &mut Panel, list: ListKind, value: &str) -> Result<(), String> {
    let added = match list {
        ListKind::Streamers => panel.add_streamer(value),
        ListKind::Keywords => panel.add_keyword(value),
        ListKind::Categories => panel.select_category(value),
    };
    if added {
        Ok(())
    } else {
        Err(format!("'{}' was not added to {}", value.trim(), list))
    }
}

fn cmd_remove(panel: &mut Panel, list: ListKind, value: &str) -> Result<(), String> {
    let removed = match list {
        ListKind::Streamers => panel.remove_streamer(value),
        ListKind::Keywords => panel.remove_keyword(value),
        ListKind::Categories => panel.remove_category(value),
    };
    if removed {
        Ok(())
    } else {
        Err(format!("'{}' is not in {}", value.trim(), list))
    }
}

fn cmd_list(panel: &Panel, list: Option<ListKind>) {
    let kinds: Vec<ListKind> = match list {
        Some(kind) => vec![kind],
        None => ListKind::ALL.to_vec(),
    };
    for kind in kinds {
        let entries = panel.store().list(kind);
        println!("{} ({}):", kind, entries.len());
        for entry in entries.iter() {
            println!("  {}", entry);
        }
    }
}

fn cmd_settings(panel: &mut Panel, silent: Option<bool>, blur: Option<bool>) {
    if let Some(silent) = silent {
        panel.set_silent_mode(silent);
    }
    if let Some(blur) = blur {
        panel.set_blur_mode(blur);
    }
    let settings = panel.store().settings;
    println!("Silent mode: {}", if settings.silent_mode { "on" } else { "off" });
    println!("Blur mode:   {}", if settings.blur_mode { "on" } else { "off" });
}

fn cmd_check(panel: &Panel, name: &str, title: &str, category: &str, page: Option<&str>) -> Result<(), String> {
    let matcher = Matcher::new(panel.store());

    let decision = match page {
        Some(page) => {
            let streamer = streamer_from_path(page);
            if streamer.is_none() {
                println!("'{}' is not a channel page", page);
                return Ok(());
            }
            let categories: Vec<String> = Some(category.trim().to_string())
                .filter(|c| !c.is_empty())
                .into_iter()
                .collect();
            matcher
                .evaluate_stream_page(streamer.as_deref(), &categories)
                .unwrap_or_default()
        }
        None => {
            let item = CandidateItem::detached(name, title, category)
                .ok_or_else(|| "--name is required unless --page is given".to_string())?;
            matcher.evaluate(&item)
        }
    };

    if decision.blocked {
        println!("BLOCKED  {}", decision.label());
    } else {
        println!("allowed");
    }
    Ok(())
}

fn cmd_stats(panel: &Panel) {
    let stats = ExtensionStats::of(panel.store());
    println!("Profile:    {}", panel.storage().path().display());
    println!("Streamers:  {}", stats.streamers_blocked);
    println!("Keywords:   {}", stats.keywords_blocked);
    println!("Categories: {}", stats.categories_blocked);
    println!("Total:      {}", stats.total_blocked);
}

fn cmd_export(panel: &Panel, output: Option<String>) -> Result<(), String> {
    let document = panel.export(&chrono::Utc::now().to_rfc3339());
    let output = output.unwrap_or_else(|| document.file_name());
    fs::write(&output, document.to_json_pretty())
        .map_err(|e| format!("Failed to write '{}': {}", output, e))?;
    println!("Exported to '{}'", output);
    Ok(())
}

fn cmd_import(panel: &mut Panel, input: &str) -> Result<(), String> {
    let text = fs::read_to_string(input)
        .map_err(|e| format!("Failed to read '{}': {}", input, e))?;
    let fields = panel
        .import(&text)
        .map_err(|e| format!("Invalid backup '{}': {}", input, e))?;
    log::info!("Imported fields {:?} from {}", fields, input);
    Ok(())
}

fn fetch_catalog() -> Result<String, String> {
    let runtime = tokio::runtime::Runtime::new()
        .map_err(|e| format!("Failed to start tokio runtime: {}", e))?;
    runtime.block_on(async {
        let response = reqwest::get(CATALOG_URL)
            .await
            .map_err(|e| format!("Request failed: {}", e))?;
        if !response.status().is_success() {
            return Err(format!("Catalog request returned {}", response.status()));
        }
        response.text().await.map_err(|e| format!("Failed to read body: {}", e))
    })
}

fn cmd_categories(panel: &mut Panel, search: Option<&str>, offline: bool) -> Result<(), String> {
    if offline {
        panel.load_catalog::<String>(Err("offline mode".to_string()));
    } else {
        panel.load_catalog(fetch_catalog());
    }

    let source = match panel.catalog().source() {
        CatalogSource::Remote => "kick.com",
        CatalogSource::Fallback => "built-in list",
    };

    match search {
        Some(query) => {
            let hits = panel.search_categories(query);
            println!("{} matches for '{}' ({}):", hits.len(), query, source);
            for (category, blocked) in hits {
                let mark = if blocked { "x" } else { " " };
                println!("  [{}] {:<28} {:>8} viewers", mark, category.name, category.viewers);
            }
        }
        None => {
            let catalog: &CategoryCatalog = panel.catalog();
            println!("{} categories ({}):", catalog.categories().len(), source);
            for category in catalog.categories() {
                let mark = if panel.store().categories.contains(&category.name) { "x" } else { " " };
                println!("  [{}] {:<28} {:>8} viewers", mark, category.name, category.viewers);
            }
        }
    }
    Ok(())
}

fn cmd_clear(path: &str) -> Result<(), String> {
    let storage = JsonFileStorage::open(path)?;
    let mut background = BackgroundService::new(storage, NoTabs, ConsoleNotifier);
    if background.clear_all_data() {
        println!("Cleared '{}'", path);
        Ok(())
    } else {
        Err(format!("Failed to clear '{}'", path))
    }
}
