use clap::{Parser, Subcommand, ValueEnum};
use newtab_dashboard::app::history::DEFAULT_HOME;
use newtab_dashboard::app::settings::{self, Settings, SidePanelOpenMode};
use newtab_dashboard::nav::{ContextId, NavCommand, NavigationController, RecordingHost};
use newtab_dashboard::net::{SuggestClient, DEFAULT_SUGGEST_ENDPOINT};
use newtab_dashboard::search::SearchEngines;
use newtab_dashboard::storage::{FileStore, KvStore};
use newtab_dashboard::suggest::{
    AggregatorConfig, BookmarkNode, HistoryEntry, SearchSession, StaticBookmarks, StaticHistory, SuggestionAggregator,
    SuggestionItem,
};
use serde::Serialize;
use std::error::Error;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::runtime::Runtime;

#[derive(Parser, Debug)]
#[command(name = "newtab-dashboard")]
#[command(about = "Side-panel navigation and search suggestions for a new-tab dashboard")]
struct Args {
    /// Directory holding the persisted sync and local storage
    #[arg(long = "data-dir", default_value = ".newtab-data")]
    data_dir: PathBuf,

    /// Home location of the side panel
    #[arg(long = "home", default_value = DEFAULT_HOME)]
    home: String,

    /// Page context issuing navigation commands
    #[arg(long = "context", default_value_t = 1)]
    context: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Send a navigation command to the side-panel controller
    Nav {
        #[command(subcommand)]
        action: NavAction,
    },
    /// Rank suggestions for a query (empty for the default list)
    Suggest {
        #[arg(default_value = "")]
        query: String,
        #[command(flatten)]
        sources: SourceArgs,
    },
    /// Pick a suggestion by url or text and print where it opens
    Select {
        key: String,
        /// Query whose suggestions are searched for `key`
        #[arg(long = "query", default_value = "")]
        query: String,
        #[command(flatten)]
        sources: SourceArgs,
    },
    /// Print the search url for a query
    Search {
        query: String,
        #[arg(long = "engine")]
        engine: Option<String>,
    },
    /// Show or change settings
    Settings {
        #[command(subcommand)]
        action: Option<SettingsAction>,
    },
}

#[derive(Subcommand, Debug)]
enum NavAction {
    Home,
    Back,
    Forward,
    State {
        #[arg(long = "url")]
        url: Option<String>,
    },
    Record {
        url: String,
    },
    Open {
        url: String,
        /// Show the url without recording it
        #[arg(long = "no-history", default_value_t = false, action = clap::ArgAction::SetTrue)]
        no_history: bool,
    },
    Update {
        url: String,
    },
    /// Get, or with an argument set, the default bookmark folder
    DefaultBookmark {
        id: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
enum SettingsAction {
    /// Set a boolean setting by its storage key
    Set {
        key: String,
        #[arg(action = clap::ArgAction::Set)]
        value: bool,
    },
    /// Choose where side-panel links open
    OpenMode { mode: OpenMode },
    /// Write first-install defaults
    Install,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum OpenMode {
    NewTab,
    SidePanel,
    CurrentTab,
}

impl From<OpenMode> for SidePanelOpenMode {
    fn from(mode: OpenMode) -> Self {
        match mode {
            OpenMode::NewTab => SidePanelOpenMode::NewTab,
            OpenMode::SidePanel => SidePanelOpenMode::SidePanel,
            OpenMode::CurrentTab => SidePanelOpenMode::CurrentTab,
        }
    }
}

#[derive(clap::Args, Debug)]
struct SourceArgs {
    /// JSON array of history entries ({url, title, lastVisitTime})
    #[arg(long = "history")]
    history: Option<PathBuf>,

    /// JSON array of bookmark tree nodes ({id, title, url, dateAdded, children})
    #[arg(long = "bookmarks")]
    bookmarks: Option<PathBuf>,

    /// Fetch online suggestions for typed queries as well
    #[arg(long = "online", default_value_t = false, action = clap::ArgAction::SetTrue)]
    online: bool,

    /// Default search engine name or alias
    #[arg(long = "engine", default_value = "google")]
    engine: String,
}

fn main() {
    env_logger::init();

    let args = Args::parse();

    let runtime = match Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Error: failed to create Tokio runtime: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = runtime.block_on(run(args)) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<(), Box<dyn Error>> {
    let store: Arc<dyn KvStore> = Arc::new(FileStore::new(&args.data_dir));

    match args.command {
        Command::Nav { action } => {
            let context = ContextId(args.context);
            let host = Arc::new(RecordingHost::new().with_active_context(context));
            let controller = NavigationController::new(store, host.clone(), args.home);

            let response = controller.handle(Some(context), nav_command(action)).await;
            print_json(&response)?;
            if let Some(path) = host.displayed() {
                log::info!("Side panel now shows {}", path);
            }
            for (target, message) in host.take_sent() {
                log::info!("Push to {:?}: {}", target, serde_json::to_string(&message)?);
            }
        }
        Command::Suggest { query, sources } => {
            let aggregator = build_aggregator(store, &sources).await?;
            print_json(&aggregator.suggest(&query).await)?;
        }
        Command::Select { key, query, sources } => {
            let aggregator = Arc::new(build_aggregator(store, &sources).await?);
            let item = aggregator
                .suggest(&query)
                .await
                .into_iter()
                .find(|item| item.key() == key)
                .unwrap_or_else(|| SuggestionItem::literal(&key));
            let session = SearchSession::new(aggregator);
            print_json(&session.select(&item).await)?;
        }
        Command::Search { query, engine } => {
            let session = SearchSession::new(Arc::new(SuggestionAggregator::new(store)));
            match session.submit(&query, engine.as_deref()).await {
                Some(action) => print_json(&action)?,
                None => return Err("empty query".into()),
            }
        }
        Command::Settings { action } => {
            match action {
                Some(SettingsAction::Set { key, value }) => settings::set_flag(store.as_ref(), &key, value).await?,
                Some(SettingsAction::OpenMode { mode }) => {
                    settings::set_side_panel_open_mode(store.as_ref(), mode.into()).await?
                }
                Some(SettingsAction::Install) => settings::apply_install_defaults(store.as_ref()).await?,
                None => {}
            }
            print_json(&Settings::load(store.as_ref()).await)?;
        }
    }
    Ok(())
}

fn nav_command(action: NavAction) -> NavCommand {
    match action {
        NavAction::Home => NavCommand::NavigateHome,
        NavAction::Back => NavCommand::NavigateBack,
        NavAction::Forward => NavCommand::NavigateForward,
        NavAction::State { url } => NavCommand::GetNavigationState { url },
        NavAction::Record { url } => NavCommand::RecordAndNavigate { url },
        NavAction::Open { url, no_history } => NavCommand::OpenUrlInSidePanel {
            url,
            update_history: !no_history,
            is_navigating: false,
        },
        NavAction::Update { url } => NavCommand::UpdateSidePanelHistory {
            url,
            source: Some("cli".to_string()),
        },
        NavAction::DefaultBookmark { id: None } => NavCommand::GetDefaultBookmarkId,
        NavAction::DefaultBookmark { id } => NavCommand::SetDefaultBookmarkId { default_bookmark_id: id },
    }
}

async fn build_aggregator(store: Arc<dyn KvStore>, sources: &SourceArgs) -> Result<SuggestionAggregator, Box<dyn Error>> {
    let mut engines = SearchEngines::default();
    if !engines.set_default(&sources.engine) {
        log::warn!("Unknown search engine {:?}, keeping {}", sources.engine, engines.default_engine().name);
    }

    let mut aggregator = SuggestionAggregator::new(store)
        .with_engines(engines)
        .with_online(Arc::new(SuggestClient::new(DEFAULT_SUGGEST_ENDPOINT)?))
        .with_config(AggregatorConfig {
            online_in_query_mode: sources.online,
            ..AggregatorConfig::default()
        });

    if let Some(path) = &sources.history {
        let entries: Vec<HistoryEntry> = read_json(path).await?;
        log::info!("Loaded {} history entries from {}", entries.len(), path.display());
        aggregator = aggregator.with_history(Arc::new(StaticHistory::new(entries)));
    }
    if let Some(path) = &sources.bookmarks {
        let roots: Vec<BookmarkNode> = read_json(path).await?;
        aggregator = aggregator.with_bookmarks(Arc::new(StaticBookmarks::new(roots)));
    }
    Ok(aggregator)
}

async fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, Box<dyn Error>> {
    let text = tokio::fs::read_to_string(path).await?;
    Ok(serde_json::from_str(&text)?)
}

fn print_json<T: Serialize>(value: &T) -> Result<(), serde_json::Error> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
