//! Command-line client for the Atelier generative-art service.
//!
//! Session state and the favorite/saved sets persist under the storage
//! directory, so commands compose across invocations the way a long-lived
//! client would: `login` once, then `favorite`, `creations`, `feed`.
//!
//! # Examples
//!
//! ```sh
//! # Authenticate (persists the session)
//! atelier login --email ada@example.com --password "secret123"
//!
//! # Browse agents and their work
//! atelier agents
//! atelier agent agent-42
//! atelier creations --agent agent-42 --pages 3
//!
//! # Search and curate
//! atelier search "nebula"
//! atelier favorite c-17
//! atelier save c-17
//!
//! # Evolve a creation into a new lineage generation
//! atelier evolve c-17
//! ```

use clap::{Parser, Subcommand};
use std::process;
use tracing_subscriber::Layer;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use atelier_rs::sync::{CollectionLoader, QueryEngine, SearchDebouncer, ToggleKind, ToggleStore};
use atelier_rs::types::{AiAgent, Creation, CreationFilter, FeedItem, NewCreation, ProfileUpdate};
use atelier_rs::{ApiClient, ApiError, ClientConfig, LocalStore, SessionManager};

/// Command-line client for the Atelier generative-art service.
#[derive(Parser)]
#[command(name = "atelier", version)]
struct Cli {
    /// Base URL of the Atelier API
    #[arg(long, default_value = atelier_rs::config::DEFAULT_BASE_URL)]
    base_url: String,

    /// Directory for persisted session and favorite/saved sets
    #[arg(long, default_value = ".atelier")]
    storage_dir: String,

    /// Enable debug logging to stderr
    #[arg(long, short)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Log in and persist the session
    Login {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
    /// Create an account and log in
    Signup {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
    /// Clear the persisted session
    Logout,
    /// Show the current user
    Whoami,
    /// Update the current user's profile
    Profile {
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        avatar: Option<String>,
    },
    /// List AI agents
    Agents {
        /// Page size
        #[arg(long, default_value_t = 20)]
        limit: u64,
        /// Number of pages to load
        #[arg(long, default_value_t = 1)]
        pages: u32,
    },
    /// Show one agent
    Agent { id: String },
    /// List creations, optionally filtered
    Creations {
        /// Only creations by this agent
        #[arg(long)]
        agent: Option<String>,
        /// Only creations in this style
        #[arg(long)]
        style: Option<String>,
        /// Page size
        #[arg(long, default_value_t = 20)]
        limit: u64,
        /// Number of pages to load
        #[arg(long, default_value_t = 1)]
        pages: u32,
    },
    /// Show one creation
    Creation { id: String },
    /// Search creations
    Search { query: String },
    /// Toggle a creation in the favorites set
    Favorite { id: String },
    /// Toggle a creation in the saved set
    Save { id: String },
    /// Commission a new root creation from an agent
    Create {
        #[arg(long)]
        agent: String,
        /// Tags for the new creation
        #[arg(long)]
        tag: Vec<String>,
    },
    /// Evolve a creation into a new child generation
    Evolve { id: String },
    /// Show the recent activity feed
    Feed {
        #[arg(long, default_value_t = 20)]
        limit: u64,
    },
}

// ── Output formatting ──────────────────────────────────────────────

fn print_agent(agent: &AiAgent) {
    println!(
        "{}  {}  [{:?}]  {} creation(s), {} like(s)",
        agent.id, agent.name, agent.status, agent.counts.creations, agent.counts.likes
    );
}

fn print_creation(c: &Creation) {
    let lineage = match &c.parent_id {
        Some(parent) => format!("gen {} of {parent}", c.generation),
        None => "root".to_string(),
    };
    println!(
        "{}  by {}  ({lineage})  {} like(s), {} evolution(s)  {}",
        c.id,
        c.agent_id,
        c.likes,
        c.evolutions,
        c.tags.join(",")
    );
}

fn print_feed_item(item: &FeedItem) {
    println!(
        "{}  {}  {:?}  {}",
        item.timestamp.format("%Y-%m-%d %H:%M"),
        item.agent_name,
        item.action,
        item.creation_id
    );
}

// ── Command execution ──────────────────────────────────────────────

struct App {
    config: ClientConfig,
    api: ApiClient,
    store: LocalStore,
    session: SessionManager,
}

impl App {
    async fn build(cli: &Cli) -> Result<Self, Box<dyn std::error::Error>> {
        let config = ClientConfig::new(cli.base_url.clone()).with_storage_dir(&cli.storage_dir);
        let api = ApiClient::new(&config)?;
        let store = LocalStore::new(&config.storage_dir)?;
        let session = SessionManager::new(api.clone(), store.clone());
        session.load_persisted().await;
        Ok(Self {
            config,
            api,
            store,
            session,
        })
    }

    fn require_auth(&self) -> Result<atelier_rs::types::AuthToken, ApiError> {
        self.session.token().ok_or(ApiError::AuthExpired)
    }

    /// Favorites set wired to the like/unlike endpoints.
    fn favorites(&self) -> Result<ToggleStore, ApiError> {
        let token = self.require_auth()?;
        let api = self.api.clone();
        Ok(ToggleStore::with_notifier(
            self.store.clone(),
            ToggleKind::Favorites,
            move |id, member| {
                let (api, token) = (api.clone(), token.clone());
                async move {
                    if member {
                        api.like_creation(&token, &id).await
                    } else {
                        api.unlike_creation(&token, &id).await
                    }
                }
            },
        ))
    }

    /// Saved set wired to the save/unsave endpoints.
    fn saved(&self) -> Result<ToggleStore, ApiError> {
        let token = self.require_auth()?;
        let api = self.api.clone();
        Ok(ToggleStore::with_notifier(
            self.store.clone(),
            ToggleKind::Saved,
            move |id, member| {
                let (api, token) = (api.clone(), token.clone());
                async move {
                    if member {
                        api.save_creation(&token, &id).await
                    } else {
                        api.unsave_creation(&token, &id).await
                    }
                }
            },
        ))
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let app = App::build(&cli).await?;

    match cli.command {
        Command::Login { email, password } => {
            let user = app.session.login(&email, &password).await?;
            println!("Logged in as {} ({:?} plan)", user.name, user.plan);
        }
        Command::Signup {
            name,
            email,
            password,
        } => {
            let user = app.session.signup(&name, &email, &password).await?;
            println!("Welcome, {} ({:?} plan)", user.name, user.plan);
        }
        Command::Logout => {
            app.session.logout();
            println!("Logged out");
        }
        Command::Whoami => match app.session.current_user() {
            Some(user) => println!("{}  {}  {:?} plan", user.id, user.name, user.plan),
            None => println!("Not logged in"),
        },
        Command::Profile { name, avatar } => {
            let user = app
                .session
                .update_profile(&ProfileUpdate { name, avatar })
                .await?;
            println!("Profile updated: {}", user.name);
        }
        Command::Agents { limit, pages } => {
            let api = app.api.clone();
            let loader = CollectionLoader::new((), limit, move |_f: (), offset, limit| {
                let api = api.clone();
                async move { api.list_agents(offset, limit).await }
            });
            load_pages(&loader, pages).await?;
            let snap = loader.snapshot();
            for agent in &snap.items {
                print_agent(agent);
            }
            print_window(snap.items.len(), snap.cursor.total);
        }
        Command::Agent { id } => {
            let api = app.api.clone();
            let agent_id = id.clone();
            let engine = QueryEngine::new(move || {
                let (api, id) = (api.clone(), agent_id.clone());
                async move { api.get_agent(&id).await.map(Some) }
            });
            if let Some(handle) = engine.refetch() {
                handle.await?;
            }
            let snap = engine.snapshot();
            match (snap.data, snap.error) {
                (Some(agent), _) => {
                    print_agent(&agent);
                    println!("specialty: {}", agent.specialty);
                    println!("creative dna: {}", agent.creative_dna);

                    let recent = app.api.agent_creations(&id, 0, 10).await?;
                    if !recent.items.is_empty() {
                        println!("recent work:");
                        for creation in &recent.items {
                            print_creation(creation);
                        }
                    }
                }
                (None, Some(e)) => return Err(e.into()),
                (None, None) => println!("Agent {id} not found"),
            }
        }
        Command::Creations {
            agent,
            style,
            limit,
            pages,
        } => {
            let filter = CreationFilter {
                agent_id: agent,
                style,
                search: None,
            };
            let api = app.api.clone();
            let loader =
                CollectionLoader::new(filter, limit, move |f: CreationFilter, offset, limit| {
                    let api = api.clone();
                    async move { api.list_creations(&f, offset, limit).await }
                });
            load_pages(&loader, pages).await?;
            let snap = loader.snapshot();
            for creation in &snap.items {
                print_creation(creation);
            }
            print_window(snap.items.len(), snap.cursor.total);
        }
        Command::Creation { id } => {
            let creation = app.api.get_creation(&id).await?;
            print_creation(&creation);
        }
        Command::Search { query } => {
            let api = app.api.clone();
            let debouncer =
                SearchDebouncer::with_window(app.config.debounce_window, move |q: String| {
                    let api = api.clone();
                    async move {
                        api.list_creations(&CreationFilter::for_search(q), 0, 20)
                            .await
                            .map(|page| page.items)
                    }
                });
            if let Some(handle) = debouncer.set_query(&query) {
                handle.await?;
            }
            let snap = debouncer.snapshot();
            if let Some(e) = snap.error {
                return Err(e.into());
            }
            for creation in &snap.data {
                print_creation(creation);
            }
            println!("{} result(s)", snap.data.len());
        }
        Command::Favorite { id } => {
            let favorites = app.favorites()?;
            let now = favorites.toggle(&id)?;
            println!(
                "{id} {} favorites ({} total)",
                if now { "added to" } else { "removed from" },
                favorites.len()
            );
        }
        Command::Save { id } => {
            let saved = app.saved()?;
            let now = saved.toggle(&id)?;
            println!(
                "{id} {} saved ({} total)",
                if now { "added to" } else { "removed from" },
                saved.len()
            );
        }
        Command::Create { agent, tag } => {
            let token = app.require_auth()?;
            let creation = app
                .api
                .create_creation(
                    &token,
                    &NewCreation {
                        agent_id: agent,
                        tags: tag,
                    },
                )
                .await?;
            print_creation(&creation);
        }
        Command::Evolve { id } => {
            let token = app.require_auth()?;
            let child = app.api.evolve_creation(&token, &id).await?;
            print_creation(&child);
        }
        Command::Feed { limit } => {
            let api = app.api.clone();
            let engine = QueryEngine::new(move || {
                let api = api.clone();
                async move { api.feed(0, limit).await.map(|page| page.items) }
            });
            if let Some(handle) = engine.refetch() {
                handle.await?;
            }
            let snap = engine.snapshot();
            if let Some(e) = snap.error {
                return Err(e.into());
            }
            for item in &snap.data {
                print_feed_item(item);
            }
        }
    }
    Ok(())
}

/// Refresh the first page, then append up to `pages - 1` more windows.
async fn load_pages<F, T>(
    loader: &CollectionLoader<F, T>,
    pages: u32,
) -> Result<(), Box<dyn std::error::Error>>
where
    F: Clone + PartialEq + Send + 'static,
    T: Clone + Send + 'static,
{
    loader.refresh().await?;
    for _ in 1..pages {
        match loader.load_more() {
            Some(handle) => handle.await?,
            None => break,
        }
    }
    if let Some(e) = loader.snapshot().error {
        return Err(e.into());
    }
    Ok(())
}

fn print_window(loaded: usize, total: u64) {
    println!("({loaded} of {total} loaded)");
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let level = if cli.verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::WARN
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_filter(level),
        )
        .init();

    match run(cli).await {
        Ok(()) => {}
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    }
}
