use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use conduit_store::config::StoreConfig;
use conduit_store::storage::{ArticleStore, ListFilter, StoreError, Viewer, DEFAULT_PAGE_LIMIT};

#[derive(Parser, Debug)]
#[command(name = "conduit-store", about = "Inspect and initialize a Conduit article store")]
struct Args {
    /// Path to the TOML config file
    #[arg(long, value_name = "FILE", default_value = "conduit.toml")]
    config: PathBuf,

    /// Database path, overriding the config file and CONDUIT_DATABASE
    #[arg(long, value_name = "PATH")]
    database: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create the database and apply the schema
    Init,

    /// List articles, most recent first
    List {
        #[arg(long)]
        tag: Option<String>,

        /// Only articles written by this username
        #[arg(long)]
        author: Option<String>,

        /// Only articles favorited by this username
        #[arg(long)]
        favorited: Option<String>,

        #[arg(long, default_value_t = DEFAULT_PAGE_LIMIT)]
        limit: i64,

        #[arg(long, default_value_t = 0)]
        offset: i64,

        /// Render favorited/following flags for this username
        #[arg(long, value_name = "USERNAME")]
        viewer: Option<String>,
    },

    /// Show a single article with its body
    Show {
        slug: String,

        #[arg(long, value_name = "USERNAME")]
        viewer: Option<String>,
    },

    /// List every known tag
    Tags,
}

/// Resolve an optional username into a viewer; no username means anonymous.
async fn resolve_viewer(store: &ArticleStore, username: Option<&str>) -> Result<Viewer> {
    let Some(username) = username else {
        return Ok(Viewer::Anonymous);
    };
    match store.database().get_user_by_username(username).await {
        Ok(user) => Ok(Viewer::from(&user)),
        Err(StoreError::NotFound) => anyhow::bail!("Unknown viewer '{}'", username),
        Err(e) => Err(e).context("Failed to look up viewer"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = StoreConfig::load(&args.config)
        .with_context(|| format!("Failed to load config '{}'", args.config.display()))?
        .with_env_overrides();
    if let Some(path) = args.database {
        config.database_path = path;
    }

    // RUST_LOG wins over the configured filter
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_filter))
        .context("Invalid log filter")?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let store = ArticleStore::open(&config)
        .await
        .with_context(|| format!("Failed to open database '{}'", config.database_path))?;

    match args.command {
        Command::Init => {
            tracing::info!(database = %config.database_path, "Database initialized");
            println!("Initialized {}", config.database_path);
        }
        Command::List {
            tag,
            author,
            favorited,
            limit,
            offset,
            viewer,
        } => {
            let viewer = resolve_viewer(&store, viewer.as_deref()).await?;
            let mut filter = ListFilter::default().page(limit, offset);
            if let Some(tag) = tag {
                filter = filter.tag(tag);
            }
            if let Some(author) = author {
                filter = filter.author(author);
            }
            if let Some(username) = favorited {
                filter = filter.favorited_by(username);
            }

            let page = store
                .list(&filter, viewer)
                .await
                .context("Failed to list articles")?;
            println!("{}", serde_json::to_string_pretty(&page)?);
        }
        Command::Show { slug, viewer } => {
            let viewer = resolve_viewer(&store, viewer.as_deref()).await?;
            let article = match store.get_by_slug(&slug, viewer).await {
                Ok(article) => article,
                Err(StoreError::NotFound) => anyhow::bail!("No article with slug '{}'", slug),
                Err(e) => return Err(e).context("Failed to load article"),
            };
            println!("{}", serde_json::to_string_pretty(&article)?);
        }
        Command::Tags => {
            let tags = store.tags().await.context("Failed to list tags")?;
            println!("{}", serde_json::to_string_pretty(&tags)?);
        }
    }

    store.database().close().await;
    Ok(())
}
