//! Parlor CLI
//!
//! Runs the conversation server and performs the small amount of
//! administration it needs:
//! - Serve the HTTP/WebSocket API
//! - Write a default config file
//! - Create users and conversations
//! - Mint bearer tokens

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use parlor::api::{serve, AppState};
use parlor::auth::{issue_token, JwtVerifier};
use parlor::config::{generate_default_config, Config};
use parlor::store::{ChatStore, SqliteStore};
use parlor::types::UserId;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "parlor")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Real-time conversation server")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file (default: search the standard locations)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP and WebSocket server
    Serve,

    /// Generate default config file
    InitConfig {
        /// Output path (default: stdout)
        path: Option<PathBuf>,
    },

    /// Create a user
    AddUser {
        username: String,
        #[arg(long)]
        avatar_url: Option<String>,
    },

    /// Create a conversation
    NewConversation {
        /// Owning user id
        #[arg(long)]
        owner: i64,
        /// Participant user ids (repeatable)
        #[arg(long = "participant", required = true)]
        participants: Vec<i64>,
        #[arg(long)]
        title: Option<String>,
    },

    /// Issue a bearer token for a user
    Token {
        username: String,
        /// Token lifetime (default: auth.token_ttl_minutes)
        #[arg(long)]
        ttl_minutes: Option<i64>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if let Commands::InitConfig { path } = &cli.command {
        return init_config(path.as_deref());
    }

    let config = Config::resolve(cli.config.as_deref())?;
    init_tracing(&config);

    match cli.command {
        Commands::Serve => run_server(config).await,
        Commands::InitConfig { .. } => Ok(()),
        Commands::AddUser {
            username,
            avatar_url,
        } => {
            let store = open_store(&config)?;
            let user = store.create_user(&username, avatar_url.as_deref()).await?;
            println!("Created user {} ({})", user.username, user.id);
            Ok(())
        }
        Commands::NewConversation {
            owner,
            participants,
            title,
        } => {
            let store = open_store(&config)?;
            let participants: Vec<UserId> = participants.into_iter().map(UserId).collect();
            let conversation = store
                .create_conversation(UserId(owner), &participants, title.as_deref())
                .await?;
            println!(
                "Created conversation {} with {} participants",
                conversation.id,
                conversation.participants.len()
            );
            Ok(())
        }
        Commands::Token {
            username,
            ttl_minutes,
        } => {
            let secret = require_secret(&config)?;
            let store = open_store(&config)?;
            if store.find_user_by_username(&username).await?.is_none() {
                bail!("unknown user: {}", username);
            }

            let ttl = chrono::Duration::minutes(ttl_minutes.unwrap_or(config.auth.token_ttl_minutes));
            let token = issue_token(secret.as_bytes(), &username, ttl)?;
            println!("{}", token);
            Ok(())
        }
    }
}

async fn run_server(config: Config) -> anyhow::Result<()> {
    tracing::info!("Starting Parlor v{}", env!("CARGO_PKG_VERSION"));

    let secret = require_secret(&config)?;
    let store = Arc::new(open_store(&config)?);
    tracing::info!("Database: {}", config.database.path);

    let verifier = Arc::new(JwtVerifier::new(
        secret.as_bytes(),
        config.auth.leeway_secs,
        store.clone(),
    ));

    let api_config = config.api_config();
    let state = AppState::with_hub_config(store, verifier, api_config.clone(), config.hub_config());

    serve(state, &api_config).await?;
    Ok(())
}

fn init_config(path: Option<&std::path::Path>) -> anyhow::Result<()> {
    let content = generate_default_config();
    match path {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("creating {}", parent.display()))?;
            }
            std::fs::write(path, content).with_context(|| format!("writing {}", path.display()))?;
            println!("Wrote default config to {}", path.display());
        }
        None => print!("{}", content),
    }
    Ok(())
}

fn open_store(config: &Config) -> anyhow::Result<SqliteStore> {
    SqliteStore::open(&config.database.path)
        .with_context(|| format!("opening database {}", config.database.path))
}

fn require_secret(config: &Config) -> anyhow::Result<&str> {
    if config.auth.jwt_secret.is_empty() {
        bail!("auth.jwt_secret is not set (config file or PARLOR_JWT_SECRET)");
    }
    Ok(&config.auth.jwt_secret)
}

fn init_tracing(config: &Config) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!("parlor={},tower_http=info", config.logging.level).into()
    });

    let registry = tracing_subscriber::registry().with(filter);
    if config.logging.format == "json" {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}
