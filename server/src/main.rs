// Lessonroom Server - Main Entry Point
//
// Bootstrap only: CLI parsing, configuration, backend selection and the
// listener. Handlers, routes and services live in the library crate.

use std::{
    path::{Path, PathBuf},
    str::FromStr,
    sync::Arc,
};

use anyhow::{Context, anyhow};
use clap::{Args, Parser, Subcommand};
use dotenvy::{Error as DotenvError, dotenv, from_filename};
use lessonroom_core::{
    config::AppConfig,
    identity::{UserProfile, normalize_email},
    ids::UserId,
    memory::{InMemoryDirectory, InMemoryRoomService},
};
use lessonroom_server::{
    Backends, build_state, observability, presence::PresenceHub, router,
    utils::users::is_valid_email,
};
use tokio::{net::TcpListener, time::MissedTickBehavior};
use tracing::{error, info, warn};
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(author, version, about = "Lessonroom collaboration server", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP server
    Serve(ServeArgs),
}

#[derive(Args, Debug, Default)]
struct ServeArgs {
    /// Path to a TOML configuration file
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Keep rooms, comments, notifications and users in memory instead of
    /// calling the external services
    #[arg(long)]
    ephemeral: bool,
    /// Seed a user into the in-memory directory (requires --ephemeral)
    #[arg(long = "seed-user", value_name = "NAME:EMAIL", requires = "ephemeral")]
    seed_users: Vec<SeedUser>,
}

#[derive(Debug, Clone)]
struct SeedUser {
    name: String,
    email: String,
}

impl FromStr for SeedUser {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let (name, email) = value
            .rsplit_once(':')
            .ok_or_else(|| format!("expected NAME:EMAIL, got `{value}`"))?;
        let name = name.trim();
        if name.is_empty() {
            return Err("seed user name must not be empty".to_owned());
        }
        if !is_valid_email(email) {
            return Err(format!("invalid seed user email `{email}`"));
        }
        Ok(Self {
            name: name.to_owned(),
            email: normalize_email(email),
        })
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env_status = load_env_file();
    observability::init_tracing()?;
    report_env_status(&env_status);

    let cli = Cli::parse();
    match cli.command.unwrap_or(Command::Serve(ServeArgs::default())) {
        Command::Serve(args) => run_serve(args).await,
    }
}

async fn run_serve(args: ServeArgs) -> anyhow::Result<()> {
    let config = AppConfig::load_with(args.config).context("load configuration")?;

    let backends = if args.ephemeral {
        let rooms = Arc::new(InMemoryRoomService::new());
        let directory = Arc::new(InMemoryDirectory::new());
        for seed in &args.seed_users {
            seed_user(&directory, seed);
        }
        Backends::in_memory(rooms, directory)
    } else {
        Backends::remote(&config)?
    };

    let state = build_state(backends, &config);
    info!(
        version = %state.metadata.version,
        backend = ?state.metadata.backend,
        max_attempts = config.notifications.max_attempts,
        presence_ttl_secs = config.presence.ttl_secs,
        "Loaded server metadata"
    );

    spawn_presence_sweeper(state.presence_hub.clone());
    let app = router::build_router(state);

    let listener = TcpListener::bind(config.bind_address)
        .await
        .context("failed to bind socket")?;
    let actual_addr = listener
        .local_addr()
        .context("failed to read local address")?;

    info!("listening on {actual_addr}");

    if let Err(error) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!(?error, "server terminated with error");
        return Err(anyhow!(error));
    }

    Ok(())
}

/// Expires presence sessions whose clients went away without leaving.
fn spawn_presence_sweeper(hub: PresenceHub) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(hub.ttl());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            hub.prune_expired();
        }
    });
}

fn seed_user(directory: &InMemoryDirectory, seed: &SeedUser) {
    let user_id = UserId::new(format!("user_{}", Uuid::new_v4().simple()));
    let token = Uuid::new_v4().simple().to_string();
    directory.insert(UserProfile::new(
        user_id.clone(),
        seed.name.clone(),
        seed.email.clone(),
        String::new(),
    ));
    directory.issue_session(token.clone(), &user_id);
    info!(
        user_id = %user_id,
        email = %seed.email,
        session_token = %token,
        "seeded user"
    );
}

enum EnvLoadStatus {
    Loaded(PathBuf),
    NotFound,
    Failed(DotenvError),
}

fn load_env_file() -> EnvLoadStatus {
    if let Ok(env_file) = std::env::var("LESSONROOM_ENV_FILE") {
        let trimmed = env_file.trim();
        if !trimmed.is_empty() {
            let path = PathBuf::from(trimmed);
            return match from_filename(&path) {
                Ok(_) => {
                    let display_path = make_relative(&path).unwrap_or_else(|| path.clone());
                    EnvLoadStatus::Loaded(display_path)
                }
                Err(err) => EnvLoadStatus::Failed(err),
            };
        }
    }

    match dotenv() {
        Ok(path) => {
            let display_path = make_relative(&path).unwrap_or_else(|| path.clone());
            EnvLoadStatus::Loaded(display_path)
        }
        Err(DotenvError::Io(err)) if err.kind() == std::io::ErrorKind::NotFound => {
            EnvLoadStatus::NotFound
        }
        Err(err) => EnvLoadStatus::Failed(err),
    }
}

fn report_env_status(status: &EnvLoadStatus) {
    match status {
        EnvLoadStatus::Loaded(path) => {
            info!("Loaded environment variables from {}", path.display());
        }
        EnvLoadStatus::NotFound => {
            info!("No .env file found; using process environment only");
        }
        EnvLoadStatus::Failed(err) => {
            warn!("Failed to load .env file: {err:?}");
        }
    }
}

fn make_relative(path: &Path) -> Option<PathBuf> {
    let cwd = std::env::current_dir().ok()?;
    path.strip_prefix(&cwd).map(|p| p.to_path_buf()).ok()
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        error!(?error, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
