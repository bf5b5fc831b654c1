//! Taskhub server
//!
//! Collaborative task management over HTTP with live updates on WebSocket.

use anyhow::{Context, Result, bail};
use clap::Parser;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use taskhub::api::{AppState, start_server};
use taskhub::auth::google::GoogleProvider;
use taskhub::auth::session::{issue_session_token, resolve_session_secret};
use taskhub::cli::{Cli, Command, TokenArgs};
use taskhub::config::{Config, ConfigLoader};
use taskhub::db::Database;
use taskhub::logging::{self, LogTarget};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    logging::init(&LogTarget::parse(&cli.log), cli.verbose)?;

    let mut loader = ConfigLoader::load(cli.config.as_deref().map(Path::new))?;
    if let Some(path) = loader.config_path() {
        info!("Loaded configuration from {:?}", path);
    }

    let config = loader.config_mut();
    if let Some(db_path) = &cli.database {
        config.server.db_path = db_path.into();
    }
    if let Some(host) = &cli.host {
        config.server.host = host.clone();
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    let config = loader.into_config();

    match cli.command {
        Some(Command::Token(args)) => run_token(&config, args),
        Some(Command::Serve) | None => run_server(config).await,
    }
}

/// Print a session token for an existing user.
fn run_token(config: &Config, args: TokenArgs) -> Result<()> {
    let db = Database::open(&config.server.db_path)?;
    let Some(user) = db.get_user(&args.user_id)? else {
        bail!("User '{}' not found in {:?}", args.user_id, config.server.db_path);
    };

    let secret = resolve_session_secret(
        config.auth.session_secret.as_deref(),
        &config.session_secret_path(),
    )?;
    let token = issue_session_token(&user, secret.as_bytes(), config.auth.session_ttl_hours)?;
    println!("{}", token);
    Ok(())
}

async fn resolve_addr(host: &str, port: u16) -> Result<SocketAddr> {
    if let Ok(addr) = format!("{}:{}", host, port).parse::<SocketAddr>() {
        return Ok(addr);
    }
    tokio::net::lookup_host((host, port))
        .await
        .with_context(|| format!("resolving listen address {}:{}", host, port))?
        .next()
        .with_context(|| format!("no address found for {}:{}", host, port))
}

/// Run the HTTP server until interrupted.
async fn run_server(config: Config) -> Result<()> {
    config.ensure_db_dir()?;

    info!("Starting taskhub v{}", env!("CARGO_PKG_VERSION"));
    info!("Database: {:?}", config.server.db_path);

    let db = Arc::new(Database::open(&config.server.db_path)?);
    info!("Database initialized successfully");

    let secret = resolve_session_secret(
        config.auth.session_secret.as_deref(),
        &config.session_secret_path(),
    )?;

    let provider = config
        .auth
        .google
        .credentials()
        .map(|(id, secret)| GoogleProvider::new(id.to_string(), secret.to_string(), config.google_redirect_url()));
    if provider.is_none() {
        warn!("Google credentials are not configured; interactive login is disabled");
    }

    let addr = resolve_addr(&config.server.host, config.server.port).await?;
    let config = Arc::new(config);
    let mut state = AppState::new(db, Arc::clone(&config), secret);
    if let Some(provider) = provider {
        state = state.with_identity_provider(Arc::new(provider));
    }

    let (shutdown_tx, bound) = start_server(state, addr).await?;
    info!("Public URL: {}", config.public_url());
    if bound != addr {
        info!("Bound to {}", bound);
    }

    tokio::signal::ctrl_c().await?;
    info!("Interrupt received, shutting down");
    let _ = shutdown_tx.send(());
    Ok(())
}
