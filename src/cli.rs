use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;

use crate::auth::{encode_token, Claims};
use crate::config::{self, AppConfig, SecurityConfig, StoreBackend};
use crate::database::{DatabaseManager, PgLedgerStore};
use crate::ledger::{Ledger, LedgerStore, MemoryStore};
use crate::AppState;

#[derive(Parser)]
#[command(name = "garderie-api")]
#[command(about = "Daycare management API - facility capacity ledger and child enrollment")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Run the HTTP server (default)")]
    Serve {
        #[arg(long, help = "Port to listen on, overrides GARDERIE_API_PORT")]
        port: Option<u16>,

        #[arg(long, help = "Create missing tables before serving")]
        migrate: bool,
    },

    #[command(about = "Create the garderie and enfant tables if missing")]
    Migrate,

    #[command(about = "Issue a bearer token signed with JWT_SECRET")]
    Token {
        #[arg(long)]
        id: i32,

        #[arg(long)]
        email: String,

        #[arg(long = "type", default_value = "directeur")]
        user_type: String,
    },
}

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = config::config();

    match cli.command.unwrap_or(Commands::Serve { port: None, migrate: false }) {
        Commands::Serve { port, migrate } => serve(config, port, migrate).await,
        Commands::Migrate => {
            let pool = DatabaseManager::connect(&config.database).await?;
            DatabaseManager::bootstrap_schema(&pool).await?;
            pool.close().await;
            Ok(())
        }
        Commands::Token { id, email, user_type } => {
            println!("{}", issue_token(&config.security, id, &email, &user_type)?);
            Ok(())
        }
    }
}

/// Token valid for `jwt_expiry_hours`
fn issue_token(security: &SecurityConfig, id: i32, email: &str, user_type: &str) -> anyhow::Result<String> {
    let claims = Claims::new(id, email, user_type, security.jwt_expiry_hours);
    encode_token(&claims, &security.jwt_secret).context("failed to sign token")
}

async fn serve(config: &AppConfig, port: Option<u16>, migrate: bool) -> anyhow::Result<()> {
    info!("Starting garderie API in {:?} mode", config.environment);

    if config.security.require_auth && config.security.jwt_secret.is_empty() {
        anyhow::bail!("authentication is required but JWT_SECRET is not set");
    }

    let store: Arc<dyn LedgerStore> = match config.database.backend {
        StoreBackend::Memory => {
            tracing::warn!("Using the in-memory store; data is lost on exit and not shared between instances");
            Arc::new(MemoryStore::new(config.database.lock_timeout()))
        }
        StoreBackend::Postgres => {
            let pool = DatabaseManager::connect(&config.database).await?;
            if migrate {
                DatabaseManager::bootstrap_schema(&pool).await?;
            }
            Arc::new(PgLedgerStore::new(pool, config.database.lock_timeout()))
        }
    };

    let state = AppState {
        ledger: Ledger::new(store),
        config: Arc::new(config.clone()),
    };

    let port = port.unwrap_or(config.api.port);
    let bind_addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", bind_addr))?;

    info!("Garderie API listening on http://{}", bind_addr);

    axum::serve(listener, crate::app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}
