//! # haven-server
//!
//! HTTP service for Haven case files.
//!
//! This binary provides:
//! - **External API** for mobile clients: field catalogue, person reads and
//!   batch writes of persons and links, gated by capability tokens and
//!   recorded in the provenance log
//! - **Management API** for a crew's operators: fields, persons, links,
//!   duplicate references and imports
//! - **Admin API** behind `ADMIN_TOKEN`: crews, users, roles and tokens

mod admin;
mod api;
mod auth;
mod config;
mod error;
mod external;
mod manage;
mod projector;
mod provenance;

use anyhow::Context;
use tracing::info;
use tracing_subscriber::EnvFilter;

use haven_store::Database;

use crate::api::AppState;
use crate::config::ServerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Initialize tracing (respects RUST_LOG env var)
    // -----------------------------------------------------------------------
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,haven_server=debug,haven_store=debug")),
        )
        .init();

    info!("Starting Haven server v{}", env!("CARGO_PKG_VERSION"));

    // -----------------------------------------------------------------------
    // 2. Load configuration
    // -----------------------------------------------------------------------
    let config = ServerConfig::from_env();
    info!(
        addr = %config.http_addr,
        database = ?config.database_path,
        "Loaded configuration"
    );
    info!(
        instance = %config.instance_name,
        admin_enabled = config.admin_token.is_some(),
        max_batch_items = config.max_batch_items,
        "Instance settings"
    );

    // -----------------------------------------------------------------------
    // 3. Open the database (runs migrations)
    // -----------------------------------------------------------------------
    let db = match &config.database_path {
        Some(path) => Database::open_at(path),
        None => Database::new(),
    }
    .context("failed to open database")?;

    let http_addr = config.http_addr;
    let app_state = AppState::new(db, config);

    // -----------------------------------------------------------------------
    // 4. Run the HTTP API server (blocks until shutdown)
    // -----------------------------------------------------------------------
    tokio::select! {
        result = api::serve(app_state, http_addr) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "HTTP server failed");
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
