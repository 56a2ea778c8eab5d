//! Cadence server binary
//!
//! Configuration via environment:
//!   CADENCE_DB          Database path (default: cadence.db)
//!   CADENCE_DB_KEY      Encryption passphrase (unset = unencrypted, dev only)
//!   CADENCE_HOST        Bind address (default: 127.0.0.1)
//!   CADENCE_PORT        Bind port (default: 3000)
//!   CADENCE_CORS_ORIGINS Comma-separated allowed CORS origins
//!   CADENCE_API_KEYS    Comma-separated API keys (unset = auth disabled)
//!   OLLAMA_HOST         Ollama server URL (enables AI analysis)
//!   OLLAMA_MODEL        Ollama model name (default: llama3.2)

use anyhow::Result;
use tracing::warn;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cadence_core::Database;
use cadence_server::ServerConfig;

#[tokio::main]
async fn main() -> Result<()> {
    // Set up logging (RUST_LOG overrides the default)
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).compact())
        .init();

    let db_path = std::env::var("CADENCE_DB").unwrap_or_else(|_| "cadence.db".to_string());
    let host = std::env::var("CADENCE_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
    let port: u16 = std::env::var("CADENCE_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(3000);

    let allowed_origins: Vec<String> = std::env::var("CADENCE_CORS_ORIGINS")
        .unwrap_or_default()
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();

    // Parse API keys from environment (comma-separated)
    let api_keys: Vec<String> = std::env::var("CADENCE_API_KEYS")
        .unwrap_or_default()
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();

    if api_keys.is_empty() {
        warn!("CADENCE_API_KEYS not set, API authentication disabled");
    } else {
        tracing::info!("API keys: {} configured", api_keys.len());
    }

    let db = match Database::new(&db_path) {
        Ok(db) => db,
        Err(cadence_core::Error::Encryption(_)) => {
            warn!("CADENCE_DB_KEY not set, opening unencrypted database (dev only)");
            Database::new_unencrypted(&db_path)?
        }
        Err(e) => return Err(e.into()),
    };

    cadence_server::serve(
        db,
        &host,
        port,
        ServerConfig {
            allowed_origins,
            api_keys,
        },
    )
    .await
}
