//! Main entry point for the HMIS server.
//!
//! Opens the SQLite store, builds the shared event bus and serves the full
//! REST API with OpenAPI/Swagger documentation.
//!
//! # Environment Variables
//! - `HMIS_REST_ADDR`: server address (default: "0.0.0.0:3000")
//! - `HMIS_DB_PATH`: SQLite database file (default: "hmis.sqlite3")
//! - `HMIS_FACILITY_NAME`: facility name for display
//!
//! Seeding reference data and demo staff is an operator action: run
//! `hmis seed` before first boot.

use api_rest::{router, AppState};
use hmis_core::{CoreConfig, EventBus, Store};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env().add_directive("hmis=info".parse()?))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let rest_addr = std::env::var("HMIS_REST_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".into());
    let cfg = CoreConfig::from_env_values(
        std::env::var("HMIS_DB_PATH").ok(),
        std::env::var("HMIS_FACILITY_NAME").ok(),
    )?;

    tracing::info!("++ Starting {} on {}", cfg.facility_name(), rest_addr);

    let store = Store::open(cfg.db_path())?;
    let state = AppState::new(store, EventBus::new());

    let listener = tokio::net::TcpListener::bind(&rest_addr).await?;
    axum::serve(listener, router(state)).await?;

    Ok(())
}
