//! Standalone REST API server binary.
//!
//! Runs the REST API server on its own, useful for development when only the
//! HTTP surface is needed. The workspace's main `hmis-run` binary is the
//! normal entry point.

use api_rest::{router, AppState};
use hmis_core::{CoreConfig, EventBus, Store};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("api_rest=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let addr = std::env::var("HMIS_REST_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".into());
    let cfg = CoreConfig::from_env_values(
        std::env::var("HMIS_DB_PATH").ok(),
        std::env::var("HMIS_FACILITY_NAME").ok(),
    )?;

    tracing::info!("-- Starting HMIS REST API on {}", addr);

    let store = Store::open(cfg.db_path())?;
    let state = AppState::new(store, EventBus::new());

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, router(state)).await?;

    Ok(())
}
