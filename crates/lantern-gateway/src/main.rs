//! Support gateway binary.

use std::net::SocketAddr;

use anyhow::Context;
use tracing::info;
use tracing_subscriber::EnvFilter;

use lantern_gateway::{breakglass, db, server, AppState, GatewayConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = GatewayConfig::from_env().context("loading gateway configuration")?;

    // An unreachable database at start-up is fatal.
    let pool = db::connect(&config.database_url)
        .await
        .with_context(|| format!("connecting to {}", config.database_url))?;

    breakglass::spawn_sweeper(pool.clone());

    let listen = config.listen.clone();
    let state = AppState::new(pool, config);

    let listener = tokio::net::TcpListener::bind(&listen)
        .await
        .with_context(|| format!("binding {listen}"))?;
    info!("support gateway listening on {listen}");

    axum::serve(
        listener,
        server::router(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}
