//! SSH certificate authority binary.

use std::sync::Arc;

use anyhow::Context;
use tracing::info;
use tracing_subscriber::EnvFilter;

use lantern_sshca::server::AppState;
use lantern_sshca::signer::SshKeygenSigner;
use lantern_sshca::{db, server, CaConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = CaConfig::from_env().context("loading CA configuration")?;

    // A missing CA key is fatal; nothing can be signed without it.
    if !std::path::Path::new(&config.ca_private_key_path).exists() {
        anyhow::bail!("CA private key missing: {}", config.ca_private_key_path);
    }

    let pool = db::connect(&config.database_url)
        .await
        .with_context(|| format!("connecting to {}", config.database_url))?;

    let listen = config.listen.clone();
    let signer = Arc::new(SshKeygenSigner::new(config.ca_private_key_path.clone()));
    let state = AppState {
        db: pool,
        config: Arc::new(config),
        signer,
    };

    let listener = tokio::net::TcpListener::bind(&listen)
        .await
        .with_context(|| format!("binding {listen}"))?;
    info!("SSH certificate authority listening on {listen}");

    axum::serve(listener, server::router(state)).await?;
    Ok(())
}
