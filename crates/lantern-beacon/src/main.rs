//! Beacon analysis engine binary.

use std::sync::Arc;

use anyhow::Context;
use tracing::info;
use tracing_subscriber::EnvFilter;

use lantern_beacon::collector::{AuditStoreSource, ErrorSource, JournalSource};
use lantern_beacon::inference::OllamaClient;
use lantern_beacon::notifier::{NoopNotifier, Notifier, WebhookNotifier};
use lantern_beacon::store::Store;
use lantern_beacon::{registrar, server, AnalysisEngine, EngineConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = EngineConfig::from_env().context("loading engine configuration")?;

    let store = Store::connect(&config.db_path)
        .await
        .with_context(|| format!("opening analysis store at {}", config.db_path))?;

    let ollama = OllamaClient::new(config.ollama_url.clone(), config.ollama_model.clone());
    let notifier: Arc<dyn Notifier> = match &config.notify_webhook_url {
        Some(url) => Arc::new(WebhookNotifier::new(url.clone())),
        None => Arc::new(NoopNotifier),
    };
    let sources: Vec<Arc<dyn ErrorSource>> = vec![
        Arc::new(JournalSource),
        Arc::new(AuditStoreSource::new(config.audit_dbs.clone())),
    ];

    let listen = config.listen.clone();
    let engine = Arc::new(AnalysisEngine::new(store, config, ollama, notifier, sources));
    engine.start();
    registrar::spawn(Arc::clone(&engine));

    let listener = tokio::net::TcpListener::bind(&listen)
        .await
        .with_context(|| format!("binding {listen}"))?;
    info!("beacon analysis engine listening on {listen}");

    axum::serve(listener, server::router(Arc::clone(&engine))).await?;

    engine.stop();
    Ok(())
}
