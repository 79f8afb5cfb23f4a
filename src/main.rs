use anyhow::Context;
use clap::Parser;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;
use whatsapp_relay::http::{self, AppState};
use whatsapp_relay::session::web::WebConnector;
use whatsapp_relay::store::FileStore;
use whatsapp_relay::{RelayConfig, SessionManager, WebhookNotifier};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = RelayConfig::parse();
    let addr = config.listen_addr()?;

    let notifier = WebhookNotifier::new(config.webhook_url.clone(), config.webhook_timeout())?;
    let store = FileStore::new(&config.auth_dir);
    info!(
        webhook = %notifier.url(),
        auth_dir = %store.dir().display(),
        "starting {}",
        config.service_name
    );

    let session = Arc::new(
        SessionManager::new(
            Arc::new(store),
            Arc::new(WebConnector::new(config.ws_url.clone())),
            Arc::new(notifier),
        )
        .with_reconnect_delay(config.reconnect_delay()),
    );
    session.connect().await.context("starting session")?;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    let state = AppState::new(Arc::clone(&session), config.service_name.as_str());
    http::serve(listener, state, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "cannot listen for ctrl-c");
            std::future::pending::<()>().await;
        }
        info!("shutting down");
    })
    .await
    .context("http server")?;

    session.shutdown().await;
    Ok(())
}
