use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio::sync::mpsc;
use tracing::info;

use commerce_sync as api;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = api::config::load_config().context("failed to load configuration")?;
    api::config::init_tracing(&cfg.log_level, cfg.log_json);

    let db = api::db::establish_connection(&cfg)
        .await
        .context("failed to connect to database")?;
    let db = Arc::new(db);

    let (event_tx, event_rx) = mpsc::channel(1024);
    let event_sender = api::events::EventSender::new(event_tx);
    tokio::spawn(api::events::process_events(event_rx));

    let storefront = Arc::new(api::storefront::rest::RestStorefrontClient::new(
        &cfg.integration,
    ));

    let addr = SocketAddr::new(cfg.host.parse().context("invalid host")?, cfg.port);
    let config = Arc::new(cfg);
    let state = api::AppState::new(db, config, event_sender, storefront);
    let app = api::router(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("listening on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
        })
        .await
        .context("server error")?;

    Ok(())
}
