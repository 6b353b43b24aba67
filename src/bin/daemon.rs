//! asanatabs-daemon: keeps the task cache in sync and serves it to tabs
//!
//! Pulls workspaces and tasks on an interval, persists them to a redb file,
//! and pushes every snapshot to tabs connected over WebSocket.

use asanatabs::api::{client_name, AsanaClient};
use asanatabs::cli::DaemonArgs;
use asanatabs::config::Config;
use asanatabs::{create_router, OriginPolicy};
use asanatabs::store::RedbStore;
use asanatabs::sync::SyncEngine;
use clap::Parser;
use std::sync::Arc;
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    let args = DaemonArgs::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut config = match &args.config {
        Some(path) => match Config::load(path) {
            Ok(config) => config,
            Err(e) => {
                tracing::error!("[daemon] Failed to load config {:?}: {}", path, e);
                std::process::exit(1);
            }
        },
        None => Config::default(),
    };
    args.apply(&mut config);

    tracing::info!("[daemon] Starting asanatabs-daemon");
    tracing::info!("[daemon] Database: {:?}", config.database_path);

    let client = match AsanaClient::new(
        config.api_base_url.clone(),
        args.session(&config),
        client_name(&config.instance_id()),
        config.request_timeout(),
    ) {
        Ok(client) => client,
        Err(e) => {
            tracing::error!("[daemon] Failed to build API client: {}", e);
            std::process::exit(1);
        }
    };

    let store = match RedbStore::open(&config.database_path) {
        Ok(store) => store,
        Err(e) => {
            tracing::error!("[daemon] Failed to open database: {}", e);
            std::process::exit(1);
        }
    };

    let sync = SyncEngine::start(Arc::new(client), Arc::new(store), config.engine_config()).await;
    if config.allowed_origins.is_empty() {
        tracing::info!("[daemon] No browser origins allowed, only non-browser clients can connect");
    }
    let app = create_router(sync.clone(), OriginPolicy::new(&config.allowed_origins));

    let listener = match tokio::net::TcpListener::bind(config.listen_addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("[daemon] Failed to bind {}: {}", config.listen_addr, e);
            std::process::exit(1);
        }
    };
    tracing::info!("[daemon] Listening on {}", config.listen_addr);

    let shutdown = async move {
        let _ = signal::ctrl_c().await;
        tracing::info!("[daemon] Received Ctrl+C");
        sync.shutdown().await;
    };

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
    {
        tracing::error!("[daemon] Server error: {}", e);
        std::process::exit(1);
    }
}
