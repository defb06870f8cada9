//! Grace train backend entrypoint wiring the engine with the overlay WebSocket and REST layers.

use std::{env, net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Context;
use axum::Router;
use grace_train_back::{
    config::AppConfig,
    dao::record_store::{DocumentStore, JsonFileStore},
    engine::depot::DepotClient,
    routes,
    services::{chat_service::ChatMessage, overlay_service::run_heartbeat},
    state::{AppState, SharedState},
};
use tokio::{net::TcpListener, sync::mpsc, time::sleep};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = AppConfig::load();
    let store = open_document_store(&config).await;
    let depot = DepotClient::new(config.depot_config()).context("building depot client")?;
    let heartbeat = config.heartbeat_interval;

    let (app_state, chat_rx) = AppState::build(config, store, depot);

    tokio::spawn(run_heartbeat(app_state.overlays().clone(), heartbeat));
    tokio::spawn(drain_chat(chat_rx));
    // Build the HTTP router once the shared state is ready.
    let app = build_router(app_state);

    let port = env::var("PORT")
        .or_else(|_| env::var("SERVER_PORT"))
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(8080);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(%addr, "starting server");

    let listener = TcpListener::bind(addr).await.context("binding server")?;
    let service = app.into_make_service();
    axum::serve(listener, service)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving axum")?;

    Ok(())
}

/// Pick the record document store: CouchDB when configured, the JSON file otherwise.
#[cfg(feature = "couch-store")]
async fn open_document_store(config: &AppConfig) -> Arc<dyn DocumentStore> {
    use grace_train_back::dao::record_store::couchdb::{CouchConfig, CouchDocumentStore};

    const MAX_CONNECT_ATTEMPTS: u32 = 5;

    let couch = match CouchConfig::from_env() {
        Ok(Some(couch)) => couch,
        Ok(None) => return file_store(config),
        Err(err) => {
            warn!(error = %err, "incomplete CouchDB configuration; using the JSON file store");
            return file_store(config);
        }
    };

    let mut delay = Duration::from_millis(500);
    let max_delay = Duration::from_secs(10);
    for attempt in 1..=MAX_CONNECT_ATTEMPTS {
        match CouchDocumentStore::connect(couch.clone()).await {
            Ok(store) => {
                info!(database = %couch.database, "using CouchDB record store");
                return Arc::new(store);
            }
            Err(err) => {
                warn!(attempt, error = %err, "CouchDB connection attempt failed");
                sleep(delay).await;
                delay = (delay * 2).min(max_delay);
            }
        }
    }

    error!(
        attempts = MAX_CONNECT_ATTEMPTS,
        "could not reach CouchDB; falling back to the JSON file store"
    );
    file_store(config)
}

#[cfg(not(feature = "couch-store"))]
async fn open_document_store(config: &AppConfig) -> Arc<dyn DocumentStore> {
    file_store(config)
}

fn file_store(config: &AppConfig) -> Arc<dyn DocumentStore> {
    info!(path = %config.records_path.display(), "using JSON file record store");
    Arc::new(JsonFileStore::new(config.records_path.clone()))
}

/// Hand chat announcements to the log until a chat collaborator consumes them.
async fn drain_chat(mut chat_rx: mpsc::UnboundedReceiver<ChatMessage>) {
    while let Some(message) = chat_rx.recv().await {
        info!(
            reply_to = message.reply_to.as_deref().unwrap_or("-"),
            text = %message.text,
            "chat announcement"
        );
    }
}

/// Build the top-level router and attach cross-cutting middleware layers.
fn build_router(state: SharedState) -> Router<()> {
    routes::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Configure tracing subscribers so logs include spans by default.
fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,tower_http=debug".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Wait for Ctrl+C or SIGTERM and shut the server down gracefully.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = term.recv() => {},
                }
            }
            Err(err) => {
                warn!(error = %err, "failed to install SIGTERM handler; waiting for Ctrl+C only");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
