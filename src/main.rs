//! Estimation room binary entrypoint wiring REST, WebSocket, storage and background tasks.

use std::{env, net::SocketAddr, path::PathBuf, sync::Arc};

use anyhow::Context;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use estimation_room_back::{
    config::AppConfig,
    dao::{
        room_store::{FileRoomStore, MemoryRoomStore, RoomStore},
        storage::StorageError,
    },
    routes,
    services::{maintenance, storage_supervisor, strudel::CodeGenerator},
    state::{AppState, SharedState},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = AppConfig::load();
    let code_generator = build_code_generator(&config);
    let app_state = AppState::new(config, code_generator).context("initializing state")?;

    spawn_storage(app_state.clone());
    tokio::spawn(maintenance::run_session_sweeper(app_state.clone()));

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
    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving axum")?;

    Ok(())
}

/// Pick the room store from the environment and hand it to the supervisor.
///
/// `MONGO_URI` wins when the mongo backend is compiled in, then `ROOM_DATA_DIR`,
/// then an in-memory store.
fn spawn_storage(state: SharedState) {
    if let Ok(uri) = env::var("MONGO_URI") {
        spawn_mongo_store(state, uri);
        return;
    }

    if let Some(dir) = env::var_os("ROOM_DATA_DIR").map(PathBuf::from) {
        info!(dir = %dir.display(), "using file room store");
        tokio::spawn(storage_supervisor::run(state, move || {
            let dir = dir.clone();
            async move {
                let store = FileRoomStore::open(dir).await?;
                Ok::<_, StorageError>(Arc::new(store) as Arc<dyn RoomStore>)
            }
        }));
        return;
    }

    warn!("no persistent room store configured; rooms live in memory only");
    let store: Arc<dyn RoomStore> = Arc::new(MemoryRoomStore::new());
    tokio::spawn(storage_supervisor::run(state, move || {
        let store = store.clone();
        async move { Ok::<_, StorageError>(store) }
    }));
}

#[cfg(feature = "mongo-store")]
fn spawn_mongo_store(state: SharedState, uri: String) {
    use estimation_room_back::dao::room_store::mongodb::{MongoConfig, MongoRoomStore};

    let db_name = env::var("MONGO_DB").ok();
    info!("using MongoDB room store");
    tokio::spawn(storage_supervisor::run(state, move || {
        let uri = uri.clone();
        let db_name = db_name.clone();
        async move {
            let config = MongoConfig::from_uri(&uri, db_name.as_deref()).await?;
            let store = MongoRoomStore::connect(config).await?;
            Ok::<_, StorageError>(Arc::new(store) as Arc<dyn RoomStore>)
        }
    }));
}

#[cfg(not(feature = "mongo-store"))]
fn spawn_mongo_store(state: SharedState, _uri: String) {
    warn!("MONGO_URI is set but the `mongo-store` feature is disabled; using memory");
    let store: Arc<dyn RoomStore> = Arc::new(MemoryRoomStore::new());
    tokio::spawn(storage_supervisor::run(state, move || {
        let store = store.clone();
        async move { Ok::<_, StorageError>(store) }
    }));
}

#[cfg(feature = "strudel-http")]
fn build_code_generator(config: &AppConfig) -> Option<Arc<dyn CodeGenerator>> {
    use estimation_room_back::services::strudel::HttpCodeGenerator;

    let endpoint = config.strudel_endpoint.as_deref()?;
    match HttpCodeGenerator::new(endpoint) {
        Ok(generator) => {
            info!(endpoint, "strudel generation enabled");
            Some(Arc::new(generator))
        }
        Err(err) => {
            warn!(error = %err, "failed to build strudel client; generation disabled");
            None
        }
    }
}

#[cfg(not(feature = "strudel-http"))]
fn build_code_generator(config: &AppConfig) -> Option<Arc<dyn CodeGenerator>> {
    if config.strudel_endpoint.is_some() {
        warn!("strudel endpoint configured but the `strudel-http` feature is disabled");
    }
    None
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

        let mut term = signal(SignalKind::terminate()).expect("install SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {},
            _ = term.recv() => {},
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
