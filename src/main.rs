//! Listening room binary entrypoint wiring REST, WebSocket, SSE and the room store.

use std::{env, net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use listening_room_back::{
    config::{AppConfig, StoreBackend},
    dao::room_store::memory::MemoryRoomStore,
    routes,
    services::metadata_service::OEmbedResolver,
    state::{AppState, SharedState},
};

const DEFAULT_PORT: u16 = 5000;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = AppConfig::load();
    let resolver = OEmbedResolver::new(&config.resolver).context("building metadata resolver")?;
    let app_state = AppState::new(config.store, Arc::new(resolver), config.room.clone());

    start_room_store(&app_state, config.store).await?;
    // Build the HTTP router once the shared state is ready.
    let app = build_router(app_state);

    let port = env::var("PORT")
        .or_else(|_| env::var("SERVER_PORT"))
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(DEFAULT_PORT);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(%addr, store = config.store.as_str(), "starting server");

    let listener = TcpListener::bind(addr).await.context("binding server")?;
    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving axum")?;

    Ok(())
}

/// Install the in-memory store right away, or hand a durable backend to the storage
/// supervisor which keeps the service degraded until it connects.
async fn start_room_store(state: &SharedState, backend: StoreBackend) -> anyhow::Result<()> {
    match backend {
        StoreBackend::Memory => {
            state
                .install_room_store(Arc::new(MemoryRoomStore::new()))
                .await;
            info!("using in-memory room store; state is lost on restart");
        }
        StoreBackend::Couch => spawn_couch_supervisor(state)?,
        StoreBackend::Mongo => spawn_mongo_supervisor(state).await?,
    }
    Ok(())
}

#[cfg(feature = "couch-store")]
fn spawn_couch_supervisor(state: &SharedState) -> anyhow::Result<()> {
    use listening_room_back::{
        dao::{
            room_store::{
                RoomStore,
                couchdb::{CouchConfig, CouchRoomStore},
            },
            storage::StorageError,
        },
        services::storage_supervisor,
    };

    let couch_config = CouchConfig::from_env().context("reading CouchDB configuration")?;
    info!(base_url = %couch_config.base_url, database = %couch_config.database, "connecting to CouchDB");

    tokio::spawn(storage_supervisor::run(state.clone(), move || {
        let couch_config = couch_config.clone();
        async move {
            CouchRoomStore::connect(couch_config)
                .await
                .map(|store| Arc::new(store) as Arc<dyn RoomStore>)
                .map_err(StorageError::from)
        }
    }));
    Ok(())
}

#[cfg(not(feature = "couch-store"))]
fn spawn_couch_supervisor(_state: &SharedState) -> anyhow::Result<()> {
    anyhow::bail!("couch store requested but the `couch-store` feature is disabled")
}

#[cfg(feature = "mongo-store")]
async fn spawn_mongo_supervisor(state: &SharedState) -> anyhow::Result<()> {
    use listening_room_back::{
        dao::{
            room_store::{
                RoomStore,
                mongodb::{MongoConfig, MongoRoomStore},
            },
            storage::StorageError,
        },
        services::storage_supervisor,
    };

    let mongo_config = MongoConfig::from_env()
        .await
        .context("reading MongoDB configuration")?;
    info!(database = %mongo_config.database_name, "connecting to MongoDB");

    tokio::spawn(storage_supervisor::run(state.clone(), move || {
        let mongo_config = mongo_config.clone();
        async move {
            MongoRoomStore::connect(mongo_config)
                .await
                .map(|store| Arc::new(store) as Arc<dyn RoomStore>)
                .map_err(StorageError::from)
        }
    }));
    Ok(())
}

#[cfg(not(feature = "mongo-store"))]
async fn spawn_mongo_supervisor(_state: &SharedState) -> anyhow::Result<()> {
    anyhow::bail!("mongo store requested but the `mongo-store` feature is disabled")
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
