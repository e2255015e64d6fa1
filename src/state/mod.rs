pub mod engine;
pub mod room;
mod sse;

use std::sync::Arc;

use axum::extract::ws::Message;
use dashmap::DashMap;
use tokio::sync::{RwLock, mpsc, watch};
use uuid::Uuid;

use crate::{
    config::StoreBackend,
    dao::room_store::RoomStore,
    error::ServiceError,
    services::metadata_service::TrackResolver,
    state::engine::{RoomEngine, RoomSettings},
};

pub use self::sse::{ROOM_SSE_CAPACITY, SseHub};

/// Reference-counted handle passed to every handler and service.
pub type SharedState = Arc<AppState>;

#[derive(Clone)]
/// Handle used to push messages to a connected observer socket.
pub struct ObserverConnection {
    /// Registry key of the connection.
    pub id: Uuid,
    /// Queue drained by the socket's writer task.
    pub tx: mpsc::UnboundedSender<Message>,
}

/// Central application state: room store handle, engine, resolver and observer registries.
pub struct AppState {
    room_store: RwLock<Option<Arc<dyn RoomStore>>>,
    store_backend: StoreBackend,
    resolver: Arc<dyn TrackResolver>,
    engine: RoomEngine,
    sse: SseHub,
    observers: DashMap<Uuid, ObserverConnection>,
    degraded: watch::Sender<bool>,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned cheaply.
    ///
    /// The application starts in degraded mode until a room store is installed.
    pub fn new(
        store_backend: StoreBackend,
        resolver: Arc<dyn TrackResolver>,
        settings: RoomSettings,
    ) -> SharedState {
        let (degraded_tx, _rx) = watch::channel(true);
        Arc::new(Self {
            room_store: RwLock::new(None),
            store_backend,
            resolver,
            engine: RoomEngine::new(settings),
            sse: SseHub::new(ROOM_SSE_CAPACITY),
            observers: DashMap::new(),
            degraded: degraded_tx,
        })
    }

    /// Obtain a handle to the current room store, if one is installed.
    pub async fn room_store(&self) -> Option<Arc<dyn RoomStore>> {
        let guard = self.room_store.read().await;
        guard.as_ref().cloned()
    }

    /// Current room store, or [`ServiceError::Degraded`] when none is usable.
    pub async fn require_room_store(&self) -> Result<Arc<dyn RoomStore>, ServiceError> {
        if self.is_degraded() {
            return Err(ServiceError::Degraded);
        }
        self.room_store().await.ok_or(ServiceError::Degraded)
    }

    /// Install a new room store implementation and leave degraded mode.
    pub async fn install_room_store(&self, store: Arc<dyn RoomStore>) {
        {
            let mut guard = self.room_store.write().await;
            *guard = Some(store);
        }
        self.engine.invalidate_cache().await;
        self.update_degraded(false);
    }

    /// Remove the current room store and enter degraded mode.
    pub async fn clear_room_store(&self) {
        {
            let mut guard = self.room_store.write().await;
            guard.take();
        }
        self.engine.invalidate_cache().await;
        self.update_degraded(true);
    }

    /// Current degraded flag.
    pub fn is_degraded(&self) -> bool {
        *self.degraded.borrow()
    }

    /// Subscribe to degraded mode updates.
    pub fn degraded_watcher(&self) -> watch::Receiver<bool> {
        self.degraded.subscribe()
    }

    /// Update and broadcast the degraded flag when the value changes.
    pub fn update_degraded(&self, value: bool) {
        self.degraded.send_if_modified(|current| {
            if *current == value {
                return false;
            }
            *current = value;
            true
        });
    }

    /// Backend selected at startup.
    pub fn store_backend(&self) -> StoreBackend {
        self.store_backend
    }

    /// Resolver turning submitted URLs into tracks.
    pub fn resolver(&self) -> &dyn TrackResolver {
        self.resolver.as_ref()
    }

    /// Transition engine guarding the room.
    pub fn engine(&self) -> &RoomEngine {
        &self.engine
    }

    /// Broadcast hub used for the room SSE stream.
    pub fn room_sse(&self) -> &SseHub {
        &self.sse
    }

    /// Registry of active observer sockets keyed by connection id.
    pub fn observers(&self) -> &DashMap<Uuid, ObserverConnection> {
        &self.observers
    }
}
