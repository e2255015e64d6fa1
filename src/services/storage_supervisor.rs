use std::{future::Future, sync::Arc, time::Duration};

use tokio::time::sleep;
use tracing::{info, warn};

use crate::{
    dao::{room_store::RoomStore, storage::StorageError},
    state::SharedState,
};

const INITIAL_DELAY: Duration = Duration::from_millis(1_000);
const MAX_DELAY: Duration = Duration::from_secs(10);
const HEALTH_POLL_INTERVAL: Duration = Duration::from_secs(5);
const MAX_RECONNECT_ATTEMPTS: u32 = 3;

/// Connect to a durable room store and keep the shared state in degraded mode while it is
/// unreachable.
///
/// Runs forever: after reconnect attempts are exhausted the store is dropped and a fresh
/// connection is built with exponential backoff.
pub async fn run<F, Fut>(state: SharedState, mut connect: F)
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Result<Arc<dyn RoomStore>, StorageError>> + Send,
{
    let mut delay = INITIAL_DELAY;

    loop {
        match connect().await {
            Ok(store) => {
                state.install_room_store(store.clone()).await;
                info!(
                    store = state.store_backend().as_str(),
                    "room store connected; leaving degraded mode"
                );
                delay = INITIAL_DELAY;

                supervise(&state, store.as_ref()).await;

                state.clear_room_store().await;
                sleep(delay).await;
                delay = (delay * 2).min(MAX_DELAY);
            }
            Err(err) => {
                warn!(error = %err, "room store connection attempt failed");
                sleep(delay).await;
                delay = (delay * 2).min(MAX_DELAY);
            }
        }
    }
}

/// Poll `store` until it fails and cannot be brought back.
async fn supervise(state: &SharedState, store: &dyn RoomStore) {
    loop {
        if store.health_check().await.is_ok() {
            if state.is_degraded() {
                info!("room store healthy again; leaving degraded mode");
                state.update_degraded(false);
            }
            sleep(HEALTH_POLL_INTERVAL).await;
            continue;
        }

        if !reconnect(state, store).await {
            warn!("exhausted room store reconnect attempts; staying in degraded mode");
            return;
        }

        state.update_degraded(false);
        sleep(HEALTH_POLL_INTERVAL).await;
    }
}

async fn reconnect(state: &SharedState, store: &dyn RoomStore) -> bool {
    let mut reconnect_delay = INITIAL_DELAY;

    for attempt in 0..MAX_RECONNECT_ATTEMPTS {
        match store.try_reconnect().await {
            Ok(()) => {
                info!(attempt, "room store reconnected after health check failure");
                return true;
            }
            Err(err) => {
                if attempt == 0 {
                    warn!(
                        attempt, error = %err,
                        "room store reconnect first attempt failed; entering degraded mode"
                    );
                    state.update_degraded(true);
                } else {
                    warn!(attempt, error = %err, "room store reconnect attempt failed");
                }
                sleep(reconnect_delay).await;
                reconnect_delay = (reconnect_delay * 2).min(MAX_DELAY);
            }
        }
    }

    false
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use futures::future::BoxFuture;
    use tokio::time::timeout;

    use super::*;
    use crate::{
        config::StoreBackend,
        dao::room_store::memory::MemoryRoomStore,
        services::metadata_service::{ResolveError, TrackResolver},
        state::{AppState, engine::RoomSettings, room::Track},
    };

    struct NoResolver;

    impl TrackResolver for NoResolver {
        fn resolve(&self, url: &str) -> BoxFuture<'static, Result<Track, ResolveError>> {
            let url = url.to_string();
            Box::pin(async move { Err(ResolveError::NoTrackId { url }) })
        }
    }

    fn degraded_state() -> SharedState {
        AppState::new(
            StoreBackend::Couch,
            Arc::new(NoResolver),
            RoomSettings::default(),
        )
    }

    #[tokio::test]
    async fn leaves_degraded_mode_once_connected() {
        let state = degraded_state();
        let mut watcher = state.degraded_watcher();
        let attempts = Arc::new(AtomicU32::new(0));

        let counter = attempts.clone();
        let handle = tokio::spawn(run(state.clone(), move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(Arc::new(MemoryRoomStore::new()) as Arc<dyn RoomStore>)
            }
        }));

        timeout(Duration::from_secs(2), watcher.wait_for(|degraded| !degraded))
            .await
            .expect("supervisor should install the store")
            .unwrap();
        assert!(state.require_room_store().await.is_ok());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);

        handle.abort();
    }

    #[tokio::test]
    async fn stays_degraded_while_connect_fails() {
        let state = degraded_state();

        let handle = tokio::spawn(run(state.clone(), || async {
            Err(StorageError::unavailable(
                "connection refused".to_string(),
                std::io::Error::other("couch is down"),
            ))
        }));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(state.is_degraded());
        assert!(state.room_store().await.is_none());

        handle.abort();
    }
}
