use std::{convert::Infallible, time::Duration};

use async_stream::stream;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::{Stream, StreamExt};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{info, warn};

use crate::{
    dto::sse::ServerEvent,
    error::ServiceError,
    services::{room_events, room_service},
    state::{SharedState, room::RoomSnapshot},
};

/// Subscribe to room pushes and capture the snapshot that opens the stream.
///
/// Both happen under the engine gate, so the first push is always the transition
/// right after the snapshot.
pub async fn subscribe_room(
    state: &SharedState,
) -> Result<(broadcast::Receiver<ServerEvent>, RoomSnapshot), ServiceError> {
    room_service::snapshot_in_order(state, |snapshot| {
        (state.room_sse().subscribe(), snapshot.clone())
    })
    .await
}

/// Convert a broadcast receiver into an SSE response that opens with `initial`.
pub fn to_sse_stream(
    state: SharedState,
    receiver: broadcast::Receiver<ServerEvent>,
    initial: RoomSnapshot,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = room_event_stream(state, receiver, initial)
        .map(|payload| Ok::<_, Infallible>(to_event(payload)));

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

/// Room events in commit order, starting with `initial`.
///
/// A subscriber that lagged behind the channel gets one fresh snapshot in place of the
/// events it missed. The backlog is dropped first: it only holds states older than that
/// snapshot.
fn room_event_stream(
    state: SharedState,
    mut receiver: broadcast::Receiver<ServerEvent>,
    initial: RoomSnapshot,
) -> impl Stream<Item = ServerEvent> {
    stream! {
        match room_events::sync_event(&initial) {
            Ok(event) => { yield event; }
            Err(err) => warn!(error = %err, "failed to serialize initial snapshot"),
        }

        loop {
            match receiver.recv().await {
                Ok(payload) => { yield payload; }
                Err(RecvError::Closed) => break,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "room SSE subscriber lagged; resynchronising");
                    let resync = room_service::snapshot_in_order(&state, |snapshot| {
                        (receiver.resubscribe(), snapshot.clone())
                    })
                    .await;
                    match resync {
                        Ok((fresh, snapshot)) => {
                            receiver = fresh;
                            match room_events::sync_event(&snapshot) {
                                Ok(event) => { yield event; }
                                Err(err) => warn!(error = %err, "failed to serialize resync snapshot"),
                            }
                        }
                        Err(err) => {
                            receiver = receiver.resubscribe();
                            warn!(error = %err, "resync snapshot unavailable");
                        }
                    }
                }
            }
        }

        info!("room SSE stream closed");
    }
}

fn to_event(payload: ServerEvent) -> Event {
    let event = Event::default().data(payload.data);
    match payload.event {
        Some(name) => event.event(name),
        None => event,
    }
}

#[cfg(test)]
mod tests {
    use std::{pin::pin, sync::Arc};

    use futures::future::BoxFuture;

    use super::*;
    use crate::{
        config::StoreBackend,
        dao::room_store::memory::MemoryRoomStore,
        services::metadata_service::{ResolveError, TrackResolver},
        state::{AppState, ROOM_SSE_CAPACITY, engine::RoomSettings, room::Track},
    };

    struct NoResolver;

    impl TrackResolver for NoResolver {
        fn resolve(&self, url: &str) -> BoxFuture<'static, Result<Track, ResolveError>> {
            let url = url.to_string();
            Box::pin(async move { Err(ResolveError::NoTrackId { url }) })
        }
    }

    #[tokio::test]
    async fn lagged_subscriber_skips_the_stale_backlog() {
        let state = AppState::new(
            StoreBackend::Memory,
            Arc::new(NoResolver),
            RoomSettings::default(),
        );
        state
            .install_room_store(Arc::new(MemoryRoomStore::new()))
            .await;

        let (receiver, initial) = subscribe_room(&state).await.unwrap();
        for n in 0..ROOM_SSE_CAPACITY + 8 {
            state
                .room_sse()
                .broadcast(ServerEvent::json(Some("stale".to_string()), &n).unwrap());
        }

        let mut events = pin!(room_event_stream(state.clone(), receiver, initial));
        let opening = events.next().await.unwrap();
        assert_eq!(opening.event.as_deref(), Some(room_events::EVENT_SYNC));
        let resync = events.next().await.unwrap();
        assert_eq!(resync.event.as_deref(), Some(room_events::EVENT_SYNC));

        let next = tokio::time::timeout(Duration::from_millis(100), events.next()).await;
        assert!(next.is_err(), "stale backlog replayed after resync: {next:?}");
    }
}
