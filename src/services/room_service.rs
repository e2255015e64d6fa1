//! Room operations shared by the HTTP routes and the observer socket.

use tracing::{debug, info, warn};

use crate::{
    error::ServiceError,
    services::room_events,
    state::{
        SharedState,
        engine::Transition,
        room::{AdvanceOutcome, EnqueueOutcome, RoomSnapshot, Track},
    },
};

/// Message returned to clients for every resolver failure.
pub const INVALID_SOURCE_MESSAGE: &str = "Invalid YouTube URL";

/// Resolve `url` and start or queue the resulting track.
pub async fn add_track(state: &SharedState, url: &str) -> Result<Track, ServiceError> {
    let store = state.require_room_store().await?;

    let track = state.resolver().resolve(url).await.map_err(|err| {
        warn!(%url, error = %err, "track resolution failed");
        ServiceError::InvalidSource(INVALID_SOURCE_MESSAGE.to_string())
    })?;

    let transition = state
        .engine()
        .enqueue(store.as_ref(), track.clone(), |snapshot| {
            room_events::broadcast_snapshot(state, snapshot)
        })
        .await?;

    match transition.outcome {
        EnqueueOutcome::Started => {
            info!(track_id = %track.id, title = %track.title, "track started")
        }
        EnqueueOutcome::Queued { position } => {
            info!(track_id = %track.id, title = %track.title, position, "track queued")
        }
    }

    Ok(track)
}

/// Handle a client report that `ended_track_id` finished playing.
///
/// Any id other than the current track's, however malformed, is a no-op.
pub async fn report_ended(
    state: &SharedState,
    ended_track_id: &str,
) -> Result<Transition<AdvanceOutcome>, ServiceError> {
    let store = state.require_room_store().await?;
    let transition = state
        .engine()
        .advance(store.as_ref(), ended_track_id, |snapshot| {
            room_events::broadcast_snapshot(state, snapshot)
        })
        .await?;

    match &transition.outcome {
        AdvanceOutcome::Advanced { ended, next } => info!(
            ended = %ended.id,
            next = next.as_ref().map(|track| track.id.as_str()).unwrap_or("none"),
            "room advanced"
        ),
        AdvanceOutcome::Ignored(reason) => debug!(
            track_id = %ended_track_id,
            reason = reason.as_str(),
            "ended report ignored"
        ),
    }

    Ok(transition)
}

/// Current room with a fresh server time.
pub async fn snapshot(state: &SharedState) -> Result<RoomSnapshot, ServiceError> {
    let store = state.require_room_store().await?;
    state.engine().snapshot(store.as_ref()).await
}

/// Current room handed to `deliver` before any later transition is broadcast.
pub async fn snapshot_in_order<F, R>(state: &SharedState, deliver: F) -> Result<R, ServiceError>
where
    F: FnOnce(&RoomSnapshot) -> R,
{
    let store = state.require_room_store().await?;
    state.engine().snapshot_in_order(store.as_ref(), deliver).await
}
