use axum::extract::ws::Message;
use serde::Serialize;
use tracing::{debug, warn};

use crate::{
    dto::{room::SnapshotResponse, sse::ServerEvent, ws::ObserverOutboundMessage},
    state::{AppState, room::RoomSnapshot},
};

/// Event name carried by every snapshot push, on SSE and WebSocket alike.
pub const EVENT_SYNC: &str = "sync_event";

/// Push `snapshot` to every SSE subscriber and every observer socket.
///
/// Delivery is best-effort; sockets whose writer is gone are dropped from the registry.
pub fn broadcast_snapshot(state: &AppState, snapshot: &RoomSnapshot) {
    let payload = SnapshotResponse::from(snapshot);
    send_room_event(state, EVENT_SYNC, &payload);
    notify_observers(state, &ObserverOutboundMessage::SyncEvent(payload));
}

/// Build the SSE event carrying `snapshot`.
pub fn sync_event(snapshot: &RoomSnapshot) -> serde_json::Result<ServerEvent> {
    ServerEvent::json(
        Some(EVENT_SYNC.to_string()),
        &SnapshotResponse::from(snapshot),
    )
}

fn send_room_event(state: &AppState, event: &str, payload: &impl Serialize) {
    match ServerEvent::json(Some(event.to_string()), payload) {
        Ok(event) => state.room_sse().broadcast(event),
        Err(err) => warn!(event, error = %err, "failed to serialize room SSE payload"),
    }
}

fn notify_observers(state: &AppState, message: &ObserverOutboundMessage) {
    let text = match serde_json::to_string(message) {
        Ok(text) => text,
        Err(err) => {
            warn!(error = %err, "failed to serialize observer payload");
            return;
        }
    };

    let closed: Vec<_> = state
        .observers()
        .iter()
        .filter(|entry| entry.tx.send(Message::Text(text.clone().into())).is_err())
        .map(|entry| *entry.key())
        .collect();

    for id in closed {
        debug!(%id, "dropping observer with closed writer");
        state.observers().remove(&id);
    }
}
