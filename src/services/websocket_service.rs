use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    dto::{
        room::{ReportEndedResponse, SnapshotResponse},
        ws::{ObserverInboundMessage, ObserverOutboundMessage},
    },
    services::room_service,
    state::{ObserverConnection, SharedState, room::RoomSnapshot},
};

/// Why handling an observer message stopped short.
#[derive(Debug, Error)]
enum ObserverError {
    /// Writer channel closed; the connection should be terminated.
    #[error("connection closed")]
    ConnectionClosed,
    /// Room operation failed; reported in the logs only.
    #[error("room operation failed: {0}")]
    Service(#[from] crate::error::ServiceError),
}

/// Handle the full lifecycle of an observer WebSocket connection.
///
/// Registration and the first snapshot happen under the engine gate, so the
/// observer neither misses a transition nor sees one before its initial state.
pub async fn handle_socket(state: SharedState, socket: WebSocket) {
    let (mut sender, mut receiver) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Message>();

    // Dedicated writer task keeps outbound messages flowing even while we await inbound frames.
    let writer_task = tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            if sender.send(message).await.is_err() {
                break;
            }
        }
    });

    let observer_id = Uuid::new_v4();
    let connection = ObserverConnection {
        id: observer_id,
        tx: outbound_tx.clone(),
    };

    let greeted = room_service::snapshot_in_order(&state, |snapshot| {
        state.observers().insert(observer_id, connection.clone());
        send_sync_event(&outbound_tx, snapshot)
    })
    .await;
    let greeted = match greeted {
        Ok(sent) => sent,
        Err(err) => {
            // No snapshot to order against; register so later pushes still arrive.
            state.observers().insert(observer_id, connection);
            Err(err.into())
        }
    };
    info!(id = %observer_id, observers = state.observers().len(), "observer connected");

    if let Err(err) = greeted {
        warn!(id = %observer_id, error = %err, "could not send initial snapshot");
        if matches!(err, ObserverError::ConnectionClosed) {
            disconnect(&state, observer_id, writer_task, outbound_tx).await;
            return;
        }
    }

    while let Some(message) = receiver.next().await {
        match message {
            Ok(Message::Text(text)) => {
                debug!(id = %observer_id, payload = %text, "received observer message");

                let result = match serde_json::from_str::<ObserverInboundMessage>(&text) {
                    Ok(ObserverInboundMessage::Sync) => send_snapshot(&state, &outbound_tx).await,
                    Ok(ObserverInboundMessage::Ended { track_id }) => {
                        handle_ended(&state, &track_id, &outbound_tx).await
                    }
                    Ok(ObserverInboundMessage::Unknown) => {
                        debug!(id = %observer_id, "ignoring unknown observer message type");
                        Ok(())
                    }
                    Err(err) => {
                        warn!(id = %observer_id, error = %err, "failed to parse observer message");
                        Ok(())
                    }
                };

                if let Err(err) = result {
                    warn!(id = %observer_id, error = %err, "error while handling observer message");
                    if matches!(err, ObserverError::ConnectionClosed) {
                        break;
                    }
                }
            }
            Ok(Message::Ping(payload)) => {
                let _ = outbound_tx.send(Message::Pong(payload));
            }
            Ok(Message::Close(frame)) => {
                let _ = outbound_tx.send(Message::Close(frame));
                break;
            }
            Ok(Message::Binary(_)) => {}
            Ok(Message::Pong(_)) => {}
            Err(err) => {
                warn!(id = %observer_id, error = %err, "websocket error");
                break;
            }
        }
    }

    disconnect(&state, observer_id, writer_task, outbound_tx).await;
}

async fn send_snapshot(
    state: &SharedState,
    tx: &mpsc::UnboundedSender<Message>,
) -> Result<(), ObserverError> {
    room_service::snapshot_in_order(state, |snapshot| send_sync_event(tx, snapshot)).await?
}

fn send_sync_event(
    tx: &mpsc::UnboundedSender<Message>,
    snapshot: &RoomSnapshot,
) -> Result<(), ObserverError> {
    send_message_to_websocket(
        tx,
        &ObserverOutboundMessage::SyncEvent(SnapshotResponse::from(snapshot)),
    )
}

async fn handle_ended(
    state: &SharedState,
    track_id: &str,
    tx: &mpsc::UnboundedSender<Message>,
) -> Result<(), ObserverError> {
    let transition = room_service::report_ended(state, track_id).await?;
    send_message_to_websocket(
        tx,
        &ObserverOutboundMessage::EndedAck(ReportEndedResponse::new(
            &transition.outcome,
            &transition.snapshot,
        )),
    )
}

/// Serialize `value` and queue it on the writer channel.
fn send_message_to_websocket<T>(
    tx: &mpsc::UnboundedSender<Message>,
    value: &T,
) -> Result<(), ObserverError>
where
    T: ?Sized + serde::Serialize + std::fmt::Debug,
{
    let payload = match serde_json::to_string(value) {
        Ok(p) => p,
        Err(err) => {
            warn!(error = %err, "failed to serialize message `{value:?}`");
            return Ok(());
        }
    };

    tx.send(Message::Text(payload.into()))
        .map_err(|_| ObserverError::ConnectionClosed)
}

async fn disconnect(
    state: &SharedState,
    observer_id: Uuid,
    writer_task: JoinHandle<()>,
    outbound_tx: mpsc::UnboundedSender<Message>,
) {
    state.observers().remove(&observer_id);
    info!(id = %observer_id, observers = state.observers().len(), "observer disconnected");

    // The registry held the other sender clone; dropping ours lets the writer drain and exit.
    drop(outbound_tx);
    let _ = writer_task.await;
}
