use serde::{Deserialize, Serialize};

use crate::dto::room::{ReportEndedResponse, SnapshotResponse};

#[derive(Debug, Deserialize)]
/// Messages accepted from observer WebSocket clients.
#[serde(tag = "type")]
pub enum ObserverInboundMessage {
    /// Ask for a fresh snapshot.
    #[serde(rename = "sync")]
    Sync,
    /// The client's player reached the end of `track_id`.
    #[serde(rename = "ended")]
    Ended { track_id: String },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Serialize)]
/// Messages pushed to observer WebSocket clients.
#[serde(tag = "type")]
pub enum ObserverOutboundMessage {
    /// Current room state; sent on connect and after every transition.
    #[serde(rename = "sync_event")]
    SyncEvent(SnapshotResponse),
    /// Answer to an `ended` report sent on this socket.
    #[serde(rename = "ended_ack")]
    EndedAck(ReportEndedResponse),
}
