//! Payloads exchanged with listening room clients.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::{
    dto::validation::validate_not_blank,
    state::room::{AdvanceOutcome, RoomSnapshot, Track},
};

/// Track as shown to clients.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct TrackDto {
    /// 11-character video identifier.
    pub id: String,
    /// Display title, `Unknown Track` when the metadata had none.
    pub title: String,
    /// Thumbnail URL, empty when unknown.
    pub thumbnail: String,
    /// Advisory duration in seconds.
    pub duration: u32,
}

impl From<&Track> for TrackDto {
    fn from(track: &Track) -> Self {
        Self {
            id: track.id.clone(),
            title: track.title.clone(),
            thumbnail: track.thumbnail.clone(),
            duration: track.duration,
        }
    }
}

/// Room state plus the server clock, used by clients to compute their playback offset
/// (`server_time - start_time`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct SnapshotResponse {
    /// Track currently playing, `null` when the room is idle.
    pub current_track: Option<TrackDto>,
    /// Server time (seconds since the Unix epoch) at which the current track started, `0` when idle.
    pub start_time: f64,
    /// Server time (seconds since the Unix epoch) when this snapshot was emitted.
    pub server_time: f64,
    /// Upcoming tracks in play order.
    pub queue: Vec<TrackDto>,
}

impl From<&RoomSnapshot> for SnapshotResponse {
    fn from(snapshot: &RoomSnapshot) -> Self {
        Self {
            current_track: snapshot.state.current_track().map(TrackDto::from),
            start_time: snapshot.state.start_time(),
            server_time: snapshot.server_time,
            queue: snapshot.state.queue().iter().map(TrackDto::from).collect(),
        }
    }
}

/// Request submitting a track by URL.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct AddTrackRequest {
    /// Watch URL, short link or other link carrying an 11-character video id.
    #[validate(length(max = 2048), custom(function = "validate_not_blank"))]
    pub url: String,
}

/// Response to a successful track submission.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AddTrackResponse {
    /// Always `success`.
    pub status: String,
    /// Track as resolved.
    pub track: TrackDto,
}

impl AddTrackResponse {
    /// Response for an accepted `track`.
    pub fn success(track: &Track) -> Self {
        Self {
            status: "success".to_string(),
            track: track.into(),
        }
    }
}

/// A client reporting that its player reached the end of a track.
#[derive(Debug, Deserialize, ToSchema)]
pub struct ReportEndedRequest {
    /// Id of the track the client just finished. Anything but the current track is a no-op.
    pub ended_track_id: String,
}

/// Whether a report advanced the room.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ReportEndedResponse {
    /// `skipped` when the room moved on, `no_skip_needed` otherwise.
    pub status: String,
    /// Whether the room moved on.
    pub transitioned: bool,
    /// Why nothing happened (`track_mismatch` or `debounced`), absent on transition.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Track playing after the report was handled.
    pub current_track: Option<TrackDto>,
}

impl ReportEndedResponse {
    /// Describe `outcome` against the room as it stands in `snapshot`.
    pub fn new(outcome: &AdvanceOutcome, snapshot: &RoomSnapshot) -> Self {
        let (status, reason) = match outcome {
            AdvanceOutcome::Advanced { .. } => ("skipped", None),
            AdvanceOutcome::Ignored(reason) => ("no_skip_needed", Some(reason.as_str().to_string())),
        };
        Self {
            status: status.to_string(),
            transitioned: outcome.transitioned(),
            reason,
            current_track: snapshot.state.current_track().map(TrackDto::from),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::room::{IgnoreReason, RoomState};

    fn track(id: &str) -> Track {
        Track {
            id: id.into(),
            title: "Song".into(),
            thumbnail: "https://i.ytimg.com/vi/x/hqdefault.jpg".into(),
            duration: 240,
        }
    }

    #[test]
    fn idle_snapshot_serializes_null_track_and_zero_start() {
        let snapshot = RoomSnapshot {
            state: RoomState::default(),
            server_time: 1_700_000_000.25,
        };
        let value = serde_json::to_value(SnapshotResponse::from(&snapshot)).unwrap();
        assert!(value["current_track"].is_null());
        assert_eq!(value["start_time"], 0.0);
        assert_eq!(value["server_time"], 1_700_000_000.25);
        assert_eq!(value["queue"], serde_json::json!([]));
    }

    #[test]
    fn ignored_report_carries_reason() {
        let mut state = RoomState::default();
        state.enqueue(track("aaaaaaaaaaa"), 5.0);
        let snapshot = RoomSnapshot {
            state,
            server_time: 6.0,
        };

        let response = ReportEndedResponse::new(
            &AdvanceOutcome::Ignored(IgnoreReason::Debounced),
            &snapshot,
        );
        assert_eq!(response.status, "no_skip_needed");
        assert!(!response.transitioned);
        assert_eq!(response.reason.as_deref(), Some("debounced"));
        assert_eq!(response.current_track.unwrap().id, "aaaaaaaaaaa");
    }

    #[test]
    fn blank_url_fails_validation() {
        let request = AddTrackRequest { url: "   ".into() };
        assert!(request.validate().is_err());

        let request = AddTrackRequest {
            url: "https://youtu.be/aaaaaaaaaaa".into(),
        };
        assert!(request.validate().is_ok());
    }
}
