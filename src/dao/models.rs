use serde::{Deserialize, Serialize};

/// Track as persisted inside the room record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrackEntity {
    /// Identifier extracted from the source URL (11 characters).
    pub id: String,
    /// Display title fetched from the metadata service.
    pub title: String,
    /// Thumbnail URL, empty when the service did not provide one.
    #[serde(default)]
    pub thumbnail: String,
    /// Advisory duration in seconds.
    #[serde(default = "default_duration")]
    pub duration: u32,
}

/// The single persisted room record.
///
/// Every field is defaulted so a partial or legacy record still loads. Older
/// deployments stored the upcoming tracks under `playlist`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct RoomStateEntity {
    /// Track currently playing, if any.
    #[serde(default)]
    pub current_track: Option<TrackEntity>,
    /// Wall-clock start of the current track in seconds since the Unix epoch, `0` when idle.
    #[serde(default)]
    pub start_time: f64,
    /// Upcoming tracks in play order.
    #[serde(default, alias = "playlist")]
    pub queue: Vec<TrackEntity>,
}

fn default_duration() -> u32 {
    crate::state::room::DEFAULT_TRACK_DURATION_SECS
}
