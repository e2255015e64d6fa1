//! Room model and the pure transitions applied by the engine.
//!
//! Nothing in here touches storage or the clock: callers pass `now` in so the
//! transitions stay deterministic.

use std::collections::VecDeque;

use time::OffsetDateTime;

use crate::dao::models::{RoomStateEntity, TrackEntity};

/// Advisory duration given to every resolved track; the metadata service does not expose one.
pub const DEFAULT_TRACK_DURATION_SECS: u32 = 240;

/// Current server wall-clock time in fractional seconds since the Unix epoch.
pub fn unix_now() -> f64 {
    OffsetDateTime::now_utc().unix_timestamp_nanos() as f64 / 1_000_000_000.0
}

/// A playable track. Immutable once resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    /// Stable identifier derived from the source URL.
    pub id: String,
    /// Display title.
    pub title: String,
    /// Thumbnail URL, possibly empty.
    pub thumbnail: String,
    /// Advisory duration in seconds; never used for timing.
    pub duration: u32,
}

/// Whether something is playing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomPhase {
    /// Nothing playing, queue empty.
    Idle,
    /// A track is playing.
    Playing,
}

/// The authoritative state of the single room.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RoomState {
    current_track: Option<Track>,
    start_time: f64,
    queue: VecDeque<Track>,
}

/// What [`RoomState::enqueue`] did with the track.
#[derive(Debug, Clone, PartialEq)]
pub enum EnqueueOutcome {
    /// The room was idle; the track started playing immediately.
    Started,
    /// The track was appended; `position` is its zero-based place in the queue.
    Queued { position: usize },
}

/// Result of an advance request.
#[derive(Debug, Clone, PartialEq)]
pub enum AdvanceOutcome {
    /// The reported track was retired.
    Advanced {
        /// Track that just ended.
        ended: Track,
        /// Track promoted from the queue, `None` when the room went idle.
        next: Option<Track>,
    },
    /// The request had no effect.
    Ignored(IgnoreReason),
}

impl AdvanceOutcome {
    /// Whether the room actually moved on.
    pub fn transitioned(&self) -> bool {
        matches!(self, AdvanceOutcome::Advanced { .. })
    }
}

/// Why an advance request was a no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// The reported id is not the track currently playing (or nothing is playing).
    TrackMismatch,
    /// An advance was already accepted moments ago.
    Debounced,
}

impl IgnoreReason {
    /// Wire name sent back in `reason`.
    pub fn as_str(&self) -> &'static str {
        match self {
            IgnoreReason::TrackMismatch => "track_mismatch",
            IgnoreReason::Debounced => "debounced",
        }
    }
}

impl RoomState {
    /// Build a state from raw parts, clearing `start_time` when nothing is playing.
    pub fn from_parts(
        current_track: Option<Track>,
        start_time: f64,
        queue: impl IntoIterator<Item = Track>,
    ) -> Self {
        let start_time = if current_track.is_some() {
            start_time
        } else {
            0.0
        };
        Self {
            current_track,
            start_time,
            queue: queue.into_iter().collect(),
        }
    }

    /// `Playing` exactly when a current track is set.
    pub fn phase(&self) -> RoomPhase {
        if self.current_track.is_some() {
            RoomPhase::Playing
        } else {
            RoomPhase::Idle
        }
    }

    /// Track playing right now.
    pub fn current_track(&self) -> Option<&Track> {
        self.current_track.as_ref()
    }

    /// When the current track started, `0.0` when idle.
    pub fn start_time(&self) -> f64 {
        self.start_time
    }

    /// Upcoming tracks, head first.
    pub fn queue(&self) -> &VecDeque<Track> {
        &self.queue
    }

    /// Whether `track_id` names the track currently playing.
    pub fn is_current(&self, track_id: &str) -> bool {
        self.current_track
            .as_ref()
            .is_some_and(|track| track.id == track_id)
    }

    /// Start `track` right away when idle, otherwise append it to the queue.
    pub fn enqueue(&mut self, track: Track, now: f64) -> EnqueueOutcome {
        match self.phase() {
            RoomPhase::Idle => {
                self.current_track = Some(track);
                self.start_time = now;
                EnqueueOutcome::Started
            }
            RoomPhase::Playing => {
                self.queue.push_back(track);
                EnqueueOutcome::Queued {
                    position: self.queue.len() - 1,
                }
            }
        }
    }

    /// Retire the current track if it is `ended_track_id`, promoting the queue head.
    pub fn advance(&mut self, ended_track_id: &str, now: f64) -> AdvanceOutcome {
        if !self.is_current(ended_track_id) {
            return AdvanceOutcome::Ignored(IgnoreReason::TrackMismatch);
        }

        let next = self.queue.pop_front();
        let ended = match &next {
            Some(track) => {
                self.start_time = now;
                self.current_track.replace(track.clone())
            }
            None => {
                self.start_time = 0.0;
                self.current_track.take()
            }
        };

        match ended {
            Some(ended) => AdvanceOutcome::Advanced { ended, next },
            None => AdvanceOutcome::Ignored(IgnoreReason::TrackMismatch),
        }
    }
}

/// Room state as handed to observers, stamped with the server clock at emission.
#[derive(Debug, Clone, PartialEq)]
pub struct RoomSnapshot {
    /// Room at the time of capture.
    pub state: RoomState,
    /// Server clock when the snapshot was emitted, in seconds since the Unix epoch.
    pub server_time: f64,
}

impl RoomSnapshot {
    /// Stamp `state` with the current server time.
    pub fn capture(state: RoomState) -> Self {
        Self {
            state,
            server_time: unix_now(),
        }
    }
}

impl From<TrackEntity> for Track {
    fn from(value: TrackEntity) -> Self {
        Self {
            id: value.id,
            title: value.title,
            thumbnail: value.thumbnail,
            duration: value.duration,
        }
    }
}

impl From<Track> for TrackEntity {
    fn from(value: Track) -> Self {
        Self {
            id: value.id,
            title: value.title,
            thumbnail: value.thumbnail,
            duration: value.duration,
        }
    }
}

impl From<RoomStateEntity> for RoomState {
    fn from(value: RoomStateEntity) -> Self {
        Self::from_parts(
            value.current_track.map(Track::from),
            value.start_time,
            value.queue.into_iter().map(Track::from),
        )
    }
}

impl From<RoomState> for RoomStateEntity {
    fn from(value: RoomState) -> Self {
        Self {
            current_track: value.current_track.map(TrackEntity::from),
            start_time: value.start_time,
            queue: value.queue.into_iter().map(TrackEntity::from).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn track(id: &str) -> Track {
        Track {
            id: id.into(),
            title: format!("title {id}"),
            thumbnail: String::new(),
            duration: DEFAULT_TRACK_DURATION_SECS,
        }
    }

    fn queued_ids(state: &RoomState) -> Vec<&str> {
        state.queue().iter().map(|t| t.id.as_str()).collect()
    }

    #[test]
    fn initial_state_is_idle() {
        let state = RoomState::default();
        assert_eq!(state.phase(), RoomPhase::Idle);
        assert_eq!(state.start_time(), 0.0);
        assert!(state.queue().is_empty());
    }

    #[test]
    fn first_enqueue_autoplays_and_later_ones_only_append() {
        let mut state = RoomState::default();

        assert_eq!(state.enqueue(track("a"), 100.0), EnqueueOutcome::Started);
        assert_eq!(state.current_track(), Some(&track("a")));
        assert_eq!(state.start_time(), 100.0);
        assert!(state.queue().is_empty());

        assert_eq!(
            state.enqueue(track("b"), 105.0),
            EnqueueOutcome::Queued { position: 0 }
        );
        assert_eq!(
            state.enqueue(track("c"), 106.0),
            EnqueueOutcome::Queued { position: 1 }
        );
        assert_eq!(state.current_track(), Some(&track("a")));
        assert_eq!(state.start_time(), 100.0);
        assert_eq!(queued_ids(&state), vec!["b", "c"]);
    }

    #[test]
    fn full_round_trip_through_the_queue() {
        let mut state = RoomState::default();
        state.enqueue(track("t1"), 10.0);
        state.enqueue(track("t2"), 11.0);

        let outcome = state.advance("t1", 250.0);
        assert_eq!(
            outcome,
            AdvanceOutcome::Advanced {
                ended: track("t1"),
                next: Some(track("t2")),
            }
        );
        assert_eq!(state.current_track(), Some(&track("t2")));
        assert_eq!(state.start_time(), 250.0);
        assert!(state.queue().is_empty());

        let outcome = state.advance("t2", 490.0);
        assert_eq!(
            outcome,
            AdvanceOutcome::Advanced {
                ended: track("t2"),
                next: None,
            }
        );
        assert_eq!(state.phase(), RoomPhase::Idle);
        assert_eq!(state.start_time(), 0.0);
    }

    #[test]
    fn stale_report_is_ignored() {
        let mut state = RoomState::default();
        state.enqueue(track("a"), 1.0);
        state.enqueue(track("b"), 2.0);

        assert!(state.advance("a", 3.0).transitioned());
        // A second observer reporting the same ended track must not skip `b`.
        assert_eq!(
            state.advance("a", 3.1),
            AdvanceOutcome::Ignored(IgnoreReason::TrackMismatch)
        );
        assert_eq!(state.current_track(), Some(&track("b")));
        assert_eq!(state.start_time(), 3.0);
    }

    #[test]
    fn advance_while_idle_is_ignored() {
        let mut state = RoomState::default();
        assert_eq!(
            state.advance("anything", 1.0),
            AdvanceOutcome::Ignored(IgnoreReason::TrackMismatch)
        );
        assert_eq!(state, RoomState::default());
    }

    #[test]
    fn from_parts_clears_start_time_without_track() {
        let state = RoomState::from_parts(None, 42.0, Vec::new());
        assert_eq!(state.start_time(), 0.0);
    }

    #[test]
    fn entity_conversion_keeps_queue_order() {
        let mut state = RoomState::default();
        state.enqueue(track("a"), 1.0);
        state.enqueue(track("b"), 1.0);
        state.enqueue(track("c"), 1.0);

        let entity = RoomStateEntity::from(state.clone());
        let ids: Vec<_> = entity.queue.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c"]);
        assert_eq!(RoomState::from(entity), state);
    }
}
