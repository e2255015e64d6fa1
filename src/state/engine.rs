//! Room transition engine: serializes enqueue/advance against the room store.
//!
//! Within one process the transition gate makes every read-modify-write
//! exclusive. Across processes sharing a durable store the conditional write
//! does the same job: a write that lost the race is retried against the fresh
//! record, so guards are always evaluated on the latest state.

use std::time::{Duration, Instant};

use futures::future::BoxFuture;
use tokio::{
    sync::{Mutex, RwLock},
    time::timeout,
};
use tracing::{debug, warn};

use crate::{
    dao::{
        room_store::{Revision, RoomStore, StoredRoom, WriteOutcome},
        storage::{StorageError, StorageResult},
    },
    error::ServiceError,
    state::room::{
        AdvanceOutcome, EnqueueOutcome, IgnoreReason, RoomSnapshot, RoomState, Track, unix_now,
    },
};

/// Window after an accepted advance in which further advances are ignored.
pub const DEFAULT_ADVANCE_DEBOUNCE: Duration = Duration::from_secs(1);
/// How long a store read may be served again from memory.
pub const DEFAULT_SNAPSHOT_CACHE_TTL: Duration = Duration::from_secs(1);
/// Bound on a single store call.
pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(5);
/// Conditional write attempts per transition.
pub const DEFAULT_MAX_WRITE_ATTEMPTS: u32 = 5;

/// Tuning knobs of the engine. A zero debounce or cache TTL disables that feature.
#[derive(Debug, Clone, PartialEq)]
pub struct RoomSettings {
    /// Advances arriving within this window of the last accepted one are ignored.
    pub advance_debounce: Duration,
    /// How long a snapshot read from the store may be reused.
    pub snapshot_cache_ttl: Duration,
    /// Upper bound for any single store call.
    pub store_timeout: Duration,
    /// Conditional write attempts before giving up on a contended transition.
    pub max_write_attempts: u32,
}

impl Default for RoomSettings {
    fn default() -> Self {
        Self {
            advance_debounce: DEFAULT_ADVANCE_DEBOUNCE,
            snapshot_cache_ttl: DEFAULT_SNAPSHOT_CACHE_TTL,
            store_timeout: DEFAULT_STORE_TIMEOUT,
            max_write_attempts: DEFAULT_MAX_WRITE_ATTEMPTS,
        }
    }
}

/// Outcome of a transition together with the room as it stands afterwards.
#[derive(Debug, Clone)]
pub struct Transition<T> {
    /// What the transition did.
    pub outcome: T,
    /// Room after the transition, or as found when nothing changed.
    pub snapshot: RoomSnapshot,
}

/// Bookkeeping only touched while the gate is held.
#[derive(Default)]
struct TransitionLedger {
    last_advance: Option<Instant>,
}

impl TransitionLedger {
    fn debounces(&self, window: Duration) -> bool {
        !window.is_zero() && self.last_advance.is_some_and(|at| at.elapsed() < window)
    }
}

#[derive(Default)]
struct SnapshotCache {
    entry: Option<CachedRoom>,
    // Bumped by every local commit so a slower concurrent read cannot
    // overwrite a newer entry.
    commits: u64,
}

struct CachedRoom {
    state: RoomState,
    cached_at: Instant,
}

enum Step<T> {
    Write(T),
    Unchanged(T),
}

/// Serializes room transitions and the snapshots handed to observers.
pub struct RoomEngine {
    gate: Mutex<TransitionLedger>,
    cache: RwLock<SnapshotCache>,
    settings: RoomSettings,
}

impl RoomEngine {
    /// Engine with an empty cache and no advance accepted yet.
    pub fn new(settings: RoomSettings) -> Self {
        Self {
            gate: Mutex::new(TransitionLedger::default()),
            cache: RwLock::new(SnapshotCache::default()),
            settings,
        }
    }

    /// Settings the engine was built with.
    pub fn settings(&self) -> &RoomSettings {
        &self.settings
    }

    /// Start `track` when the room is idle, queue it otherwise.
    ///
    /// `on_commit` runs with the new snapshot while the gate is still held, so
    /// successive notifications leave in transition order.
    pub async fn enqueue<F>(
        &self,
        store: &dyn RoomStore,
        track: Track,
        on_commit: F,
    ) -> Result<Transition<EnqueueOutcome>, ServiceError>
    where
        F: FnOnce(&RoomSnapshot),
    {
        let _gate = self.gate.lock().await;
        self.commit(
            store,
            |state, now| Step::Write(state.enqueue(track.clone(), now)),
            on_commit,
        )
        .await
    }

    /// Retire `ended_track_id` if it is the current track and no advance was
    /// accepted within the debounce window.
    pub async fn advance<F>(
        &self,
        store: &dyn RoomStore,
        ended_track_id: &str,
        on_commit: F,
    ) -> Result<Transition<AdvanceOutcome>, ServiceError>
    where
        F: FnOnce(&RoomSnapshot),
    {
        let mut ledger = self.gate.lock().await;
        let debounced = ledger.debounces(self.settings.advance_debounce);

        let transition = self
            .commit(
                store,
                |state, now| {
                    if !state.is_current(ended_track_id) {
                        Step::Unchanged(AdvanceOutcome::Ignored(IgnoreReason::TrackMismatch))
                    } else if debounced {
                        Step::Unchanged(AdvanceOutcome::Ignored(IgnoreReason::Debounced))
                    } else {
                        Step::Write(state.advance(ended_track_id, now))
                    }
                },
                on_commit,
            )
            .await?;

        if transition.outcome.transitioned() {
            ledger.last_advance = Some(Instant::now());
        }
        Ok(transition)
    }

    /// Current room stamped with a fresh `server_time`, possibly from the cache.
    pub async fn snapshot(&self, store: &dyn RoomStore) -> Result<RoomSnapshot, ServiceError> {
        let ttl = self.settings.snapshot_cache_ttl;
        let seen = {
            let cache = self.cache.read().await;
            if let Some(entry) = cache.entry.as_ref().filter(|e| e.cached_at.elapsed() < ttl) {
                return Ok(RoomSnapshot::capture(entry.state.clone()));
            }
            cache.commits
        };

        let stored = self.bounded("read", store.read()).await?;
        let state = RoomState::from(stored.state);

        if !ttl.is_zero() {
            let mut cache = self.cache.write().await;
            if cache.commits == seen {
                cache.entry = Some(CachedRoom {
                    state: state.clone(),
                    cached_at: Instant::now(),
                });
            }
        }

        Ok(RoomSnapshot::capture(state))
    }

    /// Read the room and hand it to `deliver` while the gate is held.
    ///
    /// Commits broadcast under the same gate, so whatever `deliver` queues for an
    /// observer lands before any later transition reaches that observer.
    pub async fn snapshot_in_order<F, R>(
        &self,
        store: &dyn RoomStore,
        deliver: F,
    ) -> Result<R, ServiceError>
    where
        F: FnOnce(&RoomSnapshot) -> R,
    {
        let _gate = self.gate.lock().await;
        let snapshot = self.snapshot(store).await?;
        Ok(deliver(&snapshot))
    }

    /// Drop any cached room, e.g. after the backing store was swapped.
    pub async fn invalidate_cache(&self) {
        let mut cache = self.cache.write().await;
        cache.entry = None;
        cache.commits += 1;
    }

    /// Read, apply, conditionally write; retried when another writer got there first.
    /// Callers must hold the gate.
    async fn commit<T, A, F>(
        &self,
        store: &dyn RoomStore,
        mut apply: A,
        on_commit: F,
    ) -> Result<Transition<T>, ServiceError>
    where
        A: FnMut(&mut RoomState, f64) -> Step<T>,
        F: FnOnce(&RoomSnapshot),
    {
        for attempt in 1..=self.settings.max_write_attempts.max(1) {
            let stored = self.bounded("read", store.read()).await?;
            let mut state = RoomState::from(stored.state);

            let outcome = match apply(&mut state, unix_now()) {
                Step::Unchanged(outcome) => {
                    return Ok(Transition {
                        outcome,
                        snapshot: RoomSnapshot::capture(state),
                    });
                }
                Step::Write(outcome) => outcome,
            };

            let written = match self
                .bounded("write", store.write(stored.revision.clone(), state.clone().into()))
                .await
            {
                Err(ServiceError::Timeout) => {
                    self.settle_timed_out_write(store, stored.revision.as_ref(), &state)
                        .await?
                }
                other => other?,
            };

            match written {
                WriteOutcome::Written(revision) => {
                    debug!(%revision, attempt, "room state written");
                    self.remember_commit(&state).await;
                    let snapshot = RoomSnapshot::capture(state);
                    on_commit(&snapshot);
                    return Ok(Transition { outcome, snapshot });
                }
                WriteOutcome::Conflict => {
                    warn!(attempt, "room state changed underneath transition; retrying");
                }
            }
        }

        Err(ServiceError::Contended)
    }

    /// A timed out write may still have landed. Look again: when the record moved
    /// on to exactly our state it was ours, otherwise report the timeout.
    async fn settle_timed_out_write(
        &self,
        store: &dyn RoomStore,
        expected: Option<&Revision>,
        intended: &RoomState,
    ) -> Result<WriteOutcome, ServiceError> {
        self.invalidate_cache().await;

        let StoredRoom { state, revision } = self.bounded("read", store.read()).await?;
        let ours = revision.as_ref() != expected && RoomState::from(state) == *intended;
        match revision {
            Some(revision) if ours => {
                warn!(%revision, "room write acknowledged late; treating it as committed");
                Ok(WriteOutcome::Written(revision))
            }
            _ => Err(ServiceError::Timeout),
        }
    }

    async fn remember_commit(&self, state: &RoomState) {
        let mut cache = self.cache.write().await;
        cache.commits += 1;
        cache.entry = if self.settings.snapshot_cache_ttl.is_zero() {
            None
        } else {
            Some(CachedRoom {
                state: state.clone(),
                cached_at: Instant::now(),
            })
        };
    }

    async fn bounded<T>(
        &self,
        operation: &'static str,
        call: BoxFuture<'static, StorageResult<T>>,
    ) -> Result<T, ServiceError> {
        let after = self.settings.store_timeout;
        match timeout(after, call).await {
            Ok(result) => result.map_err(ServiceError::from),
            Err(_) => Err(StorageError::Timeout { operation, after }.into()),
        }
    }
}
