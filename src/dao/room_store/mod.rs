#[cfg(feature = "couch-store")]
pub mod couchdb;
pub mod memory;
#[cfg(feature = "mongo-store")]
pub mod mongodb;

use std::fmt;

use crate::dao::models::RoomStateEntity;
use crate::dao::storage::StorageResult;
use futures::future::BoxFuture;

/// Opaque version tag of the persisted room record, compared on every write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Revision(String);

impl Revision {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Room record as read from a backend.
#[derive(Debug, Clone, Default)]
pub struct StoredRoom {
    /// Persisted state, or the idle room when nothing was ever written.
    pub state: RoomStateEntity,
    /// Revision of the record; `None` when no record exists yet.
    pub revision: Option<Revision>,
}

/// Result of a conditional write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The record was replaced; carries the new revision.
    Written(Revision),
    /// Someone else wrote since the expected revision was read.
    Conflict,
}

/// Abstraction over the persistence layer holding the single room record.
///
/// `write` only succeeds when the stored revision still equals `expected`
/// (`None` meaning "no record yet"), which lets several server instances share
/// one backend without losing each other's transitions.
pub trait RoomStore: Send + Sync {
    fn read(&self) -> BoxFuture<'static, StorageResult<StoredRoom>>;
    fn write(
        &self,
        expected: Option<Revision>,
        state: RoomStateEntity,
    ) -> BoxFuture<'static, StorageResult<WriteOutcome>>;
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>>;
}
