//! Process-local room store. State is lost on restart.

use std::sync::Arc;

use futures::future::BoxFuture;
use tokio::sync::RwLock;

use crate::dao::{
    models::RoomStateEntity,
    room_store::{Revision, RoomStore, StoredRoom, WriteOutcome},
    storage::StorageResult,
};

#[derive(Clone, Default)]
pub struct MemoryRoomStore {
    slot: Arc<RwLock<Option<MemoryRecord>>>,
}

struct MemoryRecord {
    version: u64,
    state: RoomStateEntity,
}

impl MemoryRoomStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn read(&self) -> StoredRoom {
        let guard = self.slot.read().await;
        match guard.as_ref() {
            Some(record) => StoredRoom {
                state: record.state.clone(),
                revision: Some(Revision::new(record.version.to_string())),
            },
            None => StoredRoom::default(),
        }
    }

    async fn write(&self, expected: Option<Revision>, state: RoomStateEntity) -> WriteOutcome {
        let mut guard = self.slot.write().await;
        let current = guard
            .as_ref()
            .map(|record| Revision::new(record.version.to_string()));
        if current != expected {
            return WriteOutcome::Conflict;
        }

        let version = guard.as_ref().map_or(1, |record| record.version + 1);
        *guard = Some(MemoryRecord { version, state });
        WriteOutcome::Written(Revision::new(version.to_string()))
    }
}

impl RoomStore for MemoryRoomStore {
    fn read(&self) -> BoxFuture<'static, StorageResult<StoredRoom>> {
        let store = self.clone();
        Box::pin(async move { Ok(store.read().await) })
    }

    fn write(
        &self,
        expected: Option<Revision>,
        state: RoomStateEntity,
    ) -> BoxFuture<'static, StorageResult<WriteOutcome>> {
        let store = self.clone();
        Box::pin(async move { Ok(store.write(expected, state).await) })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }
}
