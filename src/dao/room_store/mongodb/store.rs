use std::sync::Arc;

use futures::future::BoxFuture;
use mongodb::{
    Client, Collection, Database,
    bson::doc,
    error::{Error as MongoError, ErrorKind, WriteFailure},
};
use tokio::sync::RwLock;

use super::{
    config::MongoConfig,
    error::{MongoDaoError, MongoResult},
    models::{MongoRoomDocument, ROOM_DOC_ID, room_filter, room_revision_filter},
};
use crate::dao::{
    models::RoomStateEntity,
    room_store::{Revision, RoomStore, StoredRoom, WriteOutcome},
    storage::StorageResult,
};

const ROOM_COLLECTION_NAME: &str = "rooms";
const DUPLICATE_KEY_CODE: i32 = 11000;

/// Room store keeping the record in one MongoDB document with an integer revision.
#[derive(Clone)]
pub struct MongoRoomStore {
    inner: Arc<MongoInner>,
}

struct MongoInner {
    database: RwLock<Database>,
    config: MongoConfig,
}

/// Build a client for `config` and check the database answers.
///
/// A single attempt: the storage supervisor owns retries and backoff, and the
/// driver's server selection timeout bounds the ping.
async fn open_database(config: &MongoConfig) -> MongoResult<Database> {
    let client = Client::with_options(config.options.clone())
        .map_err(|source| MongoDaoError::ClientConstruction { source })?;
    let database = client.database(&config.database_name);
    ping(&database).await?;
    Ok(database)
}

async fn ping(database: &Database) -> MongoResult<()> {
    database
        .run_command(doc! { "ping": 1 })
        .await
        .map_err(|source| MongoDaoError::Unreachable {
            database: database.name().to_string(),
            source,
        })?;
    Ok(())
}

impl MongoRoomStore {
    /// Connect to MongoDB; fails when the database does not answer a ping.
    pub async fn connect(config: MongoConfig) -> MongoResult<Self> {
        let database = open_database(&config).await?;
        Ok(Self {
            inner: Arc::new(MongoInner {
                database: RwLock::new(database),
                config,
            }),
        })
    }

    async fn database(&self) -> Database {
        self.inner.database.read().await.clone()
    }

    async fn collection(&self) -> Collection<MongoRoomDocument> {
        self.database()
            .await
            .collection::<MongoRoomDocument>(ROOM_COLLECTION_NAME)
    }

    async fn health(&self) -> MongoResult<()> {
        ping(&self.database().await).await
    }

    /// Swap in a freshly built client once it answers.
    async fn reconnect(&self) -> MongoResult<()> {
        let database = open_database(&self.inner.config).await?;
        *self.inner.database.write().await = database;
        Ok(())
    }

    async fn read_room(&self) -> MongoResult<StoredRoom> {
        let document = self
            .collection()
            .await
            .find_one(room_filter())
            .await
            .map_err(|source| MongoDaoError::LoadRoom {
                id: ROOM_DOC_ID,
                source,
            })?;

        Ok(match document {
            Some(doc) => StoredRoom {
                state: doc.room,
                revision: Some(Revision::new(doc.revision.to_string())),
            },
            None => StoredRoom::default(),
        })
    }

    async fn write_room(
        &self,
        expected: Option<Revision>,
        state: RoomStateEntity,
    ) -> MongoResult<WriteOutcome> {
        let collection = self.collection().await;

        let Some(expected) = expected else {
            // First write: the `_id` uniqueness arbitrates between instances.
            let document = MongoRoomDocument::new(state, 1);
            return match collection.insert_one(&document).await {
                Ok(_) => Ok(WriteOutcome::Written(Revision::new("1"))),
                Err(err) if is_duplicate_key(&err) => Ok(WriteOutcome::Conflict),
                Err(source) => Err(MongoDaoError::SaveRoom {
                    id: ROOM_DOC_ID,
                    revision: 1,
                    source,
                }),
            };
        };

        let current: i64 =
            expected
                .as_str()
                .parse()
                .map_err(|_| MongoDaoError::InvalidRevision {
                    id: ROOM_DOC_ID,
                    revision: expected.to_string(),
                })?;
        let next = current + 1;
        let document = MongoRoomDocument::new(state, next);
        let result = collection
            .replace_one(room_revision_filter(current), &document)
            .await
            .map_err(|source| MongoDaoError::SaveRoom {
                id: ROOM_DOC_ID,
                revision: next,
                source,
            })?;

        if result.matched_count == 0 {
            Ok(WriteOutcome::Conflict)
        } else {
            Ok(WriteOutcome::Written(Revision::new(next.to_string())))
        }
    }
}

fn is_duplicate_key(err: &MongoError) -> bool {
    matches!(
        *err.kind,
        ErrorKind::Write(WriteFailure::WriteError(ref write_error))
            if write_error.code == DUPLICATE_KEY_CODE
    )
}

impl RoomStore for MongoRoomStore {
    fn read(&self) -> BoxFuture<'static, StorageResult<StoredRoom>> {
        let store = self.clone();
        Box::pin(async move { store.read_room().await.map_err(Into::into) })
    }

    fn write(
        &self,
        expected: Option<Revision>,
        state: RoomStateEntity,
    ) -> BoxFuture<'static, StorageResult<WriteOutcome>> {
        let store = self.clone();
        Box::pin(async move { store.write_room(expected, state).await.map_err(Into::into) })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.health().await.map_err(Into::into) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.reconnect().await.map_err(Into::into) })
    }
}
