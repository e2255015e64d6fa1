use futures::future::BoxFuture;
use reqwest::{Client, Method, RequestBuilder, StatusCode};

use crate::dao::{
    models::RoomStateEntity,
    room_store::{Revision, RoomStore, StoredRoom, WriteOutcome},
    storage::StorageResult,
};

use super::{
    config::CouchConfig,
    error::{CouchDaoError, CouchResult, RoomDocOp},
    models::{CouchRoomDocument, PutResponse, ROOM_DOC_ID},
};

/// Room store keeping the record in a single CouchDB document.
///
/// CouchDB's `_rev` is used as the [`Revision`]; a PUT with a stale `_rev`
/// answers `409 Conflict`, which maps onto [`WriteOutcome::Conflict`].
#[derive(Clone)]
pub struct CouchRoomStore {
    client: Client,
    config: CouchConfig,
}

impl CouchRoomStore {
    /// Build the HTTP client and make sure the room database exists.
    pub async fn connect(config: CouchConfig) -> CouchResult<Self> {
        let client = Client::builder()
            .build()
            .map_err(|source| CouchDaoError::ClientBuilder { source })?;

        let store = Self { client, config };
        store.ensure_database().await?;
        Ok(store)
    }

    fn request(&self, method: Method, url: String) -> RequestBuilder {
        let builder = self.client.request(method, url);
        match &self.config.credentials {
            Some(credentials) => {
                builder.basic_auth(&credentials.username, Some(&credentials.password))
            }
            None => builder,
        }
    }

    async fn database_status(&self, method: Method) -> CouchResult<StatusCode> {
        self.request(method, self.config.database_url())
            .send()
            .await
            .map(|response| response.status())
            .map_err(|source| CouchDaoError::DatabaseUnreachable {
                database: self.config.database.clone(),
                source,
            })
    }

    async fn ensure_database(&self) -> CouchResult<()> {
        let status = match self.database_status(Method::GET).await? {
            StatusCode::NOT_FOUND => self.database_status(Method::PUT).await?,
            status => status,
        };

        // 412 on create means another instance got there first.
        if status.is_success() || status == StatusCode::PRECONDITION_FAILED {
            Ok(())
        } else {
            Err(CouchDaoError::DatabaseStatus {
                database: self.config.database.clone(),
                status,
            })
        }
    }

    async fn read_room(&self) -> CouchResult<StoredRoom> {
        let op = RoomDocOp::Read;
        let response = self
            .request(Method::GET, self.config.document_url(ROOM_DOC_ID))
            .send()
            .await
            .map_err(|source| room_request(op, source))?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(StoredRoom::default()),
            status if status.is_success() => {
                let doc = response
                    .json::<CouchRoomDocument>()
                    .await
                    .map_err(|source| room_decode(op, source))?;
                Ok(StoredRoom {
                    state: doc.room,
                    revision: doc.rev.map(Revision::new),
                })
            }
            status => Err(room_status(op, status)),
        }
    }

    async fn write_room(
        &self,
        expected: Option<Revision>,
        state: RoomStateEntity,
    ) -> CouchResult<WriteOutcome> {
        let op = RoomDocOp::Write;
        let document =
            CouchRoomDocument::new(state, expected.map(|rev| rev.as_str().to_string()));
        let response = self
            .request(Method::PUT, self.config.document_url(ROOM_DOC_ID))
            .json(&document)
            .send()
            .await
            .map_err(|source| room_request(op, source))?;

        match response.status() {
            StatusCode::CONFLICT => Ok(WriteOutcome::Conflict),
            status if status.is_success() => {
                let body = response
                    .json::<PutResponse>()
                    .await
                    .map_err(|source| room_decode(op, source))?;
                Ok(WriteOutcome::Written(Revision::new(body.rev)))
            }
            status => Err(room_status(op, status)),
        }
    }

    async fn ping(&self) -> CouchResult<()> {
        match self.database_status(Method::GET).await? {
            status if status.is_success() => Ok(()),
            status => Err(CouchDaoError::DatabaseStatus {
                database: self.config.database.clone(),
                status,
            }),
        }
    }
}

fn room_request(op: RoomDocOp, source: reqwest::Error) -> CouchDaoError {
    CouchDaoError::RoomRequest {
        op,
        doc_id: ROOM_DOC_ID,
        source,
    }
}

fn room_status(op: RoomDocOp, status: StatusCode) -> CouchDaoError {
    CouchDaoError::RoomStatus {
        op,
        doc_id: ROOM_DOC_ID,
        status,
    }
}

fn room_decode(op: RoomDocOp, source: reqwest::Error) -> CouchDaoError {
    CouchDaoError::RoomDecode {
        op,
        doc_id: ROOM_DOC_ID,
        source,
    }
}

impl RoomStore for CouchRoomStore {
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
        Box::pin(async move { store.ping().await.map_err(Into::into) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.ensure_database().await.map_err(Into::into) })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        Json, Router,
        extract::{Path, State},
        http::StatusCode as HttpStatus,
        response::IntoResponse,
        routing::get,
    };
    use serde_json::{Value, json};
    use tokio::{net::TcpListener, sync::Mutex};

    use super::*;
    use crate::dao::{models::TrackEntity, room_store::couchdb::CouchConfig};

    /// Single-document CouchDB stand-in enforcing `_rev` on PUT.
    #[derive(Clone, Default)]
    struct FakeCouch {
        doc: Arc<Mutex<Option<(u32, Value)>>>,
    }

    async fn get_doc(State(couch): State<FakeCouch>, Path(_id): Path<String>) -> impl IntoResponse {
        match couch.doc.lock().await.as_ref() {
            Some((_, doc)) => Json(doc.clone()).into_response(),
            None => HttpStatus::NOT_FOUND.into_response(),
        }
    }

    async fn put_doc(
        State(couch): State<FakeCouch>,
        Path(_id): Path<String>,
        Json(mut body): Json<Value>,
    ) -> impl IntoResponse {
        let mut guard = couch.doc.lock().await;
        let current = guard.as_ref().map(|(rev, _)| format!("{rev}-x"));
        let sent = body.get("_rev").and_then(Value::as_str).map(str::to_owned);
        if current != sent {
            return (HttpStatus::CONFLICT, Json(json!({"error": "conflict"}))).into_response();
        }

        let next = guard.as_ref().map_or(1, |(rev, _)| rev + 1);
        let rev = format!("{next}-x");
        body["_rev"] = json!(rev);
        *guard = Some((next, body));
        (HttpStatus::CREATED, Json(json!({"ok": true, "rev": rev}))).into_response()
    }

    async fn connected_store() -> CouchRoomStore {
        let router = Router::new()
            .route("/room", get(|| async { Json(json!({"db_name": "room"})) }))
            .route("/room/{id}", get(get_doc).put(put_doc))
            .with_state(FakeCouch::default());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        CouchRoomStore::connect(CouchConfig::new(format!("http://{addr}/"), "room"))
            .await
            .unwrap()
    }

    fn playing(id: &str) -> RoomStateEntity {
        RoomStateEntity {
            current_track: Some(TrackEntity {
                id: id.into(),
                title: "Song".into(),
                thumbnail: String::new(),
                duration: 240,
            }),
            start_time: 1_700_000_000.5,
            queue: Vec::new(),
        }
    }

    #[tokio::test]
    async fn missing_document_reads_as_idle_room() {
        let store = connected_store().await;
        let stored = store.read().await.unwrap();
        assert_eq!(stored.state, RoomStateEntity::default());
        assert!(stored.revision.is_none());
    }

    #[tokio::test]
    async fn rev_mismatch_is_a_conflict() {
        let store = connected_store().await;

        let WriteOutcome::Written(revision) = store.write(None, playing("aaaaaaaaaaa")).await.unwrap()
        else {
            panic!("first write should succeed");
        };
        assert_eq!(revision.as_str(), "1-x");

        let stale = store.write(None, playing("bbbbbbbbbbb")).await.unwrap();
        assert_eq!(stale, WriteOutcome::Conflict);

        let stored = store.read().await.unwrap();
        assert_eq!(stored.revision, Some(revision.clone()));
        assert_eq!(stored.state, playing("aaaaaaaaaaa"));

        let fresh = store
            .write(Some(revision), playing("ccccccccccc"))
            .await
            .unwrap();
        assert_eq!(fresh, WriteOutcome::Written(Revision::new("2-x")));
    }

    #[tokio::test]
    async fn unexpected_status_names_the_room_document() {
        let router = Router::new()
            .route("/room", get(|| async { Json(json!({"db_name": "room"})) }))
            .route(
                "/room/{id}",
                get(|| async { HttpStatus::INTERNAL_SERVER_ERROR }),
            );
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        let store = CouchRoomStore::connect(CouchConfig::new(format!("http://{addr}"), "room"))
            .await
            .unwrap();
        let err = store.read_room().await.unwrap_err();
        assert!(matches!(
            err,
            CouchDaoError::RoomStatus { op: RoomDocOp::Read, doc_id: ROOM_DOC_ID, status }
                if status == StatusCode::INTERNAL_SERVER_ERROR
        ));
        assert!(err.to_string().contains(ROOM_DOC_ID));
    }
}
