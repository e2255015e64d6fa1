use mongodb::bson::{Document, doc};
use serde::{Deserialize, Serialize};

use crate::dao::models::RoomStateEntity;

/// `_id` of the single room record.
pub const ROOM_DOC_ID: &str = "radio_state";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoRoomDocument {
    #[serde(rename = "_id")]
    pub id: String,
    /// Incremented on every write; compared by conditional replaces.
    #[serde(default)]
    pub revision: i64,
    #[serde(flatten)]
    pub room: RoomStateEntity,
}

impl MongoRoomDocument {
    pub fn new(room: RoomStateEntity, revision: i64) -> Self {
        Self {
            id: ROOM_DOC_ID.to_string(),
            revision,
            room,
        }
    }
}

pub fn room_filter() -> Document {
    doc! { "_id": ROOM_DOC_ID }
}

/// Matches the room only while it still carries `revision`. Records saved before
/// revisions existed have no field and count as revision 0.
pub fn room_revision_filter(revision: i64) -> Document {
    if revision == 0 {
        doc! {
            "_id": ROOM_DOC_ID,
            "$or": [{ "revision": 0_i64 }, { "revision": { "$exists": false } }],
        }
    } else {
        doc! { "_id": ROOM_DOC_ID, "revision": revision }
    }
}
