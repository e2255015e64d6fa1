use serde::{Deserialize, Serialize};

use crate::dao::models::RoomStateEntity;

/// Document id of the single room record.
pub const ROOM_DOC_ID: &str = "room::state";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouchRoomDocument {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_rev", skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,
    #[serde(flatten)]
    pub room: RoomStateEntity,
}

impl CouchRoomDocument {
    pub fn new(room: RoomStateEntity, rev: Option<String>) -> Self {
        Self {
            id: ROOM_DOC_ID.to_string(),
            rev,
            room,
        }
    }
}

/// Body returned by CouchDB after a successful document PUT.
#[derive(Debug, Deserialize)]
pub struct PutResponse {
    pub rev: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_document_omits_revision() {
        let doc = CouchRoomDocument::new(RoomStateEntity::default(), None);
        let value = serde_json::to_value(&doc).unwrap();
        assert_eq!(value["_id"], ROOM_DOC_ID);
        assert!(value.get("_rev").is_none());
        assert_eq!(value["start_time"], 0.0);
    }

    #[test]
    fn stored_document_carries_revision_and_state() {
        let raw = r#"{"_id": "room::state", "_rev": "3-abc", "current_track": null, "start_time": 0, "queue": []}"#;
        let doc: CouchRoomDocument = serde_json::from_str(raw).unwrap();
        assert_eq!(doc.rev.as_deref(), Some("3-abc"));
        assert_eq!(doc.room, RoomStateEntity::default());
    }
}
