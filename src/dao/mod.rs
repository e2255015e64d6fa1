/// Persisted record shapes shared by every backend.
pub mod models;
/// Room store trait and its memory, CouchDB and MongoDB implementations.
pub mod room_store;
/// Backend-agnostic storage errors.
pub mod storage;
