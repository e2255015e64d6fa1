//! Failures of the CouchDB room store.

use std::fmt;

use reqwest::StatusCode;
use thiserror::Error;

/// Result alias for CouchDB room store calls.
pub type CouchResult<T> = Result<T, CouchDaoError>;

/// What the store was doing with the room document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomDocOp {
    /// GET of the room document.
    Read,
    /// Conditional PUT of the room document.
    Write,
}

impl fmt::Display for RoomDocOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RoomDocOp::Read => "read",
            RoomDocOp::Write => "write",
        })
    }
}

/// Failures that can occur while talking to CouchDB.
#[derive(Debug, Error)]
pub enum CouchDaoError {
    /// Required environment variable is missing.
    #[error("missing CouchDB environment variable `{var}`")]
    MissingEnvVar { var: &'static str },
    /// Building the HTTP client failed.
    #[error("failed to build CouchDB client")]
    ClientBuilder {
        #[source]
        source: reqwest::Error,
    },
    /// The room database could not be reached, or created when missing.
    #[error("CouchDB database `{database}` is unreachable")]
    DatabaseUnreachable {
        database: String,
        #[source]
        source: reqwest::Error,
    },
    /// The room database answered with an unexpected status.
    #[error("CouchDB answered {status} for database `{database}`")]
    DatabaseStatus { database: String, status: StatusCode },
    /// The request for the room document could not be sent.
    #[error("failed to {op} room document `{doc_id}`")]
    RoomRequest {
        op: RoomDocOp,
        doc_id: &'static str,
        #[source]
        source: reqwest::Error,
    },
    /// Anything but success, `404` on read or `409` on write.
    #[error("CouchDB answered {status} to a {op} of room document `{doc_id}`")]
    RoomStatus {
        op: RoomDocOp,
        doc_id: &'static str,
        status: StatusCode,
    },
    /// The reply body was not the expected JSON.
    #[error("CouchDB reply to a {op} of room document `{doc_id}` could not be decoded")]
    RoomDecode {
        op: RoomDocOp,
        doc_id: &'static str,
        #[source]
        source: reqwest::Error,
    },
}
