use mongodb::error::Error as MongoError;
use thiserror::Error;

/// Result alias for MongoDB room store calls.
pub type MongoResult<T> = std::result::Result<T, MongoDaoError>;

/// Failures of the MongoDB room store.
#[derive(Debug, Error)]
pub enum MongoDaoError {
    /// Required environment variable is missing.
    #[error("missing MongoDB environment variable `{var}`")]
    MissingEnvVar { var: &'static str },
    /// The connection URI could not be parsed.
    #[error("failed to parse MongoDB connection URI")]
    InvalidUri {
        #[source]
        source: MongoError,
    },
    /// The driver rejected the client options.
    #[error("failed to build MongoDB client from options")]
    ClientConstruction {
        #[source]
        source: MongoError,
    },
    /// The database did not answer a ping.
    #[error("MongoDB database `{database}` did not answer a ping")]
    Unreachable {
        database: String,
        #[source]
        source: MongoError,
    },
    /// A revision read back from a room record is not an integer.
    #[error("revision `{revision}` of room record `{id}` is not a MongoDB revision")]
    InvalidRevision { id: &'static str, revision: String },
    /// Reading the room record failed.
    #[error("failed to load room record `{id}`")]
    LoadRoom {
        id: &'static str,
        #[source]
        source: MongoError,
    },
    /// Writing the room record failed.
    #[error("failed to save room record `{id}` at revision {revision}")]
    SaveRoom {
        id: &'static str,
        revision: i64,
        #[source]
        source: MongoError,
    },
}
