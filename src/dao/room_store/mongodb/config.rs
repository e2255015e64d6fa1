use std::time::Duration;

use mongodb::options::ClientOptions;

use super::error::{MongoDaoError, MongoResult};

const DEFAULT_DB: &str = "listening_room";
const APP_NAME: &str = "listening-room-back";
/// Keeps a connect or ping against an absent server from hanging for the driver's 30 s default.
const DEFAULT_SERVER_SELECTION_TIMEOUT: Duration = Duration::from_secs(5);

/// Parsed driver options plus the database holding the room record.
#[derive(Clone)]
pub struct MongoConfig {
    /// Driver options parsed from the URI.
    pub options: ClientOptions,
    /// Database holding the `rooms` collection.
    pub database_name: String,
}

impl MongoConfig {
    /// Parse `uri`; values the URI leaves unset get room store defaults.
    pub async fn from_uri(uri: &str, db_name: Option<&str>) -> MongoResult<Self> {
        // The URI may carry credentials, so it is kept out of the error.
        let mut options = ClientOptions::parse(uri)
            .await
            .map_err(|source| MongoDaoError::InvalidUri { source })?;
        options.app_name.get_or_insert_with(|| APP_NAME.to_string());
        options
            .server_selection_timeout
            .get_or_insert(DEFAULT_SERVER_SELECTION_TIMEOUT);

        let database_name = db_name
            .or(options.default_database.as_deref())
            .unwrap_or(DEFAULT_DB)
            .to_owned();

        Ok(Self {
            options,
            database_name,
        })
    }

    /// Read `MONGO_URI` (required) and `MONGO_DB` (optional).
    pub async fn from_env() -> MongoResult<Self> {
        let uri = std::env::var("MONGO_URI")
            .map_err(|_| MongoDaoError::MissingEnvVar { var: "MONGO_URI" })?;
        let db = std::env::var("MONGO_DB").ok();
        Self::from_uri(&uri, db.as_deref()).await
    }
}
