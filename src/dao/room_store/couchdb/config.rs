use super::error::{CouchDaoError, CouchResult};

const BASE_URL_VAR: &str = "COUCH_BASE_URL";
const DATABASE_VAR: &str = "COUCH_DB";
const USERNAME_VAR: &str = "COUCH_USERNAME";
const PASSWORD_VAR: &str = "COUCH_PASSWORD";
const DEFAULT_DATABASE: &str = "listening_room";

/// Basic-auth pair sent with every CouchDB request.
#[derive(Debug, Clone, PartialEq)]
pub struct CouchCredentials {
    /// Account name.
    pub username: String,
    /// Account password.
    pub password: String,
}

/// Where the room document lives.
#[derive(Debug, Clone, PartialEq)]
pub struct CouchConfig {
    /// Server root without a trailing slash.
    pub base_url: String,
    /// Database holding the room document.
    pub database: String,
    /// Optional basic-auth credentials.
    pub credentials: Option<CouchCredentials>,
}

impl CouchConfig {
    /// Configuration without credentials.
    pub fn new(base_url: impl Into<String>, database: impl Into<String>) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            database: database.into(),
            credentials: None,
        }
    }

    /// Read `COUCH_BASE_URL` (required), `COUCH_DB` and the optional
    /// `COUCH_USERNAME` / `COUCH_PASSWORD` pair.
    pub fn from_env() -> CouchResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> CouchResult<Self> {
        let base_url = lookup(BASE_URL_VAR)
            .filter(|url| !url.trim().is_empty())
            .ok_or(CouchDaoError::MissingEnvVar { var: BASE_URL_VAR })?;
        let database = lookup(DATABASE_VAR).unwrap_or_else(|| DEFAULT_DATABASE.to_string());

        // A lone username or password is ignored rather than half-applied.
        let credentials = lookup(USERNAME_VAR)
            .zip(lookup(PASSWORD_VAR))
            .map(|(username, password)| CouchCredentials { username, password });

        Ok(Self {
            credentials,
            ..Self::new(base_url, database)
        })
    }

    /// URL of the room database.
    pub fn database_url(&self) -> String {
        format!("{}/{}", self.base_url, self.database)
    }

    /// URL of the document `id` inside the room database.
    pub fn document_url(&self, id: &str) -> String {
        format!("{}/{}", self.database_url(), id)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn base_url_is_required() {
        let err = CouchConfig::from_lookup(lookup(&[])).unwrap_err();
        assert!(matches!(err, CouchDaoError::MissingEnvVar { var } if var == BASE_URL_VAR));
    }

    #[test]
    fn defaults_database_and_trims_base_url() {
        let config =
            CouchConfig::from_lookup(lookup(&[(BASE_URL_VAR, "http://couch:5984/")])).unwrap();
        assert_eq!(config.base_url, "http://couch:5984");
        assert_eq!(
            config.document_url("room::state"),
            "http://couch:5984/listening_room/room::state"
        );
        assert!(config.credentials.is_none());
    }

    #[test]
    fn credentials_need_both_halves() {
        let config = CouchConfig::from_lookup(lookup(&[
            (BASE_URL_VAR, "http://couch:5984"),
            (USERNAME_VAR, "admin"),
        ]))
        .unwrap();
        assert!(config.credentials.is_none());

        let config = CouchConfig::from_lookup(lookup(&[
            (BASE_URL_VAR, "http://couch:5984"),
            (DATABASE_VAR, "radio"),
            (USERNAME_VAR, "admin"),
            (PASSWORD_VAR, "secret"),
        ]))
        .unwrap();
        assert_eq!(config.database, "radio");
        assert_eq!(
            config.credentials,
            Some(CouchCredentials {
                username: "admin".into(),
                password: "secret".into(),
            })
        );
    }
}
