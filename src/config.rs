//! Application-level configuration loading: store backend, resolver and room tuning.

use std::{env, fs, io::ErrorKind, path::PathBuf, str::FromStr, time::Duration};

use serde::Deserialize;
use serde_with::{DurationMilliSeconds, serde_as};
use thiserror::Error;
use tracing::{info, warn};

use crate::{services::metadata_service::ResolverSettings, state::engine::RoomSettings};

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "LISTENING_ROOM_CONFIG_PATH";
/// Environment variable that overrides the configured store backend.
const STORE_ENV: &str = "ROOM_STORE";

/// Where room state is persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// Process-local, lost on restart.
    #[default]
    Memory,
    Couch,
    Mongo,
}

impl StoreBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreBackend::Memory => "memory",
            StoreBackend::Couch => "couch",
            StoreBackend::Mongo => "mongo",
        }
    }
}

#[derive(Debug, Error, PartialEq)]
#[error("unknown store backend `{0}` (expected memory, couch or mongo)")]
pub struct UnknownBackend(String);

impl FromStr for StoreBackend {
    type Err = UnknownBackend;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(StoreBackend::Memory),
            "couch" | "couchdb" => Ok(StoreBackend::Couch),
            "mongo" | "mongodb" => Ok(StoreBackend::Mongo),
            _ => Err(UnknownBackend(value.to_string())),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    pub store: StoreBackend,
    pub resolver: ResolverSettings,
    pub room: RoomSettings,
}

impl AppConfig {
    /// Load the configuration from disk, then apply the `ROOM_STORE` override.
    ///
    /// A missing or broken file falls back to built-in defaults.
    pub fn load() -> Self {
        let config = Self::load_file();
        config.with_store_override(env::var(STORE_ENV).ok().as_deref())
    }

    fn load_file() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match Self::from_json_str(&contents) {
                Ok(config) => {
                    info!(
                        path = %path.display(),
                        store = config.store.as_str(),
                        "loaded configuration"
                    );
                    config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        }
    }

    /// Parse a JSON document; absent keys keep their defaults.
    pub fn from_json_str(contents: &str) -> serde_json::Result<Self> {
        serde_json::from_str::<RawConfig>(contents).map(Into::into)
    }

    /// Replace the store backend when `value` names a known one.
    pub fn with_store_override(mut self, value: Option<&str>) -> Self {
        let Some(value) = value.filter(|v| !v.trim().is_empty()) else {
            return self;
        };

        match value.parse::<StoreBackend>() {
            Ok(store) => {
                info!(store = store.as_str(), "store backend overridden by {STORE_ENV}");
                self.store = store;
            }
            Err(err) => warn!(error = %err, "ignoring {STORE_ENV}"),
        }
        self
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
struct RawConfig {
    store: Option<StoreBackend>,
    resolver: RawResolver,
    room: RawRoom,
}

#[serde_as]
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawResolver {
    oembed_endpoint: Option<String>,
    #[serde_as(as = "Option<DurationMilliSeconds<u64>>")]
    timeout_ms: Option<Duration>,
}

#[serde_as]
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawRoom {
    #[serde_as(as = "Option<DurationMilliSeconds<u64>>")]
    advance_debounce_ms: Option<Duration>,
    #[serde_as(as = "Option<DurationMilliSeconds<u64>>")]
    snapshot_cache_ms: Option<Duration>,
    #[serde_as(as = "Option<DurationMilliSeconds<u64>>")]
    store_timeout_ms: Option<Duration>,
    max_write_attempts: Option<u32>,
}

impl From<RawConfig> for AppConfig {
    fn from(value: RawConfig) -> Self {
        let resolver_defaults = ResolverSettings::default();
        let room_defaults = RoomSettings::default();

        Self {
            store: value.store.unwrap_or_default(),
            resolver: ResolverSettings {
                oembed_endpoint: value
                    .resolver
                    .oembed_endpoint
                    .unwrap_or(resolver_defaults.oembed_endpoint),
                timeout: value.resolver.timeout_ms.unwrap_or(resolver_defaults.timeout),
            },
            room: RoomSettings {
                advance_debounce: value
                    .room
                    .advance_debounce_ms
                    .unwrap_or(room_defaults.advance_debounce),
                snapshot_cache_ttl: value
                    .room
                    .snapshot_cache_ms
                    .unwrap_or(room_defaults.snapshot_cache_ttl),
                store_timeout: value
                    .room
                    .store_timeout_ms
                    .unwrap_or(room_defaults.store_timeout),
                max_write_attempts: value
                    .room
                    .max_write_attempts
                    .unwrap_or(room_defaults.max_write_attempts),
            },
        }
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_keeps_defaults() {
        let config = AppConfig::from_json_str("{}").unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.store, StoreBackend::Memory);
        assert_eq!(config.room.advance_debounce, Duration::from_secs(1));
    }

    #[test]
    fn millisecond_keys_become_durations() {
        let config = AppConfig::from_json_str(
            r#"{
                "store": "couch",
                "resolver": { "oembed_endpoint": "http://localhost:9000/oembed", "timeout_ms": 750 },
                "room": { "advance_debounce_ms": 0, "snapshot_cache_ms": 250, "max_write_attempts": 2 }
            }"#,
        )
        .unwrap();

        assert_eq!(config.store, StoreBackend::Couch);
        assert_eq!(config.resolver.oembed_endpoint, "http://localhost:9000/oembed");
        assert_eq!(config.resolver.timeout, Duration::from_millis(750));
        assert_eq!(config.room.advance_debounce, Duration::ZERO);
        assert_eq!(config.room.snapshot_cache_ttl, Duration::from_millis(250));
        assert_eq!(config.room.store_timeout, RoomSettings::default().store_timeout);
        assert_eq!(config.room.max_write_attempts, 2);
    }

    #[test]
    fn unknown_store_is_a_parse_error() {
        assert!(AppConfig::from_json_str(r#"{"store":"redis"}"#).is_err());
    }

    #[test]
    fn store_override_accepts_aliases_and_ignores_garbage() {
        let config = AppConfig::default().with_store_override(Some(" MongoDB "));
        assert_eq!(config.store, StoreBackend::Mongo);

        let config = config.with_store_override(Some("redis"));
        assert_eq!(config.store, StoreBackend::Mongo);

        let config = config.with_store_override(Some(""));
        assert_eq!(config.store, StoreBackend::Mongo);
    }
}
