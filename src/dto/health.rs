use serde::Serialize;
use utoipa::ToSchema;

/// Health payload returned by the `/healthcheck` route.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// Health status ("ok" or "degraded").
    pub status: String,
    /// Room store backend in use (`memory`, `couch` or `mongo`).
    pub store: String,
    /// WebSocket observers currently connected.
    pub observers: usize,
}

impl HealthResponse {
    pub fn new(degraded: bool, store: &str, observers: usize) -> Self {
        let status = if degraded { "degraded" } else { "ok" };
        Self {
            status: status.to_string(),
            store: store.to_string(),
            observers,
        }
    }
}
