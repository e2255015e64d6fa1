/// OpenAPI documentation generation.
pub mod documentation;
/// Health check service.
pub mod health_service;
/// Track URL parsing and metadata lookup.
pub mod metadata_service;
/// Snapshot fan-out to SSE subscribers and observer sockets.
pub mod room_events;
/// Add, report-ended and snapshot operations.
pub mod room_service;
/// Server-Sent Events streaming service.
pub mod sse_service;
/// Room store connection supervisor with backoff.
pub mod storage_supervisor;
/// Observer WebSocket connection handling.
pub mod websocket_service;
