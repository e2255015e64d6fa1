use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for the listening room backend.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::room::add_track,
        crate::routes::room::report_ended,
        crate::routes::room::sync,
        crate::routes::sse::room_stream,
        crate::routes::websocket::ws_handler,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::room::TrackDto,
            crate::dto::room::SnapshotResponse,
            crate::dto::room::AddTrackRequest,
            crate::dto::room::AddTrackResponse,
            crate::dto::room::ReportEndedRequest,
            crate::dto::room::ReportEndedResponse,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "room", description = "Shared listening room operations"),
        (name = "sse", description = "Server-sent events streams"),
        (name = "observers", description = "WebSocket push channel for room observers"),
    )
)]
pub struct ApiDoc;
