use axum::{Json, Router, extract::State, routing::{get, post}};
use axum_valid::Valid;

use crate::{
    dto::room::{
        AddTrackRequest, AddTrackResponse, ReportEndedRequest, ReportEndedResponse,
        SnapshotResponse,
    },
    error::AppError,
    services::room_service,
    state::SharedState,
};

/// Submit a track URL; it starts playing when the room is idle and is queued otherwise.
#[utoipa::path(
    post,
    path = "/api/add",
    tag = "room",
    request_body = AddTrackRequest,
    responses(
        (status = 200, description = "Track accepted", body = AddTrackResponse),
        (status = 400, description = "URL names no resolvable track"),
        (status = 503, description = "Room store unavailable")
    )
)]
pub async fn add_track(
    State(state): State<SharedState>,
    Valid(Json(payload)): Valid<Json<AddTrackRequest>>,
) -> Result<Json<AddTrackResponse>, AppError> {
    let track = room_service::add_track(&state, payload.url.trim()).await?;
    Ok(Json(AddTrackResponse::success(&track)))
}

/// Report that a client's player reached the end of a track.
#[utoipa::path(
    post,
    path = "/api/next",
    tag = "room",
    request_body = ReportEndedRequest,
    responses(
        (status = 200, description = "Report handled, whether or not the room moved on", body = ReportEndedResponse),
        (status = 503, description = "Room store unavailable")
    )
)]
pub async fn report_ended(
    State(state): State<SharedState>,
    Json(payload): Json<ReportEndedRequest>,
) -> Result<Json<ReportEndedResponse>, AppError> {
    let transition = room_service::report_ended(&state, &payload.ended_track_id).await?;
    Ok(Json(ReportEndedResponse::new(
        &transition.outcome,
        &transition.snapshot,
    )))
}

/// Current room state stamped with the server clock.
#[utoipa::path(
    get,
    path = "/api/sync",
    tag = "room",
    responses(
        (status = 200, description = "Room snapshot", body = SnapshotResponse),
        (status = 503, description = "Room store unavailable")
    )
)]
pub async fn sync(State(state): State<SharedState>) -> Result<Json<SnapshotResponse>, AppError> {
    let snapshot = room_service::snapshot(&state).await?;
    Ok(Json(SnapshotResponse::from(&snapshot)))
}

/// Configure the room REST endpoints.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new()
        .route("/api/add", post(add_track))
        .route("/api/next", post(report_ended))
        .route("/api/sync", get(sync))
}
