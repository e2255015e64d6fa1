use std::convert::Infallible;

use axum::{Router, extract::State, response::sse::Sse, routing::get};
use futures::Stream;
use tracing::info;

use crate::{error::AppError, services::sse_service, state::SharedState};

#[utoipa::path(
    get,
    path = "/sse/room",
    tag = "sse",
    responses(
        (status = 200, description = "Room SSE stream; every event is a `sync_event` snapshot", content_type = "text/event-stream", body = String),
        (status = 503, description = "Room store unavailable")
    )
)]
/// Stream room snapshots, starting with the current one.
pub async fn room_stream(
    State(state): State<SharedState>,
) -> Result<Sse<impl Stream<Item = Result<axum::response::sse::Event, Infallible>>>, AppError> {
    let (receiver, snapshot) = sse_service::subscribe_room(&state).await?;
    info!(
        subscribers = state.room_sse().subscriber_count(),
        "new room SSE connection"
    );
    Ok(sse_service::to_sse_stream(state, receiver, snapshot))
}

/// Configure the SSE endpoints.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new().route("/sse/room", get(room_stream))
}
