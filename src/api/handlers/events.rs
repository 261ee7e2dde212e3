use axum::{
    Json,
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use std::sync::Arc;
use tracing::{debug, instrument, warn};

use super::extract_user_agent;
use crate::api::AppState;
use crate::device::LoginEvent;

#[utoipa::path(
    post,
    path= "/v1/events",
    request_body = LoginEvent,
    responses (
        (status = 202, description = "Event accepted"),
        (status = 400, description = "Missing or malformed event"),
    ),
    tag= "events"
)]
// Login events pushed by an external host. The response never reflects the outcome.
#[instrument(skip_all)]
pub async fn ingest_event(
    state: Extension<Arc<AppState>>,
    headers: HeaderMap,
    payload: Option<Json<LoginEvent>>,
) -> impl IntoResponse {
    let Some(Json(event)) = payload else {
        warn!("login event missing or malformed");
        return StatusCode::BAD_REQUEST;
    };

    let user_agent = extract_user_agent(&headers);
    let outcome = state.listener.on_event(&event, user_agent.as_deref()).await;
    debug!(?outcome, "login event processed");

    StatusCode::ACCEPTED
}
