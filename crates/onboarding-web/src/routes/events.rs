//! Event ingest.
//!
//! `POST /api/events` takes one envelope and routes it synchronously. A
//! handler error answers 500 so the delivering platform redelivers.

use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use tracing::debug;

use onboarding_types::MessageBody;
use tenant_onboarding::EventEnvelope;

use super::ApiError;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new().route("/api/events", post(ingest_event))
}

async fn ingest_event(
    State(state): State<AppState>,
    Json(envelope): Json<EventEnvelope>,
) -> Result<(StatusCode, Json<MessageBody>), ApiError> {
    let route = state.events.route(&envelope).await?;
    debug!(?route, detail_type = %envelope.detail_type, "Event ingested");
    Ok((StatusCode::ACCEPTED, Json(MessageBody::new("accepted"))))
}
