//! HTTP routes
//!
//! - `/api/onboarding` request surface
//! - `/api/tenants/:tenant_id/onboarding` provisioned-tenant updates
//! - `/api/tenants/:tenant_id` tenant teardown
//! - `/api/platform/*` shared platform stack updates
//! - `/api/events` event ingest

pub mod events;
pub mod onboarding;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::error;

use onboarding_types::MessageBody;
use tenant_onboarding::{OnboardingError, StoreError};

use crate::state::AppState;

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/health", get(health))
        .merge(onboarding::routes())
        .merge(events::routes())
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()).layer(cors))
        .with_state(state)
}

async fn health() -> Json<MessageBody> {
    Json(MessageBody::new("ok"))
}

// ============================================================================
// ERROR MAPPING
// ============================================================================

/// Workflow error rendered as a status code plus `{"message": ...}`.
pub struct ApiError(OnboardingError);

impl From<OnboardingError> for ApiError {
    fn from(error: OnboardingError) -> Self {
        Self(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            OnboardingError::InvalidRequest(_) | OnboardingError::InvalidTransition { .. } => {
                StatusCode::BAD_REQUEST
            }
            OnboardingError::NotFound(_) | OnboardingError::Store(StoreError::NotFound(_)) => {
                StatusCode::NOT_FOUND
            }
            OnboardingError::Store(StoreError::Conflict { .. })
            | OnboardingError::Store(StoreError::AlreadyExists(_)) => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            error!(error = %self.0, "Request failed");
        }
        (status, Json(MessageBody::new(self.0.to_string()))).into_response()
    }
}
