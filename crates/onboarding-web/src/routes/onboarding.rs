//! Onboarding request surface.
//!
//! ## Endpoints
//!
//! - `GET /api/onboarding?tenantId=` - list, optionally for one tenant
//! - `POST /api/onboarding` - start an onboarding, returns an upload URL
//! - `GET /api/onboarding/:id`
//! - `PUT /api/onboarding/:id` - replace, guarded by version
//! - `DELETE /api/onboarding/:id` - accepted, record retained
//! - `PUT /api/tenants/:tenant_id/onboarding` - update a provisioned tenant
//! - `DELETE /api/tenants/:tenant_id` - tear the tenant's stacks down
//! - `PUT /api/platform/domain` - push the configured domain name
//! - `PUT /api/platform/app-config` - push the configured service names

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, get, put},
    Json, Router,
};
use serde::Deserialize;
use uuid::Uuid;

use onboarding_types::{
    CreateOnboardingRequest, CreateOnboardingResponse, Onboarding, PlatformStackResponse,
    UpdateProvisionedTenantRequest, UpdateProvisionedTenantResponse,
};

use super::ApiError;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/onboarding", get(list_onboardings).post(create_onboarding))
        .route(
            "/api/onboarding/:id",
            get(get_onboarding)
                .put(replace_onboarding)
                .delete(delete_onboarding),
        )
        .route(
            "/api/tenants/:tenant_id/onboarding",
            put(update_provisioned_tenant),
        )
        .route("/api/tenants/:tenant_id", delete(delete_tenant))
        .route("/api/platform/domain", put(reset_domain_name))
        .route("/api/platform/app-config", put(update_app_config))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    pub tenant_id: Option<Uuid>,
}

async fn list_onboardings(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<Onboarding>>, ApiError> {
    Ok(Json(state.service.list_onboardings(query.tenant_id).await?))
}

async fn create_onboarding(
    State(state): State<AppState>,
    Json(request): Json<CreateOnboardingRequest>,
) -> Result<(StatusCode, Json<CreateOnboardingResponse>), ApiError> {
    let response = state.service.create_onboarding(request).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

async fn get_onboarding(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Onboarding>, ApiError> {
    Ok(Json(state.service.get_onboarding(id).await?))
}

async fn replace_onboarding(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<Onboarding>,
) -> Result<Json<Onboarding>, ApiError> {
    Ok(Json(state.service.replace_onboarding(id, body).await?))
}

async fn delete_onboarding(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state.service.delete_onboarding(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn update_provisioned_tenant(
    State(state): State<AppState>,
    Path(tenant_id): Path<Uuid>,
    Json(request): Json<UpdateProvisionedTenantRequest>,
) -> Result<Json<UpdateProvisionedTenantResponse>, ApiError> {
    Ok(Json(
        state
            .service
            .update_provisioned_tenant(tenant_id, request)
            .await?,
    ))
}

async fn delete_tenant(
    State(state): State<AppState>,
    Path(tenant_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state.service.delete_tenant(tenant_id).await?;
    Ok(StatusCode::ACCEPTED)
}

async fn reset_domain_name(
    State(state): State<AppState>,
) -> Result<Json<PlatformStackResponse>, ApiError> {
    Ok(Json(state.service.reset_domain_name().await?))
}

async fn update_app_config(
    State(state): State<AppState>,
) -> Result<Json<PlatformStackResponse>, ApiError> {
    Ok(Json(state.service.update_app_config().await?))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use tenant_onboarding::events::RecordingPublisher;
    use tenant_onboarding::local::sample_app_config;
    use tenant_onboarding::{LocalEnvironment, OnboardingConfig};

    use crate::routes::create_router;
    use crate::state::AppState;

    async fn app() -> axum::Router {
        let config = OnboardingConfig::for_environment("test");
        let env = LocalEnvironment::seeded(config, sample_app_config())
            .await
            .unwrap();
        let service = Arc::new(env.service(Arc::new(RecordingPublisher::new())));
        create_router(AppState::new(service))
    }

    async fn send(
        app: &axum::Router,
        method: &str,
        uri: &str,
        body: Option<Value>,
    ) -> (u16, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json");
        let body = body.map(|b| Body::from(b.to_string())).unwrap_or_else(Body::empty);
        let response = app.clone().oneshot(request.body(body).unwrap()).await.unwrap();
        let status = response.status().as_u16();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    async fn create(app: &axum::Router) -> (u16, Value) {
        send(app, "POST", "/api/onboarding", Some(json!({"name": "Acme"}))).await
    }

    #[tokio::test]
    async fn test_create_then_get() {
        let app = app().await;
        let (status, created) = create(&app).await;
        assert_eq!(status, 201);
        assert_eq!(created["status"], "created");
        assert!(created["uploadUrl"].as_str().unwrap().contains("signature="));

        let id = created["id"].as_str().unwrap();
        let (status, fetched) = send(&app, "GET", &format!("/api/onboarding/{id}"), None).await;
        assert_eq!(status, 200);
        assert_eq!(fetched["id"], id);

        let (status, listed) = send(&app, "GET", "/api/onboarding", None).await;
        assert_eq!(status, 200);
        assert_eq!(listed.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_blank_name_is_bad_request() {
        let app = app().await;
        let (status, body) = send(&app, "POST", "/api/onboarding", Some(json!({"name": ""}))).await;
        assert_eq!(status, 400);
        assert!(body["message"].as_str().unwrap().contains("name"));
    }

    #[tokio::test]
    async fn test_unknown_id_is_not_found() {
        let app = app().await;
        let uri = format!("/api/onboarding/{}", uuid::Uuid::new_v4());
        let (status, body) = send(&app, "GET", &uri, None).await;
        assert_eq!(status, 404);
        assert!(body["message"].is_string());
    }

    #[tokio::test]
    async fn test_replace_id_mismatch_and_stale_version() {
        let app = app().await;
        let (_, created) = create(&app).await;
        let id = created["id"].as_str().unwrap().to_string();
        let (_, record) = send(&app, "GET", &format!("/api/onboarding/{id}"), None).await;

        let other = format!("/api/onboarding/{}", uuid::Uuid::new_v4());
        let (status, _) = send(&app, "PUT", &other, Some(record.clone())).await;
        assert_eq!(status, 400);

        let uri = format!("/api/onboarding/{id}");
        let (status, _) = send(&app, "PUT", &uri, Some(record.clone())).await;
        assert_eq!(status, 200);
        let (status, _) = send(&app, "PUT", &uri, Some(record)).await;
        assert_eq!(status, 409);
    }

    #[tokio::test]
    async fn test_delete_is_no_content() {
        let app = app().await;
        let (_, created) = create(&app).await;
        let uri = format!("/api/onboarding/{}", created["id"].as_str().unwrap());

        let (status, _) = send(&app, "DELETE", &uri, None).await;
        assert_eq!(status, 204);
        let (status, _) = send(&app, "GET", &uri, None).await;
        assert_eq!(status, 200);
    }

    #[tokio::test]
    async fn test_update_unknown_tenant_is_not_found() {
        let app = app().await;
        let uri = format!("/api/tenants/{}/onboarding", uuid::Uuid::new_v4());
        let (status, _) = send(&app, "PUT", &uri, Some(json!({"cpu": 1024}))).await;
        assert_eq!(status, 404);
    }

    #[tokio::test]
    async fn test_delete_tenant_is_accepted() {
        let app = app().await;
        let uri = format!("/api/tenants/{}", uuid::Uuid::new_v4());
        let (status, _) = send(&app, "DELETE", &uri, None).await;
        assert_eq!(status, 202);
    }

    #[tokio::test]
    async fn test_platform_routes() {
        let app = app().await;
        let (status, body) = send(&app, "PUT", "/api/platform/app-config", None).await;
        assert_eq!(status, 200);
        assert_eq!(body["stackId"], "onboarding-platform");

        // no domain name configured
        let (status, _) = send(&app, "PUT", "/api/platform/domain", None).await;
        assert_eq!(status, 400);
    }
}
