//! Event router.
//!
//! Classifies an envelope into a [`Route`] and hands the typed payload to the
//! matching workflow handler. A payload missing its required fields is logged
//! and dropped; collaborator and store errors from a handler are returned so
//! the caller's delivery is retried.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use tracing::{debug, error, info_span, warn, Instrument};

use super::types::*;
use crate::error::OnboardingResult;
use crate::workflow::OnboardingService;

/// Where an envelope goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Lifecycle(OnboardingEvent),
    /// Pipeline-origin state change, matched by source tag.
    Pipeline,
    /// A notification this system emits for others.
    Outbound,
    Unrecognized,
}

impl Route {
    /// Lifecycle and outbound detail types are honoured only under this
    /// system's own source tag.
    pub fn classify(envelope: &EventEnvelope) -> Self {
        if envelope.source == PIPELINE_SOURCE {
            return Self::Pipeline;
        }
        if envelope.source != EVENT_SOURCE {
            return Self::Unrecognized;
        }
        if let Some(event) = OnboardingEvent::from_detail_type(&envelope.detail_type) {
            return Self::Lifecycle(event);
        }
        match envelope.detail_type.as_str() {
            STATUS_CHANGED | WORKLOAD_READY => Self::Outbound,
            _ => Self::Unrecognized,
        }
    }
}

pub struct EventRouter {
    service: Arc<OnboardingService>,
}

impl EventRouter {
    pub fn new(service: Arc<OnboardingService>) -> Self {
        Self { service }
    }

    /// Route one envelope. Returns the route taken.
    pub async fn route(&self, envelope: &EventEnvelope) -> OnboardingResult<Route> {
        let span = info_span!(
            "event",
            correlation_id = envelope.correlation_id.as_deref().unwrap_or("-"),
            detail_type = %envelope.detail_type,
        );
        async move {
            let route = Route::classify(envelope);
            self.dispatch(route, envelope).await?;
            Ok(route)
        }
        .instrument(span)
        .await
    }

    async fn dispatch(&self, route: Route, envelope: &EventEnvelope) -> OnboardingResult<()> {
        let service = &self.service;
        let correlation = envelope.correlation_id.as_deref();

        match route {
            Route::Lifecycle(OnboardingEvent::Initiated) => {
                if let Some(detail) = payload::<OnboardingDetail>(envelope) {
                    service.handle_initiated(detail.onboarding_id).await?;
                }
            }
            Route::Lifecycle(OnboardingEvent::Validated) => {
                if let Some(detail) = payload::<OnboardingDetail>(envelope) {
                    service.handle_validated(detail.onboarding_id, correlation).await?;
                }
            }
            Route::Lifecycle(OnboardingEvent::TenantAssigned) => {
                if let Some(detail) = payload::<TenantAssignedDetail>(envelope) {
                    service.handle_tenant_assigned(detail, correlation).await?;
                }
            }
            Route::Lifecycle(OnboardingEvent::StackStatusChanged) => {
                if let Some(detail) = payload::<StackStatusDetail>(envelope) {
                    service.handle_stack_status_changed(detail, correlation).await?;
                }
            }
            Route::Lifecycle(OnboardingEvent::BaseProvisioned) => {
                if let Some(detail) = payload::<OnboardingDetail>(envelope) {
                    service.handle_base_provisioned(detail.onboarding_id).await?;
                }
            }
            Route::Lifecycle(OnboardingEvent::Provisioned) => {
                if let Some(detail) = payload::<OnboardingDetail>(envelope) {
                    service.handle_provisioned(detail.onboarding_id, correlation).await?;
                }
            }
            Route::Lifecycle(OnboardingEvent::DeploymentPipelineChanged) | Route::Pipeline => {
                if let Some(detail) = payload::<PipelineDetail>(envelope) {
                    service.handle_pipeline_changed(detail, correlation).await?;
                }
            }
            Route::Lifecycle(OnboardingEvent::Deployed) => {
                if let Some(detail) = payload::<OnboardingDetail>(envelope) {
                    service.handle_deployed(detail.onboarding_id).await?;
                }
            }
            Route::Lifecycle(OnboardingEvent::Failed) => {
                if let Some(detail) = payload::<FailedDetail>(envelope) {
                    warn!(
                        onboarding_id = %detail.onboarding_id,
                        message = %detail.message,
                        "Onboarding failed"
                    );
                }
            }
            Route::Outbound => {
                debug!("Ignoring outbound notification");
            }
            Route::Unrecognized => {
                warn!(source = %envelope.source, "Dropping unrecognized event");
            }
        }

        Ok(())
    }
}

/// Decode the payload, logging and returning `None` when required fields are
/// missing.
fn payload<T: DeserializeOwned>(envelope: &EventEnvelope) -> Option<T> {
    match envelope.payload_as::<T>() {
        Ok(detail) => Some(detail),
        Err(e) => {
            error!(
                error = %e,
                payload = %envelope.payload,
                "Missing required fields in event payload"
            );
            None
        }
    }
}
