//! HTTP request and response bodies.

use serde::{Deserialize, Serialize};

use crate::{Onboarding, OnboardingRequest};

/// Create-onboarding response: the record plus a time-limited upload target.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOnboardingResponse {
    #[serde(flatten)]
    pub onboarding: Onboarding,
    pub upload_url: String,
}

/// Create-onboarding request body is the request snapshot itself.
pub type CreateOnboardingRequest = OnboardingRequest;

/// Partial overrides for an already-provisioned tenant.
///
/// Unset fields keep their previous value on the provisioning engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProvisionedTenantRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub billing_plan: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subdomain: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProvisionedTenantResponse {
    pub stack_id: String,
}

/// Platform stack update result. `stackId` is null when the engine found
/// nothing to change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformStackResponse {
    pub stack_id: Option<String>,
}

/// Structured body for error and informational responses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageBody {
    pub message: String,
}

impl MessageBody {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
