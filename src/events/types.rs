//! Event envelope and lifecycle vocabulary.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use onboarding_types::TenantRecord;

/// Source tag on every event this system publishes.
pub const EVENT_SOURCE: &str = "tenant-onboarding";

/// Source tag of pipeline state-change notifications.
pub const PIPELINE_SOURCE: &str = "ci.pipeline";

/// Outbound notification: onboarding status for the tenant-facing side.
pub const STATUS_CHANGED: &str = "Tenant Onboarding Status Changed";

/// Outbound notification: a workload can be deployed.
pub const WORKLOAD_READY: &str = "Workload Ready For Deployment";

/// Wire envelope for every inbound and outbound event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    #[serde(default)]
    pub source: String,
    #[serde(rename = "detail-type", default)]
    pub detail_type: String,
    #[serde(alias = "detail", default)]
    pub payload: serde_json::Value,
    #[serde(rename = "correlation-id", default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
}

impl EventEnvelope {
    pub fn new(
        source: impl Into<String>,
        detail_type: impl Into<String>,
        payload: &impl Serialize,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self {
            source: source.into(),
            detail_type: detail_type.into(),
            payload: serde_json::to_value(payload)?,
            correlation_id: Some(Uuid::new_v4().to_string()),
        })
    }

    /// A lifecycle event under this system's source tag.
    pub fn lifecycle(
        event: OnboardingEvent,
        payload: &impl Serialize,
    ) -> Result<Self, serde_json::Error> {
        Self::new(EVENT_SOURCE, event.detail_type(), payload)
    }

    /// Carry the correlation id of the event being handled.
    pub fn correlated(mut self, correlation_id: Option<&str>) -> Self {
        if let Some(id) = correlation_id {
            self.correlation_id = Some(id.to_string());
        }
        self
    }

    pub fn payload_as<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.payload.clone())
    }
}

// ============================================================================
// LIFECYCLE EVENTS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OnboardingEvent {
    Initiated,
    Validated,
    TenantAssigned,
    StackStatusChanged,
    BaseProvisioned,
    Provisioned,
    DeploymentPipelineChanged,
    Deployed,
    Failed,
}

impl OnboardingEvent {
    pub const ALL: [OnboardingEvent; 9] = [
        Self::Initiated,
        Self::Validated,
        Self::TenantAssigned,
        Self::StackStatusChanged,
        Self::BaseProvisioned,
        Self::Provisioned,
        Self::DeploymentPipelineChanged,
        Self::Deployed,
        Self::Failed,
    ];

    pub fn detail_type(&self) -> &'static str {
        match self {
            Self::Initiated => "Onboarding Initiated",
            Self::Validated => "Onboarding Validated",
            Self::TenantAssigned => "Onboarding Tenant Assigned",
            Self::StackStatusChanged => "Onboarding Stack Status Changed",
            Self::BaseProvisioned => "Onboarding Base Provisioned",
            Self::Provisioned => "Onboarding Provisioned",
            Self::DeploymentPipelineChanged => "Onboarding Deployment Pipeline Changed",
            Self::Deployed => "Onboarding Deployed",
            Self::Failed => "Onboarding Failed",
        }
    }

    pub fn from_detail_type(detail_type: &str) -> Option<Self> {
        Self::ALL
            .iter()
            .find(|e| e.detail_type() == detail_type)
            .copied()
    }
}

impl std::fmt::Display for OnboardingEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.detail_type())
    }
}

// ============================================================================
// PAYLOADS
// ============================================================================

/// Payload of every lifecycle event keyed by onboarding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OnboardingDetail {
    pub onboarding_id: Uuid,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantAssignedDetail {
    pub onboarding_id: Uuid,
    pub tenant: TenantRecord,
}

/// Correlated by tenant and stack, not by onboarding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StackStatusDetail {
    pub tenant_id: Uuid,
    pub stack_id: String,
    pub stack_status: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedDetail {
    pub onboarding_id: Uuid,
    pub message: String,
}

/// Pipeline state change. `tenantId` is preferred when the pipeline carries
/// it; the name is parsed only as a fallback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineDetail {
    pub pipeline: String,
    pub state: PipelineState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PipelineState {
    Started,
    Succeeded,
    Failed,
    Canceled,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusChangedNotice {
    pub tenant_id: Uuid,
    pub onboarding_status: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkloadReadyNotice {
    #[serde(rename = "tenantId")]
    pub tenant_id: Uuid,
    #[serde(rename = "repository-name")]
    pub repository_name: String,
    #[serde(rename = "image-tag")]
    pub image_tag: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detail_types_roundtrip() {
        for event in OnboardingEvent::ALL {
            assert_eq!(OnboardingEvent::from_detail_type(event.detail_type()), Some(event));
        }
        assert_eq!(OnboardingEvent::from_detail_type("Onboarding Exploded"), None);
    }

    #[test]
    fn test_envelope_wire_names() {
        let json = r#"{
            "source": "tenant-onboarding",
            "detail-type": "Onboarding Initiated",
            "detail": {"onboardingId": "6f1c2f4e-8d3a-4c55-9a53-2b1f0e7d9c10"},
            "correlation-id": "abc"
        }"#;
        let envelope: EventEnvelope = serde_json::from_str(json).unwrap();
        assert_eq!(envelope.correlation_id.as_deref(), Some("abc"));
        let detail: OnboardingDetail = envelope.payload_as().unwrap();
        assert_eq!(
            detail.onboarding_id.to_string(),
            "6f1c2f4e-8d3a-4c55-9a53-2b1f0e7d9c10"
        );
    }

    #[test]
    fn test_unknown_pipeline_state() {
        let detail: PipelineDetail =
            serde_json::from_str(r#"{"pipeline":"p","state":"SUPERSEDED"}"#).unwrap();
        assert_eq!(detail.state, PipelineState::Other);
    }

    #[test]
    fn test_workload_ready_field_names() {
        let notice = WorkloadReadyNotice {
            tenant_id: Uuid::nil(),
            repository_name: "web".into(),
            image_tag: "latest".into(),
        };
        let value = serde_json::to_value(notice).unwrap();
        assert_eq!(value["repository-name"], "web");
        assert_eq!(value["image-tag"], "latest");
    }
}
