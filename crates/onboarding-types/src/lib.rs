//! Shared Onboarding Types
//!
//! This crate is the SINGLE SOURCE OF TRUTH for the onboarding record and the
//! types crossing HTTP and event boundaries.
//!
//! ## Rules
//!
//! 1. Pure data - no I/O, no async, no collaborator clients
//! 2. JSON field names are camelCase to match the request surface
//! 3. Stack status is kept as the provisioning engine's raw text

pub mod api;
pub mod app_config;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use api::*;
pub use app_config::*;

// ============================================================================
// STATUS
// ============================================================================

/// Lifecycle status of an onboarding record.
///
/// ```text
/// created ─▶ validating ─▶ validated ─▶ provisioning ─▶ provisioned ─▶ deploying ─▶ succeeded
///    └──────────┴─────────────┴─────────────┴──────────────┴──────────────┴──▶ failed
///
/// provisioned | deploying | succeeded | updated ─▶ updating ─▶ updated
///
/// any status except failed ─▶ deleting
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OnboardingStatus {
    Created,
    Validating,
    Validated,
    Provisioning,
    Provisioned,
    Deploying,
    Succeeded,
    Failed,
    Updating,
    Updated,
    /// Tenant teardown requested; the record is kept.
    Deleting,
}

impl OnboardingStatus {
    pub const ALL: [OnboardingStatus; 11] = [
        Self::Created,
        Self::Validating,
        Self::Validated,
        Self::Provisioning,
        Self::Provisioned,
        Self::Deploying,
        Self::Succeeded,
        Self::Failed,
        Self::Updating,
        Self::Updated,
        Self::Deleting,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Validating => "validating",
            Self::Validated => "validated",
            Self::Provisioning => "provisioning",
            Self::Provisioned => "provisioned",
            Self::Deploying => "deploying",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Updating => "updating",
            Self::Updated => "updated",
            Self::Deleting => "deleting",
        }
    }

    /// Terminal states accept no further forward transition.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Deleting)
    }

    /// The single forward successor on the main onboarding path.
    pub fn successor(&self) -> Option<OnboardingStatus> {
        match self {
            Self::Created => Some(Self::Validating),
            Self::Validating => Some(Self::Validated),
            Self::Validated => Some(Self::Provisioning),
            Self::Provisioning => Some(Self::Provisioned),
            Self::Provisioned => Some(Self::Deploying),
            Self::Deploying => Some(Self::Succeeded),
            Self::Updating => Some(Self::Updated),
            Self::Succeeded | Self::Failed | Self::Updated | Self::Deleting => None,
        }
    }

    /// Whether `self -> next` is a legal transition.
    ///
    /// `failed` is absorbing and reachable from every non-terminal state.
    /// `deleting` is reachable from everything but `failed` and leads nowhere.
    /// Forward moves go one step at a time, so a pipeline that starts while
    /// stacks are still provisioning cannot skip the record to `deploying`.
    pub fn can_transition_to(&self, next: OnboardingStatus) -> bool {
        if *self == next {
            return false;
        }
        match next {
            Self::Failed => !self.is_terminal(),
            Self::Deleting => *self != Self::Failed,
            Self::Updating => matches!(
                self,
                Self::Provisioned | Self::Deploying | Self::Succeeded | Self::Updated
            ),
            _ => self.successor() == Some(next),
        }
    }
}

impl std::fmt::Display for OnboardingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for OnboardingStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .find(|status| status.as_str() == s)
            .copied()
            .ok_or_else(|| format!("Unknown onboarding status: {}", s))
    }
}

// ============================================================================
// REQUEST SNAPSHOT
// ============================================================================

/// What the caller asked for when the onboarding was created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OnboardingRequest {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subdomain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tier: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub billing_plan: Option<String>,
}

impl OnboardingRequest {
    /// Requested subdomain, ignoring blank values.
    pub fn requested_subdomain(&self) -> Option<&str> {
        self.subdomain
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

// ============================================================================
// STACKS
// ============================================================================

/// Provisioning engine lifecycle text for a stack that was just requested.
pub const STACK_CREATE_IN_PROGRESS: &str = "CREATE_IN_PROGRESS";

/// One infrastructure-as-code deployment unit owned by an onboarding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OnboardingStack {
    pub name: String,
    /// External identifier assigned by the provisioning engine.
    pub stack_id: String,
    pub base_stack: bool,
    /// Raw lifecycle text, e.g. `CREATE_IN_PROGRESS`.
    pub status: String,
}

impl OnboardingStack {
    pub fn new(name: impl Into<String>, stack_id: impl Into<String>, base_stack: bool) -> Self {
        Self {
            name: name.into(),
            stack_id: stack_id.into(),
            base_stack,
            status: STACK_CREATE_IN_PROGRESS.to_string(),
        }
    }

    pub fn is_complete(&self) -> bool {
        matches!(self.status.as_str(), "CREATE_COMPLETE" | "UPDATE_COMPLETE")
    }

    pub fn is_failed(&self) -> bool {
        self.status.ends_with("_FAILED") || self.status.contains("ROLLBACK")
    }

    /// Console link for identifiers shaped like `arn:partition:service:region:...`.
    pub fn console_url(&self) -> Option<String> {
        let parts: Vec<&str> = self.stack_id.split(':').collect();
        if parts.len() <= 4 {
            return None;
        }
        let region = parts[3];
        Some(format!(
            "https://{region}.console.aws.amazon.com/cloudformation/home?region={region}#/stacks/stackinfo?stackId={}",
            self.stack_id
        ))
    }
}

// ============================================================================
// ONBOARDING RECORD
// ============================================================================

/// Durable per-tenant onboarding entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Onboarding {
    pub id: Uuid,
    pub status: OnboardingStatus,
    #[serde(default)]
    pub request: Option<OnboardingRequest>,
    #[serde(default)]
    pub tenant_id: Option<Uuid>,
    /// Base stack first, then one per configured service. Append-only.
    #[serde(default)]
    pub stacks: Vec<OnboardingStack>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zip_file_url: Option<String>,
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
    /// Optimistic concurrency token, bumped by the store on every write.
    #[serde(default)]
    pub version: i64,
}

impl Onboarding {
    pub fn new(request: OnboardingRequest) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            status: OnboardingStatus::Created,
            request: Some(request),
            tenant_id: None,
            stacks: Vec::new(),
            zip_file_url: None,
            created: now,
            modified: now,
            version: 0,
        }
    }

    pub fn stack(&self, stack_id: &str) -> Option<&OnboardingStack> {
        self.stacks.iter().find(|s| s.stack_id == stack_id)
    }

    pub fn has_base_stack(&self) -> bool {
        self.stacks.iter().any(|s| s.base_stack)
    }

    pub fn has_app_stacks(&self) -> bool {
        self.stacks.iter().any(|s| !s.base_stack)
    }

    pub fn base_stacks_complete(&self) -> bool {
        let mut base = self.stacks.iter().filter(|s| s.base_stack).peekable();
        base.peek().is_some() && base.all(OnboardingStack::is_complete)
    }

    pub fn stacks_complete(&self) -> bool {
        !self.stacks.is_empty() && self.stacks.iter().all(OnboardingStack::is_complete)
    }

    /// First eight characters of the tenant id, used in resource names.
    pub fn tenant_short_id(&self) -> Option<String> {
        self.tenant_id
            .map(|id| id.to_string().chars().take(8).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stack(status: &str, base: bool) -> OnboardingStack {
        OnboardingStack {
            name: "s".into(),
            stack_id: format!("id-{status}"),
            base_stack: base,
            status: status.into(),
        }
    }

    #[test]
    fn test_status_roundtrip() {
        for status in OnboardingStatus::ALL {
            let parsed: OnboardingStatus = status.as_str().parse().unwrap();
            assert_eq!(parsed, status);
            let json = serde_json::to_string(&status).unwrap();
            assert_eq!(json, format!("\"{}\"", status.as_str()));
        }
    }

    #[test]
    fn test_failed_is_absorbing() {
        for status in OnboardingStatus::ALL {
            assert!(!OnboardingStatus::Failed.can_transition_to(status));
        }
        assert!(OnboardingStatus::Provisioning.can_transition_to(OnboardingStatus::Failed));
        assert!(!OnboardingStatus::Succeeded.can_transition_to(OnboardingStatus::Failed));
    }

    #[test]
    fn test_no_skipping_forward() {
        assert!(OnboardingStatus::Provisioned.can_transition_to(OnboardingStatus::Deploying));
        assert!(!OnboardingStatus::Provisioning.can_transition_to(OnboardingStatus::Deploying));
        assert!(!OnboardingStatus::Validated.can_transition_to(OnboardingStatus::Validating));
    }

    #[test]
    fn test_deleting_is_a_dead_end() {
        assert!(OnboardingStatus::Succeeded.can_transition_to(OnboardingStatus::Deleting));
        assert!(OnboardingStatus::Provisioning.can_transition_to(OnboardingStatus::Deleting));
        assert!(!OnboardingStatus::Failed.can_transition_to(OnboardingStatus::Deleting));
        for status in OnboardingStatus::ALL {
            assert!(!OnboardingStatus::Deleting.can_transition_to(status));
        }
    }

    #[test]
    fn test_stack_predicates() {
        assert!(stack("CREATE_COMPLETE", true).is_complete());
        assert!(stack("UPDATE_COMPLETE", false).is_complete());
        assert!(!stack("CREATE_IN_PROGRESS", true).is_complete());
        assert!(stack("CREATE_FAILED", true).is_failed());
        assert!(stack("ROLLBACK_COMPLETE", true).is_failed());
        assert!(!stack("ROLLBACK_COMPLETE", true).is_complete());
    }

    #[test]
    fn test_base_stacks_complete_needs_a_base_stack() {
        let mut onboarding = Onboarding::new(OnboardingRequest {
            name: "Acme".into(),
            subdomain: None,
            tier: None,
            billing_plan: None,
        });
        assert!(!onboarding.base_stacks_complete());
        assert!(!onboarding.stacks_complete());

        onboarding.stacks.push(stack("CREATE_COMPLETE", true));
        onboarding.stacks.push(stack("CREATE_IN_PROGRESS", false));
        assert!(onboarding.base_stacks_complete());
        assert!(!onboarding.stacks_complete());
    }

    #[test]
    fn test_console_url() {
        let s = OnboardingStack::new(
            "tenant",
            "arn:aws:cloudformation:eu-west-1:123456789012:stack/tenant/abc",
            true,
        );
        let url = s.console_url().unwrap();
        assert!(url.starts_with("https://eu-west-1.console"));
        assert!(OnboardingStack::new("t", "plain-id", true).console_url().is_none());
    }

    #[test]
    fn test_blank_subdomain_is_not_requested() {
        let request: OnboardingRequest =
            serde_json::from_str(r#"{"name":"Acme","subdomain":"  "}"#).unwrap();
        assert_eq!(request.requested_subdomain(), None);
    }
}
