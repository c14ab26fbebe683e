//! Synchronous collaborators.
//!
//! Each external system the workflow calls is a trait here, with an HTTP
//! adapter for deployment and an in-memory adapter for tests and local runs.
//! Errors are never swallowed by the adapters; the calling handler decides
//! whether a failure is transient or fatal.

mod http;
mod memory;
mod storage;

pub use http::{
    HttpContainerRegistry, HttpDnsRegistry, HttpNetworkAllocator, HttpProvisioningEngine,
    HttpSettingsService, HttpTenantDirectory,
};
pub use memory::{
    standard_inventory, MemoryContainerRegistry, MemoryDnsRegistry, MemoryNetworkAllocator,
    MemoryProvisioningEngine, MemorySettingsService, MemoryTenantDirectory,
};
pub use storage::{HttpObjectStorage, MemoryObjectStorage, UrlSigner};

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use onboarding_types::{AppConfig, OnboardingRequest, TenantRecord};

use crate::error::ClientError;

/// Capabilities every stack request acknowledges.
pub const STACK_CAPABILITIES: [&str; 2] = ["CAPABILITY_NAMED_IAM", "CAPABILITY_AUTO_EXPAND"];

// ============================================================================
// DIRECTORY + SETTINGS
// ============================================================================

#[async_trait]
pub trait TenantDirectory: Send + Sync {
    /// Insert a tenant for the request. `None` when the directory accepted the
    /// call but returned no tenant.
    async fn create_tenant(
        &self,
        request: &OnboardingRequest,
    ) -> Result<Option<TenantRecord>, ClientError>;

    /// Tenant with its provisioned resource inventory.
    async fn get_tenant(&self, tenant_id: Uuid) -> Result<Option<TenantRecord>, ClientError>;
}

/// Result of the external quota check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaCheck {
    pub passed: bool,
    #[serde(default)]
    pub message: Option<String>,
}

/// Platform-wide settings the control plane's own stack is updated from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformSettings {
    /// Name or identifier of the platform stack.
    pub stack_name: String,
    #[serde(default)]
    pub domain_name: Option<String>,
}

#[async_trait]
pub trait SettingsService: Send + Sync {
    async fn app_config(&self) -> Result<AppConfig, ClientError>;

    async fn check_quotas(&self) -> Result<QuotaCheck, ClientError>;

    async fn platform_settings(&self) -> Result<PlatformSettings, ClientError>;
}

#[async_trait]
pub trait NetworkAllocator: Send + Sync {
    /// Whether any address block is still free.
    async fn has_available_block(&self) -> Result<bool, ClientError>;

    /// Reserve a block for the tenant and return it, e.g. `10.12.0.0/16`.
    async fn assign_block(&self, tenant_id: Uuid) -> Result<String, ClientError>;

    async fn get_block(&self, tenant_id: Uuid) -> Result<Option<String>, ClientError>;
}

// ============================================================================
// REGISTRY + DNS
// ============================================================================

#[async_trait]
pub trait ContainerRegistry: Send + Sync {
    /// Whether `repository` holds an image tagged `tag`. A missing repository
    /// is `Ok(false)`.
    async fn image_exists(&self, repository: &str, tag: &str) -> Result<bool, ClientError>;
}

#[async_trait]
pub trait DnsRegistry: Send + Sync {
    /// Fully qualified names of the A records in the zone.
    async fn a_records(&self, hosted_zone: &str) -> Result<Vec<String>, ClientError>;
}

// ============================================================================
// PROVISIONING ENGINE
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParameterValue {
    Value(String),
    /// Keep whatever the stack currently has.
    UsePrevious { use_previous: bool },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackParameter {
    pub key: String,
    pub value: ParameterValue,
}

impl StackParameter {
    pub fn value(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: ParameterValue::Value(value.into()),
        }
    }

    pub fn use_previous(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: ParameterValue::UsePrevious { use_previous: true },
        }
    }

    /// The literal value, if any.
    pub fn literal(&self) -> Option<&str> {
        match &self.value {
            ParameterValue::Value(v) => Some(v),
            ParameterValue::UsePrevious { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateStackRequest {
    pub stack_name: String,
    pub template_url: String,
    pub parameters: Vec<StackParameter>,
    /// Where lifecycle notifications for the stack are sent.
    pub notification_target: String,
    pub capabilities: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateStackRequest {
    pub stack_id: String,
    pub use_previous_template: bool,
    pub parameters: Vec<StackParameter>,
    pub capabilities: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    Updating { stack_id: String },
    /// The engine found nothing to change.
    NoChanges,
}

#[async_trait]
pub trait ProvisioningEngine: Send + Sync {
    /// Request a stack. Returns the engine's stack identifier.
    async fn create_stack(&self, request: &CreateStackRequest) -> Result<String, ClientError>;

    async fn update_stack(&self, request: &UpdateStackRequest)
        -> Result<UpdateOutcome, ClientError>;

    /// Tear a stack down. A stack the engine does not know is
    /// [`ClientError::NotFound`].
    async fn delete_stack(&self, stack: &str) -> Result<(), ClientError>;
}

// ============================================================================
// OBJECT STORAGE
// ============================================================================

#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// A URL that accepts one upload to `key` until `ttl` elapses.
    async fn presign_upload(&self, key: &str, ttl: Duration) -> Result<String, ClientError>;

    async fn put_object(&self, key: &str, body: Vec<u8>) -> Result<(), ClientError>;
}
