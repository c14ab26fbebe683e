//! In-memory collaborators.
//!
//! Each adapter can be switched into an outage, after which every call fails
//! with [`ClientError::Unavailable`] until cleared.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use onboarding_types::{
    AppConfig, OnboardingRequest, TenantRecord, TenantResource, DEFAULT_TIER,
};

use super::*;

/// Switchable failure shared by the adapters below.
#[derive(Debug, Default)]
struct Outage {
    message: RwLock<Option<String>>,
}

impl Outage {
    async fn check(&self, service: &'static str) -> Result<(), ClientError> {
        match self.message.read().await.as_ref() {
            Some(message) => Err(ClientError::unavailable(service, message.clone())),
            None => Ok(()),
        }
    }

    async fn set(&self, message: Option<String>) {
        *self.message.write().await = message;
    }
}

// ============================================================================
// TENANT DIRECTORY
// ============================================================================

#[derive(Debug, Default)]
pub struct MemoryTenantDirectory {
    tenants: RwLock<HashMap<Uuid, TenantRecord>>,
    /// Inventory attached to every tenant created from here on.
    inventory: RwLock<BTreeMap<String, TenantResource>>,
    create_returns_none: RwLock<bool>,
    outage: Outage,
}

impl MemoryTenantDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Directory whose tenants carry a complete resource inventory.
    pub fn with_standard_inventory() -> Self {
        let mut directory = Self::default();
        *directory.inventory.get_mut() = standard_inventory();
        directory
    }

    pub async fn set_inventory(&self, inventory: BTreeMap<String, TenantResource>) {
        *self.inventory.write().await = inventory;
    }

    /// Make tenant creation answer with no tenant.
    pub async fn set_create_returns_none(&self, value: bool) {
        *self.create_returns_none.write().await = value;
    }

    pub async fn set_outage(&self, message: Option<&str>) {
        self.outage.set(message.map(str::to_string)).await;
    }

    pub async fn tenant(&self, tenant_id: Uuid) -> Option<TenantRecord> {
        self.tenants.read().await.get(&tenant_id).cloned()
    }

    pub async fn tenant_count(&self) -> usize {
        self.tenants.read().await.len()
    }
}

/// Every inventory entry the app phase needs, including the optional HTTPS listener.
pub fn standard_inventory() -> BTreeMap<String, TenantResource> {
    let named = |name: &str| TenantResource {
        name: name.to_string(),
        arn: format!("arn:local:resource:local-1:000000000000:{name}"),
    };
    [
        ("VPC", named("vpc-0a1b")),
        ("PRIVATE_SUBNET_A", named("subnet-0a")),
        ("PRIVATE_SUBNET_B", named("subnet-0b")),
        ("ECS_CLUSTER", named("tenant-cluster")),
        ("ECS_SECURITY_GROUP", named("sg-0c1d")),
        ("LOAD_BALANCER", named("tenant-alb")),
        ("HTTP_LISTENER", named("tenant-alb-http")),
        ("HTTPS_LISTENER", named("tenant-alb-https")),
    ]
    .into_iter()
    .map(|(key, resource)| (key.to_string(), resource))
    .collect()
}

#[async_trait]
impl TenantDirectory for MemoryTenantDirectory {
    async fn create_tenant(
        &self,
        request: &OnboardingRequest,
    ) -> Result<Option<TenantRecord>, ClientError> {
        self.outage.check("tenant directory").await?;
        if *self.create_returns_none.read().await {
            return Ok(None);
        }

        let tenant = TenantRecord {
            id: Uuid::new_v4(),
            name: request.name.clone(),
            subdomain: request.requested_subdomain().map(str::to_string),
            tier: Some(
                request
                    .tier
                    .clone()
                    .filter(|tier| !tier.trim().is_empty())
                    .unwrap_or_else(|| DEFAULT_TIER.to_string()),
            ),
            resources: self.inventory.read().await.clone(),
        };
        self.tenants.write().await.insert(tenant.id, tenant.clone());
        Ok(Some(tenant))
    }

    async fn get_tenant(&self, tenant_id: Uuid) -> Result<Option<TenantRecord>, ClientError> {
        self.outage.check("tenant directory").await?;
        Ok(self.tenant(tenant_id).await)
    }
}

// ============================================================================
// SETTINGS
// ============================================================================

#[derive(Debug)]
pub struct MemorySettingsService {
    app_config: RwLock<AppConfig>,
    platform: RwLock<PlatformSettings>,
    quota: RwLock<QuotaCheck>,
    quota_outage: Outage,
    outage: Outage,
}

impl MemorySettingsService {
    pub fn new(app_config: AppConfig) -> Self {
        Self {
            app_config: RwLock::new(app_config),
            platform: RwLock::new(PlatformSettings {
                stack_name: "onboarding-platform".to_string(),
                domain_name: None,
            }),
            quota: RwLock::new(QuotaCheck {
                passed: true,
                message: None,
            }),
            quota_outage: Outage::default(),
            outage: Outage::default(),
        }
    }

    pub async fn set_app_config(&self, app_config: AppConfig) {
        *self.app_config.write().await = app_config;
    }

    pub async fn set_platform(&self, platform: PlatformSettings) {
        *self.platform.write().await = platform;
    }

    pub async fn set_quota(&self, quota: QuotaCheck) {
        *self.quota.write().await = quota;
    }

    /// Fail only the quota check.
    pub async fn set_quota_outage(&self, message: Option<&str>) {
        self.quota_outage.set(message.map(str::to_string)).await;
    }

    pub async fn set_outage(&self, message: Option<&str>) {
        self.outage.set(message.map(str::to_string)).await;
    }
}

#[async_trait]
impl SettingsService for MemorySettingsService {
    async fn app_config(&self) -> Result<AppConfig, ClientError> {
        self.outage.check("settings").await?;
        Ok(self.app_config.read().await.clone())
    }

    async fn check_quotas(&self) -> Result<QuotaCheck, ClientError> {
        self.outage.check("settings").await?;
        self.quota_outage.check("quota check").await?;
        Ok(self.quota.read().await.clone())
    }

    async fn platform_settings(&self) -> Result<PlatformSettings, ClientError> {
        self.outage.check("settings").await?;
        Ok(self.platform.read().await.clone())
    }
}

// ============================================================================
// NETWORK ALLOCATOR
// ============================================================================

#[derive(Debug, Default)]
pub struct MemoryNetworkAllocator {
    free: Mutex<VecDeque<String>>,
    assigned: Mutex<HashMap<Uuid, String>>,
    assign_calls: Mutex<usize>,
    outage: Outage,
}

impl MemoryNetworkAllocator {
    /// `count` free `/16` blocks: `10.0.0.0/16`, `10.1.0.0/16`, ...
    pub fn with_blocks(count: u8) -> Self {
        let mut allocator = Self::default();
        *allocator.free.get_mut() = (0..count).map(|i| format!("10.{i}.0.0/16")).collect();
        allocator
    }

    pub async fn assign_calls(&self) -> usize {
        *self.assign_calls.lock().await
    }

    pub async fn set_outage(&self, message: Option<&str>) {
        self.outage.set(message.map(str::to_string)).await;
    }
}

#[async_trait]
impl NetworkAllocator for MemoryNetworkAllocator {
    async fn has_available_block(&self) -> Result<bool, ClientError> {
        self.outage.check("network allocator").await?;
        Ok(!self.free.lock().await.is_empty())
    }

    async fn assign_block(&self, tenant_id: Uuid) -> Result<String, ClientError> {
        self.outage.check("network allocator").await?;
        *self.assign_calls.lock().await += 1;

        let mut assigned = self.assigned.lock().await;
        if let Some(block) = assigned.get(&tenant_id) {
            return Ok(block.clone());
        }
        let block = self
            .free
            .lock()
            .await
            .pop_front()
            .ok_or_else(|| {
                ClientError::unavailable("network allocator", "no free address blocks")
            })?;
        assigned.insert(tenant_id, block.clone());
        Ok(block)
    }

    async fn get_block(&self, tenant_id: Uuid) -> Result<Option<String>, ClientError> {
        self.outage.check("network allocator").await?;
        Ok(self.assigned.lock().await.get(&tenant_id).cloned())
    }
}

// ============================================================================
// CONTAINER REGISTRY
// ============================================================================

#[derive(Debug, Default)]
pub struct MemoryContainerRegistry {
    images: RwLock<HashSet<(String, String)>>,
    outage: Outage,
}

impl MemoryContainerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn push_image(&self, repository: &str, tag: &str) {
        self.images
            .write()
            .await
            .insert((repository.to_string(), tag.to_string()));
    }

    pub async fn set_outage(&self, message: Option<&str>) {
        self.outage.set(message.map(str::to_string)).await;
    }
}

#[async_trait]
impl ContainerRegistry for MemoryContainerRegistry {
    async fn image_exists(&self, repository: &str, tag: &str) -> Result<bool, ClientError> {
        self.outage.check("container registry").await?;
        Ok(self
            .images
            .read()
            .await
            .contains(&(repository.to_string(), tag.to_string())))
    }
}

// ============================================================================
// DNS
// ============================================================================

#[derive(Debug, Default)]
pub struct MemoryDnsRegistry {
    zones: RwLock<HashMap<String, Vec<String>>>,
    outage: Outage,
}

impl MemoryDnsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_a_record(&self, hosted_zone: &str, name: &str) {
        self.zones
            .write()
            .await
            .entry(hosted_zone.to_string())
            .or_default()
            .push(name.to_string());
    }

    pub async fn set_outage(&self, message: Option<&str>) {
        self.outage.set(message.map(str::to_string)).await;
    }
}

#[async_trait]
impl DnsRegistry for MemoryDnsRegistry {
    async fn a_records(&self, hosted_zone: &str) -> Result<Vec<String>, ClientError> {
        self.outage.check("dns").await?;
        Ok(self
            .zones
            .read()
            .await
            .get(hosted_zone)
            .cloned()
            .unwrap_or_default())
    }
}

// ============================================================================
// PROVISIONING ENGINE
// ============================================================================

#[derive(Debug, Default)]
pub struct MemoryProvisioningEngine {
    created: Mutex<Vec<(String, CreateStackRequest)>>,
    updates: Mutex<Vec<UpdateStackRequest>>,
    deleted: Mutex<Vec<String>>,
    /// Stack names containing this fragment fail to create.
    fail_matching: RwLock<Option<String>>,
    update_behaviour: RwLock<Option<Result<bool, String>>>,
    outage: Outage,
}

impl MemoryProvisioningEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn fail_stacks_matching(&self, fragment: Option<&str>) {
        *self.fail_matching.write().await = fragment.map(str::to_string);
    }

    /// Make the next updates report that nothing changed.
    pub async fn set_no_changes(&self) {
        *self.update_behaviour.write().await = Some(Ok(false));
    }

    pub async fn set_update_error(&self, message: &str) {
        *self.update_behaviour.write().await = Some(Err(message.to_string()));
    }

    /// Every accepted create request with the identifier handed out.
    pub async fn created(&self) -> Vec<(String, CreateStackRequest)> {
        self.created.lock().await.clone()
    }

    pub async fn updates(&self) -> Vec<UpdateStackRequest> {
        self.updates.lock().await.clone()
    }

    /// Stacks torn down, in order.
    pub async fn deleted(&self) -> Vec<String> {
        self.deleted.lock().await.clone()
    }

    pub async fn set_outage(&self, message: Option<&str>) {
        self.outage.set(message.map(str::to_string)).await;
    }
}

#[async_trait]
impl ProvisioningEngine for MemoryProvisioningEngine {
    async fn create_stack(&self, request: &CreateStackRequest) -> Result<String, ClientError> {
        self.outage.check("provisioning engine").await?;
        if let Some(fragment) = self.fail_matching.read().await.as_deref() {
            if request.stack_name.contains(fragment) {
                return Err(ClientError::Status {
                    service: "provisioning engine",
                    status: 400,
                    body: format!("Stack {} rejected", request.stack_name),
                });
            }
        }

        let stack_id = format!(
            "arn:local:provisioning:local-1:000000000000:stack/{}/{}",
            request.stack_name,
            Uuid::new_v4()
        );
        self.created
            .lock()
            .await
            .push((stack_id.clone(), request.clone()));
        Ok(stack_id)
    }

    async fn update_stack(
        &self,
        request: &UpdateStackRequest,
    ) -> Result<UpdateOutcome, ClientError> {
        self.outage.check("provisioning engine").await?;
        match self.update_behaviour.read().await.clone() {
            Some(Err(message)) => Err(ClientError::Status {
                service: "provisioning engine",
                status: 400,
                body: message,
            }),
            Some(Ok(false)) => Ok(UpdateOutcome::NoChanges),
            _ => {
                self.updates.lock().await.push(request.clone());
                Ok(UpdateOutcome::Updating {
                    stack_id: request.stack_id.clone(),
                })
            }
        }
    }

    /// Known stacks are the created ones, by identifier or name.
    async fn delete_stack(&self, stack: &str) -> Result<(), ClientError> {
        self.outage.check("provisioning engine").await?;
        let known = self
            .created
            .lock()
            .await
            .iter()
            .any(|(stack_id, request)| stack_id == stack || request.stack_name == stack);
        let mut deleted = self.deleted.lock().await;
        if !known || deleted.iter().any(|d| d == stack) {
            return Err(ClientError::not_found(format!("stack {stack}")));
        }
        deleted.push(stack.to_string());
        Ok(())
    }
}
