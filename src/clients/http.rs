//! HTTP adapters.
//!
//! Each adapter talks JSON to one base URL. Non-success statuses become
//! [`ClientError::Status`] with the response body, except where a 404 has a
//! meaning of its own.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;
use uuid::Uuid;

use onboarding_types::{AppConfig, OnboardingRequest, TenantRecord};

use super::*;

const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Engine response text when an update carries no changes.
const NO_UPDATES_MESSAGE: &str = "No updates are to be performed";

/// Engine response text for a stack it does not know.
const MISSING_STACK_MESSAGE: &str = "does not exist";

/// JSON client bound to one collaborator base URL.
#[derive(Clone)]
struct ApiClient {
    client: Client,
    base: Url,
    service: &'static str,
}

impl ApiClient {
    fn new(service: &'static str, base: &Url) -> Result<Self, ClientError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;
        let mut base = base.clone();
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Ok(Self {
            client,
            base,
            service,
        })
    }

    fn url(&self, path: &str) -> Result<Url, ClientError> {
        Ok(self.base.join(path)?)
    }

    async fn check(&self, response: Response) -> Result<Response, ClientError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(ClientError::Status {
            service: self.service,
            status: status.as_u16(),
            body,
        })
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>, ClientError> {
        let url = self.url(path)?;
        debug!(service = self.service, %url, "GET");
        let response = self.client.get(url).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = self.check(response).await?;
        Ok(Some(response.json().await?))
    }

    async fn send<B: Serialize + ?Sized>(
        &self,
        method: reqwest::Method,
        path: &str,
        body: &B,
    ) -> Result<Response, ClientError> {
        let url = self.url(path)?;
        debug!(service = self.service, %url, %method, "request");
        let response = self.client.request(method, url).json(body).send().await?;
        self.check(response).await
    }

    /// DELETE; a 404 is [`ClientError::NotFound`].
    async fn delete(&self, path: &str) -> Result<(), ClientError> {
        let url = self.url(path)?;
        debug!(service = self.service, %url, "DELETE");
        let response = self.client.delete(url).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(ClientError::not_found(path.to_string()));
        }
        self.check(response).await?;
        Ok(())
    }
}

// ============================================================================
// TENANT DIRECTORY
// ============================================================================

pub struct HttpTenantDirectory {
    api: ApiClient,
}

impl HttpTenantDirectory {
    pub fn new(base: &Url) -> Result<Self, ClientError> {
        Ok(Self {
            api: ApiClient::new("tenant directory", base)?,
        })
    }
}

#[async_trait]
impl TenantDirectory for HttpTenantDirectory {
    async fn create_tenant(
        &self,
        request: &OnboardingRequest,
    ) -> Result<Option<TenantRecord>, ClientError> {
        let response = self
            .api
            .send(reqwest::Method::POST, "tenants", request)
            .await?;
        Ok(response.json::<Option<TenantRecord>>().await?)
    }

    async fn get_tenant(&self, tenant_id: Uuid) -> Result<Option<TenantRecord>, ClientError> {
        self.api.get(&format!("tenants/{tenant_id}")).await
    }
}

// ============================================================================
// SETTINGS
// ============================================================================

pub struct HttpSettingsService {
    api: ApiClient,
}

impl HttpSettingsService {
    pub fn new(base: &Url) -> Result<Self, ClientError> {
        Ok(Self {
            api: ApiClient::new("settings", base)?,
        })
    }
}

#[async_trait]
impl SettingsService for HttpSettingsService {
    async fn app_config(&self) -> Result<AppConfig, ClientError> {
        self.api
            .get("settings/config")
            .await?
            .ok_or_else(|| ClientError::not_found("app config"))
    }

    async fn check_quotas(&self) -> Result<QuotaCheck, ClientError> {
        self.api
            .get("quotas/check")
            .await?
            .ok_or_else(|| ClientError::not_found("quota check"))
    }

    async fn platform_settings(&self) -> Result<PlatformSettings, ClientError> {
        self.api
            .get("settings/platform")
            .await?
            .ok_or_else(|| ClientError::not_found("platform settings"))
    }
}

// ============================================================================
// NETWORK ALLOCATOR
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Availability {
    available: bool,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BlockAssignment {
    tenant_id: Uuid,
    #[serde(default)]
    cidr_block: Option<String>,
}

pub struct HttpNetworkAllocator {
    api: ApiClient,
}

impl HttpNetworkAllocator {
    pub fn new(base: &Url) -> Result<Self, ClientError> {
        Ok(Self {
            api: ApiClient::new("network allocator", base)?,
        })
    }
}

#[async_trait]
impl NetworkAllocator for HttpNetworkAllocator {
    async fn has_available_block(&self) -> Result<bool, ClientError> {
        let availability: Option<Availability> = self.api.get("network/blocks/available").await?;
        Ok(availability.is_some_and(|a| a.available))
    }

    async fn assign_block(&self, tenant_id: Uuid) -> Result<String, ClientError> {
        let request = BlockAssignment {
            tenant_id,
            cidr_block: None,
        };
        let assignment: BlockAssignment = self
            .api
            .send(reqwest::Method::POST, "network/blocks", &request)
            .await?
            .json()
            .await?;
        assignment
            .cidr_block
            .ok_or_else(|| ClientError::unavailable("network allocator", "no block assigned"))
    }

    async fn get_block(&self, tenant_id: Uuid) -> Result<Option<String>, ClientError> {
        let assignment: Option<BlockAssignment> =
            self.api.get(&format!("network/blocks/{tenant_id}")).await?;
        Ok(assignment.and_then(|a| a.cidr_block))
    }
}

// ============================================================================
// CONTAINER REGISTRY
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImageList {
    #[serde(default)]
    image_tags: Vec<String>,
}

pub struct HttpContainerRegistry {
    api: ApiClient,
}

impl HttpContainerRegistry {
    pub fn new(base: &Url) -> Result<Self, ClientError> {
        Ok(Self {
            api: ApiClient::new("container registry", base)?,
        })
    }
}

#[async_trait]
impl ContainerRegistry for HttpContainerRegistry {
    async fn image_exists(&self, repository: &str, tag: &str) -> Result<bool, ClientError> {
        let images: Option<ImageList> = self
            .api
            .get(&format!("repositories/{repository}/images"))
            .await?;
        Ok(images.is_some_and(|list| list.image_tags.iter().any(|t| t == tag)))
    }
}

// ============================================================================
// DNS
// ============================================================================

#[derive(Debug, Deserialize)]
struct RecordSet {
    name: String,
    #[serde(rename = "type")]
    record_type: String,
}

#[derive(Debug, Deserialize)]
struct RecordSets {
    #[serde(default)]
    records: Vec<RecordSet>,
}

pub struct HttpDnsRegistry {
    api: ApiClient,
}

impl HttpDnsRegistry {
    pub fn new(base: &Url) -> Result<Self, ClientError> {
        Ok(Self {
            api: ApiClient::new("dns", base)?,
        })
    }
}

#[async_trait]
impl DnsRegistry for HttpDnsRegistry {
    async fn a_records(&self, hosted_zone: &str) -> Result<Vec<String>, ClientError> {
        let sets: RecordSets = self
            .api
            .get(&format!("zones/{hosted_zone}/records"))
            .await?
            .ok_or_else(|| ClientError::not_found(format!("hosted zone {hosted_zone}")))?;
        Ok(sets
            .records
            .into_iter()
            .filter(|r| r.record_type == "A")
            .map(|r| r.name)
            .collect())
    }
}

// ============================================================================
// PROVISIONING ENGINE
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StackCreated {
    stack_id: String,
}

pub struct HttpProvisioningEngine {
    api: ApiClient,
}

impl HttpProvisioningEngine {
    pub fn new(base: &Url) -> Result<Self, ClientError> {
        Ok(Self {
            api: ApiClient::new("provisioning engine", base)?,
        })
    }
}

#[async_trait]
impl ProvisioningEngine for HttpProvisioningEngine {
    async fn create_stack(&self, request: &CreateStackRequest) -> Result<String, ClientError> {
        let created: StackCreated = self
            .api
            .send(reqwest::Method::POST, "stacks", request)
            .await?
            .json()
            .await?;
        Ok(created.stack_id)
    }

    async fn update_stack(
        &self,
        request: &UpdateStackRequest,
    ) -> Result<UpdateOutcome, ClientError> {
        let path = format!("stacks/{}", urlencode(&request.stack_id));
        match self.api.send(reqwest::Method::PUT, &path, request).await {
            Ok(response) => {
                let updated: StackCreated = response.json().await?;
                Ok(UpdateOutcome::Updating {
                    stack_id: updated.stack_id,
                })
            }
            Err(ClientError::Status { body, .. }) if body.contains(NO_UPDATES_MESSAGE) => {
                Ok(UpdateOutcome::NoChanges)
            }
            Err(e) => Err(e),
        }
    }

    async fn delete_stack(&self, stack: &str) -> Result<(), ClientError> {
        let path = format!("stacks/{}", urlencode(stack));
        match self.api.delete(&path).await {
            Err(ClientError::Status { body, .. }) if body.contains(MISSING_STACK_MESSAGE) => {
                Err(ClientError::not_found(format!("stack {stack}")))
            }
            other => other,
        }
    }
}

/// Stack identifiers contain `/` and `:`; keep them in one path segment.
fn urlencode(segment: &str) -> String {
    url::form_urlencoded::byte_serialize(segment.as_bytes()).collect()
}
